//! Core types used throughout the system
//!
//! Identifiers and the two balance-bearing assets every module talks about.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// User ID - assigned at registration, never reused.
pub type UserId = uuid::Uuid;

/// The two balances a user holds.
///
/// The fiat side is denominated in the user's configured currency; the
/// secondary side is the single crypto asset the platform quotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Asset {
    Fiat,
    Secondary,
}

impl Asset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Asset::Fiat => "fiat",
            Asset::Secondary => "secondary",
        }
    }

    /// The asset on the other side of a swap
    pub fn other(&self) -> Asset {
        match self {
            Asset::Fiat => Asset::Secondary,
            Asset::Secondary => Asset::Fiat,
        }
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Asset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fiat" => Ok(Asset::Fiat),
            "secondary" | "crypto" => Ok(Asset::Secondary),
            _ => Err(format!("Unsupported asset: {}", s)),
        }
    }
}

/// Which store a movement in the admin feed came from.
///
/// `Admin` rows are canonical ledger entries, `User` rows are normalized
/// request records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementSource {
    User,
    Admin,
}

impl MovementSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementSource::User => "user",
            MovementSource::Admin => "admin",
        }
    }
}

impl fmt::Display for MovementSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MovementSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(MovementSource::User),
            "admin" => Ok(MovementSource::Admin),
            _ => Err(format!("Invalid movement source: {}", s)),
        }
    }
}
