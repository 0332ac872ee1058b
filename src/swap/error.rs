//! Swap error types

use rust_decimal::Decimal;
use thiserror::Error;

use crate::core_types::{Asset, UserId};
use crate::money::MoneyError;
use crate::store::StoreError;

#[derive(Error, Debug, Clone)]
pub enum SwapError {
    #[error("Invalid swap: {0}")]
    Validation(String),

    #[error("Insufficient {asset} balance: available {available}, required {required}")]
    InsufficientFunds {
        asset: Asset,
        available: Decimal,
        required: Decimal,
    },

    /// Oracle failed; nothing was written
    #[error("Exchange rate unavailable: {0}")]
    RateUnavailable(String),

    #[error("User not found: {0}")]
    UserNotFound(UserId),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl SwapError {
    pub fn code(&self) -> &'static str {
        match self {
            SwapError::Validation(_) => "INVALID_SWAP",
            SwapError::InsufficientFunds { .. } => "INSUFFICIENT_BALANCE",
            SwapError::RateUnavailable(_) => "RATE_UNAVAILABLE",
            SwapError::UserNotFound(_) => "USER_NOT_FOUND",
            SwapError::Persistence(_) => "PERSISTENCE_ERROR",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            SwapError::Validation(_) => 400,
            SwapError::UserNotFound(_) => 404,
            SwapError::InsufficientFunds { .. } => 422,
            SwapError::Persistence(_) => 500,
            SwapError::RateUnavailable(_) => 503,
        }
    }
}

impl From<MoneyError> for SwapError {
    fn from(e: MoneyError) -> Self {
        SwapError::Validation(e.to_string())
    }
}

impl From<StoreError> for SwapError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::InsufficientBalance { asset, .. } => SwapError::InsufficientFunds {
                asset,
                available: Decimal::ZERO,
                required: Decimal::ZERO,
            },
            StoreError::InvalidPosting(why) => SwapError::Validation(why),
            other => SwapError::Persistence(other.to_string()),
        }
    }
}
