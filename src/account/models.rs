//! Data models for user accounts

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core_types::{Asset, UserId};

/// User account with both balances
///
/// Balances are only ever changed inside a store posting; read paths get
/// a copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub full_name: String,
    pub fiat_balance: Decimal,
    pub secondary_balance: Decimal,
    /// Configured fiat currency code (e.g. `USD`)
    pub currency: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// New user with zero balances
    pub fn new(email: impl Into<String>, full_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4(),
            email: email.into(),
            full_name: full_name.into(),
            fiat_balance: Decimal::ZERO,
            secondary_balance: Decimal::ZERO,
            currency: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_balances(mut self, fiat: Decimal, secondary: Decimal) -> Self {
        self.fiat_balance = fiat;
        self.secondary_balance = secondary;
        self
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    #[inline]
    pub fn balance(&self, asset: Asset) -> Decimal {
        match asset {
            Asset::Fiat => self.fiat_balance,
            Asset::Secondary => self.secondary_balance,
        }
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            email: self.email.clone(),
            full_name: self.full_name.clone(),
        }
    }

    pub fn snapshot(&self) -> BalanceSnapshot {
        BalanceSnapshot {
            user_id: self.id,
            fiat: self.fiat_balance,
            secondary: self.secondary_balance,
            currency: self.currency.clone(),
        }
    }
}

/// Display join of a user onto a movement row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: UserId,
    pub email: String,
    pub full_name: String,
}

/// Both balances of one user after a posting
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceSnapshot {
    pub user_id: UserId,
    pub fiat: Decimal,
    pub secondary: Decimal,
    pub currency: Option<String>,
}
