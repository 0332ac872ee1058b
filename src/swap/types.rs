//! Swap request and result shapes

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::account::BalanceSnapshot;
use crate::core_types::{Asset, UserId};
use crate::ledger::LedgerEntry;

/// Raw swap input; every field is validated by the engine
#[derive(Debug, Clone)]
pub struct SwapRequest {
    pub user_id: UserId,
    pub from_asset: String,
    pub to_asset: String,
    pub from_amount: String,
    /// Used only when the user has no configured currency
    pub user_currency: Option<String>,
}

/// Engine settings threaded in at construction
#[derive(Debug, Clone, Deserialize)]
pub struct SwapSettings {
    /// Quote currency when neither the user nor the caller names one
    pub default_currency: String,
    /// Display symbol of the secondary asset on ledger entries
    #[serde(default = "default_secondary_symbol")]
    pub secondary_symbol: String,
}

fn default_secondary_symbol() -> String {
    "BTC".to_string()
}

impl Default for SwapSettings {
    fn default() -> Self {
        Self {
            default_currency: "USD".to_string(),
            secondary_symbol: default_secondary_symbol(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwapSummary {
    pub from_asset: Asset,
    pub to_asset: Asset,
    pub from_amount: Decimal,
    pub to_amount: Decimal,
    /// Fiat per one unit of the secondary asset
    pub rate: Decimal,
    pub quote_currency: String,
    pub fee: Decimal,
    pub reference: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SwapOutcome {
    pub swap: SwapSummary,
    /// Debit leg first, then credit leg
    pub transactions: Vec<LedgerEntry>,
    pub new_balances: BalanceSnapshot,
}
