//! Price oracle
//!
//! Fetches the fiat price of the secondary asset. Callers treat any error
//! as final: there is no cached or default rate to fall back to.

pub mod error;
pub mod http;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;

pub use error::OracleError;
pub use http::HttpPriceOracle;

#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Price of one unit of `asset_id` in `quote_currency`
    async fn fetch_rate(&self, asset_id: &str, quote_currency: &str)
    -> Result<Decimal, OracleError>;
}

/// Oracle endpoint and retry policy
#[derive(Debug, Clone, Deserialize)]
pub struct OracleConfig {
    pub base_url: String,
    /// Oracle id of the secondary asset (e.g. `bitcoin`)
    pub asset_id: String,
    /// Per-attempt bound, covering connect, response and body
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Linear backoff: attempt `n` waits `n * backoff_step_ms`
    #[serde(default = "default_backoff_step_ms")]
    pub backoff_step_ms: u64,
    /// Lower-case fiat codes the oracle is asked about
    #[serde(default = "default_supported_currencies")]
    pub supported_currencies: Vec<String>,
}

fn default_timeout_ms() -> u64 {
    8_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_step_ms() -> u64 {
    1_000
}

fn default_supported_currencies() -> Vec<String> {
    ["usd", "eur", "gbp", "jpy", "cad", "aud", "chf"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.coingecko.com/api/v3".to_string(),
            asset_id: "bitcoin".to_string(),
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            backoff_step_ms: default_backoff_step_ms(),
            supported_currencies: default_supported_currencies(),
        }
    }
}

impl OracleConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Delay before retry number `retry` (1-based)
    pub fn backoff(&self, retry: u32) -> Duration {
        Duration::from_millis(self.backoff_step_ms.saturating_mul(retry as u64))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    pub fn supports(&self, currency: &str) -> bool {
        let lowered = currency.to_lowercase();
        self.supported_currencies
            .iter()
            .any(|c| c.eq_ignore_ascii_case(&lowered))
    }
}
