//! HTTP price oracle
//!
//! `GET {base_url}/simple/price?ids={asset}&vs_currencies={ccy}` returning
//! `{ "<asset>": { "<ccy>": <number> } }`.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use tracing::{debug, error, warn};

use super::{OracleConfig, OracleError, PriceOracle};

pub struct HttpPriceOracle {
    client: reqwest::Client,
    config: OracleConfig,
}

impl HttpPriceOracle {
    pub fn new(config: OracleConfig) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| OracleError::Network(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// One bounded request
    async fn attempt(&self, asset_id: &str, currency: &str) -> Result<Decimal, OracleError> {
        let url = format!("{}/simple/price", self.config.base_url.trim_end_matches('/'));
        let request = async {
            let response = self
                .client
                .get(&url)
                .query(&[("ids", asset_id), ("vs_currencies", currency)])
                .send()
                .await?;
            let status = response.status();
            if !status.is_success() {
                return Err(OracleError::Http(status.as_u16()));
            }
            let body: Value = response.json().await?;
            Ok::<Value, OracleError>(body)
        };

        let body = tokio::time::timeout(self.config.timeout(), request)
            .await
            .map_err(|_| OracleError::Timeout(self.config.timeout_ms))??;

        parse_rate(&body, asset_id, currency)
    }
}

/// Pull the positive numeric rate for the pair out of an oracle payload
pub fn parse_rate(body: &Value, asset_id: &str, currency: &str) -> Result<Decimal, OracleError> {
    let number = body
        .get(asset_id)
        .and_then(|prices| prices.get(currency))
        .ok_or_else(|| OracleError::Malformed(format!("no {}/{} price", asset_id, currency)))?;

    let Value::Number(n) = number else {
        return Err(OracleError::Malformed(format!(
            "{}/{} price is not a number",
            asset_id, currency
        )));
    };

    let text = n.to_string();
    let rate = Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|e| OracleError::Malformed(format!("rate {}: {}", text, e)))?;

    if rate <= Decimal::ZERO {
        return Err(OracleError::Malformed(format!("non-positive rate {}", rate)));
    }
    Ok(rate)
}

#[async_trait]
impl PriceOracle for HttpPriceOracle {
    async fn fetch_rate(
        &self,
        asset_id: &str,
        quote_currency: &str,
    ) -> Result<Decimal, OracleError> {
        if !self.config.supports(quote_currency) {
            return Err(OracleError::UnsupportedCurrency(quote_currency.to_string()));
        }
        let currency = quote_currency.to_lowercase();
        let max_attempts = self.config.max_attempts();

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.attempt(asset_id, &currency).await {
                Ok(rate) => {
                    debug!(attempt, %rate, currency = %currency, "Oracle rate fetched");
                    return Ok(rate);
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.config.backoff(attempt);
                    warn!(
                        attempt,
                        delay_ms = %delay.as_millis(),
                        error = %e,
                        "Oracle request failed, retrying after delay"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!(attempt, error = %e, "Oracle request failed, giving up");
                    return Err(OracleError::RateUnavailable {
                        attempts: attempt,
                        last_error: e.to_string(),
                    });
                }
            }
        }
    }
}
