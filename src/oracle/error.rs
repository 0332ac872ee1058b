//! Oracle error types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OracleError {
    #[error("Unsupported quote currency: {0}")]
    UnsupportedCurrency(String),

    #[error("Oracle returned HTTP {0}")]
    Http(u16),

    #[error("Oracle request timed out after {0} ms")]
    Timeout(u64),

    #[error("Oracle network error: {0}")]
    Network(String),

    #[error("Malformed oracle payload: {0}")]
    Malformed(String),

    /// Every attempt failed; the caller must not fall back to another rate
    #[error("Rate unavailable after {attempts} attempts: {last_error}")]
    RateUnavailable { attempts: u32, last_error: String },
}

impl OracleError {
    /// Single-attempt failures are retried; the rest are final
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OracleError::Http(_)
                | OracleError::Timeout(_)
                | OracleError::Network(_)
                | OracleError::Malformed(_)
        )
    }

    pub fn code(&self) -> &'static str {
        match self {
            OracleError::UnsupportedCurrency(_) => "UNSUPPORTED_CURRENCY",
            OracleError::Http(_) => "ORACLE_HTTP_ERROR",
            OracleError::Timeout(_) => "ORACLE_TIMEOUT",
            OracleError::Network(_) => "ORACLE_NETWORK_ERROR",
            OracleError::Malformed(_) => "ORACLE_MALFORMED",
            OracleError::RateUnavailable { .. } => "RATE_UNAVAILABLE",
        }
    }
}

impl From<reqwest::Error> for OracleError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            OracleError::Http(status.as_u16())
        } else if e.is_decode() {
            OracleError::Malformed(e.to_string())
        } else {
            OracleError::Network(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(OracleError::Http(502).is_retryable());
        assert!(OracleError::Timeout(8000).is_retryable());
        assert!(!OracleError::UnsupportedCurrency("xyz".into()).is_retryable());
        assert!(
            !OracleError::RateUnavailable {
                attempts: 4,
                last_error: "x".into()
            }
            .is_retryable()
        );
    }
}
