//! Money parsing and rounding
//!
//! Every client-supplied amount goes through [`parse_amount`] before it can
//! touch a balance. Amounts are `Decimal` end to end; floats never appear on
//! the balance path.
//!
//! ## Scales
//! - fiat amounts carry at most [`FIAT_SCALE`] decimals
//! - secondary-asset amounts carry at most [`SECONDARY_SCALE`] decimals

use rust_decimal::prelude::*;
use thiserror::Error;

use crate::core_types::Asset;

/// Decimal places kept for fiat balances
pub const FIAT_SCALE: u32 = 2;

/// Decimal places kept for secondary-asset balances (satoshi precision)
pub const SECONDARY_SCALE: u32 = 8;

/// Largest amount or fee a client may submit
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(0xA4C6_8000, 0x0003_8D7E, 0, false, 0); // 1_000_000_000_000_000

/// Money parsing errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Amount cannot be empty")]
    Empty,

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Amount must be greater than zero")]
    NotPositive,

    #[error("Amount cannot be negative")]
    Negative,

    #[error("Precision overflow: provided {provided} decimals, max allowed {max}")]
    PrecisionOverflow { provided: u32, max: u32 },

    #[error("Amount exceeds maximum of {max}")]
    TooLarge { max: Decimal },

    #[error("Arithmetic overflow")]
    Overflow,
}

/// Maximum scale allowed for an asset
#[inline]
pub fn scale_for(asset: Asset) -> u32 {
    match asset {
        Asset::Fiat => FIAT_SCALE,
        Asset::Secondary => SECONDARY_SCALE,
    }
}

/// Parse a client amount string into a strictly positive `Decimal`.
///
/// Rejects `.5`, `5.`, `+5`, scientific notation, `NaN`/`inf` and anything
/// carrying more than `max_scale` decimals.
pub fn parse_amount(raw: &str, max_scale: u32) -> Result<Decimal, MoneyError> {
    let d = parse_strict(raw, max_scale)?;
    if d <= Decimal::ZERO {
        return Err(MoneyError::NotPositive);
    }
    Ok(d)
}

/// Parse an optional fee; missing means zero, negative is rejected.
pub fn parse_fee(raw: Option<&str>, max_scale: u32) -> Result<Decimal, MoneyError> {
    let Some(s) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(Decimal::ZERO);
    };
    let d = parse_strict(s, max_scale)?;
    if d.is_sign_negative() && !d.is_zero() {
        return Err(MoneyError::Negative);
    }
    Ok(d)
}

fn parse_strict(raw: &str, max_scale: u32) -> Result<Decimal, MoneyError> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(MoneyError::Empty);
    }
    if s.starts_with('.') {
        return Err(MoneyError::InvalidFormat("use 0.5 not .5".into()));
    }
    if s.ends_with('.') {
        return Err(MoneyError::InvalidFormat("use 5.0 not 5.".into()));
    }
    if s.starts_with('+') {
        return Err(MoneyError::InvalidFormat("+ prefix not allowed".into()));
    }
    if s.contains(['e', 'E']) {
        return Err(MoneyError::InvalidFormat(
            "scientific notation not allowed".into(),
        ));
    }

    let d = Decimal::from_str(s)
        .map_err(|e| MoneyError::InvalidFormat(e.to_string()))?
        .normalize();
    if d.scale() > max_scale {
        return Err(MoneyError::PrecisionOverflow {
            provided: d.scale(),
            max: max_scale,
        });
    }
    if d.abs() > MAX_AMOUNT {
        return Err(MoneyError::TooLarge { max: MAX_AMOUNT });
    }
    Ok(d)
}

/// Round toward zero to the asset's scale.
///
/// Conversions never round up: the platform must not credit value it did
/// not receive.
#[inline]
pub fn round_down(value: Decimal, asset: Asset) -> Decimal {
    value.round_dp_with_strategy(scale_for(asset), RoundingStrategy::ToZero)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_parse_amount_valid() {
        assert_eq!(parse_amount("100", FIAT_SCALE), Ok(d("100")));
        assert_eq!(parse_amount(" 0.5 ", FIAT_SCALE), Ok(d("0.5")));
        assert_eq!(parse_amount("0.00000001", SECONDARY_SCALE), Ok(d("0.00000001")));
        // trailing zeros do not count against precision
        assert_eq!(parse_amount("1.500", FIAT_SCALE), Ok(d("1.5")));
    }

    #[test]
    fn test_parse_amount_rejects_bad_format() {
        assert_eq!(parse_amount("", FIAT_SCALE), Err(MoneyError::Empty));
        assert!(matches!(
            parse_amount(".5", FIAT_SCALE),
            Err(MoneyError::InvalidFormat(_))
        ));
        assert!(matches!(
            parse_amount("5.", FIAT_SCALE),
            Err(MoneyError::InvalidFormat(_))
        ));
        assert!(matches!(
            parse_amount("1e3", FIAT_SCALE),
            Err(MoneyError::InvalidFormat(_))
        ));
        assert!(matches!(
            parse_amount("NaN", FIAT_SCALE),
            Err(MoneyError::InvalidFormat(_))
        ));
        assert!(matches!(
            parse_amount("inf", FIAT_SCALE),
            Err(MoneyError::InvalidFormat(_))
        ));
        assert!(matches!(
            parse_amount("abc", FIAT_SCALE),
            Err(MoneyError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_parse_amount_rejects_non_positive() {
        assert_eq!(parse_amount("0", FIAT_SCALE), Err(MoneyError::NotPositive));
        assert_eq!(parse_amount("-5", FIAT_SCALE), Err(MoneyError::NotPositive));
    }

    #[test]
    fn test_parse_amount_precision() {
        assert_eq!(
            parse_amount("1.234", FIAT_SCALE),
            Err(MoneyError::PrecisionOverflow {
                provided: 3,
                max: 2
            })
        );
    }

    #[test]
    fn test_parse_amount_upper_bound() {
        assert_eq!(parse_amount("1000000000000000", FIAT_SCALE), Ok(MAX_AMOUNT));
        assert_eq!(
            parse_amount("1000000000000000.01", FIAT_SCALE),
            Err(MoneyError::TooLarge { max: MAX_AMOUNT })
        );
        // Decimal::MAX parses but must never reach balance arithmetic
        assert_eq!(
            parse_amount("79228162514264337593543950335", FIAT_SCALE),
            Err(MoneyError::TooLarge { max: MAX_AMOUNT })
        );
        assert_eq!(
            parse_fee(Some("79228162514264337593543950335"), FIAT_SCALE),
            Err(MoneyError::TooLarge { max: MAX_AMOUNT })
        );
    }

    #[test]
    fn test_parse_fee() {
        assert_eq!(parse_fee(None, FIAT_SCALE), Ok(Decimal::ZERO));
        assert_eq!(parse_fee(Some("0"), FIAT_SCALE), Ok(Decimal::ZERO));
        assert_eq!(parse_fee(Some("0.00"), FIAT_SCALE), Ok(Decimal::ZERO));
        assert_eq!(parse_fee(Some("2.5"), FIAT_SCALE), Ok(d("2.5")));
        assert_eq!(parse_fee(Some("-1"), FIAT_SCALE), Err(MoneyError::Negative));
    }

    #[test]
    fn test_round_down() {
        assert_eq!(round_down(d("0.123456789"), Asset::Secondary), d("0.12345678"));
        assert_eq!(round_down(d("99.999"), Asset::Fiat), d("99.99"));
    }
}
