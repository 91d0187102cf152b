//! Fixed-point unit scaling
//!
//! Contract amounts are integers scaled by a per-asset number of decimals.
//! Everything here is exact: user input is parsed straight into `U256` and
//! only display values are converted to `Decimal`.

use alloy_primitives::utils as alloy_units;
use alloy_primitives::U256;
use rust_decimal::Decimal;
use thiserror::Error;

/// Unit conversion errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UnitsError {
    #[error("empty amount")]
    Empty,

    #[error("invalid amount '{0}'")]
    Invalid(String),

    #[error("too many decimal places (max {max})")]
    TooPrecise { max: u8 },

    #[error("amount out of range")]
    Overflow,
}

/// 10^decimals as U256
pub fn pow10(decimals: u8) -> U256 {
    let ten = U256::from(10u64);
    (0..decimals).fold(U256::from(1u64), |acc, _| acc * ten)
}

/// Parse a decimal string such as `"12.5"` into a fixed-point integer.
///
/// Leading/trailing whitespace is ignored. More fractional digits than
/// `decimals` is an error rather than a silent truncation.
pub fn parse_units(amount: &str, decimals: u8) -> Result<U256, UnitsError> {
    let amount = amount.trim();
    if amount.is_empty() {
        return Err(UnitsError::Empty);
    }

    let (whole, frac) = match amount.split_once('.') {
        Some((w, f)) => (w, f),
        None => (amount, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(UnitsError::Invalid(amount.to_string()));
    }
    let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if !all_digits(whole) || !all_digits(frac) {
        return Err(UnitsError::Invalid(amount.to_string()));
    }

    // alloy truncates excess digits; only zeros may be dropped here
    let frac = frac.trim_end_matches('0');
    if frac.len() > decimals as usize {
        return Err(UnitsError::TooPrecise { max: decimals });
    }

    let whole = if whole.is_empty() { "0" } else { whole };
    let normalized = if frac.is_empty() {
        whole.to_string()
    } else {
        format!("{}.{}", whole, frac)
    };
    alloy_units::parse_units(&normalized, decimals)
        .map(|parsed| parsed.get_absolute())
        .map_err(|_| UnitsError::Overflow)
}

/// Format a fixed-point integer as a decimal string without trailing zeros.
pub fn format_units(value: U256, decimals: u8) -> String {
    match alloy_units::format_units(value, decimals) {
        Ok(s) if s.contains('.') => s.trim_end_matches('0').trim_end_matches('.').to_string(),
        Ok(s) => s,
        // Only reachable for more than 77 decimals
        Err(_) => value.to_string(),
    }
}

/// Convert a fixed-point integer to a `Decimal` for display.
pub fn to_decimal(value: U256, decimals: u8) -> Result<Decimal, UnitsError> {
    let raw = u128::try_from(value).map_err(|_| UnitsError::Overflow)?;
    let raw = i128::try_from(raw).map_err(|_| UnitsError::Overflow)?;
    Decimal::try_from_i128_with_scale(raw, decimals as u32)
        .map(|d| d.normalize())
        .map_err(|_| UnitsError::Overflow)
}

/// `value * numerator / denominator` with truncation
pub fn mul_div(value: U256, numerator: u64, denominator: u64) -> U256 {
    if denominator == 0 {
        return U256::ZERO;
    }
    value.saturating_mul(U256::from(numerator)) / U256::from(denominator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_units_whole_and_fraction() {
        assert_eq!(parse_units("100", 18).unwrap(), U256::from(100u64) * pow10(18));
        assert_eq!(parse_units("50.25", 6).unwrap(), U256::from(50_250_000u64));
        assert_eq!(parse_units(".5", 6).unwrap(), U256::from(500_000u64));
        assert_eq!(parse_units("1.", 6).unwrap(), U256::from(1_000_000u64));
        assert_eq!(parse_units(" 0.000001 ", 6).unwrap(), U256::from(1u64));
    }

    #[test]
    fn test_parse_units_rejects_bad_input() {
        assert_eq!(parse_units("", 6), Err(UnitsError::Empty));
        assert!(matches!(parse_units("-1", 6), Err(UnitsError::Invalid(_))));
        assert!(matches!(parse_units("1e5", 6), Err(UnitsError::Invalid(_))));
        assert!(matches!(parse_units(".", 6), Err(UnitsError::Invalid(_))));
        assert_eq!(
            parse_units("0.0000001", 6),
            Err(UnitsError::TooPrecise { max: 6 })
        );
        // trailing zeros beyond precision are harmless
        assert_eq!(parse_units("1.2500000", 6).unwrap(), U256::from(1_250_000u64));
    }

    #[test]
    fn test_parse_units_overflow() {
        let huge = "9".repeat(80);
        assert_eq!(parse_units(&huge, 18), Err(UnitsError::Overflow));
    }

    #[test]
    fn test_format_units() {
        assert_eq!(format_units(U256::from(50_250_000u64), 6), "50.25");
        assert_eq!(format_units(U256::from(1u64), 6), "0.000001");
        assert_eq!(format_units(pow10(18) * U256::from(3u64), 18), "3");
        assert_eq!(format_units(U256::ZERO, 8), "0");
    }

    #[test]
    fn test_to_decimal() {
        assert_eq!(to_decimal(U256::from(65_000_000u64), 8).unwrap(), dec!(0.65));
        assert_eq!(
            to_decimal(U256::from(1_500_000_000_000_000_000u64), 18).unwrap(),
            dec!(1.5)
        );
        assert_eq!(to_decimal(U256::MAX, 18), Err(UnitsError::Overflow));
    }

    #[test]
    fn test_mul_div_truncates() {
        assert_eq!(mul_div(U256::from(1000u64), 80, 100), U256::from(800u64));
        assert_eq!(mul_div(U256::from(999u64), 80, 100), U256::from(799u64));
        assert_eq!(mul_div(U256::from(5u64), 1, 0), U256::ZERO);
    }
}
