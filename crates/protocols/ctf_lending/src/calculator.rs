//! Display Calculator
//!
//! Pure math for health status, rates and number formatting.
//! No I/O - just calculations on values the loader already fetched.

use accrue_core::constants::{
    COLLATERAL_DECIMALS, HEALTH_FACTOR_DECIMALS, PRICE_DECIMALS,
};
use accrue_core::units::{self, to_decimal, UnitsError};
use accrue_core::U256;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::constants::{display, health, strategy};

/// Risk bucket of a health factor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Danger,
}

/// What the health indicator should show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HealthReading {
    /// No debt: health is unbounded
    Infinite,
    /// Loaded ratio and its bucket
    Ratio { value: Decimal, status: HealthStatus },
    /// Debt exists but no chain value has been loaded for it yet
    Unknown,
}

impl HealthReading {
    pub fn status(&self) -> Option<HealthStatus> {
        match self {
            Self::Infinite => Some(HealthStatus::Healthy),
            Self::Ratio { status, .. } => Some(*status),
            Self::Unknown => None,
        }
    }
}

/// Determine health status from health factor
pub fn health_status(health_factor: Decimal) -> HealthStatus {
    if health_factor >= health::HEALTHY_THRESHOLD {
        HealthStatus::Healthy
    } else if health_factor >= health::WARNING_THRESHOLD {
        HealthStatus::Warning
    } else {
        HealthStatus::Danger
    }
}

/// Health to display for a debt and the last loaded health factor.
///
/// Zero debt is always infinite; otherwise only a chain-loaded value is shown.
pub fn health_reading(debt: U256, health_factor: Option<U256>) -> HealthReading {
    if debt.is_zero() {
        return HealthReading::Infinite;
    }
    match health_factor.map(|hf| to_decimal(hf, HEALTH_FACTOR_DECIMALS)) {
        Some(Ok(value)) => HealthReading::Ratio {
            value,
            status: health_status(value),
        },
        // Contracts report u256::MAX for positions they consider unbounded
        Some(Err(_)) => HealthReading::Infinite,
        None => HealthReading::Unknown,
    }
}

/// USD value of locked collateral at the oracle price
pub fn collateral_value(collateral: U256, price: U256) -> Result<Decimal, UnitsError> {
    let shares = to_decimal(collateral, COLLATERAL_DECIMALS)?;
    let price = to_decimal(price, PRICE_DECIMALS)?;
    shares.checked_mul(price).ok_or(UnitsError::Overflow)
}

/// Annualized 1e18 rate as a percentage
pub fn rate_percent(annual_rate: U256) -> Result<Decimal, UnitsError> {
    to_decimal(annual_rate, display::RATE_PERCENT_DECIMALS)
}

/// Basis points as a percentage
pub fn ltv_percent(ltv_bps: U256) -> Result<Decimal, UnitsError> {
    let bps = to_decimal(ltv_bps, 0)?;
    Ok((bps / Decimal::from(display::BPS_PER_PERCENT)).normalize())
}

/// Suggested amount for the borrow "max" helper
pub fn borrow_max_suggestion(max_borrowable: U256) -> U256 {
    units::mul_div(max_borrowable, display::BORROW_MAX_SUGGESTION_PERCENT, 100)
}

/// Amount the protocol-managed strategy borrows
pub fn managed_borrow_amount(max_borrowable: U256) -> U256 {
    units::mul_div(max_borrowable, strategy::MANAGED_BORROW_PERCENT, 100)
}

/// Time since deposit: `Nd Nh Nm`, `Nh Nm Ns`, `Nm Ns` or `Ns`
pub fn format_elapsed(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3_600;
    let minutes = (secs % 3_600) / 60;
    let seconds = secs % 60;

    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Format with thousands separators and exactly `fraction_digits` decimals
pub fn format_number(value: Decimal, fraction_digits: u32) -> String {
    let rounded =
        value.round_dp_with_strategy(fraction_digits, RoundingStrategy::MidpointAwayFromZero);
    let text = format!("{:.*}", fraction_digits as usize, rounded.abs());
    let (int_part, frac_part) = match text.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (text.as_str(), None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    match frac_part {
        Some(f) => format!("{}{}.{}", sign, grouped, f),
        None => format!("{}{}", sign, grouped),
    }
}

/// Format a base-unit amount for display
pub fn format_amount(value: U256, decimals: u8, fraction_digits: u32) -> String {
    match to_decimal(value, decimals) {
        Ok(d) => format_number(d, fraction_digits),
        Err(_) => units::format_units(value, decimals),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accrue_core::units::pow10;
    use rust_decimal_macros::dec;

    /// Health factor given in thousandths
    fn hf(millis: u64) -> U256 {
        U256::from(millis) * pow10(15)
    }

    #[test]
    fn test_health_status_buckets() {
        assert_eq!(health_status(dec!(2)), HealthStatus::Healthy);
        assert_eq!(health_status(dec!(1.5)), HealthStatus::Healthy);
        assert_eq!(health_status(dec!(1.49)), HealthStatus::Warning);
        assert_eq!(health_status(dec!(1.2)), HealthStatus::Warning);
        assert_eq!(health_status(dec!(1.19)), HealthStatus::Danger);
    }

    #[test]
    fn test_health_infinite_iff_no_debt() {
        assert_eq!(health_reading(U256::ZERO, None), HealthReading::Infinite);
        assert_eq!(
            health_reading(U256::ZERO, Some(hf(1_100))),
            HealthReading::Infinite
        );
        assert_eq!(
            health_reading(U256::from(1u64), Some(hf(1_300))),
            HealthReading::Ratio {
                value: dec!(1.3),
                status: HealthStatus::Warning
            }
        );
        assert_eq!(
            health_reading(U256::from(1u64), None),
            HealthReading::Unknown
        );
        assert_eq!(
            health_reading(U256::from(1u64), Some(U256::MAX)),
            HealthReading::Infinite
        );
    }

    #[test]
    fn test_collateral_value() {
        let shares = U256::from(100u64) * pow10(18);
        let price = U256::from(65_000_000u64); // 0.65
        assert_eq!(collateral_value(shares, price).unwrap(), dec!(65));
    }

    #[test]
    fn test_rate_and_ltv_percent() {
        // 5 % annualized
        let rate = U256::from(5u64) * pow10(16);
        assert_eq!(rate_percent(rate).unwrap(), dec!(5));
        assert_eq!(ltv_percent(U256::from(7_500u64)).unwrap(), dec!(75));
        assert_eq!(ltv_percent(U256::from(6_250u64)).unwrap(), dec!(62.5));
    }

    #[test]
    fn test_max_helpers() {
        assert_eq!(
            borrow_max_suggestion(U256::from(1_000u64)),
            U256::from(990u64)
        );
        assert_eq!(
            managed_borrow_amount(U256::from(1_000u64)),
            U256::from(800u64)
        );
        assert_eq!(managed_borrow_amount(U256::from(1u64)), U256::ZERO);
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(0), "0s");
        assert_eq!(format_elapsed(59), "59s");
        assert_eq!(format_elapsed(61), "1m 1s");
        assert_eq!(format_elapsed(3_725), "1h 2m 5s");
        assert_eq!(format_elapsed(90_061), "1d 1h 1m");
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(dec!(1234567.891), 2), "1,234,567.89");
        assert_eq!(format_number(dec!(999), 2), "999.00");
        assert_eq!(format_number(dec!(1000), 0), "1,000");
        assert_eq!(format_number(dec!(0.005), 2), "0.01");
        assert_eq!(format_number(dec!(-1234.5), 1), "-1,234.5");
    }

    #[test]
    fn test_format_amount() {
        let usdc = U256::from(1_234_500_000u64);
        assert_eq!(format_amount(usdc, 6, 2), "1,234.50");
    }
}
