//! Conditional-token lending constants
//!
//! Client-side parameters only. Contract addresses and the network live in
//! `accrue_core::config`.

/// Estimated lender yield, used by the client-side earnings display
pub mod earnings {
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    /// 12.5 % APY
    pub const APY: Decimal = dec!(0.125);
    /// 365.25 days
    pub const SECONDS_PER_YEAR: u64 = 31_557_600;
    pub const TICK_INTERVAL_SECS: u64 = 1;
}

/// Health factor display thresholds
pub mod health {
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    pub const HEALTHY_THRESHOLD: Decimal = dec!(1.5);
    pub const WARNING_THRESHOLD: Decimal = dec!(1.2);
}

/// Protocol-managed strategy
pub mod strategy {
    /// Share of the max borrowable amount the managed strategy borrows
    pub const MANAGED_BORROW_PERCENT: u64 = 80;
}

/// Display scaling of on-chain rates and ratios
pub mod display {
    /// Annualized 1e18 rate to percent
    pub const RATE_PERCENT_DECIMALS: u8 = 16;
    /// Basis points to percent
    pub const BPS_PER_PERCENT: u64 = 100;
    /// "Max" button for borrowing suggests this share of the max borrowable
    pub const BORROW_MAX_SUGGESTION_PERCENT: u64 = 99;
    /// Elapsed-time display refresh
    pub const ELAPSED_TICK_SECS: u64 = 1;
}
