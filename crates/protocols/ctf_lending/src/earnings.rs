//! Client-side earnings estimate
//!
//! A display-only accumulator: each second it adds `debt * APY / year` to a
//! running total. It is never submitted on-chain and is unrelated to the
//! interest the pool actually charges.

use std::time::Duration;

use accrue_core::constants::STABLE_DECIMALS;
use accrue_core::units::to_decimal;
use accrue_core::U256;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::constants::earnings::{APY, SECONDS_PER_YEAR, TICK_INTERVAL_SECS};
use crate::state::AppStore;
use crate::ticker::Ticker;

/// Estimated earnings in the stable asset's units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EarningsEstimate {
    pub earned: Decimal,
    pub rate_per_second: Decimal,
}

impl Default for EarningsEstimate {
    fn default() -> Self {
        Self {
            earned: Decimal::ZERO,
            rate_per_second: APY / Decimal::from(SECONDS_PER_YEAR),
        }
    }
}

impl EarningsEstimate {
    /// Add `secs` seconds of accrual on `debt` (6-decimal base units)
    pub fn accrue(&mut self, debt: U256, secs: u64) {
        let Ok(debt) = to_decimal(debt, STABLE_DECIMALS) else {
            tracing::warn!(%debt, "Debt out of display range, skipping accrual");
            return;
        };
        let increment = debt
            .checked_mul(self.rate_per_second)
            .and_then(|per_sec| per_sec.checked_mul(Decimal::from(secs)));
        if let Some(increment) = increment {
            self.earned = self.earned.saturating_add(increment);
        }
    }

    pub fn reset(&mut self) {
        self.earned = Decimal::ZERO;
    }
}

/// Drives `EarningsEstimate::accrue` from a one-second ticker
pub struct EarningsEstimator {
    store: AppStore,
    ticker: Ticker,
}

impl EarningsEstimator {
    pub fn new(store: AppStore) -> Self {
        Self {
            store,
            ticker: Ticker::new("earnings", Duration::from_secs(TICK_INTERVAL_SECS)),
        }
    }

    /// Start ticking; a running estimator is left alone
    pub fn start(&self) {
        let store = self.store.clone();
        let started = self.ticker.start(move || {
            store.update(|s| {
                let debt = s.position.debt.value();
                s.earnings.accrue(debt, TICK_INTERVAL_SECS);
            });
        });
        if started {
            tracing::debug!("Earnings estimator running");
        }
    }

    pub fn stop(&self) {
        self.ticker.stop();
    }

    pub fn is_running(&self) -> bool {
        self.ticker.is_running()
    }
}
