//! View model for the renderer
//!
//! Formats one `AppStateRecord` into display strings. Nothing here reads the
//! chain; a renderer re-derives the view on every state change.

use accrue_core::constants::{COLLATERAL_DECIMALS, PRICE_DECIMALS, STABLE_DECIMALS};
use accrue_core::units::format_units;
use accrue_core::{short_address, StrategyMode, VaultSide, U256};
use ctf_lending::{
    borrow_max_suggestion, collateral_value, format_amount, format_elapsed, format_number,
    health_reading, ltv_percent, rate_percent, AppStateRecord, HealthReading, HealthStatus,
};
use serde::Serialize;

/// Placeholder for values that are not loaded yet
const MISSING: &str = "--";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthView {
    pub text: String,
    pub status: Option<HealthStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarketView {
    pub price: String,
    pub price_valid: bool,
    pub total_locked: String,
    pub ltv: String,
    pub borrow_apr: String,
    pub deposit_apy: String,
    pub available_liquidity: String,
    pub max_borrowable: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewModel {
    pub connected: bool,
    pub account: Option<String>,
    pub selected_vault: Option<VaultSide>,
    pub wallet_balance: String,
    pub collateral: String,
    pub collateral_value: String,
    pub debt: String,
    pub health: HealthView,
    pub market: Option<MarketView>,
    pub strategy: Option<StrategyMode>,
    pub earned: String,
    pub elapsed: Option<String>,
    /// Some shown values are optimistic and await the next chain read
    pub pending_refresh: bool,
    /// Input value for the lock "max" button
    pub lock_max: String,
    /// Input value for the borrow "max" button
    pub borrow_max: String,
}

fn percent(value: Result<rust_decimal::Decimal, accrue_core::units::UnitsError>) -> String {
    value
        .map(|p| format!("{}%", format_number(p, 2)))
        .unwrap_or_else(|_| MISSING.to_string())
}

fn health_view(reading: HealthReading) -> HealthView {
    let text = match reading {
        HealthReading::Infinite => "∞".to_string(),
        HealthReading::Ratio { value, .. } => format_number(value, 2),
        HealthReading::Unknown => MISSING.to_string(),
    };
    HealthView {
        text,
        status: reading.status(),
    }
}

impl ViewModel {
    pub fn from_state(state: &AppStateRecord) -> Self {
        let position = &state.position;
        let collateral = position.collateral.value();
        let debt = position.debt.value();

        let market = state.market.as_ref().map(|m| MarketView {
            price: format!("${}", format_amount(m.current_price, PRICE_DECIMALS, 4)),
            price_valid: m.price_valid,
            total_locked: format_amount(m.total_locked, COLLATERAL_DECIMALS, 2),
            ltv: ltv_percent(m.ltv_bps)
                .map(|p| format!("{}%", p))
                .unwrap_or_else(|_| MISSING.to_string()),
            borrow_apr: percent(rate_percent(m.borrow_apr)),
            deposit_apy: percent(rate_percent(m.deposit_apy)),
            available_liquidity: format_amount(m.available_liquidity, STABLE_DECIMALS, 2),
            max_borrowable: format_amount(m.max_borrowable, STABLE_DECIMALS, 2),
        });

        let collateral_value = state
            .market
            .as_ref()
            .and_then(|m| collateral_value(collateral, m.current_price).ok())
            .map(|v| format!("${}", format_number(v, 2)))
            .unwrap_or_else(|| MISSING.to_string());

        let borrow_max = state
            .market
            .as_ref()
            .map(|m| borrow_max_suggestion(m.max_borrowable))
            .unwrap_or(U256::ZERO);

        Self {
            connected: state.is_connected(),
            account: state.session.map(|s| short_address(&s.address)),
            selected_vault: position.selected_vault,
            wallet_balance: format_amount(state.wallet_balance.value(), COLLATERAL_DECIMALS, 2),
            collateral: format_amount(collateral, COLLATERAL_DECIMALS, 2),
            collateral_value,
            debt: format_amount(debt, STABLE_DECIMALS, 2),
            health: health_view(health_reading(debt, position.health_factor)),
            market,
            strategy: position.strategy,
            earned: format_number(state.earnings.earned, 6),
            elapsed: state.elapsed_secs.map(format_elapsed),
            pending_refresh: position.collateral.is_tentative()
                || position.debt.is_tentative()
                || state.wallet_balance.is_tentative(),
            lock_max: format_units(state.wallet_balance.value(), COLLATERAL_DECIMALS),
            borrow_max: format_units(borrow_max, STABLE_DECIMALS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accrue_core::units::pow10;
    use accrue_core::Address;
    use ctf_lending::{MarketSnapshot, Session, Tracked};

    fn loaded() -> AppStateRecord {
        let mut state = AppStateRecord {
            session: Some(Session {
                address: Address::repeat_byte(0xab),
                chain_id: 80002,
            }),
            market: Some(MarketSnapshot {
                current_price: U256::from(65_000_000u64),
                price_valid: true,
                ltv_bps: U256::from(7_500u64),
                borrow_apr: U256::from(5u64) * pow10(16),
                max_borrowable: U256::from(1_000u64) * pow10(6),
                ..MarketSnapshot::default()
            }),
            wallet_balance: Tracked::confirmed(U256::from(1_500u64) * pow10(18)),
            ..AppStateRecord::default()
        };
        state.position.collateral = Tracked::confirmed(U256::from(100u64) * pow10(18));
        state
    }

    #[test]
    fn test_no_debt_shows_infinite_health() {
        let view = ViewModel::from_state(&loaded());
        assert!(view.connected);
        let account = view.account.unwrap();
        assert!(account.starts_with("0x") && account.contains("..."));
        assert_eq!(account.len(), 13);
        assert_eq!(view.health.text, "∞");
        assert_eq!(view.health.status, Some(HealthStatus::Healthy));
        assert_eq!(view.wallet_balance, "1,500.00");
        assert_eq!(view.collateral_value, "$65.00");
        assert!(!view.pending_refresh);
    }

    #[test]
    fn test_market_formatting() {
        let market = ViewModel::from_state(&loaded()).market.unwrap();
        assert_eq!(market.price, "$0.6500");
        assert_eq!(market.ltv, "75%");
        assert_eq!(market.borrow_apr, "5.00%");
    }

    #[test]
    fn test_debt_health_and_tentative() {
        let mut state = loaded();
        state.position.debt = Tracked::tentative(U256::from(50u64) * pow10(6));
        let view = ViewModel::from_state(&state);
        assert_eq!(view.debt, "50.00");
        assert_eq!(view.health.text, "--");
        assert_eq!(view.health.status, None);
        assert!(view.pending_refresh);

        state.position.health_factor = Some(U256::from(1_150u64) * pow10(15));
        let view = ViewModel::from_state(&state);
        assert_eq!(view.health.text, "1.15");
        assert_eq!(view.health.status, Some(HealthStatus::Danger));
    }

    #[test]
    fn test_max_helpers_are_input_values() {
        let view = ViewModel::from_state(&loaded());
        assert_eq!(view.lock_max, "1500");
        assert_eq!(view.borrow_max, "990");
    }

    #[test]
    fn test_disconnected_view() {
        let view = ViewModel::from_state(&AppStateRecord::default());
        assert!(!view.connected);
        assert!(view.account.is_none());
        assert!(view.market.is_none());
        assert_eq!(view.collateral_value, "--");
        assert_eq!(view.earned, "0.000000");
        assert_eq!(view.borrow_max, "0");
    }
}
