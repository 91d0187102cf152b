//! Application state
//!
//! One immutable record published through a `watch` channel. Every write is a
//! single `send_modify`, so readers never observe a half-applied update.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use accrue_core::{Address, ChainId, StrategyMode, VaultSide, U256};
use serde::Serialize;
use tokio::sync::watch;

use crate::earnings::EarningsEstimate;

/// A cached chain value and whether it was written optimistically.
///
/// Values written after a confirmed transaction but before the next chain
/// read are tentative; the loader's writes clear the flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Tracked<T> {
    value: T,
    tentative: bool,
}

impl<T: Copy> Tracked<T> {
    pub fn confirmed(value: T) -> Self {
        Self {
            value,
            tentative: false,
        }
    }

    pub fn tentative(value: T) -> Self {
        Self {
            value,
            tentative: true,
        }
    }

    pub fn value(&self) -> T {
        self.value
    }

    pub fn is_tentative(&self) -> bool {
        self.tentative
    }
}

/// Connected wallet session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Session {
    pub address: Address,
    pub chain_id: ChainId,
}

/// The user's position in the selected vault
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Position {
    pub selected_vault: Option<VaultSide>,
    pub vault_address: Option<Address>,
    /// Vault shares locked as collateral (18 decimals)
    pub collateral: Tracked<U256>,
    /// Outstanding borrow (6 decimals)
    pub debt: Tracked<U256>,
    /// 18-decimal ratio as loaded from chain; `None` while there is no debt
    pub health_factor: Option<U256>,
    /// Unix seconds of the last lock/borrow
    pub deposit_timestamp: Option<u64>,
    pub strategy: Option<StrategyMode>,
    /// Earnings estimator should be running
    pub earning: bool,
}

impl Position {
    pub fn has_debt(&self) -> bool {
        !self.debt.value().is_zero()
    }

    /// Back to nothing locked, nothing borrowed; keeps the vault selection
    pub fn clear(&mut self) {
        *self = Self {
            selected_vault: self.selected_vault,
            vault_address: self.vault_address,
            ..Self::default()
        };
    }
}

/// Market data for the active vault, replaced wholesale on each load
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MarketSnapshot {
    /// Oracle price (8 decimals)
    pub current_price: U256,
    pub price_valid: bool,
    pub price_updated_at: U256,
    /// YES vault total assets (18 decimals)
    pub total_locked: U256,
    /// Loan-to-value of the active vault, basis points
    pub ltv_bps: U256,
    /// Annualized borrow rate, 1e18 = 100 %
    pub borrow_apr: U256,
    /// Annualized deposit rate, 1e18 = 100 %
    pub deposit_apy: U256,
    /// Stable asset the pool can still lend (6 decimals)
    pub available_liquidity: U256,
    /// Stable asset this user can still borrow (6 decimals)
    pub max_borrowable: U256,
}

/// Everything one chain load returns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainSnapshot {
    /// Outcome tokens held, both ids combined (18 decimals)
    pub wallet_balance: U256,
    pub market: MarketSnapshot,
    pub collateral: U256,
    pub debt: U256,
    /// Only queried while `debt > 0`
    pub health_factor: Option<U256>,
}

/// The full state record handed to the renderer
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AppStateRecord {
    pub session: Option<Session>,
    pub position: Position,
    pub market: Option<MarketSnapshot>,
    pub wallet_balance: Tracked<U256>,
    pub earnings: EarningsEstimate,
    /// Seconds since `deposit_timestamp`, refreshed by the elapsed clock
    pub elapsed_secs: Option<u64>,
}

impl AppStateRecord {
    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }
}

/// Shared handle to the application state
#[derive(Clone)]
pub struct AppStore {
    inner: Arc<watch::Sender<AppStateRecord>>,
}

impl Default for AppStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AppStore {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(AppStateRecord::default());
        Self { inner: Arc::new(tx) }
    }

    /// Receiver that wakes on every state change
    pub fn subscribe(&self) -> watch::Receiver<AppStateRecord> {
        self.inner.subscribe()
    }

    /// Clone of the current record
    pub fn snapshot(&self) -> AppStateRecord {
        self.inner.borrow().clone()
    }

    /// Read a value without cloning the whole record
    pub fn read<R>(&self, f: impl FnOnce(&AppStateRecord) -> R) -> R {
        f(&self.inner.borrow())
    }

    /// Apply one atomic modification
    pub fn update(&self, f: impl FnOnce(&mut AppStateRecord)) {
        self.inner.send_modify(f);
    }

    /// Everything back to the initial, disconnected state
    pub fn reset(&self) {
        self.inner.send_replace(AppStateRecord::default());
    }

    /// Start a session, dropping whatever the previous one cached
    pub fn begin_session(&self, session: Session) {
        self.inner.send_replace(AppStateRecord {
            session: Some(session),
            ..AppStateRecord::default()
        });
    }

    /// Merge a successful chain load; clears every tentative flag.
    ///
    /// Returns whether the loaded debt is non-zero.
    pub fn apply_snapshot(&self, snapshot: ChainSnapshot) -> bool {
        let has_debt = !snapshot.debt.is_zero();
        self.update(|state| {
            state.wallet_balance = Tracked::confirmed(snapshot.wallet_balance);
            state.market = Some(snapshot.market);

            let position = &mut state.position;
            position.collateral = Tracked::confirmed(snapshot.collateral);
            position.debt = Tracked::confirmed(snapshot.debt);
            position.health_factor = if has_debt {
                snapshot.health_factor
            } else {
                None
            };
            position.earning = has_debt;
            if has_debt {
                position.deposit_timestamp.get_or_insert_with(unix_now);
            }
        });
        has_debt
    }
}

/// Current wall-clock time in unix seconds
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(collateral: u64, debt: u64) -> ChainSnapshot {
        ChainSnapshot {
            wallet_balance: U256::from(5u64),
            market: MarketSnapshot::default(),
            collateral: U256::from(collateral),
            debt: U256::from(debt),
            health_factor: (debt > 0).then(|| U256::from(2u64)),
        }
    }

    #[test]
    fn test_tracked_flags() {
        let t = Tracked::tentative(U256::from(3u64));
        assert!(t.is_tentative());
        assert!(!Tracked::confirmed(U256::ZERO).is_tentative());
    }

    #[test]
    fn test_apply_snapshot_clears_tentative() {
        let store = AppStore::new();
        store.update(|s| s.position.collateral = Tracked::tentative(U256::from(1u64)));

        let has_debt = store.apply_snapshot(snapshot(100, 0));
        assert!(!has_debt);

        let state = store.snapshot();
        assert_eq!(state.position.collateral, Tracked::confirmed(U256::from(100u64)));
        assert_eq!(state.wallet_balance.value(), U256::from(5u64));
        assert!(state.position.health_factor.is_none());
        assert!(state.position.deposit_timestamp.is_none());
    }

    #[test]
    fn test_apply_snapshot_with_debt_marks_earning() {
        let store = AppStore::new();
        assert!(store.apply_snapshot(snapshot(100, 50)));

        let position = store.snapshot().position;
        assert!(position.earning);
        assert!(position.deposit_timestamp.is_some());
        assert_eq!(position.health_factor, Some(U256::from(2u64)));
    }

    #[test]
    fn test_apply_snapshot_keeps_existing_timestamp() {
        let store = AppStore::new();
        store.update(|s| s.position.deposit_timestamp = Some(42));
        store.apply_snapshot(snapshot(1, 1));
        assert_eq!(store.snapshot().position.deposit_timestamp, Some(42));
    }

    #[test]
    fn test_single_notification_per_write() {
        let store = AppStore::new();
        let mut rx = store.subscribe();
        let _ = rx.borrow_and_update();

        store.apply_snapshot(snapshot(10, 10));
        assert!(rx.has_changed().unwrap());
        let _ = rx.borrow_and_update();
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_clear_keeps_vault_selection() {
        let mut position = Position {
            selected_vault: Some(VaultSide::No),
            debt: Tracked::confirmed(U256::from(9u64)),
            strategy: Some(StrategyMode::SelfManaged),
            ..Position::default()
        };
        position.clear();
        assert_eq!(position.selected_vault, Some(VaultSide::No));
        assert!(!position.has_debt());
        assert!(position.strategy.is_none());
    }

    #[test]
    fn test_begin_session_drops_cache() {
        let store = AppStore::new();
        store.apply_snapshot(snapshot(10, 10));
        store.begin_session(Session {
            address: Address::repeat_byte(1),
            chain_id: 80002,
        });
        let state = store.snapshot();
        assert!(state.is_connected());
        assert!(state.market.is_none());
        assert!(!state.position.has_debt());
    }
}
