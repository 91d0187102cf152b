//! Conditional-Token Lending
//!
//! Client-side logic for locking prediction-market outcome tokens as
//! collateral and borrowing a stable asset against them.
//!
//! # Protocol Overview
//!
//! Each outcome side (YES/NO) has an ERC-4626 vault wrapping the ERC-1155
//! conditional tokens. Vault shares are deposited into the collateral manager,
//! which sizes how much the lending pool will lend.
//!
//! # Architecture
//!
//! The chain is always the source of truth. `fetch` loads it into the
//! `state::AppStore`; `workflow` runs multi-transaction actions and writes
//! tentative values until the next load confirms them.

pub mod calculator;
pub mod constants;
pub mod earnings;
pub mod fetch;
pub mod state;
pub mod ticker;
pub mod workflow;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-exports
pub use calculator::*;
pub use earnings::*;
pub use fetch::*;
pub use state::*;
pub use ticker::{ElapsedClock, Ticker};
pub use workflow::*;
