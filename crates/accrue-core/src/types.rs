//! Core type definitions for Accrue

use std::fmt;

use serde::{Deserialize, Serialize};

pub use alloy_primitives::{Address, TxHash, U256};

/// EVM chain id
pub type ChainId = u64;

/// Outcome side of a conditional-token position.
///
/// Each side has its own vault and its own ERC1155 position id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VaultSide {
    Yes,
    No,
}

impl VaultSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Yes => "YES",
            Self::No => "NO",
        }
    }

    /// ERC1155 id of the outcome token held by this side's vault
    pub fn position_id(&self) -> u64 {
        match self {
            Self::Yes => constants::POSITION_ID_YES,
            Self::No => constants::POSITION_ID_NO,
        }
    }
}

impl fmt::Display for VaultSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How the borrowed liquidity is managed after collateral is locked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyMode {
    /// User chose the borrow amount
    SelfManaged,
    /// Protocol borrowed a conservative share of the max on the user's behalf
    ProtocolManaged,
}

impl StrategyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SelfManaged => "self",
            Self::ProtocolManaged => "protocol",
        }
    }
}

/// Shorten an address for display: `0x1234...abcd`
pub fn short_address(address: &Address) -> String {
    let full = address.to_checksum(None);
    format!("{}...{}", &full[..6], &full[full.len() - 4..])
}

/// Constants
pub mod constants {
    /// Decimals of vault shares and conditional tokens
    pub const COLLATERAL_DECIMALS: u8 = 18;

    /// Decimals of the USD stable asset borrowed from the pool
    pub const STABLE_DECIMALS: u8 = 6;

    /// Decimals of oracle prices
    pub const PRICE_DECIMALS: u8 = 8;

    /// Decimals of health factor values reported by the collateral manager
    pub const HEALTH_FACTOR_DECIMALS: u8 = 18;

    /// ERC1155 id of the YES outcome token
    pub const POSITION_ID_YES: u64 = 1;

    /// ERC1155 id of the NO outcome token
    pub const POSITION_ID_NO: u64 = 2;

    /// Seconds per year used to annualize on-chain per-second rates
    pub const SECONDS_PER_YEAR_ONCHAIN: u64 = 31_536_000;
}
