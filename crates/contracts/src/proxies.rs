//! One trait per remote contract
//!
//! Views return decoded values. Mutating calls return a `PendingTx` that the
//! caller must confirm before treating the effect as durable.

use accrue_core::{Address, ContractError, U256};
use async_trait::async_trait;
use wallet_client::PendingTx;

pub type Result<T> = std::result::Result<T, ContractError>;

/// Oracle price for a vault's outcome token (8 decimals)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceData {
    pub price: U256,
    /// Unix seconds of the last oracle update
    pub last_updated: U256,
    pub is_valid: bool,
}

/// Risk parameters of a collateral vault, in basis points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollateralConfig {
    pub is_active: bool,
    pub ltv: U256,
    pub liquidation_threshold: U256,
    pub liquidation_bonus: U256,
}

/// Per-second pool rates (1e18 = 100 %)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolRates {
    pub deposit_rate: U256,
    pub borrow_rate: U256,
}

/// Collateral vaults and share amounts a user has deposited
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserCollaterals {
    pub vaults: Vec<Address>,
    pub amounts: Vec<U256>,
}

#[async_trait]
pub trait Erc20Token: Send + Sync {
    async fn balance_of(&self, account: Address) -> Result<U256>;
    async fn allowance(&self, owner: Address, spender: Address) -> Result<U256>;
    async fn approve(&self, spender: Address, amount: U256) -> Result<PendingTx>;
    async fn transfer(&self, to: Address, amount: U256) -> Result<PendingTx>;
}

#[async_trait]
pub trait ConditionalTokens: Send + Sync {
    async fn balance_of(&self, account: Address, id: U256) -> Result<U256>;
    async fn is_approved_for_all(&self, account: Address, operator: Address) -> Result<bool>;
    async fn set_approval_for_all(&self, operator: Address, approved: bool) -> Result<PendingTx>;
    async fn safe_transfer_from(
        &self,
        from: Address,
        to: Address,
        id: U256,
        amount: U256,
        data: Vec<u8>,
    ) -> Result<PendingTx>;
}

#[async_trait]
pub trait PositionVault: Send + Sync {
    async fn name(&self) -> Result<String>;
    async fn symbol(&self) -> Result<String>;
    async fn position_id(&self) -> Result<U256>;
    async fn total_assets(&self) -> Result<U256>;
    async fn total_supply(&self) -> Result<U256>;
    async fn balance_of(&self, account: Address) -> Result<U256>;
    async fn deposit(&self, assets: U256, receiver: Address) -> Result<PendingTx>;
    async fn withdraw(&self, assets: U256, receiver: Address, owner: Address)
        -> Result<PendingTx>;
    async fn approve(&self, spender: Address, amount: U256) -> Result<PendingTx>;
}

#[async_trait]
pub trait LendingPool: Send + Sync {
    async fn total_deposits(&self) -> Result<U256>;
    async fn total_borrows(&self) -> Result<U256>;
    async fn available_liquidity(&self) -> Result<U256>;
    async fn utilization_rate(&self) -> Result<U256>;
    async fn current_rates(&self) -> Result<PoolRates>;
    async fn shares_of(&self, account: Address) -> Result<U256>;
    async fn balance_of(&self, account: Address) -> Result<U256>;
    async fn debt_of(&self, account: Address) -> Result<U256>;
    async fn deposit(&self, amount: U256) -> Result<PendingTx>;
    async fn withdraw(&self, shares: U256) -> Result<PendingTx>;
    async fn borrow(&self, amount: U256) -> Result<PendingTx>;
    async fn repay(&self, amount: U256) -> Result<PendingTx>;
}

#[async_trait]
pub trait CollateralManager: Send + Sync {
    /// 18-decimal ratio; only meaningful while the user has debt
    async fn health_factor(&self, user: Address) -> Result<U256>;
    /// Stable-asset amount (6 decimals) the user may still borrow
    async fn max_borrow_amount(&self, user: Address) -> Result<U256>;
    async fn total_collateral_value(&self, user: Address) -> Result<U256>;
    async fn is_liquidatable(&self, user: Address) -> Result<bool>;
    async fn user_collaterals(&self, user: Address) -> Result<UserCollaterals>;
    async fn collateral_amount(&self, user: Address, vault: Address) -> Result<U256>;
    async fn collateral_config(&self, vault: Address) -> Result<CollateralConfig>;
    async fn deposit_collateral(&self, vault: Address, amount: U256) -> Result<PendingTx>;
    async fn withdraw_collateral(&self, vault: Address, amount: U256) -> Result<PendingTx>;
}

#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn price_data(&self, vault: Address) -> Result<PriceData>;
    async fn price(&self, vault: Address) -> Result<U256>;
}
