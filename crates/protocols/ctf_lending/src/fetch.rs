//! Chain state loading
//!
//! Reads everything the position and market panels show in one logical
//! batch. A single failed query fails the whole load; nothing partial is
//! returned.

use accrue_contracts::{ContractSet, PriceData};
use accrue_core::constants::{POSITION_ID_NO, POSITION_ID_YES, SECONDS_PER_YEAR_ONCHAIN};
use accrue_core::{Address, ContractError, VaultSide, U256};

use crate::state::{ChainSnapshot, MarketSnapshot};

/// Load the user's position and the market for `vault` (YES when unset)
pub async fn load_chain_snapshot(
    contracts: &ContractSet,
    user: Address,
    vault: Option<VaultSide>,
) -> Result<ChainSnapshot, ContractError> {
    let side = vault.unwrap_or(VaultSide::Yes);
    let vault_address = contracts.vault_address(side);

    let (
        balance_yes,
        balance_no,
        price,
        total_locked,
        config,
        collateral,
        debt,
        rates,
        available_liquidity,
        max_borrowable,
    ) = tokio::try_join!(
        contracts.ctf.balance_of(user, U256::from(POSITION_ID_YES)),
        contracts.ctf.balance_of(user, U256::from(POSITION_ID_NO)),
        contracts.oracle.price_data(vault_address),
        contracts.vault_yes.total_assets(),
        contracts.manager.collateral_config(vault_address),
        contracts.manager.collateral_amount(user, vault_address),
        contracts.pool.debt_of(user),
        contracts.pool.current_rates(),
        contracts.pool.available_liquidity(),
        contracts.manager.max_borrow_amount(user),
    )?;

    let health_factor = if debt.is_zero() {
        None
    } else {
        Some(contracts.manager.health_factor(user).await?)
    };

    let annualize = |rate: U256| rate.saturating_mul(U256::from(SECONDS_PER_YEAR_ONCHAIN));

    tracing::debug!(
        user = %user,
        vault = %side,
        collateral = %collateral,
        debt = %debt,
        "Chain state loaded"
    );

    Ok(ChainSnapshot {
        wallet_balance: balance_yes.saturating_add(balance_no),
        market: MarketSnapshot {
            current_price: price.price,
            price_valid: price.is_valid,
            price_updated_at: price.last_updated,
            total_locked,
            ltv_bps: config.ltv,
            borrow_apr: annualize(rates.borrow_rate),
            deposit_apy: annualize(rates.deposit_rate),
            available_liquidity,
            max_borrowable,
        },
        collateral,
        debt,
        health_factor,
    })
}

/// Oracle price for one vault, used when the selection changes
pub async fn fetch_price(
    contracts: &ContractSet,
    side: VaultSide,
) -> Result<PriceData, ContractError> {
    contracts
        .oracle
        .price_data(contracts.vault_address(side))
        .await
}
