//! Proxies backed by the wallet's JSON-RPC
//!
//! Calldata is ABI-encoded with the `sol!` interfaces; views go through
//! `eth_call`, writes through `eth_sendTransaction` signed by the session
//! account.

use accrue_core::{Address, ContractError, U256};
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use wallet_client::{PendingTx, WalletClient};

use crate::abi::{
    ICollateralManager, IConditionalTokens, IERC20, ILendingPool, IPositionVault, IPriceOracle,
};
use crate::proxies::{
    CollateralConfig, CollateralManager, ConditionalTokens, Erc20Token, LendingPool, PoolRates,
    PositionVault, PriceData, PriceOracle, Result, UserCollaterals,
};

/// A deployed contract reached through the wallet, signing as `from`
#[derive(Clone)]
pub struct RpcContract {
    wallet: WalletClient,
    address: Address,
    from: Address,
}

impl RpcContract {
    pub fn new(wallet: WalletClient, address: Address, from: Address) -> Self {
        Self {
            wallet,
            address,
            from,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    async fn view<C: SolCall + Send>(&self, call: C) -> Result<C::Return> {
        let out = self.wallet.call(self.address, call.abi_encode()).await?;
        C::abi_decode_returns(&out, true).map_err(|e| ContractError::Decode {
            method: C::SIGNATURE,
            message: e.to_string(),
        })
    }

    async fn send<C: SolCall + Send>(&self, call: C) -> Result<PendingTx> {
        tracing::debug!(contract = %self.address, method = C::SIGNATURE, "Submitting call");
        let pending = self
            .wallet
            .send_transaction(self.from, self.address, call.abi_encode())
            .await?;
        Ok(pending)
    }
}

/// ERC20 stable asset
pub struct RpcErc20(pub RpcContract);

/// ERC1155 conditional tokens
pub struct RpcConditionalTokens(pub RpcContract);

/// Outcome share vault
pub struct RpcPositionVault(pub RpcContract);

pub struct RpcLendingPool(pub RpcContract);

pub struct RpcCollateralManager(pub RpcContract);

pub struct RpcPriceOracle(pub RpcContract);

#[async_trait]
impl Erc20Token for RpcErc20 {
    async fn balance_of(&self, account: Address) -> Result<U256> {
        Ok(self.0.view(IERC20::balanceOfCall { account }).await?._0)
    }

    async fn allowance(&self, owner: Address, spender: Address) -> Result<U256> {
        Ok(self
            .0
            .view(IERC20::allowanceCall { owner, spender })
            .await?
            ._0)
    }

    async fn approve(&self, spender: Address, amount: U256) -> Result<PendingTx> {
        self.0.send(IERC20::approveCall { spender, amount }).await
    }

    async fn transfer(&self, to: Address, amount: U256) -> Result<PendingTx> {
        self.0.send(IERC20::transferCall { to, amount }).await
    }
}

#[async_trait]
impl ConditionalTokens for RpcConditionalTokens {
    async fn balance_of(&self, account: Address, id: U256) -> Result<U256> {
        Ok(self
            .0
            .view(IConditionalTokens::balanceOfCall { account, id })
            .await?
            ._0)
    }

    async fn is_approved_for_all(&self, account: Address, operator: Address) -> Result<bool> {
        Ok(self
            .0
            .view(IConditionalTokens::isApprovedForAllCall { account, operator })
            .await?
            ._0)
    }

    async fn set_approval_for_all(&self, operator: Address, approved: bool) -> Result<PendingTx> {
        self.0
            .send(IConditionalTokens::setApprovalForAllCall { operator, approved })
            .await
    }

    async fn safe_transfer_from(
        &self,
        from: Address,
        to: Address,
        id: U256,
        amount: U256,
        data: Vec<u8>,
    ) -> Result<PendingTx> {
        self.0
            .send(IConditionalTokens::safeTransferFromCall {
                from,
                to,
                id,
                amount,
                data: data.into(),
            })
            .await
    }
}

#[async_trait]
impl PositionVault for RpcPositionVault {
    async fn name(&self) -> Result<String> {
        Ok(self.0.view(IPositionVault::nameCall {}).await?._0)
    }

    async fn symbol(&self) -> Result<String> {
        Ok(self.0.view(IPositionVault::symbolCall {}).await?._0)
    }

    async fn position_id(&self) -> Result<U256> {
        Ok(self.0.view(IPositionVault::positionIdCall {}).await?._0)
    }

    async fn total_assets(&self) -> Result<U256> {
        Ok(self.0.view(IPositionVault::totalAssetsCall {}).await?._0)
    }

    async fn total_supply(&self) -> Result<U256> {
        Ok(self.0.view(IPositionVault::totalSupplyCall {}).await?._0)
    }

    async fn balance_of(&self, account: Address) -> Result<U256> {
        Ok(self
            .0
            .view(IPositionVault::balanceOfCall { account })
            .await?
            ._0)
    }

    async fn deposit(&self, assets: U256, receiver: Address) -> Result<PendingTx> {
        self.0
            .send(IPositionVault::depositCall { assets, receiver })
            .await
    }

    async fn withdraw(
        &self,
        assets: U256,
        receiver: Address,
        owner: Address,
    ) -> Result<PendingTx> {
        self.0
            .send(IPositionVault::withdrawCall {
                assets,
                receiver,
                owner,
            })
            .await
    }

    async fn approve(&self, spender: Address, amount: U256) -> Result<PendingTx> {
        self.0
            .send(IPositionVault::approveCall { spender, amount })
            .await
    }
}

#[async_trait]
impl LendingPool for RpcLendingPool {
    async fn total_deposits(&self) -> Result<U256> {
        Ok(self.0.view(ILendingPool::totalDepositsCall {}).await?._0)
    }

    async fn total_borrows(&self) -> Result<U256> {
        Ok(self.0.view(ILendingPool::totalBorrowsCall {}).await?._0)
    }

    async fn available_liquidity(&self) -> Result<U256> {
        Ok(self
            .0
            .view(ILendingPool::availableLiquidityCall {})
            .await?
            ._0)
    }

    async fn utilization_rate(&self) -> Result<U256> {
        Ok(self
            .0
            .view(ILendingPool::getUtilizationRateCall {})
            .await?
            ._0)
    }

    async fn current_rates(&self) -> Result<PoolRates> {
        let rates = self.0.view(ILendingPool::getCurrentRatesCall {}).await?;
        Ok(PoolRates {
            deposit_rate: rates.depositRate,
            borrow_rate: rates.borrowRate,
        })
    }

    async fn shares_of(&self, account: Address) -> Result<U256> {
        Ok(self
            .0
            .view(ILendingPool::sharesOfCall { account })
            .await?
            ._0)
    }

    async fn balance_of(&self, account: Address) -> Result<U256> {
        Ok(self
            .0
            .view(ILendingPool::balanceOfCall { account })
            .await?
            ._0)
    }

    async fn debt_of(&self, account: Address) -> Result<U256> {
        Ok(self.0.view(ILendingPool::debtOfCall { account }).await?._0)
    }

    async fn deposit(&self, amount: U256) -> Result<PendingTx> {
        self.0.send(ILendingPool::depositCall { amount }).await
    }

    async fn withdraw(&self, shares: U256) -> Result<PendingTx> {
        self.0.send(ILendingPool::withdrawCall { shares }).await
    }

    async fn borrow(&self, amount: U256) -> Result<PendingTx> {
        self.0.send(ILendingPool::borrowCall { amount }).await
    }

    async fn repay(&self, amount: U256) -> Result<PendingTx> {
        self.0.send(ILendingPool::repayCall { amount }).await
    }
}

#[async_trait]
impl CollateralManager for RpcCollateralManager {
    async fn health_factor(&self, user: Address) -> Result<U256> {
        Ok(self
            .0
            .view(ICollateralManager::getHealthFactorCall { user })
            .await?
            ._0)
    }

    async fn max_borrow_amount(&self, user: Address) -> Result<U256> {
        Ok(self
            .0
            .view(ICollateralManager::getMaxBorrowAmountCall { user })
            .await?
            ._0)
    }

    async fn total_collateral_value(&self, user: Address) -> Result<U256> {
        Ok(self
            .0
            .view(ICollateralManager::getTotalCollateralValueCall { user })
            .await?
            ._0)
    }

    async fn is_liquidatable(&self, user: Address) -> Result<bool> {
        Ok(self
            .0
            .view(ICollateralManager::isLiquidatableCall { user })
            .await?
            ._0)
    }

    async fn user_collaterals(&self, user: Address) -> Result<UserCollaterals> {
        let out = self
            .0
            .view(ICollateralManager::getUserCollateralsCall { user })
            .await?;
        Ok(UserCollaterals {
            vaults: out.vaults,
            amounts: out.amounts,
        })
    }

    async fn collateral_amount(&self, user: Address, vault: Address) -> Result<U256> {
        Ok(self
            .0
            .view(ICollateralManager::getCollateralAmountCall { user, vault })
            .await?
            ._0)
    }

    async fn collateral_config(&self, vault: Address) -> Result<CollateralConfig> {
        let config = self
            .0
            .view(ICollateralManager::getCollateralConfigCall { vault })
            .await?
            ._0;
        Ok(CollateralConfig {
            is_active: config.isActive,
            ltv: config.ltv,
            liquidation_threshold: config.liquidationThreshold,
            liquidation_bonus: config.liquidationBonus,
        })
    }

    async fn deposit_collateral(&self, vault: Address, amount: U256) -> Result<PendingTx> {
        self.0
            .send(ICollateralManager::depositCollateralCall { vault, amount })
            .await
    }

    async fn withdraw_collateral(&self, vault: Address, amount: U256) -> Result<PendingTx> {
        self.0
            .send(ICollateralManager::withdrawCollateralCall { vault, amount })
            .await
    }
}

#[async_trait]
impl PriceOracle for RpcPriceOracle {
    async fn price_data(&self, vault: Address) -> Result<PriceData> {
        let out = self
            .0
            .view(IPriceOracle::getPriceDataCall { vault })
            .await?;
        Ok(PriceData {
            price: out.price,
            last_updated: out.lastUpdated,
            is_valid: out.isValid,
        })
    }

    async fn price(&self, vault: Address) -> Result<U256> {
        Ok(self.0.view(IPriceOracle::getPriceCall { vault }).await?._0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accrue_core::{TxError, WorkflowConfig};
    use alloy_sol_types::SolValue;
    use serde_json::json;
    use std::sync::Arc;
    use wallet_client::mock::ScriptedProvider;
    use wallet_client::Eip1193Provider;

    fn contract(provider: &Arc<ScriptedProvider>) -> RpcContract {
        let wallet = WalletClient::from_injected(
            Some(provider.clone() as Arc<dyn Eip1193Provider>),
            &WorkflowConfig::default(),
        )
        .unwrap();
        RpcContract::new(wallet, Address::repeat_byte(0x11), Address::repeat_byte(0x22))
    }

    fn encoded(bytes: Vec<u8>) -> serde_json::Value {
        json!(format!("0x{}", hex::encode(bytes)))
    }

    #[tokio::test]
    async fn test_debt_of_round_trip() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.respond("eth_call", encoded(U256::from(50_000_000u64).abi_encode()));

        let pool = RpcLendingPool(contract(&provider));
        let debt = pool.debt_of(Address::repeat_byte(0x22)).await.unwrap();
        assert_eq!(debt, U256::from(50_000_000u64));

        let calls = provider.calls_to("eth_call");
        let data = calls[0][0]["data"].as_str().unwrap().to_string();
        let expected = ILendingPool::debtOfCall {
            account: Address::repeat_byte(0x22),
        }
        .abi_encode();
        assert_eq!(data, format!("0x{}", hex::encode(expected)));
        assert_eq!(calls[0][1], json!("latest"));
    }

    #[tokio::test]
    async fn test_price_data_decodes_tuple() {
        let provider = Arc::new(ScriptedProvider::new());
        let ret = (U256::from(65_000_000u64), U256::from(1_700_000_000u64), true).abi_encode_params();
        provider.respond("eth_call", encoded(ret));

        let oracle = RpcPriceOracle(contract(&provider));
        let data = oracle.price_data(Address::ZERO).await.unwrap();
        assert_eq!(data.price, U256::from(65_000_000u64));
        assert!(data.is_valid);
    }

    #[tokio::test]
    async fn test_decode_error_names_method() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.respond("eth_call", json!("0x01"));

        let pool = RpcLendingPool(contract(&provider));
        let err = pool.available_liquidity().await.unwrap_err();
        match err {
            ContractError::Decode { method, .. } => assert_eq!(method, "availableLiquidity()"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_borrow_sends_from_session_account() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.respond("eth_sendTransaction", json!(format!("0x{}", "aa".repeat(32))));

        let pool = RpcLendingPool(contract(&provider));
        let pending = pool.borrow(U256::from(800u64)).await.unwrap();
        assert_eq!(pending.tx_hash(), accrue_core::TxHash::repeat_byte(0xaa));

        let sent = provider.calls_to("eth_sendTransaction");
        let from: Address = sent[0][0]["from"].as_str().unwrap().parse().unwrap();
        let to: Address = sent[0][0]["to"].as_str().unwrap().parse().unwrap();
        assert_eq!(from, Address::repeat_byte(0x22));
        assert_eq!(to, Address::repeat_byte(0x11));
    }

    #[tokio::test]
    async fn test_rejected_send_is_classified() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.fail(
            "eth_sendTransaction",
            wallet_client::RpcError::new(4001, "User denied"),
        );

        let manager = RpcCollateralManager(contract(&provider));
        let err = manager
            .deposit_collateral(Address::ZERO, U256::from(1u64))
            .await
            .unwrap_err();
        assert!(matches!(err, ContractError::Transaction(TxError::UserRejected)));
    }
}
