//! Typed proxies for the deployed Accrue contracts
//!
//! # Contracts
//!
//! - stable asset (ERC20, 6 decimals)
//! - conditional tokens (ERC1155, outcome ids YES = 1 and NO = 2)
//! - YES and NO position vaults (share tokens, 18 decimals)
//! - lending pool, collateral manager, price oracle
//!
//! All business rules live on-chain; these proxies only encode calls and
//! decode results.

pub mod abi;
pub mod proxies;
pub mod rpc;

use std::sync::Arc;

use accrue_core::{Address, ContractAddresses, VaultSide};
use wallet_client::WalletClient;

pub use proxies::*;
use rpc::{
    RpcCollateralManager, RpcConditionalTokens, RpcContract, RpcErc20, RpcLendingPool,
    RpcPositionVault, RpcPriceOracle,
};

/// Every contract the client talks to, bound to one signing account
#[derive(Clone)]
pub struct ContractSet {
    pub addresses: ContractAddresses,
    pub token: Arc<dyn Erc20Token>,
    pub ctf: Arc<dyn ConditionalTokens>,
    pub vault_yes: Arc<dyn PositionVault>,
    pub vault_no: Arc<dyn PositionVault>,
    pub pool: Arc<dyn LendingPool>,
    pub manager: Arc<dyn CollateralManager>,
    pub oracle: Arc<dyn PriceOracle>,
}

impl ContractSet {
    /// Proxies that go through the wallet's JSON-RPC, signing as `from`
    pub fn rpc(wallet: &WalletClient, from: Address, addresses: ContractAddresses) -> Self {
        let at = |address: Address| RpcContract::new(wallet.clone(), address, from);
        Self {
            token: Arc::new(RpcErc20(at(addresses.usdc))),
            ctf: Arc::new(RpcConditionalTokens(at(addresses.ctf))),
            vault_yes: Arc::new(RpcPositionVault(at(addresses.vault_yes))),
            vault_no: Arc::new(RpcPositionVault(at(addresses.vault_no))),
            pool: Arc::new(RpcLendingPool(at(addresses.lending_pool))),
            manager: Arc::new(RpcCollateralManager(at(addresses.collateral_manager))),
            oracle: Arc::new(RpcPriceOracle(at(addresses.price_oracle))),
            addresses,
        }
    }

    /// Vault proxy for an outcome side
    pub fn vault(&self, side: VaultSide) -> &Arc<dyn PositionVault> {
        match side {
            VaultSide::Yes => &self.vault_yes,
            VaultSide::No => &self.vault_no,
        }
    }

    /// Deployed address of an outcome side's vault
    pub fn vault_address(&self, side: VaultSide) -> Address {
        self.addresses.vault(side)
    }
}
