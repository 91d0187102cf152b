//! Network verification and switching
//!
//! Checks the wallet's active chain and asks it to switch (or register and
//! switch) when it is on the wrong one.

use accrue_core::{NetworkConfig, WalletError, RPC_UNRECOGNIZED_CHAIN, RPC_USER_REJECTED};
use serde_json::json;

use crate::{Result, WalletClient};

/// What `ensure_network` had to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkAction {
    /// Wallet was already on the target chain
    AlreadyActive,
    /// Wallet switched to a chain it knew
    Switched,
    /// Chain was added to the wallet, then selected
    Added,
}

impl WalletClient {
    /// Make sure the wallet is on `network`, switching or adding it if needed
    pub async fn ensure_network(&self, network: &NetworkConfig) -> Result<NetworkAction> {
        let current = self.chain_id().await?;
        if current == network.chain_id {
            return Ok(NetworkAction::AlreadyActive);
        }

        tracing::info!(
            current,
            expected = network.chain_id,
            "Wallet on wrong network, requesting switch"
        );

        let action = match self.switch_chain(network).await {
            Ok(()) => NetworkAction::Switched,
            Err(e) if e.code == RPC_UNRECOGNIZED_CHAIN => {
                self.add_chain(network).await?;
                NetworkAction::Added
            }
            Err(e) if e.code == RPC_USER_REJECTED => return Err(WalletError::UserRejected),
            Err(e) => {
                return Err(WalletError::ChainSwitch { message: e.message });
            }
        };

        let actual = self.chain_id().await?;
        if actual != network.chain_id {
            return Err(WalletError::WrongNetwork {
                expected: network.chain_id,
                actual,
            });
        }

        tracing::info!(chain_id = actual, ?action, "Wallet network ready");
        Ok(action)
    }

    async fn switch_chain(&self, network: &NetworkConfig) -> std::result::Result<(), crate::RpcError> {
        let params = json!([{ "chainId": network.chain_id_hex() }]);
        self.provider()
            .request("wallet_switchEthereumChain", params)
            .await
            .map(|_| ())
    }

    async fn add_chain(&self, network: &NetworkConfig) -> Result<()> {
        let params = json!([{
            "chainId": network.chain_id_hex(),
            "chainName": network.chain_name,
            "nativeCurrency": {
                "name": network.native_currency.name,
                "symbol": network.native_currency.symbol,
                "decimals": network.native_currency.decimals,
            },
            "rpcUrls": network.rpc_urls,
            "blockExplorerUrls": network.block_explorer_urls,
        }]);
        self.provider()
            .request("wallet_addEthereumChain", params)
            .await
            .map(|_| ())
            .map_err(|e| {
                tracing::warn!(error = %e, "Failed to add network to wallet");
                WalletError::ChainSwitch {
                    message: format!("could not add {}: {}", network.chain_name, e.message),
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedProvider;
    use crate::{Eip1193Provider, RpcError};
    use accrue_core::WorkflowConfig;
    use std::sync::Arc;

    fn client(provider: &Arc<ScriptedProvider>) -> WalletClient {
        WalletClient::from_injected(
            Some(provider.clone() as Arc<dyn Eip1193Provider>),
            &WorkflowConfig::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_already_on_network() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.respond("eth_chainId", json!("0x13882"));

        let action = client(&provider)
            .ensure_network(&NetworkConfig::amoy())
            .await
            .unwrap();
        assert_eq!(action, NetworkAction::AlreadyActive);
        assert!(provider.calls_to("wallet_switchEthereumChain").is_empty());
    }

    #[tokio::test]
    async fn test_switch_known_chain() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.respond("eth_chainId", json!("0x1"));
        provider.respond("eth_chainId", json!("0x13882"));
        provider.respond("wallet_switchEthereumChain", json!(null));

        let action = client(&provider)
            .ensure_network(&NetworkConfig::amoy())
            .await
            .unwrap();
        assert_eq!(action, NetworkAction::Switched);
        let switch = provider.calls_to("wallet_switchEthereumChain");
        assert_eq!(switch[0][0]["chainId"], json!("0x13882"));
    }

    #[tokio::test]
    async fn test_add_unknown_chain() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.respond("eth_chainId", json!("0x1"));
        provider.respond("eth_chainId", json!("0x13882"));
        provider.fail(
            "wallet_switchEthereumChain",
            RpcError::new(4902, "Unrecognized chain ID"),
        );
        provider.respond("wallet_addEthereumChain", json!(null));

        let action = client(&provider)
            .ensure_network(&NetworkConfig::amoy())
            .await
            .unwrap();
        assert_eq!(action, NetworkAction::Added);

        let added = provider.calls_to("wallet_addEthereumChain");
        assert_eq!(added[0][0]["chainName"], json!("Polygon Amoy Testnet"));
        assert_eq!(added[0][0]["nativeCurrency"]["decimals"], json!(18));
        assert_eq!(
            added[0][0]["rpcUrls"][0],
            json!("https://rpc-amoy.polygon.technology")
        );
    }

    #[tokio::test]
    async fn test_add_chain_failure() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.respond("eth_chainId", json!("0x1"));
        provider.fail("wallet_switchEthereumChain", RpcError::new(4902, "Unrecognized"));
        provider.fail("wallet_addEthereumChain", RpcError::new(-32602, "bad params"));

        let err = client(&provider)
            .ensure_network(&NetworkConfig::amoy())
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::ChainSwitch { .. }));
    }

    #[tokio::test]
    async fn test_switch_rejected_by_user() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.respond("eth_chainId", json!("0x1"));
        provider.fail("wallet_switchEthereumChain", RpcError::new(4001, "rejected"));

        let err = client(&provider)
            .ensure_network(&NetworkConfig::amoy())
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::UserRejected));
    }

    #[tokio::test]
    async fn test_still_wrong_after_switch() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.respond("eth_chainId", json!("0x1"));
        provider.respond("wallet_switchEthereumChain", json!(null));

        let err = client(&provider)
            .ensure_network(&NetworkConfig::amoy())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WalletError::WrongNetwork {
                expected: 80002,
                actual: 1
            }
        ));
    }
}
