//! wallet-client: Wrapper around an injected EIP-1193 wallet provider
//!
//! This crate provides a high-level client for the browser wallet: account
//! access, network verification and switching, read-only contract calls,
//! transaction submission and receipt polling.

pub mod network;
pub mod pending;
pub mod provider;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

use std::sync::Arc;
use std::time::Duration;

use accrue_core::{Address, ChainId, TxError, TxHash, WalletError, WorkflowConfig};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;

pub use pending::{CancelToken, ConfirmOptions, PendingTx, ReceiptSource, TxReceipt};
pub use provider::{Eip1193Provider, ProviderEvent, RpcError};

/// Result type for wallet client operations
pub type Result<T> = std::result::Result<T, WalletError>;

/// High-level wallet client
#[derive(Clone)]
pub struct WalletClient {
    provider: Arc<dyn Eip1193Provider>,
    request_timeout: Duration,
}

/// Why a provider request did not produce a value
#[derive(Debug)]
enum RequestFailure {
    Rpc(RpcError),
    Timeout(Duration),
}

impl From<RequestFailure> for WalletError {
    fn from(f: RequestFailure) -> Self {
        match f {
            RequestFailure::Rpc(e) => e.into(),
            RequestFailure::Timeout(d) => WalletError::Timeout { secs: d.as_secs() },
        }
    }
}

impl From<RequestFailure> for TxError {
    fn from(f: RequestFailure) -> Self {
        match f {
            RequestFailure::Rpc(e) => e.into(),
            RequestFailure::Timeout(d) => TxError::RequestTimeout { secs: d.as_secs() },
        }
    }
}

impl WalletClient {
    /// Wrap the injected provider, failing with `NoWallet` when there is none
    pub fn from_injected(
        provider: Option<Arc<dyn Eip1193Provider>>,
        config: &WorkflowConfig,
    ) -> Result<Self> {
        let provider = provider.ok_or(WalletError::NoWallet)?;
        Ok(Self {
            provider,
            request_timeout: config.request_timeout(),
        })
    }

    /// Get the underlying provider (for advanced usage)
    pub fn provider(&self) -> &Arc<dyn Eip1193Provider> {
        &self.provider
    }

    /// Subscribe to account/chain notifications
    pub fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.provider.subscribe()
    }

    /// Ask the wallet for account access; prompts the user if needed.
    ///
    /// Waits as long as the prompt stays open.
    pub async fn request_accounts(&self) -> Result<Vec<Address>> {
        let value = self
            .prompt("eth_requestAccounts", json!([]))
            .await
            .map_err(WalletError::from)?;
        let accounts = parse_accounts(&value)?;
        if accounts.is_empty() {
            return Err(WalletError::NoAccounts);
        }
        tracing::info!(account = %accounts[0], "Wallet account access granted");
        Ok(accounts)
    }

    /// Currently active chain id
    pub async fn chain_id(&self) -> Result<ChainId> {
        let value = self.timed("eth_chainId", json!([])).await?;
        let hex = value
            .as_str()
            .ok_or_else(|| WalletError::InvalidResponse(format!("eth_chainId: {}", value)))?;
        parse_hex_u64(hex)
            .ok_or_else(|| WalletError::InvalidResponse(format!("eth_chainId: {}", hex)))
    }

    /// Read-only contract call at the latest block
    pub async fn call(&self, to: Address, data: Vec<u8>) -> Result<Vec<u8>> {
        let params = json!([{ "to": to, "data": encode_hex(&data) }, "latest"]);
        let value = self.timed("eth_call", params).await?;
        let hex = value
            .as_str()
            .ok_or_else(|| WalletError::InvalidResponse(format!("eth_call: {}", value)))?;
        decode_hex(hex).ok_or_else(|| WalletError::InvalidResponse(format!("eth_call: {}", hex)))
    }

    /// Sign and broadcast a contract call; returns a handle to await.
    ///
    /// The wallet shows a signing prompt, so no request deadline applies.
    /// Callers that need to give up drop the future.
    pub async fn send_transaction(
        &self,
        from: Address,
        to: Address,
        data: Vec<u8>,
    ) -> std::result::Result<PendingTx, TxError> {
        let params = json!([{ "from": from, "to": to, "data": encode_hex(&data) }]);
        let value = self
            .prompt("eth_sendTransaction", params)
            .await
            .map_err(TxError::from)?;
        let tx_hash: TxHash = value
            .as_str()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| TxError::Rpc {
                code: 0,
                message: format!("unexpected eth_sendTransaction result: {}", value),
            })?;
        tracing::debug!(tx_hash = %tx_hash, to = %to, "Transaction broadcast");
        Ok(PendingTx::new(tx_hash, Arc::new(self.clone())))
    }

    /// A request that waits on the user at the wallet prompt
    async fn prompt(&self, method: &str, params: Value) -> std::result::Result<Value, RpcError> {
        self.provider.request(method, params).await.map_err(|e| {
            tracing::debug!(method, error = %e, "Wallet prompt failed");
            e
        })
    }

    async fn timed(&self, method: &str, params: Value) -> Result<Value> {
        self.timed_raw(method, params).await.map_err(WalletError::from)
    }

    async fn timed_raw(
        &self,
        method: &str,
        params: Value,
    ) -> std::result::Result<Value, RequestFailure> {
        timed_request(self.request_timeout, self.provider.request(method, params))
            .await
            .map_err(|f| {
                tracing::debug!(method, error = ?f, "Wallet request failed");
                f
            })
    }
}

#[async_trait]
impl ReceiptSource for WalletClient {
    async fn receipt(&self, tx_hash: TxHash) -> std::result::Result<Option<TxReceipt>, TxError> {
        let value = self
            .timed_raw("eth_getTransactionReceipt", json!([tx_hash]))
            .await
            .map_err(TxError::from)?;
        if value.is_null() {
            return Ok(None);
        }
        let raw: RawReceipt = serde_json::from_value(value).map_err(|e| TxError::Rpc {
            code: 0,
            message: format!("malformed receipt: {}", e),
        })?;
        // A receipt without a block number is still pending on some wallets
        let Some(block_number) = raw.block_number.as_deref().and_then(parse_hex_u64) else {
            return Ok(None);
        };
        Ok(Some(TxReceipt {
            tx_hash: raw.transaction_hash.unwrap_or(tx_hash),
            block_number,
            success: raw.status.as_deref().and_then(parse_hex_u64) == Some(1),
        }))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    transaction_hash: Option<TxHash>,
    block_number: Option<String>,
    status: Option<String>,
}

/// Apply the request timeout to a provider call
async fn timed_request(
    limit: Duration,
    fut: impl std::future::Future<Output = std::result::Result<Value, RpcError>>,
) -> std::result::Result<Value, RequestFailure> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| RequestFailure::Timeout(limit))?
        .map_err(RequestFailure::Rpc)
}

fn parse_accounts(value: &Value) -> Result<Vec<Address>> {
    let list = value
        .as_array()
        .ok_or_else(|| WalletError::InvalidResponse(format!("accounts: {}", value)))?;
    list.iter()
        .map(|v| {
            v.as_str()
                .and_then(|s| s.parse::<Address>().ok())
                .ok_or_else(|| WalletError::InvalidResponse(format!("account: {}", v)))
        })
        .collect()
}

/// Parse a `0x`-prefixed hex quantity
pub fn parse_hex_u64(s: &str) -> Option<u64> {
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))?;
    if digits.is_empty() {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}

fn encode_hex(data: &[u8]) -> String {
    format!("0x{}", hex::encode(data))
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    hex::decode(s.strip_prefix("0x").unwrap_or(s)).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedProvider;

    fn client(provider: Arc<ScriptedProvider>) -> WalletClient {
        WalletClient::from_injected(
            Some(provider as Arc<dyn Eip1193Provider>),
            &WorkflowConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_no_wallet() {
        let err = WalletClient::from_injected(None, &WorkflowConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, WalletError::NoWallet));
    }

    #[test]
    fn test_parse_hex_u64() {
        assert_eq!(parse_hex_u64("0x13882"), Some(80002));
        assert_eq!(parse_hex_u64("0x0"), Some(0));
        assert_eq!(parse_hex_u64("13882"), None);
        assert_eq!(parse_hex_u64("0x"), None);
    }

    #[tokio::test]
    async fn test_request_accounts() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.respond(
            "eth_requestAccounts",
            json!(["0x52326ac01109dcdbcb013c960b3bbb14e3946c17"]),
        );
        let accounts = client(provider).request_accounts().await.unwrap();
        assert_eq!(accounts.len(), 1);
    }

    #[tokio::test]
    async fn test_request_accounts_rejected() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.fail("eth_requestAccounts", RpcError::new(4001, "User rejected"));
        let err = client(provider).request_accounts().await.unwrap_err();
        assert!(matches!(err, WalletError::UserRejected));
    }

    #[tokio::test]
    async fn test_empty_accounts() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.respond("eth_requestAccounts", json!([]));
        let err = client(provider).request_accounts().await.unwrap_err();
        assert!(matches!(err, WalletError::NoAccounts));
    }

    #[tokio::test]
    async fn test_send_transaction_classifies_errors() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.fail(
            "eth_sendTransaction",
            RpcError::new(-32000, "execution reverted: Exceeds max borrow"),
        );
        let err = client(provider)
            .send_transaction(Address::ZERO, Address::ZERO, vec![1, 2])
            .await
            .unwrap_err();
        match err {
            TxError::ExecutionReverted { reason } => {
                assert_eq!(reason.as_deref(), Some("Exceeds max borrow"))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_and_confirm() {
        let provider = Arc::new(ScriptedProvider::new());
        let hash = format!("0x{}", "11".repeat(32));
        provider.respond("eth_sendTransaction", json!(hash));
        provider.respond("eth_getTransactionReceipt", Value::Null);
        provider.respond(
            "eth_getTransactionReceipt",
            json!({ "transactionHash": hash, "blockNumber": "0x10", "status": "0x1" }),
        );

        let wallet = client(provider.clone());
        let pending = wallet
            .send_transaction(Address::ZERO, Address::ZERO, vec![0xde, 0xad])
            .await
            .unwrap();
        let options = ConfirmOptions {
            poll_interval: Duration::from_millis(1),
            ..ConfirmOptions::default()
        };
        let receipt = pending.confirm(&options).await.unwrap();
        assert_eq!(receipt.block_number, 16);
        assert!(receipt.success);

        let sent = provider.calls_to("eth_sendTransaction");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0][0]["data"], json!("0xdead"));
    }

    #[tokio::test]
    async fn test_call_decodes_hex() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.respond("eth_call", json!("0x00ff"));
        let out = client(provider).call(Address::ZERO, vec![]).await.unwrap();
        assert_eq!(out, vec![0x00, 0xff]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_timeout() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.hang("eth_chainId");
        let err = client(provider).chain_id().await.unwrap_err();
        assert!(matches!(err, WalletError::Timeout { secs: 30 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_signing_prompt_has_no_deadline() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.hang("eth_sendTransaction");
        let wallet = client(provider.clone());
        let send = wallet.send_transaction(Address::ZERO, Address::ZERO, vec![1]);
        let waited = tokio::time::timeout(Duration::from_secs(600), send).await;
        assert!(waited.is_err(), "signing prompt was cut off by the request deadline");
        assert_eq!(provider.calls_to("eth_sendTransaction").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_account_prompt_has_no_deadline() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.hang("eth_requestAccounts");
        let wallet = client(provider);
        let waited = tokio::time::timeout(Duration::from_secs(600), wallet.request_accounts()).await;
        assert!(waited.is_err());
    }
}
