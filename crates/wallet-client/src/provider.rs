//! EIP-1193 provider boundary
//!
//! The injected wallet is reached through a single `request` entry point and
//! pushes account/chain notifications on a broadcast channel.

use accrue_core::{Address, ChainId, TxError, WalletError};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

/// Error object returned by a provider request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

impl From<RpcError> for WalletError {
    fn from(e: RpcError) -> Self {
        WalletError::from_rpc(e.code, e.message)
    }
}

impl From<RpcError> for TxError {
    fn from(e: RpcError) -> Self {
        TxError::from_rpc(e.code, &e.message)
    }
}

/// Notifications pushed by the wallet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    /// Active accounts changed; empty means the wallet disconnected us
    AccountsChanged(Vec<Address>),
    /// Active chain changed
    ChainChanged(ChainId),
}

/// An injected EIP-1193 wallet provider
#[async_trait]
pub trait Eip1193Provider: Send + Sync {
    /// Issue a JSON-RPC request (`method`, positional `params`)
    async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError>;

    /// Subscribe to account and chain notifications
    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent>;
}
