//! Error types for Accrue

use thiserror::Error;

use crate::types::{ChainId, TxHash};

/// EIP-1193 code for a request the user rejected in the wallet
pub const RPC_USER_REJECTED: i64 = 4001;

/// EIP-3085/3326 code for a chain the wallet does not know
pub const RPC_UNRECOGNIZED_CHAIN: i64 = 4902;

/// JSON-RPC internal error, used by wallets for failed execution
pub const RPC_INTERNAL_ERROR: i64 = -32603;

/// Core errors that can occur in Accrue
#[derive(Debug, Error)]
pub enum Error {
    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] TxError),

    #[error("Contract error: {0}")]
    Contract(#[from] ContractError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Wallet provider and network errors
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("No wallet provider detected")]
    NoWallet,

    #[error("Wrong network: expected chain {expected}, wallet is on {actual}")]
    WrongNetwork { expected: ChainId, actual: ChainId },

    #[error("Failed to switch network: {message}")]
    ChainSwitch { message: String },

    #[error("User rejected the request")]
    UserRejected,

    #[error("Wallet returned no accounts")]
    NoAccounts,

    #[error("Wallet RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Wallet request timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("Invalid wallet response: {0}")]
    InvalidResponse(String),
}

/// Transaction submission and confirmation errors
#[derive(Debug, Error)]
pub enum TxError {
    #[error("User rejected the transaction")]
    UserRejected,

    #[error("Execution reverted{}", reason_suffix(.reason))]
    ExecutionReverted { reason: Option<String> },

    #[error("Insufficient funds for gas")]
    InsufficientFunds,

    #[error("Transaction RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Transaction {tx_hash} not confirmed after {secs}s")]
    ConfirmationTimeout { tx_hash: TxHash, secs: u64 },

    #[error("Stopped waiting for transaction {tx_hash}")]
    Cancelled { tx_hash: TxHash },

    #[error("Stopped waiting for the wallet to sign")]
    SigningAbandoned,

    #[error("Wallet request timed out after {secs}s")]
    RequestTimeout { secs: u64 },
}

/// Contract call errors
#[derive(Debug, Error)]
pub enum ContractError {
    #[error("Failed to decode {method} result: {message}")]
    Decode {
        method: &'static str,
        message: String,
    },

    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error(transparent)]
    Transaction(#[from] TxError),
}

/// Client-side protocol and workflow errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid amount: {message}")]
    InvalidAmount { message: String },

    #[error("Wallet not connected")]
    NotConnected,

    #[error("No vault selected")]
    NoVaultSelected,

    #[error("Another operation is in progress: {running}")]
    WorkflowBusy { running: String },

    #[error("No debt or collateral left to unwind")]
    NothingToTerminate,
}

/// Result type alias for Accrue operations
pub type Result<T> = std::result::Result<T, Error>;

impl WalletError {
    /// Map a raw provider error from a wallet-level request
    pub fn from_rpc(code: i64, message: impl Into<String>) -> Self {
        if code == RPC_USER_REJECTED {
            Self::UserRejected
        } else {
            Self::Rpc {
                code,
                message: message.into(),
            }
        }
    }
}

impl TxError {
    /// Classify a raw provider error returned while sending a transaction
    pub fn from_rpc(code: i64, message: &str) -> Self {
        if code == RPC_USER_REJECTED {
            return Self::UserRejected;
        }
        let lower = message.to_ascii_lowercase();
        if lower.contains("insufficient funds") {
            return Self::InsufficientFunds;
        }
        if lower.contains("execution reverted") {
            return Self::ExecutionReverted {
                reason: revert_reason(message),
            };
        }
        Self::Rpc {
            code,
            message: message.to_string(),
        }
    }
}

fn reason_suffix(reason: &Option<String>) -> String {
    reason
        .as_ref()
        .map(|r| format!(": {}", r))
        .unwrap_or_default()
}

/// Extract a revert reason from a provider error message.
///
/// Handles `reason="..."` as emitted by ethers-style providers and the
/// `execution reverted: ...` form emitted by most wallets.
pub fn revert_reason(message: &str) -> Option<String> {
    if let Some(start) = message.find("reason=\"") {
        let rest = &message[start + "reason=\"".len()..];
        if let Some(end) = rest.find('"') {
            let reason = &rest[..end];
            if !reason.is_empty() {
                return Some(reason.to_string());
            }
        }
    }
    let lower = message.to_ascii_lowercase();
    if let Some(start) = lower.find("execution reverted:") {
        let reason = message[start + "execution reverted:".len()..].trim();
        if !reason.is_empty() {
            return Some(reason.to_string());
        }
    }
    None
}

/// Coarse error classification used for user-facing notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorClass {
    NoWallet,
    WrongNetwork,
    ChainSwitch,
    UserRejected,
    ExecutionReverted(Option<String>),
    InsufficientFunds,
    InvalidAmount,
    Busy,
    /// The user stopped waiting; the transaction itself may still land
    Cancelled,
    /// A read-only wallet request got no answer in time
    Timeout,
    Other,
}

impl ErrorClass {
    /// Whether the error ends the current action for good (as opposed to an
    /// informational cancellation the user caused)
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::UserRejected | Self::Busy | Self::Cancelled | Self::Timeout
        )
    }
}

impl Error {
    /// Classify this error for notification purposes
    pub fn classify(&self) -> ErrorClass {
        match self {
            Self::Wallet(e) => classify_wallet(e),
            Self::Transaction(e) => classify_tx(e),
            Self::Contract(ContractError::Wallet(e)) => classify_wallet(e),
            Self::Contract(ContractError::Transaction(e)) => classify_tx(e),
            Self::Contract(ContractError::Decode { .. }) => ErrorClass::Other,
            Self::Protocol(ProtocolError::InvalidAmount { .. }) => ErrorClass::InvalidAmount,
            Self::Protocol(ProtocolError::WorkflowBusy { .. }) => ErrorClass::Busy,
            Self::Protocol(_) => ErrorClass::Other,
        }
    }

    /// Stable machine-readable code
    pub fn error_code(&self) -> &'static str {
        match self.classify() {
            ErrorClass::NoWallet => "no_wallet",
            ErrorClass::WrongNetwork => "wrong_network",
            ErrorClass::ChainSwitch => "chain_switch",
            ErrorClass::UserRejected => "user_rejected",
            ErrorClass::ExecutionReverted(_) => "execution_reverted",
            ErrorClass::InsufficientFunds => "insufficient_funds",
            ErrorClass::InvalidAmount => "invalid_amount",
            ErrorClass::Busy => "busy",
            ErrorClass::Cancelled => "cancelled",
            ErrorClass::Timeout => "timeout",
            ErrorClass::Other => "other",
        }
    }

    /// Message suitable for a transient notification
    pub fn user_message(&self) -> String {
        match self.classify() {
            ErrorClass::NoWallet => "Please install a browser wallet".to_string(),
            ErrorClass::WrongNetwork | ErrorClass::ChainSwitch => {
                "Please switch your wallet to Polygon Amoy".to_string()
            }
            ErrorClass::UserRejected => "Transaction cancelled by user".to_string(),
            ErrorClass::ExecutionReverted(Some(reason)) => {
                format!("Transaction failed: {}", reason)
            }
            ErrorClass::ExecutionReverted(None) => {
                "Transaction rejected by contract, please check the parameters".to_string()
            }
            ErrorClass::InsufficientFunds => "Not enough MATIC to pay for gas".to_string(),
            ErrorClass::Busy => "Please wait for the current operation to finish".to_string(),
            ErrorClass::Cancelled => {
                "Stopped waiting for confirmation, the transaction may still complete".to_string()
            }
            ErrorClass::Timeout => "The wallet did not respond in time, please retry".to_string(),
            ErrorClass::InvalidAmount | ErrorClass::Other => self.to_string(),
        }
    }
}

fn classify_wallet(e: &WalletError) -> ErrorClass {
    match e {
        WalletError::NoWallet => ErrorClass::NoWallet,
        WalletError::WrongNetwork { .. } => ErrorClass::WrongNetwork,
        WalletError::ChainSwitch { .. } => ErrorClass::ChainSwitch,
        WalletError::UserRejected => ErrorClass::UserRejected,
        WalletError::Timeout { .. } => ErrorClass::Timeout,
        _ => ErrorClass::Other,
    }
}

fn classify_tx(e: &TxError) -> ErrorClass {
    match e {
        TxError::UserRejected => ErrorClass::UserRejected,
        TxError::ExecutionReverted { reason } => ErrorClass::ExecutionReverted(reason.clone()),
        TxError::InsufficientFunds => ErrorClass::InsufficientFunds,
        TxError::Cancelled { .. } | TxError::SigningAbandoned => ErrorClass::Cancelled,
        TxError::RequestTimeout { .. } => ErrorClass::Timeout,
        TxError::Rpc { code, .. } if *code == RPC_INTERNAL_ERROR => {
            ErrorClass::ExecutionReverted(None)
        }
        _ => ErrorClass::Other,
    }
}
