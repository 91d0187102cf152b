//! Configuration types for Accrue
//!
//! Network and contract settings are compiled in; only the workflow timing
//! knobs are meant to be changed by callers.

use std::time::Duration;

use alloy_primitives::{address, Address};
use serde::{Deserialize, Serialize};

use crate::types::{ChainId, VaultSide};

/// Polygon Amoy testnet chain id
pub const AMOY_CHAIN_ID: ChainId = 80002;

/// Native currency descriptor for `wallet_addEthereumChain`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Network descriptor used to verify, switch or add the target chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub chain_id: ChainId,
    pub chain_name: String,
    pub native_currency: NativeCurrency,
    pub rpc_urls: Vec<String>,
    pub block_explorer_urls: Vec<String>,
}

impl NetworkConfig {
    /// Polygon Amoy testnet
    pub fn amoy() -> Self {
        Self {
            chain_id: AMOY_CHAIN_ID,
            chain_name: "Polygon Amoy Testnet".to_string(),
            native_currency: NativeCurrency {
                name: "MATIC".to_string(),
                symbol: "MATIC".to_string(),
                decimals: 18,
            },
            rpc_urls: vec!["https://rpc-amoy.polygon.technology".to_string()],
            block_explorer_urls: vec!["https://amoy.polygonscan.com/".to_string()],
        }
    }

    /// Chain id in the `0x`-prefixed hex form wallets expect
    pub fn chain_id_hex(&self) -> String {
        format!("{:#x}", self.chain_id)
    }

    /// Explorer link for a transaction hash
    pub fn tx_url(&self, tx_hash: &impl std::fmt::Display) -> Option<String> {
        self.block_explorer_urls
            .first()
            .map(|base| format!("{}/tx/{}", base.trim_end_matches('/'), tx_hash))
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self::amoy()
    }
}

/// Deployed contract addresses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractAddresses {
    pub usdc: Address,
    pub ctf: Address,
    pub vault_factory: Address,
    pub lending_pool: Address,
    pub collateral_manager: Address,
    pub liquidation_engine: Address,
    pub price_oracle: Address,
    pub vault_yes: Address,
    pub vault_no: Address,
}

impl ContractAddresses {
    /// Vault address for an outcome side
    pub fn vault(&self, side: VaultSide) -> Address {
        match side {
            VaultSide::Yes => self.vault_yes,
            VaultSide::No => self.vault_no,
        }
    }
}

impl Default for ContractAddresses {
    fn default() -> Self {
        Self {
            usdc: address!("DF3B67F50e92852168Fb5cD6048D76cF3447D8a0"),
            ctf: address!("7E620820562bcA813cbBf4AAc171989b8abdFc2b"),
            vault_factory: address!("300B07ADbb3F5A6a842CE3D18F74823682F0c214"),
            lending_pool: address!("6965c3E71369f486254aDBe93Fc1D40231F51Fb9"),
            collateral_manager: address!("CF00F48F2cfC4e1A5E61723B46D47223a01479fd"),
            liquidation_engine: address!("7757B661D785a24930E2fFc5Fe4baE8149AAb104"),
            price_oracle: address!("713C7D391d24323509c258BeFE95d6B08C0f8274"),
            vault_yes: address!("52326aC01109DcdBcb013c960b3BBB14e3946c17"),
            vault_no: address!("50A5aAf2706406E0A318F943D7A14cFF49265f03"),
        }
    }
}

/// Timing of wallet requests and transaction confirmation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Give up waiting for a receipt after this many seconds (None = wait forever)
    #[serde(default)]
    pub confirmation_timeout_secs: Option<u64>,

    /// Receipt polling interval
    #[serde(default = "default_receipt_poll_interval_ms")]
    pub receipt_poll_interval_ms: u64,

    /// Timeout for a single wallet RPC request
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_receipt_poll_interval_ms() -> u64 {
    1_500
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl WorkflowConfig {
    pub fn confirmation_timeout(&self) -> Option<Duration> {
        self.confirmation_timeout_secs.map(Duration::from_secs)
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            confirmation_timeout_secs: None,
            receipt_poll_interval_ms: default_receipt_poll_interval_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub contracts: ContractAddresses,
    #[serde(default)]
    pub workflow: WorkflowConfig,
}
