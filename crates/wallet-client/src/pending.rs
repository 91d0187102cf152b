//! Pending transaction handles and confirmation waiting
//!
//! A broadcast transaction cannot be recalled, so timeouts and cancellation
//! only end the local wait. The transaction may still be mined afterwards and
//! the next chain reload picks up whatever happened.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use accrue_core::{TxError, TxHash, WorkflowConfig};
use async_trait::async_trait;
use tokio::sync::Notify;

/// Mined transaction receipt (the fields the client cares about)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub success: bool,
}

/// Anything that can look up a receipt by hash
#[async_trait]
pub trait ReceiptSource: Send + Sync {
    /// `Ok(None)` while the transaction is still pending
    async fn receipt(&self, tx_hash: TxHash) -> Result<Option<TxReceipt>, TxError>;
}

/// Cooperative cancellation flag shared between a waiter and its owner
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel` has been called
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// How long and how often to wait for a receipt
#[derive(Clone)]
pub struct ConfirmOptions {
    pub poll_interval: Duration,
    pub timeout: Option<Duration>,
    pub cancel: CancelToken,
}

impl ConfirmOptions {
    pub fn from_config(config: &WorkflowConfig, cancel: CancelToken) -> Self {
        Self {
            poll_interval: config.receipt_poll_interval(),
            timeout: config.confirmation_timeout(),
            cancel,
        }
    }
}

impl Default for ConfirmOptions {
    fn default() -> Self {
        Self::from_config(&WorkflowConfig::default(), CancelToken::new())
    }
}

/// Handle to a broadcast, not yet confirmed transaction
#[derive(Clone)]
pub struct PendingTx {
    tx_hash: TxHash,
    source: Arc<dyn ReceiptSource>,
}

impl std::fmt::Debug for PendingTx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingTx")
            .field("tx_hash", &self.tx_hash)
            .finish()
    }
}

impl PendingTx {
    pub fn new(tx_hash: TxHash, source: Arc<dyn ReceiptSource>) -> Self {
        Self { tx_hash, source }
    }

    pub fn tx_hash(&self) -> TxHash {
        self.tx_hash
    }

    /// Wait until the transaction is mined.
    ///
    /// A reverted receipt is `ExecutionReverted`. Timeout and cancellation
    /// leave the transaction itself untouched.
    pub async fn confirm(self, options: &ConfirmOptions) -> Result<TxReceipt, TxError> {
        let tx_hash = self.tx_hash;
        if options.cancel.is_cancelled() {
            return Err(TxError::Cancelled { tx_hash });
        }

        let wait = async {
            match options.timeout {
                Some(limit) => tokio::time::timeout(limit, self.poll(options.poll_interval))
                    .await
                    .map_err(|_| TxError::ConfirmationTimeout {
                        tx_hash,
                        secs: limit.as_secs(),
                    })?,
                None => self.poll(options.poll_interval).await,
            }
        };

        tokio::select! {
            result = wait => result,
            _ = options.cancel.cancelled() => {
                tracing::warn!(tx_hash = %tx_hash, "Stopped waiting for confirmation");
                Err(TxError::Cancelled { tx_hash })
            }
        }
    }

    async fn poll(&self, interval: Duration) -> Result<TxReceipt, TxError> {
        loop {
            match self.source.receipt(self.tx_hash).await {
                Ok(Some(receipt)) if receipt.success => return Ok(receipt),
                Ok(Some(_)) => return Err(TxError::ExecutionReverted { reason: None }),
                Ok(None) => {}
                Err(e) => {
                    // Transient lookup failures: keep polling, the timeout bounds us
                    tracing::debug!(tx_hash = %self.tx_hash, error = %e, "Receipt lookup failed");
                }
            }
            tokio::time::sleep(interval).await;
        }
    }
}
