//! Transient user notifications
//!
//! The shell turns workflow outcomes and errors into short messages the
//! renderer shows as toasts.

use accrue_core::constants::{COLLATERAL_DECIMALS, STABLE_DECIMALS};
use accrue_core::{Error, NetworkConfig};
use ctf_lending::{format_amount, unix_now, RunReport, WorkflowKind};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub id: String,
    pub severity: Severity,
    /// Machine-readable error code, set for error-derived notifications
    pub code: Option<&'static str>,
    pub message: String,
    /// Explorer link of the last transaction involved
    pub link: Option<String>,
    pub timestamp: u64,
}

impl Notification {
    fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            severity,
            code: None,
            message: message.into(),
            link: None,
            timestamp: unix_now(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(Severity::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    /// Rejections and busy refusals are warnings, everything else an error
    pub fn from_error(error: &Error) -> Self {
        let class = error.classify();
        let severity = if class.is_fatal() {
            Severity::Error
        } else {
            Severity::Warning
        };
        Self {
            code: Some(error.error_code()),
            ..Self::new(severity, error.user_message())
        }
    }

    /// Success message for a completed workflow
    pub fn workflow_done(report: &RunReport, network: &NetworkConfig) -> Self {
        let shares = || format_amount(report.amount, COLLATERAL_DECIMALS, 2);
        let stable = || format_amount(report.amount, STABLE_DECIMALS, 2);
        let message = match report.kind {
            WorkflowKind::Lock => format!("Locked {} shares as collateral", shares()),
            WorkflowKind::Borrow => format!("Borrowed {} USDC", stable()),
            WorkflowKind::EnableManagedStrategy => {
                format!("Managed strategy enabled, borrowed {} USDC", stable())
            }
            WorkflowKind::Repay => format!("Repaid {} USDC", stable()),
            WorkflowKind::Terminate => "Position closed".to_string(),
        };
        Self {
            link: report
                .tx_hashes
                .last()
                .and_then(|hash| network.tx_url(hash)),
            ..Self::success(message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accrue_core::units::pow10;
    use accrue_core::{ProtocolError, TxError, TxHash, WalletError, U256};

    #[test]
    fn test_rejection_is_a_warning() {
        let n = Notification::from_error(&Error::Transaction(TxError::UserRejected));
        assert_eq!(n.severity, Severity::Warning);
        assert_eq!(n.code, Some("user_rejected"));
        assert_eq!(n.message, "Transaction cancelled by user");
    }

    #[test]
    fn test_errors() {
        let n = Notification::from_error(&Error::Wallet(WalletError::NoWallet));
        assert_eq!(n.severity, Severity::Error);
        assert_eq!(n.message, "Please install a browser wallet");

        let n = Notification::from_error(&Error::Protocol(ProtocolError::WorkflowBusy {
            running: "lock".into(),
        }));
        assert_eq!(n.severity, Severity::Warning);
        assert_eq!(n.code, Some("busy"));

        let n = Notification::from_error(&Error::Transaction(TxError::ExecutionReverted {
            reason: Some("HF too low".into()),
        }));
        assert_eq!(n.severity, Severity::Error);
        assert_eq!(n.message, "Transaction failed: HF too low");
    }

    #[test]
    fn test_workflow_done_links_last_tx() {
        let report = RunReport {
            run_id: uuid::Uuid::new_v4(),
            kind: WorkflowKind::Borrow,
            amount: U256::from(1_250u64) * pow10(6),
            tx_hashes: vec![TxHash::repeat_byte(0x11), TxHash::repeat_byte(0x22)],
        };
        let n = Notification::workflow_done(&report, &NetworkConfig::amoy());
        assert_eq!(n.severity, Severity::Success);
        assert_eq!(n.message, "Borrowed 1,250.00 USDC");
        let link = n.link.unwrap();
        assert!(link.starts_with("https://amoy.polygonscan.com/tx/0x2222"));
    }
}
