//! Transaction orchestration
//!
//! Every user action is a fixed, ordered list of contract calls planned up
//! front. Each step is submitted and then awaited until mined before the next
//! one starts. The first failure aborts the run; steps that were already
//! mined stay mined and the next chain load reconciles the cache.

use std::fmt;
use std::sync::{Mutex, MutexGuard};

use accrue_contracts::ContractSet;
use accrue_core::constants::{COLLATERAL_DECIMALS, STABLE_DECIMALS};
use accrue_core::units::parse_units;
use accrue_core::{
    Address, AppConfig, ContractError, NetworkConfig, ProtocolError, Result, StrategyMode, TxError,
    TxHash, VaultSide, WorkflowConfig, U256,
};
use serde::Serialize;
use tokio::sync::watch;
use uuid::Uuid;
use wallet_client::{CancelToken, ConfirmOptions, PendingTx};

use crate::calculator::managed_borrow_amount;
use crate::earnings::EarningsEstimator;
use crate::fetch::{fetch_price, load_chain_snapshot};
use crate::state::{unix_now, AppStore, Tracked};
use crate::ticker::ElapsedClock;

/// User-level actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    Lock,
    Borrow,
    EnableManagedStrategy,
    Repay,
    Terminate,
}

impl WorkflowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lock => "lock",
            Self::Borrow => "borrow",
            Self::EnableManagedStrategy => "enable_managed_strategy",
            Self::Repay => "repay",
            Self::Terminate => "terminate",
        }
    }
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One contract call in a workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Let the vault move the user's outcome tokens
    ApproveOutcomeTokens { side: VaultSide },
    DepositToVault { side: VaultSide, amount: U256 },
    /// Let the collateral manager pull vault shares
    ApproveShares { side: VaultSide, amount: U256 },
    DepositCollateral { side: VaultSide, amount: U256 },
    Borrow { amount: U256 },
    /// Let the pool pull the stable asset for repayment
    ApproveRepayment { amount: U256 },
    Repay { amount: U256 },
    WithdrawCollateral { side: VaultSide, amount: U256 },
    WithdrawFromVault { side: VaultSide, amount: U256 },
}

impl Step {
    pub fn label(&self) -> &'static str {
        match self {
            Self::ApproveOutcomeTokens { .. } => "approve outcome tokens",
            Self::DepositToVault { .. } => "deposit into vault",
            Self::ApproveShares { .. } => "approve vault shares",
            Self::DepositCollateral { .. } => "deposit collateral",
            Self::Borrow { .. } => "borrow",
            Self::ApproveRepayment { .. } => "approve repayment",
            Self::Repay { .. } => "repay",
            Self::WithdrawCollateral { .. } => "withdraw collateral",
            Self::WithdrawFromVault { .. } => "withdraw from vault",
        }
    }
}

/// Where a workflow run currently is
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    Idle,
    /// Step `step` (1-based) submitted or being submitted
    StepPending {
        step: usize,
        label: &'static str,
        tx_hash: Option<TxHash>,
    },
    StepConfirmed {
        step: usize,
        tx_hash: TxHash,
    },
    Done,
    Failed {
        step: usize,
        error: String,
    },
}

/// Progress of the latest workflow run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowProgress {
    pub run_id: Option<Uuid>,
    pub kind: Option<WorkflowKind>,
    pub total_steps: usize,
    pub phase: Phase,
}

impl Default for WorkflowProgress {
    fn default() -> Self {
        Self {
            run_id: None,
            kind: None,
            total_steps: 0,
            phase: Phase::Idle,
        }
    }
}

impl WorkflowProgress {
    pub fn is_running(&self) -> bool {
        matches!(
            self.phase,
            Phase::StepPending { .. } | Phase::StepConfirmed { .. }
        )
    }
}

/// Outcome of a successful run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub kind: WorkflowKind,
    pub amount: U256,
    pub tx_hashes: Vec<TxHash>,
}

/// Steps for locking `amount` outcome tokens as collateral
pub fn lock_plan(side: VaultSide, amount: U256, vault_approved: bool) -> Vec<Step> {
    let mut steps = Vec::with_capacity(4);
    if !vault_approved {
        steps.push(Step::ApproveOutcomeTokens { side });
    }
    steps.extend([
        Step::DepositToVault { side, amount },
        Step::ApproveShares { side, amount },
        Step::DepositCollateral { side, amount },
    ]);
    steps
}

/// Steps for repaying `amount` of debt
pub fn repay_plan(amount: U256) -> Vec<Step> {
    vec![
        Step::ApproveRepayment { amount },
        Step::Repay { amount },
    ]
}

/// Steps to fully unwind a position from authoritative chain values
pub fn terminate_plan(
    side: VaultSide,
    debt: U256,
    collateral: U256,
) -> std::result::Result<Vec<Step>, ProtocolError> {
    if debt.is_zero() && collateral.is_zero() {
        return Err(ProtocolError::NothingToTerminate);
    }
    let mut steps = Vec::with_capacity(4);
    if !debt.is_zero() {
        steps.extend(repay_plan(debt));
    }
    if !collateral.is_zero() {
        steps.extend([
            Step::WithdrawCollateral {
                side,
                amount: collateral,
            },
            Step::WithdrawFromVault {
                side,
                amount: collateral,
            },
        ]);
    }
    Ok(steps)
}

/// Parse a user-entered amount; must be a positive number
pub fn parse_amount(input: &str, decimals: u8) -> std::result::Result<U256, ProtocolError> {
    let amount = parse_units(input, decimals).map_err(|e| ProtocolError::InvalidAmount {
        message: e.to_string(),
    })?;
    if amount.is_zero() {
        return Err(ProtocolError::InvalidAmount {
            message: "amount must be greater than zero".to_string(),
        });
    }
    Ok(amount)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// A workflow holding the orchestrator's gate
struct Run<'a> {
    _gate: tokio::sync::MutexGuard<'a, ()>,
    active: &'a Mutex<Option<WorkflowKind>>,
    id: Uuid,
    kind: WorkflowKind,
    confirm: ConfirmOptions,
}

impl Drop for Run<'_> {
    fn drop(&mut self) {
        *lock(self.active) = None;
    }
}

/// Runs workflows for one connected account
pub struct Orchestrator {
    contracts: ContractSet,
    user: Address,
    store: AppStore,
    config: WorkflowConfig,
    network: NetworkConfig,
    estimator: EarningsEstimator,
    clock: ElapsedClock,
    gate: tokio::sync::Mutex<()>,
    active: Mutex<Option<WorkflowKind>>,
    cancel: Mutex<CancelToken>,
    progress: watch::Sender<WorkflowProgress>,
}

impl Orchestrator {
    pub fn new(contracts: ContractSet, user: Address, store: AppStore, config: &AppConfig) -> Self {
        let (progress, _) = watch::channel(WorkflowProgress::default());
        Self {
            contracts,
            user,
            estimator: EarningsEstimator::new(store.clone()),
            clock: ElapsedClock::new(store.clone()),
            store,
            config: config.workflow.clone(),
            network: config.network.clone(),
            gate: tokio::sync::Mutex::new(()),
            active: Mutex::new(None),
            cancel: Mutex::new(CancelToken::new()),
            progress,
        }
    }

    pub fn user(&self) -> Address {
        self.user
    }

    pub fn progress(&self) -> watch::Receiver<WorkflowProgress> {
        self.progress.subscribe()
    }

    pub fn estimator(&self) -> &EarningsEstimator {
        &self.estimator
    }

    pub fn clock(&self) -> &ElapsedClock {
        &self.clock
    }

    /// Stop waiting on the running workflow's current confirmation
    pub fn cancel(&self) {
        lock(&self.cancel).cancel();
    }

    /// Stop every background task this orchestrator owns
    pub fn shutdown(&self) {
        self.cancel();
        self.estimator.stop();
        self.clock.stop();
    }

    /// Read the chain and replace the cached position and market.
    ///
    /// Refused with `WorkflowBusy` while a workflow owns the state.
    pub async fn reload(&self) -> Result<()> {
        let _gate = self.exclusive()?;
        self.refresh().await
    }

    async fn refresh(&self) -> Result<()> {
        let vault = self.store.read(|s| s.position.selected_vault);
        let snapshot = load_chain_snapshot(&self.contracts, self.user, vault).await?;
        let has_debt = self.store.apply_snapshot(snapshot);

        if has_debt {
            self.estimator.start();
        } else {
            self.estimator.stop();
        }
        if self.store.read(|s| s.position.deposit_timestamp.is_some()) {
            self.clock.start();
        }
        Ok(())
    }

    /// Choose the active vault and refresh its price.
    ///
    /// A failed price read is logged; the selection still applies. Refused
    /// with `WorkflowBusy` while a workflow runs against the current vault.
    pub async fn select_vault(&self, side: VaultSide) -> Result<()> {
        let _gate = self.exclusive()?;
        let address = self.contracts.vault_address(side);
        self.store.update(|s| {
            s.position.selected_vault = Some(side);
            s.position.vault_address = Some(address);
        });

        match fetch_price(&self.contracts, side).await {
            Ok(price) => self.store.update(|s| {
                let market = s.market.get_or_insert_with(Default::default);
                market.current_price = price.price;
                market.price_valid = price.is_valid;
                market.price_updated_at = price.last_updated;
            }),
            Err(e) => {
                tracing::warn!(vault = %side, error = %e, "Failed to refresh vault price");
            }
        }
        Ok(())
    }

    /// Lock outcome tokens of the selected vault as collateral
    pub async fn lock(&self, amount: &str) -> Result<RunReport> {
        let run = self.begin(WorkflowKind::Lock)?;
        self.require_session()?;
        let side = self.selected_vault()?;

        let amount = parse_amount(amount, COLLATERAL_DECIMALS)?;
        let balance = self.store.read(|s| s.wallet_balance.value());
        if amount > balance {
            return Err(ProtocolError::InvalidAmount {
                message: "amount exceeds wallet balance".to_string(),
            }
            .into());
        }

        let vault = self.contracts.vault_address(side);
        let approved = self
            .contracts
            .ctf
            .is_approved_for_all(self.user, vault)
            .await?;

        let tx_hashes = self
            .execute(&run, &lock_plan(side, amount, approved))
            .await?;

        self.store.update(|s| {
            let collateral = s.position.collateral.value().saturating_add(amount);
            s.position.collateral = Tracked::tentative(collateral);
            s.position.deposit_timestamp = Some(unix_now());
        });
        self.clock.start();
        self.reload_after(&run).await;

        Ok(run.report(amount, tx_hashes))
    }

    /// Borrow a user-chosen amount of the stable asset
    pub async fn borrow(&self, amount: &str) -> Result<RunReport> {
        let run = self.begin(WorkflowKind::Borrow)?;
        self.require_session()?;
        let amount = parse_amount(amount, STABLE_DECIMALS)?;

        let tx_hashes = self.execute(&run, &[Step::Borrow { amount }]).await?;
        self.record_borrow(amount, StrategyMode::SelfManaged);
        self.reload_after(&run).await;

        Ok(run.report(amount, tx_hashes))
    }

    /// Borrow a fixed share of the current max on the user's behalf
    pub async fn enable_managed_strategy(&self) -> Result<RunReport> {
        let run = self.begin(WorkflowKind::EnableManagedStrategy)?;
        self.require_session()?;

        let max = self.contracts.manager.max_borrow_amount(self.user).await?;
        let amount = managed_borrow_amount(max);
        if amount.is_zero() {
            return Err(ProtocolError::InvalidAmount {
                message: "no borrowing capacity available".to_string(),
            }
            .into());
        }
        tracing::info!(max = %max, amount = %amount, "Managed strategy borrow sized");

        let tx_hashes = self.execute(&run, &[Step::Borrow { amount }]).await?;
        self.record_borrow(amount, StrategyMode::ProtocolManaged);
        self.reload_after(&run).await;

        Ok(run.report(amount, tx_hashes))
    }

    /// Repay part or all of the debt
    pub async fn repay(&self, amount: &str) -> Result<RunReport> {
        let run = self.begin(WorkflowKind::Repay)?;
        self.require_session()?;
        let amount = parse_amount(amount, STABLE_DECIMALS)?;

        let tx_hashes = self.execute(&run, &repay_plan(amount)).await?;

        let mut cleared = false;
        self.store.update(|s| {
            let remaining = s.position.debt.value().saturating_sub(amount);
            s.position.debt = Tracked::tentative(remaining);
            s.earnings.reset();
            if remaining.is_zero() {
                s.position.health_factor = None;
                s.position.earning = false;
                cleared = true;
            }
        });
        if cleared {
            self.estimator.stop();
        }
        self.reload_after(&run).await;

        Ok(run.report(amount, tx_hashes))
    }

    /// Repay all debt, withdraw all collateral and unwrap the vault shares
    pub async fn terminate(&self) -> Result<RunReport> {
        let run = self.begin(WorkflowKind::Terminate)?;
        self.require_session()?;
        let side = self.selected_vault()?;
        let vault = self.contracts.vault_address(side);

        let (debt, collateral) = tokio::try_join!(
            self.contracts.pool.debt_of(self.user),
            self.contracts.manager.collateral_amount(self.user, vault),
        )?;
        let steps = terminate_plan(side, debt, collateral)?;

        let tx_hashes = self.execute(&run, &steps).await?;

        self.store.update(|s| {
            s.position.clear();
            s.position.collateral = Tracked::tentative(U256::ZERO);
            s.position.debt = Tracked::tentative(U256::ZERO);
            s.earnings.reset();
        });
        self.estimator.stop();
        self.clock.stop();
        self.reload_after(&run).await;

        Ok(run.report(collateral, tx_hashes))
    }

    /// Take the gate without waiting
    fn exclusive(&self) -> std::result::Result<tokio::sync::MutexGuard<'_, ()>, ProtocolError> {
        self.gate.try_lock().map_err(|_| {
            let running = *lock(&self.active);
            ProtocolError::WorkflowBusy {
                running: running.map_or_else(|| "workflow".to_string(), |k| k.to_string()),
            }
        })
    }

    fn begin(&self, kind: WorkflowKind) -> std::result::Result<Run<'_>, ProtocolError> {
        let gate = self.exclusive()?;
        *lock(&self.active) = Some(kind);

        let cancel = CancelToken::new();
        *lock(&self.cancel) = cancel.clone();

        Ok(Run {
            _gate: gate,
            active: &self.active,
            id: Uuid::new_v4(),
            kind,
            confirm: ConfirmOptions::from_config(&self.config, cancel),
        })
    }

    fn require_session(&self) -> std::result::Result<(), ProtocolError> {
        if self.store.read(|s| s.is_connected()) {
            Ok(())
        } else {
            Err(ProtocolError::NotConnected)
        }
    }

    fn selected_vault(&self) -> std::result::Result<VaultSide, ProtocolError> {
        self.store
            .read(|s| s.position.selected_vault)
            .ok_or(ProtocolError::NoVaultSelected)
    }

    /// Submit and confirm each step in order
    async fn execute(&self, run: &Run<'_>, steps: &[Step]) -> Result<Vec<TxHash>> {
        let total_steps = steps.len();
        let publish = |phase: Phase| {
            self.progress.send_replace(WorkflowProgress {
                run_id: Some(run.id),
                kind: Some(run.kind),
                total_steps,
                phase,
            });
        };

        let mut tx_hashes = Vec::with_capacity(total_steps);
        for (i, step) in steps.iter().enumerate() {
            let n = i + 1;
            publish(Phase::StepPending {
                step: n,
                label: step.label(),
                tx_hash: None,
            });
            tracing::info!(
                run_id = %run.id,
                workflow = %run.kind,
                step = n,
                total_steps,
                action = step.label(),
                "Submitting step"
            );

            let outcome: Result<TxHash> = async {
                // An open signing prompt only ends with the user or a cancel
                let pending = tokio::select! {
                    submitted = self.submit(*step) => submitted?,
                    _ = run.confirm.cancel.cancelled() => {
                        tracing::warn!(
                            run_id = %run.id,
                            step = n,
                            "Stopped waiting for the wallet to sign"
                        );
                        return Err(accrue_core::Error::from(TxError::SigningAbandoned));
                    }
                };
                let tx_hash = pending.tx_hash();
                publish(Phase::StepPending {
                    step: n,
                    label: step.label(),
                    tx_hash: Some(tx_hash),
                });
                if let Some(url) = self.network.tx_url(&tx_hash) {
                    tracing::info!(tx_hash = %tx_hash, url = %url, "Transaction submitted");
                }
                pending.confirm(&run.confirm).await?;
                Ok(tx_hash)
            }
            .await;

            match outcome {
                Ok(tx_hash) => {
                    tracing::info!(tx_hash = %tx_hash, step = n, "Step confirmed");
                    publish(Phase::StepConfirmed { step: n, tx_hash });
                    tx_hashes.push(tx_hash);
                }
                Err(e) => {
                    tracing::warn!(
                        run_id = %run.id,
                        workflow = %run.kind,
                        step = n,
                        error = %e,
                        "Workflow aborted"
                    );
                    publish(Phase::Failed {
                        step: n,
                        error: e.user_message(),
                    });
                    return Err(e);
                }
            }
        }

        publish(Phase::Done);
        tracing::info!(run_id = %run.id, workflow = %run.kind, "Workflow complete");
        Ok(tx_hashes)
    }

    async fn submit(&self, step: Step) -> std::result::Result<PendingTx, ContractError> {
        let c = &self.contracts;
        match step {
            Step::ApproveOutcomeTokens { side } => {
                c.ctf
                    .set_approval_for_all(c.vault_address(side), true)
                    .await
            }
            Step::DepositToVault { side, amount } => c.vault(side).deposit(amount, self.user).await,
            Step::ApproveShares { side, amount } => {
                c.vault(side)
                    .approve(c.addresses.collateral_manager, amount)
                    .await
            }
            Step::DepositCollateral { side, amount } => {
                c.manager
                    .deposit_collateral(c.vault_address(side), amount)
                    .await
            }
            Step::Borrow { amount } => c.pool.borrow(amount).await,
            Step::ApproveRepayment { amount } => {
                c.token.approve(c.addresses.lending_pool, amount).await
            }
            Step::Repay { amount } => c.pool.repay(amount).await,
            Step::WithdrawCollateral { side, amount } => {
                c.manager
                    .withdraw_collateral(c.vault_address(side), amount)
                    .await
            }
            Step::WithdrawFromVault { side, amount } => {
                c.vault(side)
                    .withdraw(amount, self.user, self.user)
                    .await
            }
        }
    }

    fn record_borrow(&self, amount: U256, strategy: StrategyMode) {
        self.store.update(|s| {
            let debt = s.position.debt.value().saturating_add(amount);
            s.position.debt = Tracked::tentative(debt);
            s.position.deposit_timestamp = Some(unix_now());
            s.position.strategy = Some(strategy);
            s.position.earning = true;
            s.earnings.reset();
        });
        self.estimator.start();
        self.clock.start();
    }

    /// Reload after a confirmed run; a failure keeps the tentative values
    async fn reload_after(&self, run: &Run<'_>) {
        if let Err(e) = self.refresh().await {
            tracing::warn!(
                run_id = %run.id,
                workflow = %run.kind,
                error = %e,
                "Reload after confirmed workflow failed, keeping tentative values"
            );
        }
    }
}

impl Run<'_> {
    fn report(&self, amount: U256, tx_hashes: Vec<TxHash>) -> RunReport {
        RunReport {
            run_id: self.id,
            kind: self.kind,
            amount,
            tx_hashes,
        }
    }
}
