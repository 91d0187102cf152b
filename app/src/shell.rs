//! Application shell
//!
//! One dispatch loop owns the session. It consumes user commands from an mpsc
//! channel and wallet notifications from the provider's broadcast, and
//! reports every outcome as a `Notification`. Workflows run on spawned tasks
//! so wallet events keep flowing while a confirmation is pending.

use std::future::Future;
use std::sync::Arc;

use accrue_contracts::ContractSet;
use accrue_core::{short_address, Address, AppConfig, Error, ProtocolError, Result, VaultSide, WalletError};
use ctf_lending::{
    AppStateRecord, AppStore, Orchestrator, RunReport, Session, WorkflowKind, WorkflowProgress,
};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use wallet_client::{Eip1193Provider, ProviderEvent, WalletClient};

use crate::notifications::Notification;
use crate::view::ViewModel;

const COMMAND_BUFFER: usize = 32;
const NOTIFICATION_BUFFER: usize = 64;

/// User intents sent by the renderer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Connect,
    Disconnect,
    SelectVault(VaultSide),
    Lock { amount: String },
    Borrow { amount: String },
    EnableManagedStrategy,
    Repay { amount: String },
    Terminate,
    Reload,
    /// Stop waiting on the running workflow's confirmation
    CancelWait,
}

/// Builds the contract proxies for a connected account
pub type ContractsFactory = Arc<dyn Fn(&WalletClient, Address) -> ContractSet + Send + Sync>;

struct Completion {
    session: u64,
    kind: WorkflowKind,
    result: Result<RunReport>,
}

/// Renderer-side handle to a running shell
#[derive(Clone)]
pub struct ShellHandle {
    commands: mpsc::Sender<Command>,
    store: AppStore,
    notifications: broadcast::Sender<Notification>,
    progress: Arc<watch::Sender<WorkflowProgress>>,
}

impl ShellHandle {
    /// Queue a command; false once the shell has stopped
    pub async fn send(&self, command: Command) -> bool {
        self.commands.send(command).await.is_ok()
    }

    pub fn state(&self) -> watch::Receiver<AppStateRecord> {
        self.store.subscribe()
    }

    pub fn view(&self) -> ViewModel {
        self.store.read(ViewModel::from_state)
    }

    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    /// Step progress of the latest workflow in any session
    pub fn progress(&self) -> watch::Receiver<WorkflowProgress> {
        self.progress.subscribe()
    }
}

pub struct Shell {
    config: AppConfig,
    wallet: Option<WalletClient>,
    events: Option<broadcast::Receiver<ProviderEvent>>,
    contracts: ContractsFactory,
    store: AppStore,
    orchestrator: Option<Arc<Orchestrator>>,
    session: u64,
    commands: mpsc::Receiver<Command>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions: mpsc::UnboundedReceiver<Completion>,
    connects_tx: mpsc::UnboundedSender<(u64, Result<Address>)>,
    connects: mpsc::UnboundedReceiver<(u64, Result<Address>)>,
    /// Id of the connect attempt waiting on wallet prompts
    connecting: Option<u64>,
    attempts: u64,
    notifications: broadcast::Sender<Notification>,
    progress: Arc<watch::Sender<WorkflowProgress>>,
}

async fn next_event(
    events: &mut Option<broadcast::Receiver<ProviderEvent>>,
) -> std::result::Result<ProviderEvent, RecvError> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

impl Shell {
    /// Shell talking to the deployed contracts through the wallet
    pub fn new(
        config: AppConfig,
        provider: Option<Arc<dyn Eip1193Provider>>,
    ) -> (Self, ShellHandle) {
        let addresses = config.contracts.clone();
        let contracts: ContractsFactory =
            Arc::new(move |wallet, from| ContractSet::rpc(wallet, from, addresses.clone()));
        Self::with_contracts(config, provider, contracts)
    }

    pub fn with_contracts(
        config: AppConfig,
        provider: Option<Arc<dyn Eip1193Provider>>,
        contracts: ContractsFactory,
    ) -> (Self, ShellHandle) {
        let wallet = match WalletClient::from_injected(provider, &config.workflow) {
            Ok(wallet) => Some(wallet),
            Err(e) => {
                tracing::warn!(error = %e, "Starting without a wallet provider");
                None
            }
        };
        let events = wallet.as_ref().map(WalletClient::subscribe);

        let (commands_tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let (completions_tx, completions) = mpsc::unbounded_channel();
        let (connects_tx, connects) = mpsc::unbounded_channel();
        let (notifications, _) = broadcast::channel(NOTIFICATION_BUFFER);
        let (progress, _) = watch::channel(WorkflowProgress::default());
        let progress = Arc::new(progress);
        let store = AppStore::new();

        let handle = ShellHandle {
            commands: commands_tx,
            store: store.clone(),
            notifications: notifications.clone(),
            progress: progress.clone(),
        };
        let shell = Self {
            config,
            wallet,
            events,
            contracts,
            store,
            orchestrator: None,
            session: 0,
            commands,
            completions_tx,
            completions,
            connects_tx,
            connects,
            connecting: None,
            attempts: 0,
            notifications,
            progress,
        };
        (shell, handle)
    }

    /// Run until every `ShellHandle` is dropped
    pub async fn run(mut self) {
        tracing::info!("Shell dispatch loop started");
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.dispatch(command).await,
                    None => break,
                },
                Some(done) = self.completions.recv() => self.complete(done),
                Some((attempt, result)) = self.connects.recv() => {
                    self.finish_connect(attempt, result).await
                }
                event = next_event(&mut self.events) => match event {
                    Ok(event) => self.on_provider_event(event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Missed wallet notifications");
                    }
                    Err(RecvError::Closed) => {
                        tracing::warn!("Wallet notification stream closed");
                        self.events = None;
                    }
                },
            }
        }
        self.end_session();
        tracing::info!("Shell dispatch loop stopped");
    }

    async fn dispatch(&mut self, command: Command) {
        tracing::debug!(?command, "Dispatching command");
        match command {
            Command::Connect => self.connect(),
            Command::Disconnect => {
                if self.connecting.take().is_some() {
                    tracing::info!("Dropping the pending connect attempt");
                }
                if self.orchestrator.is_some() {
                    self.end_session();
                    self.notify(Notification::success("Wallet disconnected"));
                }
            }
            Command::SelectVault(side) => {
                let result = match self.current() {
                    Ok(orchestrator) => orchestrator.select_vault(side).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = result {
                    self.notify_error(&e);
                }
            }
            Command::Reload => {
                let result = match self.current() {
                    Ok(orchestrator) => orchestrator.reload().await,
                    Err(e) => Err(e),
                };
                if let Err(e) = result {
                    self.notify_error(&e);
                }
            }
            Command::CancelWait => {
                if let Some(orchestrator) = &self.orchestrator {
                    orchestrator.cancel();
                }
            }
            Command::Lock { amount } => self.spawn_workflow(WorkflowKind::Lock, |o| async move {
                o.lock(&amount).await
            }),
            Command::Borrow { amount } => {
                self.spawn_workflow(WorkflowKind::Borrow, |o| async move {
                    o.borrow(&amount).await
                })
            }
            Command::EnableManagedStrategy => self
                .spawn_workflow(WorkflowKind::EnableManagedStrategy, |o| async move {
                    o.enable_managed_strategy().await
                }),
            Command::Repay { amount } => self.spawn_workflow(WorkflowKind::Repay, |o| async move {
                o.repay(&amount).await
            }),
            Command::Terminate => self.spawn_workflow(WorkflowKind::Terminate, |o| async move {
                o.terminate().await
            }),
        }
    }

    fn current(&self) -> Result<Arc<Orchestrator>> {
        self.orchestrator
            .clone()
            .ok_or_else(|| ProtocolError::NotConnected.into())
    }

    fn spawn_workflow<F, Fut>(&self, kind: WorkflowKind, run: F)
    where
        F: FnOnce(Arc<Orchestrator>) -> Fut,
        Fut: Future<Output = Result<RunReport>> + Send + 'static,
    {
        let orchestrator = match self.current() {
            Ok(orchestrator) => orchestrator,
            Err(e) => return self.notify_error(&e),
        };
        let done = self.completions_tx.clone();
        let session = self.session;
        let task = run(orchestrator);
        tokio::spawn(async move {
            let result = task.await;
            let _ = done.send(Completion {
                session,
                kind,
                result,
            });
        });
    }

    fn complete(&self, done: Completion) {
        if done.session != self.session {
            tracing::debug!(workflow = %done.kind, "Ignoring result from a closed session");
            return;
        }
        match done.result {
            Ok(report) => self.notify(Notification::workflow_done(&report, &self.config.network)),
            Err(e) => {
                tracing::warn!(workflow = %done.kind, error = %e, "Workflow failed");
                self.notify_error(&e);
            }
        }
    }

    /// Request account access and the right network on a task, since the
    /// wallet prompts stay open for as long as the user takes
    fn connect(&mut self) {
        let Some(wallet) = self.wallet.clone() else {
            return self.notify_error(&WalletError::NoWallet.into());
        };
        if self.connecting.is_some() {
            let busy = ProtocolError::WorkflowBusy {
                running: "connect".to_string(),
            };
            return self.notify_error(&busy.into());
        }
        self.attempts += 1;
        let attempt = self.attempts;
        self.connecting = Some(attempt);

        let network = self.config.network.clone();
        let done = self.connects_tx.clone();
        tokio::spawn(async move {
            let result: Result<Address> = async {
                let accounts = wallet.request_accounts().await?;
                let account = accounts.first().copied().ok_or(WalletError::NoAccounts)?;
                wallet.ensure_network(&network).await?;
                Ok(account)
            }
            .await;
            let _ = done.send((attempt, result));
        });
    }

    async fn finish_connect(&mut self, attempt: u64, result: Result<Address>) {
        if self.connecting != Some(attempt) {
            tracing::debug!(attempt, "Ignoring a connect attempt that was dropped");
            return;
        }
        self.connecting = None;
        let Some(wallet) = self.wallet.clone() else {
            return;
        };

        match result {
            Ok(account) => {
                self.start_session(&wallet, account).await;
                self.notify(Notification::success("Wallet connected"));
            }
            Err(e) => {
                tracing::warn!(error = %e, "Wallet connection failed");
                self.notify_error(&e);
            }
        }
    }

    /// Replace any current session with one for `address` and load it
    async fn start_session(&mut self, wallet: &WalletClient, address: Address) {
        self.end_session();
        self.store.begin_session(Session {
            address,
            chain_id: self.config.network.chain_id,
        });

        let contracts = (self.contracts)(wallet, address);
        let orchestrator = Arc::new(Orchestrator::new(
            contracts,
            address,
            self.store.clone(),
            &self.config,
        ));
        self.forward_progress(&orchestrator);
        self.orchestrator = Some(orchestrator.clone());
        tracing::info!(account = %address, session = self.session, "Session started");

        if let Err(e) = orchestrator.reload().await {
            tracing::warn!(account = %address, error = %e, "Initial chain load failed");
            self.notify(Notification::warning(format!(
                "Could not load your position: {}",
                e.user_message()
            )));
        }
    }

    fn end_session(&mut self) {
        self.session += 1;
        if let Some(orchestrator) = self.orchestrator.take() {
            orchestrator.shutdown();
            tracing::info!(account = %orchestrator.user(), "Session ended");
        }
        self.store.reset();
    }

    /// Mirror one orchestrator's progress into the shell-wide channel
    fn forward_progress(&self, orchestrator: &Orchestrator) {
        let mut rx = orchestrator.progress();
        let progress = self.progress.clone();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let latest = rx.borrow_and_update().clone();
                progress.send_replace(latest);
            }
        });
    }

    async fn on_provider_event(&mut self, event: ProviderEvent) {
        tracing::debug!(?event, "Wallet notification");
        match event {
            ProviderEvent::AccountsChanged(accounts) => {
                let current = self.orchestrator.as_ref().map(|o| o.user());
                match (accounts.first().copied(), current) {
                    (None, Some(_)) => {
                        self.end_session();
                        self.notify(Notification::warning("Wallet disconnected"));
                    }
                    (Some(next), Some(previous)) if next != previous => {
                        let Some(wallet) = self.wallet.clone() else {
                            return;
                        };
                        self.start_session(&wallet, next).await;
                        self.notify(Notification::warning(format!(
                            "Switched to account {}",
                            short_address(&next)
                        )));
                    }
                    _ => {}
                }
            }
            ProviderEvent::ChainChanged(chain_id) => {
                if self.orchestrator.is_some() {
                    tracing::warn!(chain_id, "Wallet network changed, resetting session");
                    self.end_session();
                    self.notify(Notification::warning(
                        "Network changed, please reconnect your wallet",
                    ));
                }
            }
        }
    }

    fn notify(&self, notification: Notification) {
        tracing::debug!(
            severity = ?notification.severity,
            message = %notification.message,
            "Notification"
        );
        // No subscribers is fine
        let _ = self.notifications.send(notification);
    }

    fn notify_error(&self, error: &Error) {
        self.notify(Notification::from_error(error));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::Severity;
    use accrue_core::constants::POSITION_ID_YES;
    use accrue_core::units::pow10;
    use accrue_core::U256;
    use ctf_lending::testing::{Fault, FakeChain};
    use ctf_lending::Phase;
    use serde_json::json;
    use std::time::Duration;
    use wallet_client::mock::ScriptedProvider;
    use wallet_client::RpcError;

    fn provider_for(chain: &FakeChain) -> Arc<ScriptedProvider> {
        let provider = Arc::new(ScriptedProvider::new());
        provider.respond("eth_requestAccounts", json!([chain.user()]));
        provider.respond("eth_chainId", json!("0x13882"));
        provider
    }

    fn start(chain: &Arc<FakeChain>, provider: Option<Arc<ScriptedProvider>>) -> ShellHandle {
        let fake = chain.clone();
        let contracts: ContractsFactory = Arc::new(move |_, _| fake.contracts());
        let provider = provider.map(|p| p as Arc<dyn Eip1193Provider>);
        let (shell, handle) = Shell::with_contracts(AppConfig::default(), provider, contracts);
        tokio::spawn(shell.run());
        handle
    }

    async fn next(rx: &mut broadcast::Receiver<Notification>) -> Notification {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("notification in time")
            .expect("channel open")
    }

    async fn connected(chain: &Arc<FakeChain>) -> (ShellHandle, Arc<ScriptedProvider>) {
        let provider = provider_for(chain);
        let handle = start(chain, Some(provider.clone()));
        let mut notes = handle.notifications();
        handle.send(Command::Connect).await;
        assert_eq!(next(&mut notes).await.severity, Severity::Success);
        (handle, provider)
    }

    #[tokio::test]
    async fn test_connect_loads_position() {
        let chain = FakeChain::new();
        chain.set_outcome_balance(POSITION_ID_YES, U256::from(7u64) * pow10(18));

        let (handle, _provider) = connected(&chain).await;
        let state = handle.state().borrow().clone();
        assert_eq!(state.session.map(|s| s.address), Some(chain.user()));
        assert_eq!(state.session.map(|s| s.chain_id), Some(80002));
        assert_eq!(state.wallet_balance.value(), U256::from(7u64) * pow10(18));
        assert_eq!(handle.view().health.text, "∞");
    }

    #[tokio::test]
    async fn test_connect_without_wallet() {
        let chain = FakeChain::new();
        let handle = start(&chain, None);
        let mut notes = handle.notifications();

        handle.send(Command::Connect).await;
        let n = next(&mut notes).await;
        assert_eq!(n.severity, Severity::Error);
        assert_eq!(n.code, Some("no_wallet"));
        assert!(!handle.view().connected);
    }

    #[tokio::test]
    async fn test_rejected_network_switch() {
        let chain = FakeChain::new();
        let provider = Arc::new(ScriptedProvider::new());
        provider.respond("eth_requestAccounts", json!([chain.user()]));
        provider.respond("eth_chainId", json!("0x1"));
        provider.fail(
            "wallet_switchEthereumChain",
            RpcError::new(4001, "User rejected the request."),
        );
        let handle = start(&chain, Some(provider));
        let mut notes = handle.notifications();

        handle.send(Command::Connect).await;
        let n = next(&mut notes).await;
        assert_eq!(n.severity, Severity::Warning);
        assert_eq!(n.code, Some("user_rejected"));
        assert!(!handle.view().connected);
    }

    #[tokio::test]
    async fn test_workflow_before_connect() {
        let chain = FakeChain::new();
        let handle = start(&chain, Some(provider_for(&chain)));
        let mut notes = handle.notifications();

        handle
            .send(Command::Lock {
                amount: "1".into(),
            })
            .await;
        let n = next(&mut notes).await;
        assert_eq!(n.severity, Severity::Error);
        assert_eq!(n.message, "Protocol error: Wallet not connected");
        assert!(chain.sent().is_empty());
    }

    #[tokio::test]
    async fn test_lock_through_shell() {
        let chain = FakeChain::new();
        chain.set_outcome_balance(POSITION_ID_YES, U256::from(10u64) * pow10(18));
        let (handle, _provider) = connected(&chain).await;
        let mut notes = handle.notifications();

        handle.send(Command::SelectVault(VaultSide::Yes)).await;
        handle
            .send(Command::Lock {
                amount: "5".into(),
            })
            .await;

        let n = next(&mut notes).await;
        assert_eq!(n.severity, Severity::Success);
        assert_eq!(n.message, "Locked 5.00 shares as collateral");
        assert!(n.link.is_some());

        let view = handle.view();
        assert_eq!(view.collateral, "5.00");
        assert_eq!(view.lock_max, "5");

        let mut progress = handle.progress();
        tokio::time::timeout(
            Duration::from_secs(5),
            progress.wait_for(|p| p.phase == Phase::Done),
        )
        .await
        .expect("progress forwarded")
        .expect("progress channel open");
    }

    #[tokio::test]
    async fn test_second_workflow_is_busy_then_cancel() {
        let chain = FakeChain::new();
        chain.inject("pool.borrow", Fault::NeverMine);
        let (handle, _provider) = connected(&chain).await;
        let mut notes = handle.notifications();

        handle
            .send(Command::Borrow {
                amount: "10".into(),
            })
            .await;
        handle
            .send(Command::Borrow {
                amount: "5".into(),
            })
            .await;

        let n = next(&mut notes).await;
        assert_eq!(n.code, Some("busy"));
        assert_eq!(n.severity, Severity::Warning);

        handle.send(Command::CancelWait).await;
        let n = next(&mut notes).await;
        assert_eq!(n.code, Some("cancelled"));
        assert_eq!(n.severity, Severity::Warning);
        assert_eq!(chain.sent(), vec!["pool.borrow"]);
    }

    #[tokio::test]
    async fn test_account_change_replaces_session() {
        let chain = FakeChain::new();
        let (handle, provider) = connected(&chain).await;
        let mut notes = handle.notifications();

        let other = Address::repeat_byte(0x77);
        provider.emit(ProviderEvent::AccountsChanged(vec![other]));
        let n = next(&mut notes).await;
        assert!(n.message.starts_with("Switched to account"));
        assert_eq!(
            handle.state().borrow().session.map(|s| s.address),
            Some(other)
        );

        provider.emit(ProviderEvent::AccountsChanged(vec![]));
        let n = next(&mut notes).await;
        assert_eq!(n.message, "Wallet disconnected");
        assert!(!handle.view().connected);
    }

    /// Borrow so the earnings and elapsed tickers are writing to the store
    async fn earning(chain: &Arc<FakeChain>) -> (ShellHandle, Arc<ScriptedProvider>) {
        let (handle, provider) = connected(chain).await;
        let mut notes = handle.notifications();
        handle
            .send(Command::Borrow {
                amount: "10".into(),
            })
            .await;
        assert_eq!(next(&mut notes).await.severity, Severity::Success);

        let mut state = handle.state();
        state.mark_unchanged();
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert!(state.has_changed().unwrap(), "tickers should be running");
        (handle, provider)
    }

    /// No ticker writes to the store once the session is gone
    async fn assert_tickers_stopped(handle: &ShellHandle) {
        let mut state = handle.state();
        state.mark_unchanged();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!state.has_changed().unwrap());
        assert_eq!(*state.borrow(), AppStateRecord::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_chain_change_resets_everything() {
        let chain = FakeChain::new();
        chain.set_outcome_balance(POSITION_ID_YES, U256::from(3u64) * pow10(18));
        let (handle, provider) = earning(&chain).await;
        let mut notes = handle.notifications();

        provider.emit(ProviderEvent::ChainChanged(1));
        let n = next(&mut notes).await;
        assert_eq!(n.severity, Severity::Warning);

        assert_tickers_stopped(&handle).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_stops_tickers() {
        let chain = FakeChain::new();
        let (handle, _provider) = earning(&chain).await;
        let mut notes = handle.notifications();

        handle.send(Command::Disconnect).await;
        assert_eq!(next(&mut notes).await.message, "Wallet disconnected");

        assert_tickers_stopped(&handle).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_account_prompt_keeps_shell_responsive() {
        let chain = FakeChain::new();
        let provider = Arc::new(ScriptedProvider::new());
        provider.hang("eth_requestAccounts");
        let handle = start(&chain, Some(provider));
        let mut notes = handle.notifications();

        handle.send(Command::Connect).await;
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(notes.try_recv().is_err(), "connect gave up on the open prompt");

        handle.send(Command::Connect).await;
        let n = next(&mut notes).await;
        assert_eq!(n.code, Some("busy"));

        handle.send(Command::SelectVault(VaultSide::Yes)).await;
        let n = next(&mut notes).await;
        assert_eq!(n.message, "Protocol error: Wallet not connected");
    }
}
