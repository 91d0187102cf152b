//! Accrue application library

pub mod notifications;
pub mod shell;
pub mod view;

use std::sync::Arc;

use accrue_core::AppConfig;
use wallet_client::Eip1193Provider;

pub use notifications::{Notification, Severity};
pub use shell::{Command, Shell, ShellHandle};
pub use view::ViewModel;

const DEFAULT_LOG_FILTER: &str = "accrue=debug,ctf_lending=debug,wallet_client=debug,info";

/// Install the global subscriber; `RUST_LOG` overrides the default filter
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));
    // A host that already installed a subscriber keeps it
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Start the application on the current tokio runtime
pub fn run(provider: Option<Arc<dyn Eip1193Provider>>) -> ShellHandle {
    init_tracing();
    tracing::info!("Starting Accrue application");

    let (shell, handle) = Shell::new(AppConfig::default(), provider);
    tokio::spawn(shell.run());
    handle
}
