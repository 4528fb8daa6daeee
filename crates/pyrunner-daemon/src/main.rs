//! pyrunnerd - executes Python submissions for graders over a Unix socket
//!
//! Submissions run one at a time (by default) through a shared admission
//! gate, each in a throwaway working directory under a restricted user.

use anyhow::Result;
use futures::StreamExt;
use pyrunner_core::{GatedExecutor, SandboxExecutor};
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use tokio::net::UnixListener;
use tracing_subscriber::EnvFilter;

mod config;
mod server;

use config::DaemonConfig;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("pyrunner=info".parse()?))
        .init();

    tracing::info!("pyrunnerd starting");

    let config = DaemonConfig::load()?;
    tracing::info!(
        capacity = config.gate_capacity,
        socket = ?config.socket_path,
        timeout_secs = config.sandbox.timeout.as_secs(),
        "configuration loaded"
    );

    let executor = SandboxExecutor::new(config.sandbox.clone())?;
    let executor = GatedExecutor::new(executor, config.gate_capacity);

    if let Some(parent) = config.socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // stale socket from a previous run
    let _ = std::fs::remove_file(&config.socket_path);

    let listener = UnixListener::bind(&config.socket_path)?;
    tracing::info!(socket = ?config.socket_path, "listening");

    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    let signals_handle = signals.handle();
    let shutdown = async move {
        if let Some(signal) = signals.next().await {
            tracing::info!(signal, "received signal");
        }
    };

    let served = server::run(listener, executor, shutdown).await;

    signals_handle.close();
    if let Err(e) = std::fs::remove_file(&config.socket_path) {
        tracing::warn!(error = %e, socket = ?config.socket_path, "failed to remove socket");
    }

    served?;
    tracing::info!("pyrunnerd stopped");
    Ok(())
}
