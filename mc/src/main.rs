use clap::Parser;
use eyre::{Context, Result};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use mcast::cli::Cli;
use mcast::config::{Bootstrap, Config};
use mcast::coordinator::Coordinator;
use mcast::logging::{resolve_level, setup_logging};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Config::load(cli.settings.as_ref())?;
    let level = resolve_level(cli.log_level.as_deref(), settings.log_level.as_deref());
    setup_logging(level, settings.log_file.as_deref()).context("Failed to setup logging")?;

    let bootstrap = Bootstrap::load(&cli.config)
        .with_context(|| format!("Failed to load coordinator config from {}", cli.config.display()))?;
    let config = settings.with_bootstrap(bootstrap);
    debug!(?config, "main: configuration loaded");

    let coordinator = Coordinator::bind(config.coordinator).await?;
    info!(addr = %coordinator.local_addr()?, "Waiting for participants to connect");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server = tokio::spawn(coordinator.run(shutdown_rx));

    wait_for_signal().await?;
    info!("Coordinator shutting down...");
    let _ = shutdown_tx.send(true);

    let metrics = server.await.context("Coordinator task failed")??;
    info!(
        accepted = metrics.sessions_accepted,
        rejected = metrics.sessions_rejected,
        messages = metrics.messages_received,
        "Coordinator exited"
    );
    Ok(())
}

async fn wait_for_signal() -> Result<()> {
    debug!("wait_for_signal: called");
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = sigint.recv() => warn!("SIGINT received"),
            _ = sigterm.recv() => warn!("SIGTERM received"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        warn!("Ctrl-C received");
    }

    Ok(())
}
