//! Accept loop and worker pool
//!
//! At most `max-sessions` control sessions run at once. A connection arriving
//! while the pool is full is told so and closed; nothing is queued.

use std::net::SocketAddr;
use std::sync::Arc;

use eyre::{Context, Result};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, watch};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use super::config::CoordinatorConfig;
use super::group::Group;
use super::metrics::{CoordinatorMetrics, Metrics};
use super::session::CommandSession;
use crate::protocol::{Reply, write_line};

/// Holds a pool slot for the lifetime of one session
struct SessionSlot {
    _permit: OwnedSemaphorePermit,
    metrics: Arc<Metrics>,
}

impl Drop for SessionSlot {
    fn drop(&mut self) {
        self.metrics.session_finished();
    }
}

pub struct Coordinator {
    listener: TcpListener,
    group: Arc<Group>,
    metrics: Arc<Metrics>,
    slots: Arc<Semaphore>,
    config: CoordinatorConfig,
}

impl Coordinator {
    /// Listen on all interfaces at the configured port
    pub async fn bind(config: CoordinatorConfig) -> Result<Self> {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
        Self::bind_to(config, addr).await
    }

    pub async fn bind_to(config: CoordinatorConfig, addr: SocketAddr) -> Result<Self> {
        debug!(%addr, max_sessions = config.max_sessions, "Coordinator::bind_to: called");
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind control listener on {}", addr))?;

        let metrics = Arc::new(Metrics::new());
        let group = Arc::new(Group::new(&config, metrics.clone()));
        Ok(Self {
            listener,
            group,
            metrics,
            slots: Arc::new(Semaphore::new(config.max_sessions)),
            config,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().context("Failed to read listener address")
    }

    pub fn group(&self) -> Arc<Group> {
        self.group.clone()
    }

    /// Serve until `shutdown` turns true, then drain and return final counters
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<CoordinatorMetrics> {
        debug!("Coordinator::run: called");
        info!(
            addr = ?self.listener.local_addr().ok(),
            threshold_secs = self.config.threshold_secs,
            "Coordinator listening"
        );
        let mut sessions: JoinSet<Result<()>> = JoinSet::new();

        loop {
            let accepted = tokio::select! {
                accepted = self.listener.accept() => accepted,
                Some(joined) = sessions.join_next() => {
                    log_session_exit(joined);
                    continue;
                }
                Ok(_) = shutdown.wait_for(|stop| *stop) => {
                    info!("Shutdown signal received");
                    break;
                }
            };

            match accepted {
                Ok((stream, peer)) => self.admit(stream, peer, &mut sessions, shutdown.clone()).await,
                Err(e) => warn!(error = %e, "Failed to accept control connection"),
            }
        }

        let Self { listener, group, config, .. } = self;
        drop(listener);

        let grace = config.shutdown_grace();
        info!(active = sessions.len(), ?grace, "Draining control sessions");
        let drained = tokio::time::timeout(grace, async {
            while let Some(joined) = sessions.join_next().await {
                log_session_exit(joined);
            }
        })
        .await;

        if drained.is_err() {
            warn!("Aborting {} control sessions after grace period", sessions.len());
            sessions.shutdown().await;
        } else {
            debug!("Coordinator::run: all sessions finished");
        }

        group.close_all_channels().await;
        let metrics = group.metrics();
        info!(?metrics, "Coordinator stopped");
        Ok(metrics)
    }

    async fn admit(
        &self,
        mut stream: TcpStream,
        peer: SocketAddr,
        sessions: &mut JoinSet<Result<()>>,
        shutdown: watch::Receiver<bool>,
    ) {
        debug!(%peer, "Coordinator::admit: called");
        let permit = match self.slots.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                self.metrics.session_rejected();
                warn!(%peer, "Worker pool full, rejecting participant");
                if let Err(e) = write_line(&mut stream, &Reply::ConnectionRejected.to_string()).await {
                    debug!(%peer, error = %e, "Coordinator::admit: rejection notice not sent");
                }
                let _ = stream.shutdown().await;
                return;
            }
        };

        if let Err(e) = write_line(&mut stream, &Reply::ConnectionAccepted.to_string()).await {
            debug!(%peer, error = %e, "Coordinator::admit: handshake failed");
            return;
        }

        self.metrics.session_accepted();
        info!(%peer, "Accepted control connection");
        let slot = SessionSlot {
            _permit: permit,
            metrics: self.metrics.clone(),
        };
        let session = CommandSession::new(stream, self.group.clone(), self.config.max_line_bytes, peer.to_string());
        sessions.spawn(async move {
            let _slot = slot;
            session.run(shutdown).await
        });
    }
}

fn log_session_exit(joined: Result<Result<()>, JoinError>) {
    match joined {
        Ok(Ok(())) => debug!("log_session_exit: session finished"),
        Ok(Err(e)) => warn!(error = %e, "Control session ended with error"),
        Err(e) if e.is_cancelled() => debug!("log_session_exit: session aborted"),
        Err(e) => error!(error = %e, "Control session panicked"),
    }
}
