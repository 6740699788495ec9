//! Delivery receiver
//!
//! Listens for the coordinator's delivery connection and appends every frame
//! it carries to the message log. The listener is bound before the port is
//! announced, so the coordinator's connect never races the bind.

use std::net::SocketAddr;
use std::path::PathBuf;

use eyre::{Context, Result};
use mcast::protocol::read_frame;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::log::MessageLog;

pub struct DeliveryReceiver {
    addr: SocketAddr,
    stop: watch::Sender<bool>,
    task: JoinHandle<Result<usize>>,
}

impl DeliveryReceiver {
    /// Listen on all interfaces at `port` (0 picks a free port)
    pub async fn bind(port: u16, log_path: PathBuf) -> Result<Self> {
        Self::bind_to(SocketAddr::from(([0, 0, 0, 0], port)), log_path).await
    }

    pub async fn bind_to(addr: SocketAddr, log_path: PathBuf) -> Result<Self> {
        debug!(%addr, ?log_path, "DeliveryReceiver::bind_to: called");
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to listen for deliveries on {}", addr))?;
        let addr = listener.local_addr().context("Failed to read delivery address")?;
        let log = MessageLog::open(&log_path).await?;

        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(receive(listener, log, stop_rx));
        Ok(Self { addr, stop, task })
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// True once the coordinator closed the channel or it failed
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel and wait; returns how many messages were logged
    pub async fn stop(self) -> Result<usize> {
        debug!(port = self.addr.port(), "DeliveryReceiver::stop: called");
        let _ = self.stop.send(true);
        self.task.await.context("Delivery receiver task failed")?
    }
}

async fn receive(listener: TcpListener, mut log: MessageLog, mut stop: watch::Receiver<bool>) -> Result<usize> {
    let (mut stream, peer) = tokio::select! {
        accepted = listener.accept() => accepted.context("Failed to accept delivery connection")?,
        Ok(_) = stop.wait_for(|s| *s) => {
            debug!("receive: stopped before coordinator connected");
            return Ok(0);
        }
    };
    drop(listener);
    info!(%peer, "Delivery channel open");

    let mut received = 0;
    loop {
        let frame = tokio::select! {
            frame = read_frame(&mut stream) => frame,
            Ok(_) = stop.wait_for(|s| *s) => {
                debug!("receive: stopped");
                break;
            }
        };

        match frame {
            Ok(Some(payload)) => {
                log.append(&payload).await?;
                received += 1;
                debug!(received, "receive: logged message");
            }
            Ok(None) => {
                debug!("receive: coordinator closed delivery channel");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Delivery channel failed");
                break;
            }
        }
    }

    info!(received, path = %log.path().display(), "Delivery channel closed");
    Ok(received)
}
