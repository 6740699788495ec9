//! Fan-out and replay
//!
//! `msend` walks a snapshot of the registry: ONLINE participants get the
//! payload pushed, OFFLINE ones get it buffered. A failed push forces that
//! participant OFFLINE and the walk carries on with the next one.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::metrics::Metrics;
use super::registry::{BufferedMessage, ParticipantRecord, ParticipantRegistry, ParticipantStatus};
use crate::protocol::ParticipantId;

/// Outcome of one fan-out pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanoutReport {
    pub delivered: usize,
    pub buffered: usize,
    /// Participants whose push failed; they are OFFLINE now
    pub failed: Vec<ParticipantId>,
}

/// Outcome of replaying a pending queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub delivered: usize,
    pub expired: usize,
    /// Entries lost because the new channel broke mid-replay
    pub failed: usize,
}

#[derive(Debug)]
pub struct Dispatcher {
    registry: Arc<ParticipantRegistry>,
    threshold: Duration,
    delivery_timeout: Duration,
    metrics: Arc<Metrics>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<ParticipantRegistry>,
        threshold: Duration,
        delivery_timeout: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        debug!(?threshold, ?delivery_timeout, "Dispatcher::new: called");
        Self {
            registry,
            threshold,
            delivery_timeout,
            metrics,
        }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Fan `payload` out to every participant in the group
    pub async fn msend(&self, payload: &str) -> FanoutReport {
        self.msend_at(payload, Instant::now()).await
    }

    /// Fan out with an explicit enqueue time for OFFLINE participants
    pub async fn msend_at(&self, payload: &str, now: Instant) -> FanoutReport {
        debug!(len = payload.len(), "Dispatcher::msend_at: called");
        let payload: Arc<str> = Arc::from(payload);
        let mut report = FanoutReport::default();

        for (id, handle) in self.registry.snapshot() {
            let mut record = handle.lock().await;
            // Deregistered (or replaced) since the snapshot was taken
            if !self.registry.is_current(id, &handle) {
                debug!(participant_id = %id, "Dispatcher::msend_at: skipping stale record");
                continue;
            }

            match record.status() {
                ParticipantStatus::Online => match record.push(&payload, self.delivery_timeout).await {
                    Ok(()) => report.delivered += 1,
                    Err(e) => {
                        warn!(participant_id = %id, error = %e, "Push failed, marking participant offline");
                        drop(record.detach());
                        self.metrics.add_delivery_failures(1);
                        self.metrics.forced_offline();
                        report.failed.push(id);
                    }
                },
                ParticipantStatus::Offline => {
                    record.enqueue(payload.clone(), now);
                    report.buffered += 1;
                }
                ParticipantStatus::NotMember => {}
            }
        }

        self.metrics.add_delivered(report.delivered as u64);
        self.metrics.add_buffered(report.buffered as u64);
        debug!(
            delivered = report.delivered,
            buffered = report.buffered,
            failed = report.failed.len(),
            "Dispatcher::msend_at: done"
        );
        report
    }

    /// Push every entry of `backlog` no older than the threshold, oldest first
    ///
    /// Expired entries are discarded. If a push fails the record is detached
    /// and the rest of the backlog is dropped.
    pub async fn replay(
        &self,
        record: &mut ParticipantRecord,
        backlog: VecDeque<BufferedMessage>,
        now: Instant,
    ) -> ReplayReport {
        let id = record.id();
        debug!(participant_id = %id, pending = backlog.len(), "Dispatcher::replay: called");
        let mut report = ReplayReport::default();
        let mut backlog = backlog.into_iter();

        while let Some(message) = backlog.next() {
            let age = message.age(now);
            if age > self.threshold {
                info!(participant_id = %id, ?age, threshold = ?self.threshold, "Discarding expired message");
                report.expired += 1;
                continue;
            }

            if let Err(e) = record.push(&message.payload, self.delivery_timeout).await {
                report.failed = 1 + backlog.len();
                warn!(
                    participant_id = %id,
                    error = %e,
                    lost = report.failed,
                    "Replay push failed, marking participant offline"
                );
                drop(record.detach());
                self.metrics.forced_offline();
                break;
            }
            report.delivered += 1;
        }

        self.metrics.add_replayed(report.delivered as u64);
        self.metrics.add_expired(report.expired as u64);
        self.metrics.add_delivery_failures(report.failed as u64);
        info!(
            participant_id = %id,
            delivered = report.delivered,
            expired = report.expired,
            failed = report.failed,
            "Replay finished"
        );
        report
    }
}
