//! Coordinator counters
//!
//! Updated from every session task without locking; read as a
//! [`CoordinatorMetrics`] snapshot.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

/// Live counters shared by the accept loop, sessions and the dispatcher
#[derive(Debug, Default)]
pub struct Metrics {
    sessions_accepted: AtomicU64,
    sessions_rejected: AtomicU64,
    active_sessions: AtomicUsize,
    registered_participants: AtomicUsize,
    messages_received: AtomicU64,
    pushes_delivered: AtomicU64,
    messages_buffered: AtomicU64,
    replayed: AtomicU64,
    expired_discarded: AtomicU64,
    delivery_failures: AtomicU64,
    forced_offline: AtomicU64,
}

/// Point-in-time copy of [`Metrics`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorMetrics {
    pub sessions_accepted: u64,
    pub sessions_rejected: u64,
    pub active_sessions: usize,
    pub registered_participants: usize,
    /// Accepted `msend` commands
    pub messages_received: u64,
    /// Payloads pushed during fan-out
    pub pushes_delivered: u64,
    pub messages_buffered: u64,
    /// Payloads pushed during reconnect replay
    pub replayed: u64,
    pub expired_discarded: u64,
    pub delivery_failures: u64,
    pub forced_offline: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_accepted(&self) {
        self.sessions_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_finished(&self) {
        self.active_sessions.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn session_rejected(&self) {
        self.sessions_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_registered(&self, count: usize) {
        self.registered_participants.store(count, Ordering::Relaxed);
    }

    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_delivered(&self, n: u64) {
        self.pushes_delivered.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_buffered(&self, n: u64) {
        self.messages_buffered.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_replayed(&self, n: u64) {
        self.replayed.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_expired(&self, n: u64) {
        self.expired_discarded.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_delivery_failures(&self, n: u64) {
        self.delivery_failures.fetch_add(n, Ordering::Relaxed);
    }

    pub fn forced_offline(&self) {
        self.forced_offline.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CoordinatorMetrics {
        CoordinatorMetrics {
            sessions_accepted: self.sessions_accepted.load(Ordering::Relaxed),
            sessions_rejected: self.sessions_rejected.load(Ordering::Relaxed),
            active_sessions: self.active_sessions.load(Ordering::Relaxed),
            registered_participants: self.registered_participants.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            pushes_delivered: self.pushes_delivered.load(Ordering::Relaxed),
            messages_buffered: self.messages_buffered.load(Ordering::Relaxed),
            replayed: self.replayed.load(Ordering::Relaxed),
            expired_discarded: self.expired_discarded.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
            forced_offline: self.forced_offline.load(Ordering::Relaxed),
        }
    }
}
