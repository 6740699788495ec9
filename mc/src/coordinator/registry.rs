//! Participant registry
//!
//! Membership map from id to record. The map itself sits behind a short-lived
//! structural lock; each record has its own async mutex so a slow push to one
//! participant never blocks lookups or pushes for another.
//!
//! A record's status is derived from whether it holds a delivery channel, so
//! "ONLINE iff channel present" cannot be violated. An id with no entry is a
//! non-member.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::debug;

use super::delivery::{DeliveryChannel, DeliveryError};
use crate::protocol::{Endpoint, ParticipantId};

/// Shared handle to one record
pub type RecordHandle = Arc<Mutex<ParticipantRecord>>;

/// Membership status as seen by the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantStatus {
    Online,
    Offline,
    NotMember,
}

/// A payload waiting for an OFFLINE participant
#[derive(Debug, Clone)]
pub struct BufferedMessage {
    pub payload: Arc<str>,
    pub enqueued_at: Instant,
}

impl BufferedMessage {
    pub fn new(payload: Arc<str>, enqueued_at: Instant) -> Self {
        Self { payload, enqueued_at }
    }

    /// Age at `now`; zero if `now` precedes the enqueue time
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.enqueued_at)
    }
}

/// Per-participant state
#[derive(Debug)]
pub struct ParticipantRecord {
    id: ParticipantId,
    endpoint: Endpoint,
    channel: Option<DeliveryChannel>,
    pending: VecDeque<BufferedMessage>,
}

impl ParticipantRecord {
    /// A freshly registered, ONLINE participant
    pub fn online(id: ParticipantId, endpoint: Endpoint, channel: DeliveryChannel) -> Self {
        Self {
            id,
            endpoint,
            channel: Some(channel),
            pending: VecDeque::new(),
        }
    }

    pub fn id(&self) -> ParticipantId {
        self.id
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn status(&self) -> ParticipantStatus {
        if self.channel.is_some() {
            ParticipantStatus::Online
        } else {
            ParticipantStatus::Offline
        }
    }

    pub fn is_online(&self) -> bool {
        self.channel.is_some()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Append to the pending queue
    pub fn enqueue(&mut self, payload: Arc<str>, now: Instant) {
        self.pending.push_back(BufferedMessage::new(payload, now));
    }

    /// Take the delivery channel, leaving the record OFFLINE
    pub fn detach(&mut self) -> Option<DeliveryChannel> {
        debug!(participant_id = %self.id, "ParticipantRecord::detach: called");
        self.channel.take()
    }

    /// Install a new channel at `endpoint` and hand back the pending queue
    ///
    /// The record is ONLINE and its queue is empty afterwards.
    pub fn attach(&mut self, endpoint: Endpoint, channel: DeliveryChannel) -> VecDeque<BufferedMessage> {
        debug!(participant_id = %self.id, %endpoint, "ParticipantRecord::attach: called");
        self.endpoint = endpoint;
        self.channel = Some(channel);
        std::mem::take(&mut self.pending)
    }

    /// Push one payload over the delivery channel
    pub async fn push(&mut self, payload: &str, timeout: Duration) -> Result<(), DeliveryError> {
        match self.channel.as_mut() {
            Some(channel) => channel.push(payload, timeout).await,
            None => Err(DeliveryError::NotConnected),
        }
    }

    /// Drop every pending message, returning how many were dropped
    pub fn clear_pending(&mut self) -> usize {
        let n = self.pending.len();
        self.pending.clear();
        n
    }
}

/// Thread-safe map of participant records
#[derive(Debug, Default)]
pub struct ParticipantRegistry {
    records: RwLock<HashMap<ParticipantId, RecordHandle>>,
}

impl ParticipantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, id: ParticipantId) -> Option<RecordHandle> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        records.get(&id).cloned()
    }

    pub fn contains(&self, id: ParticipantId) -> bool {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        records.contains_key(&id)
    }

    /// Insert a record unless its id is taken
    ///
    /// On conflict the record is handed back so the caller can close its
    /// channel.
    pub fn try_insert(&self, record: ParticipantRecord) -> Result<RecordHandle, ParticipantRecord> {
        let id = record.id();
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        if records.contains_key(&id) {
            debug!(participant_id = %id, "ParticipantRegistry::try_insert: duplicate");
            return Err(record);
        }
        let handle = Arc::new(Mutex::new(record));
        records.insert(id, handle.clone());
        debug!(participant_id = %id, count = records.len(), "ParticipantRegistry::try_insert: inserted");
        Ok(handle)
    }

    pub fn remove(&self, id: ParticipantId) -> Option<RecordHandle> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        let removed = records.remove(&id);
        debug!(participant_id = %id, removed = removed.is_some(), "ParticipantRegistry::remove: called");
        removed
    }

    /// Whether `handle` is still the live record for `id`
    ///
    /// False after the participant was removed, or removed and registered
    /// again under the same id.
    pub fn is_current(&self, id: ParticipantId, handle: &RecordHandle) -> bool {
        self.lookup(id).is_some_and(|live| Arc::ptr_eq(&live, handle))
    }

    /// Momentary copy of all records, ordered by id
    ///
    /// Records inserted or removed after the copy is taken are not reflected.
    pub fn snapshot(&self) -> Vec<(ParticipantId, RecordHandle)> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        let mut entries: Vec<_> = records.iter().map(|(id, handle)| (*id, handle.clone())).collect();
        entries.sort_by_key(|(id, _)| *id);
        entries
    }

    pub fn ids(&self) -> Vec<ParticipantId> {
        self.snapshot().into_iter().map(|(id, _)| id).collect()
    }

    pub fn len(&self) -> usize {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
