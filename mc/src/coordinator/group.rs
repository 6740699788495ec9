//! Membership operations
//!
//! [`Group`] is what a control session talks to. Each operation takes the
//! participant id the session is bound to and returns the reply or the
//! protocol error to send back.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::config::CoordinatorConfig;
use super::delivery::DeliveryChannel;
use super::dispatch::{Dispatcher, FanoutReport, ReplayReport};
use super::metrics::{CoordinatorMetrics, Metrics};
use super::registry::{ParticipantRecord, ParticipantRegistry, ParticipantStatus};
use crate::protocol::{Endpoint, MAX_FRAME_LEN, ParticipantId, ProtocolError};

pub struct Group {
    registry: Arc<ParticipantRegistry>,
    dispatcher: Dispatcher,
    connect_timeout: Duration,
    metrics: Arc<Metrics>,
}

impl Group {
    pub fn new(config: &CoordinatorConfig, metrics: Arc<Metrics>) -> Self {
        debug!(threshold_secs = config.threshold_secs, "Group::new: called");
        let registry = Arc::new(ParticipantRegistry::new());
        let dispatcher = Dispatcher::new(
            registry.clone(),
            config.threshold(),
            config.delivery_timeout(),
            metrics.clone(),
        );
        Self {
            registry,
            dispatcher,
            connect_timeout: config.connect_timeout(),
            metrics,
        }
    }

    /// Join the group, opening a delivery channel to `endpoint`
    pub async fn register(&self, id: ParticipantId, endpoint: Endpoint) -> Result<(), ProtocolError> {
        debug!(participant_id = %id, %endpoint, "Group::register: called");
        if self.registry.contains(id) {
            return Err(ProtocolError::DuplicateParticipant(id));
        }

        let channel = DeliveryChannel::open(&endpoint, self.connect_timeout).await?;
        let record = ParticipantRecord::online(id, endpoint, channel);

        // Another session may have taken the id while the channel was opening
        if let Err(mut lost) = self.registry.try_insert(record) {
            if let Some(channel) = lost.detach() {
                channel.close().await;
            }
            return Err(ProtocolError::DuplicateParticipant(id));
        }

        self.metrics.set_registered(self.registry.len());
        info!(participant_id = %id, "Participant registered");
        Ok(())
    }

    /// Leave the group, dropping any pending messages
    pub async fn deregister(&self, id: ParticipantId) -> Result<(), ProtocolError> {
        debug!(participant_id = %id, "Group::deregister: called");
        let handle = self.registry.remove(id).ok_or(ProtocolError::NotAMember)?;
        self.metrics.set_registered(self.registry.len());

        let mut record = handle.lock().await;
        let dropped = record.clear_pending();
        if let Some(channel) = record.detach() {
            channel.close().await;
        }
        info!(participant_id = %id, dropped_pending = dropped, "Participant deregistered");
        Ok(())
    }

    /// Go OFFLINE; later messages are buffered. Idempotent.
    pub async fn disconnect(&self, id: ParticipantId) -> Result<(), ProtocolError> {
        debug!(participant_id = %id, "Group::disconnect: called");
        let handle = self.registry.lookup(id).ok_or(ProtocolError::NotAMember)?;
        let mut record = handle.lock().await;
        match record.detach() {
            Some(channel) => {
                channel.close().await;
                info!(participant_id = %id, "Participant disconnected");
            }
            None => debug!(participant_id = %id, "Group::disconnect: already offline"),
        }
        Ok(())
    }

    /// Come back ONLINE at `endpoint` and replay what is still fresh
    pub async fn reconnect(&self, id: ParticipantId, endpoint: Endpoint) -> Result<ReplayReport, ProtocolError> {
        debug!(participant_id = %id, %endpoint, "Group::reconnect: called");
        let handle = self.registry.lookup(id).ok_or(ProtocolError::NotAMember)?;
        let mut record = handle.lock().await;
        if record.is_online() {
            return Err(ProtocolError::AlreadyOnline(id));
        }

        // On failure the record stays OFFLINE with its queue intact
        let channel = DeliveryChannel::open(&endpoint, self.connect_timeout).await?;
        let backlog = record.attach(endpoint, channel);
        info!(participant_id = %id, pending = backlog.len(), "Participant reconnected");

        Ok(self.dispatcher.replay(&mut record, backlog, Instant::now()).await)
    }

    /// Multicast `payload` from `origin` to the whole group
    pub async fn msend(&self, origin: ParticipantId, payload: &str) -> Result<FanoutReport, ProtocolError> {
        debug!(participant_id = %origin, len = payload.len(), "Group::msend: called");
        if !self.registry.contains(origin) {
            return Err(ProtocolError::NotAMember);
        }
        if payload.len() > MAX_FRAME_LEN {
            return Err(ProtocolError::PayloadTooLarge(payload.len()));
        }

        self.metrics.message_received();
        Ok(self.dispatcher.msend(payload).await)
    }

    pub async fn status(&self, id: ParticipantId) -> ParticipantStatus {
        match self.registry.lookup(id) {
            Some(handle) => handle.lock().await.status(),
            None => ParticipantStatus::NotMember,
        }
    }

    pub fn is_member(&self, id: ParticipantId) -> bool {
        self.registry.contains(id)
    }

    pub async fn pending_len(&self, id: ParticipantId) -> usize {
        match self.registry.lookup(id) {
            Some(handle) => handle.lock().await.pending_len(),
            None => 0,
        }
    }

    pub fn members(&self) -> Vec<ParticipantId> {
        self.registry.ids()
    }

    pub fn metrics(&self) -> CoordinatorMetrics {
        self.metrics.snapshot()
    }

    /// Close every open delivery channel; records stay as OFFLINE members
    pub async fn close_all_channels(&self) {
        debug!("Group::close_all_channels: called");
        for (id, handle) in self.registry.snapshot() {
            let channel = handle.lock().await.detach();
            if let Some(channel) = channel {
                debug!(participant_id = %id, "Group::close_all_channels: closing");
                channel.close().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::read_frame;
    use tokio::net::{TcpListener, TcpStream};

    fn group(threshold_secs: u64) -> Group {
        let config = CoordinatorConfig {
            threshold_secs,
            connect_timeout_ms: 2_000,
            delivery_timeout_ms: 1_000,
            ..Default::default()
        };
        Group::new(&config, Arc::new(Metrics::new()))
    }

    /// Delivery listener plus the endpoint to announce for it
    async fn listener() -> (TcpListener, Endpoint) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, Endpoint::new("127.0.0.1", port))
    }

    async fn register(group: &Group, id: u32) -> TcpStream {
        let (listener, endpoint) = listener().await;
        let (result, accepted) = tokio::join!(group.register(ParticipantId(id), endpoint), listener.accept());
        result.unwrap();
        accepted.unwrap().0
    }

    #[tokio::test]
    async fn test_register_and_msend() {
        let group = group(60);
        let mut stream = register(&group, 7).await;
        assert_eq!(group.status(ParticipantId(7)).await, ParticipantStatus::Online);

        let report = group.msend(ParticipantId(7), "hello").await.unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(read_frame(&mut stream).await.unwrap().as_deref(), Some("hello"));
        assert_eq!(group.metrics().messages_received, 1);
        assert_eq!(group.metrics().registered_participants, 1);
    }

    #[tokio::test]
    async fn test_register_duplicate_id() {
        let group = group(60);
        let _stream = register(&group, 1).await;
        let (_listener, endpoint) = listener().await;

        let err = group.register(ParticipantId(1), endpoint).await.unwrap_err();
        assert_eq!(err, ProtocolError::DuplicateParticipant(ParticipantId(1)));
        assert_eq!(group.members(), vec![ParticipantId(1)]);
    }

    #[tokio::test]
    async fn test_register_unreachable_inserts_nothing() {
        let group = group(60);
        let endpoint = {
            let (_listener, endpoint) = listener().await;
            endpoint
        };

        let err = group.register(ParticipantId(3), endpoint).await.unwrap_err();
        assert!(matches!(err, ProtocolError::DeliveryUnreachable { .. }));
        assert_eq!(group.status(ParticipantId(3)).await, ParticipantStatus::NotMember);
    }

    #[tokio::test]
    async fn test_lifecycle_on_non_member() {
        let group = group(60);
        let id = ParticipantId(42);
        let (_listener, endpoint) = listener().await;

        assert_eq!(group.deregister(id).await, Err(ProtocolError::NotAMember));
        assert_eq!(group.disconnect(id).await, Err(ProtocolError::NotAMember));
        assert_eq!(
            group.reconnect(id, endpoint).await.unwrap_err(),
            ProtocolError::NotAMember
        );
        assert_eq!(group.msend(id, "x").await.unwrap_err(), ProtocolError::NotAMember);
    }

    #[tokio::test]
    async fn test_disconnect_buffers_then_reconnect_replays() {
        let group = group(60);
        let mut first = register(&group, 7).await;

        group.disconnect(ParticipantId(7)).await.unwrap();
        // Old channel is closed
        assert!(read_frame(&mut first).await.unwrap().is_none());
        // Second disconnect is a no-op
        group.disconnect(ParticipantId(7)).await.unwrap();
        assert_eq!(group.status(ParticipantId(7)).await, ParticipantStatus::Offline);

        let report = group.msend(ParticipantId(7), "world").await.unwrap();
        assert_eq!(report.buffered, 1);
        assert_eq!(group.pending_len(ParticipantId(7)).await, 1);

        let (listener, endpoint) = listener().await;
        let (result, accepted) = tokio::join!(group.reconnect(ParticipantId(7), endpoint), listener.accept());
        let replay = result.unwrap();
        let mut second = accepted.unwrap().0;

        assert_eq!(replay.delivered, 1);
        assert_eq!(read_frame(&mut second).await.unwrap().as_deref(), Some("world"));
        assert_eq!(group.pending_len(ParticipantId(7)).await, 0);
        assert_eq!(group.status(ParticipantId(7)).await, ParticipantStatus::Online);
    }

    #[tokio::test]
    async fn test_reconnect_while_online_rejected() {
        let group = group(60);
        let _stream = register(&group, 5).await;
        let (_listener, endpoint) = listener().await;

        let err = group.reconnect(ParticipantId(5), endpoint).await.unwrap_err();
        assert_eq!(err, ProtocolError::AlreadyOnline(ParticipantId(5)));
    }

    #[tokio::test]
    async fn test_reconnect_unreachable_keeps_queue() {
        let group = group(60);
        let _stream = register(&group, 5).await;
        group.disconnect(ParticipantId(5)).await.unwrap();
        group.msend(ParticipantId(5), "kept").await.unwrap();

        let endpoint = {
            let (_listener, endpoint) = listener().await;
            endpoint
        };
        let err = group.reconnect(ParticipantId(5), endpoint).await.unwrap_err();

        assert!(matches!(err, ProtocolError::DeliveryUnreachable { .. }));
        assert_eq!(group.status(ParticipantId(5)).await, ParticipantStatus::Offline);
        assert_eq!(group.pending_len(ParticipantId(5)).await, 1);
    }

    #[tokio::test]
    async fn test_threshold_zero_discards_backlog() {
        let group = group(0);
        let _stream = register(&group, 2).await;
        group.disconnect(ParticipantId(2)).await.unwrap();
        group.msend(ParticipantId(2), "stale").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let (listener, endpoint) = listener().await;
        let (result, _accepted) = tokio::join!(group.reconnect(ParticipantId(2), endpoint), listener.accept());
        let replay = result.unwrap();

        assert_eq!(replay.delivered, 0);
        assert_eq!(replay.expired, 1);
        assert_eq!(group.pending_len(ParticipantId(2)).await, 0);
    }

    #[tokio::test]
    async fn test_deregister_drops_pending_and_allows_reuse() {
        let group = group(60);
        let _stream = register(&group, 4).await;
        group.disconnect(ParticipantId(4)).await.unwrap();
        group.msend(ParticipantId(4), "never seen").await.unwrap();

        group.deregister(ParticipantId(4)).await.unwrap();
        assert_eq!(group.status(ParticipantId(4)).await, ParticipantStatus::NotMember);
        assert_eq!(group.metrics().registered_participants, 0);

        let mut stream = register(&group, 4).await;
        assert_eq!(group.pending_len(ParticipantId(4)).await, 0);
        group.msend(ParticipantId(4), "fresh").await.unwrap();
        assert_eq!(read_frame(&mut stream).await.unwrap().as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_msend_payload_too_large() {
        let group = group(60);
        let _stream = register(&group, 1).await;
        let payload = "x".repeat(MAX_FRAME_LEN + 1);

        let err = group.msend(ParticipantId(1), &payload).await.unwrap_err();
        assert_eq!(err, ProtocolError::PayloadTooLarge(MAX_FRAME_LEN + 1));
        assert_eq!(group.metrics().messages_received, 0);
    }

    #[tokio::test]
    async fn test_close_all_channels() {
        let group = group(60);
        let mut a = register(&group, 1).await;
        let mut b = register(&group, 2).await;

        group.close_all_channels().await;

        assert!(read_frame(&mut a).await.unwrap().is_none());
        assert!(read_frame(&mut b).await.unwrap().is_none());
        assert_eq!(group.status(ParticipantId(1)).await, ParticipantStatus::Offline);
    }
}
