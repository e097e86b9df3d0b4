//! Realtime signal fan-out.
//!
//! Every committed state change is published to the rooms that should see
//! it. Delivery is best-effort: publishing never blocks on subscribers and
//! never fails the operation that produced the event. Within one room,
//! subscribers observe events in commit order; across rooms there is no
//! ordering. A subscriber that lags or reconnects re-fetches the session
//! snapshot instead of replaying missed events.

use common::types::{ChannelId, MediaChannelId, SessionId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tokio::sync::{broadcast, RwLock};
use tracing::trace;

/// Broadcast buffer per room. A receiver further behind than this gets
/// `RecvError::Lagged` and must re-fetch the session snapshot.
pub const ROOM_BUFFER: usize = 256;

/// Addressable set of subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomId {
    /// One user's personal room (ring, call outcomes).
    User(UserId),
    /// All subscribers of a clan/federation voice channel.
    Channel(ChannelId),
    /// Everyone in one call session.
    Session(SessionId),
    /// The server-wide voice room.
    Global,
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomId::User(id) => write!(f, "user:{id}"),
            RoomId::Channel(id) => write!(f, "channel:{id}"),
            RoomId::Session(id) => write!(f, "session:{id}"),
            RoomId::Global => f.write_str("global"),
        }
    }
}

/// Server -> client signal event, in the wire vocabulary clients consume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum SignalEvent {
    #[serde(rename = "incoming_call", rename_all = "camelCase")]
    IncomingCall {
        session_id: SessionId,
        caller_id: UserId,
        channel_id: MediaChannelId,
    },
    #[serde(rename = "call_accepted", rename_all = "camelCase")]
    CallAccepted { session_id: SessionId },
    #[serde(rename = "call_rejected", rename_all = "camelCase")]
    CallRejected { session_id: SessionId },
    #[serde(rename = "call_ended", rename_all = "camelCase")]
    CallEnded { session_id: SessionId, duration: i64 },
    #[serde(rename = "participant_joined", rename_all = "camelCase")]
    ParticipantJoined {
        session_id: SessionId,
        user_id: UserId,
    },
    #[serde(rename = "participant_left", rename_all = "camelCase")]
    ParticipantLeft {
        session_id: SessionId,
        user_id: UserId,
    },
    #[serde(rename = "hand_raised", rename_all = "camelCase")]
    HandRaised {
        session_id: SessionId,
        user_id: UserId,
    },
    #[serde(rename = "mute_changed", rename_all = "camelCase")]
    MuteChanged {
        session_id: SessionId,
        user_id: UserId,
        muted: bool,
    },
    #[serde(rename = "promotedSpeaker", rename_all = "camelCase")]
    PromotedSpeaker {
        session_id: SessionId,
        user_id: UserId,
    },
    #[serde(rename = "demotedSpeaker", rename_all = "camelCase")]
    DemotedSpeaker {
        session_id: SessionId,
        user_id: UserId,
    },
}

impl SignalEvent {
    /// Wire name, for logs and metric labels (bounded cardinality).
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            SignalEvent::IncomingCall { .. } => "incoming_call",
            SignalEvent::CallAccepted { .. } => "call_accepted",
            SignalEvent::CallRejected { .. } => "call_rejected",
            SignalEvent::CallEnded { .. } => "call_ended",
            SignalEvent::ParticipantJoined { .. } => "participant_joined",
            SignalEvent::ParticipantLeft { .. } => "participant_left",
            SignalEvent::HandRaised { .. } => "hand_raised",
            SignalEvent::MuteChanged { .. } => "mute_changed",
            SignalEvent::PromotedSpeaker { .. } => "promotedSpeaker",
            SignalEvent::DemotedSpeaker { .. } => "demotedSpeaker",
        }
    }
}

/// Per-room broadcast registry.
///
/// Rooms are created lazily on first subscribe. Session rooms are
/// removed when their session is reaped; user, channel, and global
/// rooms are reaped when a publish finds their subscribers all gone.
#[derive(Debug)]
pub struct SignalBus {
    rooms: RwLock<HashMap<RoomId, broadcast::Sender<SignalEvent>>>,
    room_buffer: usize,
}

impl Default for SignalBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalBus {
    #[must_use]
    pub fn new() -> Self {
        Self::with_room_buffer(ROOM_BUFFER)
    }

    /// Bus with a custom per-room buffer (small buffers exercise lag
    /// handling in tests).
    #[must_use]
    pub fn with_room_buffer(room_buffer: usize) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            room_buffer,
        }
    }

    /// Subscribe to a room, creating it if needed. Only events published
    /// after this call are delivered.
    pub async fn subscribe(&self, room: RoomId) -> broadcast::Receiver<SignalEvent> {
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(room)
            .or_insert_with(|| broadcast::channel(self.room_buffer).0)
            .subscribe()
    }

    /// Publish an event to a room. Fire-and-forget: a room nobody has
    /// subscribed to drops the event, and a room whose last subscriber
    /// is gone is reaped on the way out.
    pub async fn publish(&self, room: RoomId, event: SignalEvent) {
        let name = event.name();
        let rooms = self.rooms.read().await;
        let Some(sender) = rooms.get(&room) else {
            trace!(target: "vc.signal", room = %room, event = name, "no room, dropping");
            return;
        };
        match sender.send(event) {
            Ok(delivered) => {
                trace!(
                    target: "vc.signal",
                    room = %room,
                    event = name,
                    receivers = delivered,
                    "published"
                );
                crate::observability::metrics::record_signal_published(name);
            }
            Err(_) => {
                drop(rooms);
                self.drop_if_abandoned(room).await;
                trace!(target: "vc.signal", room = %room, event = name, "no receivers, dropping");
            }
        }
    }

    /// Remove a room whose subscribers are all gone. Session rooms are
    /// exempt: their actor removes them, and transient zero-receiver
    /// windows must not tear a live session's room down.
    async fn drop_if_abandoned(&self, room: RoomId) {
        if matches!(room, RoomId::Session(_)) {
            return;
        }
        let mut rooms = self.rooms.write().await;
        if let Some(sender) = rooms.get(&room) {
            if sender.receiver_count() == 0 {
                rooms.remove(&room);
            }
        }
    }

    /// Drop a room; pending events stay readable by existing receivers
    /// until they drain, then the stream closes.
    pub async fn remove_room(&self, room: RoomId) {
        let mut rooms = self.rooms.write().await;
        rooms.remove(&room);
    }

    /// Number of live rooms (status/metrics).
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::{RecvError, TryRecvError};

    fn event(session_id: SessionId, user_id: UserId) -> SignalEvent {
        SignalEvent::ParticipantJoined {
            session_id,
            user_id,
        }
    }

    #[tokio::test]
    async fn test_subscriber_sees_events_in_publish_order() {
        let bus = SignalBus::new();
        let session = SessionId::new();
        let room = RoomId::Session(session);
        let mut rx = bus.subscribe(room).await;

        let users: Vec<UserId> = (0..5).map(|_| UserId::new()).collect();
        for user in &users {
            bus.publish(room, event(session, *user)).await;
        }

        for user in &users {
            let received = rx.recv().await.unwrap();
            assert_eq!(received, event(session, *user));
        }
    }

    #[tokio::test]
    async fn test_rooms_are_isolated() {
        let bus = SignalBus::new();
        let session_a = SessionId::new();
        let session_b = SessionId::new();
        let mut rx_a = bus.subscribe(RoomId::Session(session_a)).await;
        let mut rx_b = bus.subscribe(RoomId::Session(session_b)).await;

        bus.publish(RoomId::Session(session_a), event(session_a, UserId::new()))
            .await;

        assert!(rx_a.try_recv().is_ok());
        assert!(matches!(rx_b.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_silent() {
        let bus = SignalBus::new();
        let session = SessionId::new();
        // No room at all.
        bus.publish(RoomId::Session(session), event(session, UserId::new()))
            .await;
        assert_eq!(bus.room_count().await, 0);

        // Room exists but the only receiver is gone.
        let rx = bus.subscribe(RoomId::Session(session)).await;
        drop(rx);
        bus.publish(RoomId::Session(session), event(session, UserId::new()))
            .await;
    }

    #[tokio::test]
    async fn test_abandoned_room_is_reaped_on_publish() {
        let bus = SignalBus::new();
        let user = UserId::new();
        let session = SessionId::new();

        let user_rx = bus.subscribe(RoomId::User(user)).await;
        let session_rx = bus.subscribe(RoomId::Session(session)).await;
        assert_eq!(bus.room_count().await, 2);

        // A live subscriber keeps the room.
        bus.publish(RoomId::User(user), event(session, user)).await;
        assert_eq!(bus.room_count().await, 2);

        drop(user_rx);
        drop(session_rx);
        bus.publish(RoomId::User(user), event(session, user)).await;
        bus.publish(RoomId::Session(session), event(session, user))
            .await;

        // The user room went with its last subscriber; the session room
        // waits for its actor's cleanup.
        assert_eq!(bus.room_count().await, 1);
        bus.remove_room(RoomId::Session(session)).await;
        assert_eq!(bus.room_count().await, 0);
    }

    #[tokio::test]
    async fn test_late_subscriber_misses_earlier_events() {
        let bus = SignalBus::new();
        let session = SessionId::new();
        let room = RoomId::Session(session);
        let _early = bus.subscribe(room).await;

        bus.publish(room, event(session, UserId::new())).await;
        let mut late = bus.subscribe(room).await;
        assert!(matches!(late.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_slow_subscriber_observes_lag() {
        let bus = SignalBus::with_room_buffer(2);
        let session = SessionId::new();
        let room = RoomId::Session(session);
        let mut rx = bus.subscribe(room).await;

        for _ in 0..5 {
            bus.publish(room, event(session, UserId::new())).await;
        }

        assert!(matches!(rx.recv().await, Err(RecvError::Lagged(_))));
        // After the lag notice the receiver resumes with the retained tail.
        assert!(rx.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_removed_room_closes_after_drain() {
        let bus = SignalBus::new();
        let session = SessionId::new();
        let room = RoomId::Session(session);
        let mut rx = bus.subscribe(room).await;

        bus.publish(room, event(session, UserId::new())).await;
        bus.remove_room(room).await;
        assert_eq!(bus.room_count().await, 0);

        assert!(rx.recv().await.is_ok());
        assert!(matches!(rx.recv().await, Err(RecvError::Closed)));
    }

    #[tokio::test]
    async fn test_concurrent_publish_and_subscribe() {
        let bus = std::sync::Arc::new(SignalBus::new());
        let session = SessionId::new();
        let room = RoomId::Session(session);

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let bus = bus.clone();
            tasks.push(tokio::spawn(async move {
                let _rx = bus.subscribe(room).await;
                bus.publish(room, event(session, UserId::new())).await;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(bus.room_count().await, 1);
    }

    #[test]
    fn test_wire_shape_matches_signaling_contract() {
        let session = SessionId::new();
        let caller = UserId::new();
        let channel = MediaChannelId::new();

        let json = serde_json::to_value(SignalEvent::IncomingCall {
            session_id: session,
            caller_id: caller,
            channel_id: channel.clone(),
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "event": "incoming_call",
                "sessionId": session.0,
                "callerId": caller.0,
                "channelId": channel.0,
            })
        );

        let json = serde_json::to_value(SignalEvent::PromotedSpeaker {
            session_id: session,
            user_id: caller,
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "event": "promotedSpeaker",
                "sessionId": session.0,
                "userId": caller.0,
            })
        );

        let json = serde_json::to_value(SignalEvent::CallEnded {
            session_id: session,
            duration: 95,
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "event": "call_ended",
                "sessionId": session.0,
                "duration": 95,
            })
        );
    }
}
