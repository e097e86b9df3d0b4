//! Call session domain model.
//!
//! `CallSession` is a plain value type: it is owned and mutated by exactly
//! one session actor, which serializes every operation through its mailbox.
//! The methods here are therefore synchronous check-and-mutate steps; each
//! one is atomic because the owning actor never interleaves two of them.

use chrono::{DateTime, Utc};
use common::types::{ChannelId, MediaChannelId, SessionId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::CallError;
use crate::policy::CapacityLimits;

/// What a call session is attached to; fixes its capacity limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
    /// Server-wide voice room.
    Global,
    /// Clan voice channel.
    Clan,
    /// Federation voice channel.
    Federation,
    /// One-to-one call.
    Private,
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CallKind::Global => "global",
            CallKind::Clan => "clan",
            CallKind::Federation => "federation",
            CallKind::Private => "private",
        };
        f.write_str(s)
    }
}

/// Which community owns a named voice channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Clan,
    Federation,
}

impl From<ChannelKind> for CallKind {
    fn from(kind: ChannelKind) -> Self {
        match kind {
            ChannelKind::Clan => CallKind::Clan,
            ChannelKind::Federation => CallKind::Federation,
        }
    }
}

/// Who or what a new call is aimed at. The call kind and context are
/// derived from the target, so a kind/target mismatch cannot be expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallTarget {
    /// One-to-one call to another user.
    User(UserId),
    /// Clan or federation voice channel.
    Channel { id: ChannelId, kind: ChannelKind },
    /// The server-wide voice room.
    Global,
}

impl CallTarget {
    /// The session kind a call against this target gets.
    #[must_use]
    pub fn call_kind(self) -> CallKind {
        match self {
            CallTarget::User(_) => CallKind::Private,
            CallTarget::Channel { kind, .. } => kind.into(),
            CallTarget::Global => CallKind::Global,
        }
    }

    /// The owning channel reference, if any.
    #[must_use]
    pub fn context_ref(self) -> Option<ChannelId> {
        match self {
            CallTarget::Channel { id, .. } => Some(id),
            CallTarget::User(_) | CallTarget::Global => None,
        }
    }
}

/// Lifecycle state of a call session.
///
/// Transitions are monotonic along the allowed graph; `Ended` and
/// `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    /// Created, waiting for the callee/room to accept.
    Pending,
    /// Accepted; the call clock (`start_time`) is running.
    Accepted,
    /// At least one participant has joined the live call.
    Active,
    /// Closed normally; `end_time` and `duration_seconds` are set.
    Ended,
    /// Declined or expired while pending.
    Rejected,
}

impl CallStatus {
    /// True for `Ended` and `Rejected`; no transition leaves these.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, CallStatus::Ended | CallStatus::Rejected)
    }

    /// Whether the lifecycle graph allows `self -> next`.
    #[must_use]
    pub fn can_transition_to(self, next: CallStatus) -> bool {
        matches!(
            (self, next),
            (CallStatus::Pending, CallStatus::Accepted)
                | (CallStatus::Pending, CallStatus::Rejected)
                | (CallStatus::Accepted, CallStatus::Active)
                | (CallStatus::Accepted | CallStatus::Active, CallStatus::Ended)
        )
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CallStatus::Pending => "pending",
            CallStatus::Accepted => "accepted",
            CallStatus::Active => "active",
            CallStatus::Ended => "ended",
            CallStatus::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// Kind of entry in a session's append-only event log.
///
/// Wire names match the signaling vocabulary clients already consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "created")]
    Created,
    #[serde(rename = "joined")]
    Joined,
    #[serde(rename = "left")]
    Left,
    #[serde(rename = "muted")]
    Muted,
    #[serde(rename = "unmuted")]
    Unmuted,
    #[serde(rename = "raisedHand")]
    RaisedHand,
    #[serde(rename = "promotedSpeaker")]
    PromotedSpeaker,
    #[serde(rename = "demotedSpeaker")]
    DemotedSpeaker,
}

/// One entry in the session event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub kind: EventKind,
    pub user_id: UserId,
    pub at: DateTime<Utc>,
}

/// One entry in the speaker-promotion audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakerPromotion {
    pub promoted_user: UserId,
    pub promoted_by: UserId,
    pub promoted_at: DateTime<Utc>,
}

/// Roster entry for one joined user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub user_id: UserId,
    pub is_speaker: bool,
    pub is_raised_hand: bool,
    pub joined_at: DateTime<Utc>,
}

/// One call/voice-session instance: lifecycle state, roster, and audit logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSession {
    pub id: SessionId,
    pub kind: CallKind,
    pub owner_id: UserId,
    /// Owning clan/federation channel; `None` for private and global calls.
    pub context_ref: Option<ChannelId>,
    /// Media room name issued at creation, carried in the incoming-call
    /// signal so the transport layer can bind it.
    pub media_channel: MediaChannelId,
    pub status: CallStatus,
    /// Ordered roster, unique by `user_id`.
    pub participants: Vec<Participant>,
    /// Frozen from the capacity policy at creation.
    pub user_limit: u32,
    /// Frozen from the capacity policy at creation.
    pub speaker_limit: u32,
    /// Append-only promotion audit trail.
    pub speaker_promotions: Vec<SpeakerPromotion>,
    /// Append-only event log, ordered exactly as operations committed.
    pub events: Vec<SessionEvent>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Whole seconds between `start_time` and `end_time`, computed once
    /// when the call ends.
    pub duration_seconds: Option<i64>,
}

impl CallSession {
    /// Create a new pending session with limits frozen from the policy.
    #[must_use]
    pub fn new(
        id: SessionId,
        kind: CallKind,
        owner_id: UserId,
        context_ref: Option<ChannelId>,
        media_channel: MediaChannelId,
        limits: CapacityLimits,
        now: DateTime<Utc>,
    ) -> Self {
        let mut session = Self {
            id,
            kind,
            owner_id,
            context_ref,
            media_channel,
            status: CallStatus::Pending,
            participants: Vec::new(),
            user_limit: limits.user_limit,
            speaker_limit: limits.speaker_limit,
            speaker_promotions: Vec::new(),
            events: Vec::new(),
            start_time: None,
            end_time: None,
            duration_seconds: None,
        };
        session.record_event(EventKind::Created, owner_id, now);
        session
    }

    /// Number of roster entries currently holding a speaker slot.
    #[must_use]
    pub fn speaker_count(&self) -> usize {
        self.participants.iter().filter(|p| p.is_speaker).count()
    }

    /// Roster entry for `user_id`, if joined.
    #[must_use]
    pub fn participant(&self, user_id: UserId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.user_id == user_id)
    }

    fn participant_mut(&mut self, user_id: UserId) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.user_id == user_id)
    }

    /// Owner or any current speaker may promote/demote.
    #[must_use]
    pub fn is_arbiter(&self, actor_id: UserId) -> bool {
        actor_id == self.owner_id
            || self
                .participant(actor_id)
                .is_some_and(|p| p.is_speaker)
    }

    fn record_event(&mut self, kind: EventKind, user_id: UserId, at: DateTime<Utc>) {
        self.events.push(SessionEvent { kind, user_id, at });
    }

    fn require_status(
        &self,
        operation: &'static str,
        allowed: &[CallStatus],
    ) -> Result<(), CallError> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(CallError::InvalidState {
                operation,
                status: self.status,
            })
        }
    }

    fn require_live(&self, operation: &'static str) -> Result<(), CallError> {
        if self.status.is_terminal() {
            Err(CallError::InvalidState {
                operation,
                status: self.status,
            })
        } else {
            Ok(())
        }
    }

    /// Accept a pending call; starts the call clock.
    pub fn accept(&mut self, now: DateTime<Utc>) -> Result<(), CallError> {
        self.require_status("accept", &[CallStatus::Pending])?;
        self.status = CallStatus::Accepted;
        self.start_time = Some(now);
        Ok(())
    }

    /// Reject a pending call; terminal. Also the expiry path for calls
    /// nobody answered.
    pub fn reject(&mut self) -> Result<(), CallError> {
        self.require_status("reject", &[CallStatus::Pending])?;
        self.status = CallStatus::Rejected;
        Ok(())
    }

    /// End a live call; terminal. Returns the computed duration in whole
    /// seconds.
    pub fn end(&mut self, now: DateTime<Utc>) -> Result<i64, CallError> {
        self.require_status("end", &[CallStatus::Accepted, CallStatus::Active])?;
        let start = self
            .start_time
            .ok_or_else(|| CallError::Internal("live session missing start_time".to_string()))?;
        let duration = (now - start).num_seconds();
        self.status = CallStatus::Ended;
        self.end_time = Some(now);
        self.duration_seconds = Some(duration);
        Ok(duration)
    }

    /// Add a user to the roster as a listener.
    ///
    /// The first join after acceptance marks the session `Active`.
    pub fn join(&mut self, user_id: UserId, now: DateTime<Utc>) -> Result<(), CallError> {
        self.require_live("join")?;
        if self.participants.len() as u32 >= self.user_limit {
            return Err(CallError::CapacityExceeded {
                limit: self.user_limit,
            });
        }
        if self.participant(user_id).is_some() {
            return Err(CallError::AlreadyJoined(user_id));
        }
        self.participants.push(Participant {
            user_id,
            is_speaker: false,
            is_raised_hand: false,
            joined_at: now,
        });
        self.record_event(EventKind::Joined, user_id, now);
        if self.status == CallStatus::Accepted {
            self.status = CallStatus::Active;
        }
        Ok(())
    }

    /// Remove a user from the roster; any speaker slot or raised hand goes
    /// with it.
    pub fn leave(&mut self, user_id: UserId, now: DateTime<Utc>) -> Result<(), CallError> {
        self.require_live("leave")?;
        let before = self.participants.len();
        self.participants.retain(|p| p.user_id != user_id);
        if self.participants.len() == before {
            return Err(CallError::NotAJoinedParticipant(user_id));
        }
        self.record_event(EventKind::Left, user_id, now);
        Ok(())
    }

    /// Flag a participant as requesting a speaker slot.
    pub fn raise_hand(&mut self, user_id: UserId, now: DateTime<Utc>) -> Result<(), CallError> {
        self.require_live("raise_hand")?;
        let participant = self
            .participant_mut(user_id)
            .ok_or(CallError::NotAJoinedParticipant(user_id))?;
        participant.is_raised_hand = true;
        self.record_event(EventKind::RaisedHand, user_id, now);
        Ok(())
    }

    /// Record a participant's mute state change. Mute is a signaled audio
    /// state, not a roster flag.
    pub fn set_muted(
        &mut self,
        user_id: UserId,
        muted: bool,
        now: DateTime<Utc>,
    ) -> Result<(), CallError> {
        self.require_live("set_muted")?;
        if self.participant(user_id).is_none() {
            return Err(CallError::NotAJoinedParticipant(user_id));
        }
        let kind = if muted {
            EventKind::Muted
        } else {
            EventKind::Unmuted
        };
        self.record_event(kind, user_id, now);
        Ok(())
    }

    /// Grant a speaker slot to `target_id` on behalf of `actor_id`.
    ///
    /// Appends to the promotion audit trail; clears the target's raised
    /// hand.
    pub fn promote_speaker(
        &mut self,
        actor_id: UserId,
        target_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<(), CallError> {
        self.require_live("promote_speaker")?;
        if !self.is_arbiter(actor_id) {
            return Err(CallError::Unauthorized(
                "only the session owner or a current speaker can promote".to_string(),
            ));
        }
        if self.speaker_count() as u32 >= self.speaker_limit {
            return Err(CallError::SpeakerLimitExceeded {
                limit: self.speaker_limit,
            });
        }
        let participant = self
            .participant_mut(target_id)
            .ok_or(CallError::NotAJoinedParticipant(target_id))?;
        participant.is_speaker = true;
        participant.is_raised_hand = false;
        self.speaker_promotions.push(SpeakerPromotion {
            promoted_user: target_id,
            promoted_by: actor_id,
            promoted_at: now,
        });
        self.record_event(EventKind::PromotedSpeaker, target_id, now);
        Ok(())
    }

    /// Revoke `target_id`'s speaker slot on behalf of `actor_id`.
    pub fn demote_speaker(
        &mut self,
        actor_id: UserId,
        target_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<(), CallError> {
        self.require_live("demote_speaker")?;
        if !self.is_arbiter(actor_id) {
            return Err(CallError::Unauthorized(
                "only the session owner or a current speaker can demote".to_string(),
            ));
        }
        let participant = self
            .participant_mut(target_id)
            .ok_or(CallError::NotAJoinedParticipant(target_id))?;
        participant.is_speaker = false;
        self.record_event(EventKind::DemotedSpeaker, target_id, now);
        Ok(())
    }
}
