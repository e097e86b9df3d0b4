//! Message types for actor communication.
//!
//! All inter-actor communication uses strongly-typed message passing via
//! `tokio::sync::mpsc`. Request-reply exchanges carry a
//! `tokio::sync::oneshot` sender for the response.

use crate::errors::CallError;
use crate::model::{CallSession, CallTarget};

use super::call::CallSessionActorHandle;

use common::types::{MediaChannelId, SessionId, UserId};
use std::time::Duration;
use tokio::sync::oneshot;

/// Messages sent to `CallControllerActor`.
#[derive(Debug)]
pub enum ControllerMessage {
    /// Create a new pending session and ring the target.
    Initiate {
        owner_id: UserId,
        target: CallTarget,
        /// Response channel for the session/channel ids or error.
        respond_to: oneshot::Sender<Result<InitiatedCall, CallError>>,
    },

    /// Look up the actor handle for a live session.
    ///
    /// Per-session operations go through the returned handle directly, so
    /// traffic for one busy session never queues behind another in the
    /// controller mailbox.
    GetSession {
        session_id: SessionId,
        /// Response channel for the session actor handle or error.
        respond_to: oneshot::Sender<Result<CallSessionActorHandle, CallError>>,
    },

    /// Get current controller status (for health checks and load shedding).
    GetStatus {
        /// Response channel for controller status.
        respond_to: oneshot::Sender<ControllerStatus>,
    },

    /// Initiate graceful shutdown (SIGTERM received).
    Shutdown {
        /// Deadline for shutdown.
        deadline: Duration,
        /// Response channel for confirmation.
        respond_to: oneshot::Sender<Result<(), CallError>>,
    },
}

impl ControllerMessage {
    /// Operation label for metrics (bounded cardinality).
    #[must_use]
    pub fn operation_name(&self) -> &'static str {
        match self {
            ControllerMessage::Initiate { .. } => "initiate",
            ControllerMessage::GetSession { .. } => "get_session",
            ControllerMessage::GetStatus { .. } => "get_status",
            ControllerMessage::Shutdown { .. } => "shutdown",
        }
    }
}

/// Messages sent to `CallSessionActor`.
///
/// Every state-changing operation is one message, so the check and the
/// mutation it guards execute atomically inside the session's mailbox.
#[derive(Debug)]
pub enum CallSessionMessage {
    /// Callee accepts the ringing call.
    Accept {
        user_id: UserId,
        /// Response channel for the updated session snapshot.
        respond_to: oneshot::Sender<Result<CallSession, CallError>>,
    },

    /// Callee declines the ringing call.
    Reject {
        user_id: UserId,
        /// Response channel for the final session snapshot.
        respond_to: oneshot::Sender<Result<CallSession, CallError>>,
    },

    /// End a live call.
    End {
        user_id: UserId,
        /// Response channel for the final snapshot plus duration.
        respond_to: oneshot::Sender<Result<EndedCall, CallError>>,
    },

    /// Join the roster as a listener.
    Join {
        user_id: UserId,
        /// Response channel for confirmation.
        respond_to: oneshot::Sender<Result<(), CallError>>,
    },

    /// Leave the roster.
    Leave {
        user_id: UserId,
        /// Response channel for confirmation.
        respond_to: oneshot::Sender<Result<(), CallError>>,
    },

    /// Raise a hand to request a speaker slot.
    RaiseHand {
        user_id: UserId,
        /// Response channel for confirmation.
        respond_to: oneshot::Sender<Result<(), CallError>>,
    },

    /// Signal a mute state change (informational, no roster flag).
    SetMuted {
        user_id: UserId,
        muted: bool,
        /// Response channel for confirmation.
        respond_to: oneshot::Sender<Result<(), CallError>>,
    },

    /// Grant a speaker slot (owner or current speaker only).
    PromoteSpeaker {
        actor_id: UserId,
        target_user_id: UserId,
        /// Response channel for confirmation.
        respond_to: oneshot::Sender<Result<(), CallError>>,
    },

    /// Revoke a speaker slot (owner or current speaker only).
    DemoteSpeaker {
        actor_id: UserId,
        target_user_id: UserId,
        /// Response channel for confirmation.
        respond_to: oneshot::Sender<Result<(), CallError>>,
    },

    /// Get the current session state (reads, reconnect refresh).
    GetSnapshot {
        /// Response channel for the session snapshot.
        respond_to: oneshot::Sender<CallSession>,
    },
}

impl CallSessionMessage {
    /// Operation label for metrics (bounded cardinality).
    #[must_use]
    pub fn operation_name(&self) -> &'static str {
        match self {
            CallSessionMessage::Accept { .. } => "accept",
            CallSessionMessage::Reject { .. } => "reject",
            CallSessionMessage::End { .. } => "end",
            CallSessionMessage::Join { .. } => "join",
            CallSessionMessage::Leave { .. } => "leave",
            CallSessionMessage::RaiseHand { .. } => "raise_hand",
            CallSessionMessage::SetMuted { .. } => "set_muted",
            CallSessionMessage::PromoteSpeaker { .. } => "promote_speaker",
            CallSessionMessage::DemoteSpeaker { .. } => "demote_speaker",
            CallSessionMessage::GetSnapshot { .. } => "snapshot",
        }
    }
}

// ----------------------------------------------------------------------------
// Supporting Types
// ----------------------------------------------------------------------------

/// Reply to a successful `Initiate`.
#[derive(Debug, Clone)]
pub struct InitiatedCall {
    /// Session id for all subsequent operations.
    pub session_id: SessionId,
    /// Media room the transport layer should bind for this call.
    pub channel_id: MediaChannelId,
}

/// Reply to a successful `End`.
#[derive(Debug, Clone)]
pub struct EndedCall {
    /// Final immutable snapshot, retained for history.
    pub session: CallSession,
    /// Whole seconds the call was live.
    pub duration_seconds: i64,
}

/// Status of the `CallControllerActor`.
#[derive(Debug, Clone)]
pub struct ControllerStatus {
    /// Live session actors.
    pub session_count: usize,
    /// Participants across all live sessions.
    pub participant_count: usize,
    /// Whether the controller is draining (shutdown in progress).
    pub is_draining: bool,
    /// Current controller mailbox depth.
    pub mailbox_depth: usize,
}
