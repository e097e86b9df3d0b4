//! Voice Controller error types.
//!
//! Error types map to signaling `ErrorCode` values for client responses.
//! Internal details are logged server-side but not exposed to clients.

use common::types::{SessionId, UserId};
use thiserror::Error;

use crate::model::CallStatus;

/// Voice Controller error type.
///
/// Maps to signaling `ErrorCode` values:
/// - `Unauthorized`: `FORBIDDEN` (3)
/// - `TargetNotFound`, `SessionNotFound`, `NotAJoinedParticipant`: `NOT_FOUND` (4)
/// - `InvalidState`, `AlreadyJoined`: `CONFLICT` (5)
/// - `Internal`: `INTERNAL_ERROR` (6)
/// - `CapacityExceeded`, `SpeakerLimitExceeded`, `Unavailable`: `CAPACITY_EXCEEDED` (7)
#[derive(Debug, Error)]
pub enum CallError {
    /// Callee or channel context does not exist (or cannot host calls).
    #[error("Target not found: {0}")]
    TargetNotFound(String),

    /// No live session with this id.
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    /// Operation not legal for the session's current status.
    #[error("Operation '{operation}' not allowed while session is {status}")]
    InvalidState {
        operation: &'static str,
        status: CallStatus,
    },

    /// Roster is at its user limit.
    #[error("Call at capacity: limit {limit}")]
    CapacityExceeded { limit: u32 },

    /// Every speaker slot is taken.
    #[error("Speaker limit reached: limit {limit}")]
    SpeakerLimitExceeded { limit: u32 },

    /// User is already in the roster.
    #[error("Already joined: {0}")]
    AlreadyJoined(UserId),

    /// User is not in the roster.
    #[error("Not a joined participant: {0}")]
    NotAJoinedParticipant(UserId),

    /// Actor is neither the session owner nor a current speaker.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Controller is refusing new work (draining or at max sessions).
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Internal error (lost reply channel, broken invariant).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CallError {
    /// Returns the signaling `ErrorCode` value for this error.
    #[must_use]
    pub fn error_code(&self) -> i32 {
        match self {
            CallError::Unauthorized(_) => 3, // FORBIDDEN
            CallError::TargetNotFound(_)
            | CallError::SessionNotFound(_)
            | CallError::NotAJoinedParticipant(_) => 4, // NOT_FOUND
            CallError::InvalidState { .. } | CallError::AlreadyJoined(_) => 5, // CONFLICT
            CallError::Internal(_) => 6, // INTERNAL_ERROR
            CallError::CapacityExceeded { .. }
            | CallError::SpeakerLimitExceeded { .. }
            | CallError::Unavailable(_) => 7, // CAPACITY_EXCEEDED
        }
    }

    /// Returns a client-safe error message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            CallError::TargetNotFound(_) => "Target not found".to_string(),
            CallError::SessionNotFound(_) => "Call session not found".to_string(),
            CallError::InvalidState { .. } => {
                "Operation not allowed in the current call state".to_string()
            }
            CallError::CapacityExceeded { .. } => "Call is full".to_string(),
            CallError::SpeakerLimitExceeded { .. } => "All speaker slots are taken".to_string(),
            CallError::AlreadyJoined(_) => "Already in this call".to_string(),
            CallError::NotAJoinedParticipant(_) => "Not a participant of this call".to_string(),
            CallError::Unauthorized(msg) => msg.clone(),
            CallError::Unavailable(_) => "Server is unavailable, please try again".to_string(),
            CallError::Internal(_) => "An internal error occurred".to_string(),
        }
    }
}
