//! Capacity policy: fixed limits per call kind.
//!
//! Consulted exactly once, at session creation. The chosen limits are frozen
//! into the session so a later policy change never affects in-flight calls.

use crate::model::CallKind;

/// Participant and speaker limits for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityLimits {
    /// Maximum roster size, including non-speakers.
    pub user_limit: u32,
    /// Maximum concurrent speakers.
    pub speaker_limit: u32,
}

/// Limits for a call of the given kind.
#[must_use]
pub fn limits_for(kind: CallKind) -> CapacityLimits {
    match kind {
        CallKind::Global => CapacityLimits {
            user_limit: 10,
            speaker_limit: 5,
        },
        CallKind::Clan | CallKind::Federation => CapacityLimits {
            user_limit: 30,
            speaker_limit: 5,
        },
        CallKind::Private => CapacityLimits {
            user_limit: 2,
            speaker_limit: 2,
        },
    }
}
