//! Archive of terminal sessions and the per-user history projection.
//!
//! Sessions land here exactly once, when they go terminal; the archive is
//! read directly (no actor mailbox in the path) so history queries never
//! contend with live call traffic.

use chrono::{DateTime, Utc};
use common::types::{ChannelId, SessionId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::RwLock;
use tracing::warn;

use crate::model::{CallKind, CallSession, CallStatus};

/// Upper bound on retained terminal sessions; the oldest record is evicted
/// past this.
pub const ARCHIVE_CAPACITY: usize = 10_000;

/// Hard cap on history page size.
pub const MAX_PAGE_SIZE: usize = 50;

/// One row of a user's call history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSummary {
    pub id: SessionId,
    pub kind: CallKind,
    pub owner_id: UserId,
    pub context_ref: Option<ChannelId>,
    pub status: CallStatus,
    pub participant_count: usize,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
}

impl From<&CallSession> for CallSummary {
    fn from(session: &CallSession) -> Self {
        Self {
            id: session.id,
            kind: session.kind,
            owner_id: session.owner_id,
            context_ref: session.context_ref,
            status: session.status,
            participant_count: session.participants.len(),
            start_time: session.start_time,
            end_time: session.end_time,
            duration_seconds: session.duration_seconds,
        }
    }
}

/// In-memory store of ended/rejected sessions.
#[derive(Debug)]
pub struct CallArchive {
    sessions: RwLock<VecDeque<CallSession>>,
    capacity: usize,
    max_page_size: usize,
}

impl Default for CallArchive {
    fn default() -> Self {
        Self::new()
    }
}

impl CallArchive {
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(ARCHIVE_CAPACITY, MAX_PAGE_SIZE)
    }

    #[must_use]
    pub fn with_limits(capacity: usize, max_page_size: usize) -> Self {
        Self {
            sessions: RwLock::new(VecDeque::new()),
            capacity,
            max_page_size: max_page_size.max(1),
        }
    }

    /// Store a terminal session. Non-terminal snapshots are refused.
    pub async fn record(&self, session: CallSession) {
        if !session.status.is_terminal() {
            warn!(
                target: "vc.history",
                session_id = %session.id,
                status = %session.status,
                "refusing to archive non-terminal session"
            );
            return;
        }
        let mut sessions = self.sessions.write().await;
        if sessions.len() >= self.capacity {
            sessions.pop_front();
        }
        sessions.push_back(session);
    }

    /// Full archived snapshot, if this session has gone terminal.
    pub async fn get(&self, session_id: SessionId) -> Option<CallSession> {
        let sessions = self.sessions.read().await;
        sessions.iter().find(|s| s.id == session_id).cloned()
    }

    /// Number of archived sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Sessions where `user_id` was owner or participant, newest
    /// `start_time` first; sessions that never started (rejected while
    /// pending) sort last. `page` is 1-based; `limit` 0 means the default
    /// page size, and every request is capped at the archive's page limit.
    pub async fn history(&self, user_id: UserId, page: usize, limit: usize) -> Vec<CallSummary> {
        let limit = if limit == 0 {
            self.max_page_size
        } else {
            limit.min(self.max_page_size)
        };
        let page = page.max(1);

        let sessions = self.sessions.read().await;
        let mut matches: Vec<CallSummary> = sessions
            .iter()
            .filter(|s| {
                s.owner_id == user_id || s.participants.iter().any(|p| p.user_id == user_id)
            })
            .map(CallSummary::from)
            .collect();
        matches.sort_by_key(|s| {
            std::cmp::Reverse(s.start_time.unwrap_or(DateTime::<Utc>::MIN_UTC))
        });
        matches
            .into_iter()
            .skip((page - 1).saturating_mul(limit))
            .take(limit)
            .collect()
    }
}
