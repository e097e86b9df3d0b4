//! Read-only target directory.
//!
//! Whether a callee or a channel exists is owned by the wider system
//! (member records, channel records); the engine only ever asks existence
//! and voice-capability questions at `initiate` time. `TargetDirectory` is
//! that seam; [`StaticDirectory`] is the in-process implementation the
//! embedding service keeps in sync.

use common::types::{ChannelId, UserId};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use crate::model::ChannelKind;

/// Directory view of one clan/federation channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelEntry {
    pub kind: ChannelKind,
    /// Text-only channels exist in the wider system; they cannot host
    /// calls.
    pub voice: bool,
}

/// Existence/capability queries the engine performs before creating a
/// session. Read-only by contract.
pub trait TargetDirectory: Send + Sync {
    /// Whether a user with this id is known.
    fn user_exists(&self, user_id: UserId) -> bool;

    /// The channel with this id, if known.
    fn channel(&self, channel_id: ChannelId) -> Option<ChannelEntry>;
}

/// In-memory directory, safe for concurrent lookup alongside updates.
///
/// A poisoned lock degrades to "not found".
#[derive(Debug, Default)]
pub struct StaticDirectory {
    users: RwLock<HashSet<UserId>>,
    channels: RwLock<HashMap<ChannelId, ChannelEntry>>,
}

impl StaticDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_user(&self, user_id: UserId) {
        if let Ok(mut users) = self.users.write() {
            users.insert(user_id);
        }
    }

    pub fn remove_user(&self, user_id: UserId) {
        if let Ok(mut users) = self.users.write() {
            users.remove(&user_id);
        }
    }

    pub fn register_channel(&self, channel_id: ChannelId, entry: ChannelEntry) {
        if let Ok(mut channels) = self.channels.write() {
            channels.insert(channel_id, entry);
        }
    }

    pub fn remove_channel(&self, channel_id: ChannelId) {
        if let Ok(mut channels) = self.channels.write() {
            channels.remove(&channel_id);
        }
    }
}

impl TargetDirectory for StaticDirectory {
    fn user_exists(&self, user_id: UserId) -> bool {
        self.users
            .read()
            .map(|users| users.contains(&user_id))
            .unwrap_or(false)
    }

    fn channel(&self, channel_id: ChannelId) -> Option<ChannelEntry> {
        self.channels
            .read()
            .ok()
            .and_then(|channels| channels.get(&channel_id).copied())
    }
}
