//! Analyst conversations kept between REST requests.
//!
//! ## Eviction
//!
//! Conversations idle longer than the configured cutoff are dropped on the
//! next insert. When the store is still full, the least-recently-used
//! conversation is evicted.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use imint::Conversation;
use uuid::Uuid;

/// Default maximum number of stored conversations.
pub const DEFAULT_MAX_CONVERSATIONS: usize = 256;

/// Default idle cutoff, in seconds.
pub const DEFAULT_IDLE_SECS: u64 = 3600;

struct Entry {
    conversation: Conversation,
    last_used: Instant,
}

/// Bounded map of idle conversations keyed by id.
///
/// A conversation in use by a request is taken out with [`take`](Self::take)
/// and handed back with [`put`](Self::put).
pub struct ConversationStore {
    entries: HashMap<Uuid, Entry>,
    max_entries: usize,
    idle_ttl: Duration,
}

impl ConversationStore {
    pub fn new(max_entries: usize, idle_ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            max_entries: max_entries.max(1),
            idle_ttl,
        }
    }

    /// Remove and return the conversation `id`. Expired conversations are
    /// treated as absent.
    pub fn take(&mut self, id: &Uuid) -> Option<Conversation> {
        let entry = self.entries.remove(id)?;
        if entry.last_used.elapsed() > self.idle_ttl {
            tracing::debug!("conversation {id} expired");
            return None;
        }
        Some(entry.conversation)
    }

    /// Store `conversation` under `id`, evicting to stay within capacity.
    pub fn put(&mut self, id: Uuid, conversation: Conversation) {
        self.cleanup_expired();
        while self.entries.len() >= self.max_entries && !self.entries.contains_key(&id) {
            let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| *k)
            else {
                break;
            };
            tracing::debug!("evicting conversation {oldest}");
            self.entries.remove(&oldest);
        }
        self.entries.insert(
            id,
            Entry {
                conversation,
                last_used: Instant::now(),
            },
        );
    }

    /// Drop every conversation idle longer than the cutoff.
    pub fn cleanup_expired(&mut self) {
        let ttl = self.idle_ttl;
        self.entries.retain(|_, e| e.last_used.elapsed() <= ttl);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.entries.contains_key(id)
    }
}
