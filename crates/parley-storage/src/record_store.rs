//! The set of saved conversations.
//!
//! Pure in-memory container with a defined mutation API. Observers subscribe
//! to [`StoreEvent`]s instead of reading shared state. Ordering is by
//! `created_at`, most recent first, re-established after every mutation.

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::debug;

use parley_core::error::ParleyError;
use parley_core::events::StoreEvent;
use parley_core::types::{Conversation, ConversationId, Message};

/// Capacity of the observer channel. Slow observers lag rather than block.
const EVENT_CAPACITY: usize = 64;

/// Saved conversations plus the id of the current one.
///
/// Holds the only copy of the "current" marker, so at most one conversation
/// can ever be current.
pub struct RecordStore {
    conversations: Vec<Conversation>,
    current: Option<ConversationId>,
    events: broadcast::Sender<StoreEvent>,
}

/// Saved state for rolling back a multi-step operation.
#[derive(Clone, Debug)]
pub struct StoreCheckpoint {
    conversations: Vec<Conversation>,
    current: Option<ConversationId>,
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            conversations: Vec::new(),
            current: None,
            events,
        }
    }

    /// Build a store from previously persisted conversations.
    ///
    /// Later duplicates of an id are dropped.
    pub fn from_conversations(conversations: Vec<Conversation>) -> Self {
        let mut store = Self::new();
        for conv in conversations {
            if store.find(conv.id).is_some() {
                debug!(id = %conv.id, "Dropping duplicate conversation on load");
                continue;
            }
            store.conversations.push(conv);
        }
        store.sort();
        store
    }

    /// Receive a notification for every subsequent mutation.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// All conversations, most recent first.
    pub fn list(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    pub fn find(&self, id: ConversationId) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    pub fn contains(&self, id: ConversationId) -> bool {
        self.find(id).is_some()
    }

    /// Number of messages recorded under `id` at its last commit.
    pub fn message_count(&self, id: ConversationId) -> Option<usize> {
        self.find(id).map(Conversation::message_count)
    }

    /// Replace the conversation with the same id in place, or insert it at
    /// the head. Returns `true` when a new record was created.
    pub fn upsert(&mut self, conversation: Conversation) -> bool {
        let id = conversation.id;
        let message_count = conversation.message_count();
        let created = match self.conversations.iter_mut().find(|c| c.id == id) {
            Some(existing) => {
                *existing = conversation;
                false
            }
            None => {
                self.conversations.insert(0, conversation);
                true
            }
        };
        self.sort();
        self.emit(StoreEvent::ConversationSaved {
            id,
            message_count,
            created,
            timestamp: Utc::now(),
        });
        created
    }

    /// Insert a conversation whose id must not exist yet.
    pub fn insert_new(&mut self, conversation: Conversation) -> Result<(), ParleyError> {
        if self.contains(conversation.id) {
            return Err(ParleyError::Invariant(format!(
                "conversation {} already exists",
                conversation.id
            )));
        }
        self.upsert(conversation);
        Ok(())
    }

    /// Overwrite the title of an existing conversation.
    pub fn rename(&mut self, id: ConversationId, title: &str) -> bool {
        let title = title.trim();
        if title.is_empty() {
            return false;
        }
        let Some(conv) = self.conversations.iter_mut().find(|c| c.id == id) else {
            return false;
        };
        conv.title = title.to_string();
        self.emit(StoreEvent::TitleUpdated {
            id,
            title: title.to_string(),
            timestamp: Utc::now(),
        });
        true
    }

    /// Overwrite one message of a stored conversation in place.
    ///
    /// Used for reactions on an already-committed message: neither ordering
    /// nor `last_saved_at` changes, and no event is emitted.
    pub fn update_message(&mut self, id: ConversationId, message: &Message) -> bool {
        let Some(conv) = self.conversations.iter_mut().find(|c| c.id == id) else {
            return false;
        };
        match conv.messages.iter_mut().find(|m| m.id == message.id) {
            Some(slot) => {
                *slot = message.clone();
                true
            }
            None => false,
        }
    }

    /// Remove a conversation. Unknown ids are a no-op returning `None`.
    pub fn delete(&mut self, id: ConversationId) -> Option<Conversation> {
        let pos = self.conversations.iter().position(|c| c.id == id)?;
        let removed = self.conversations.remove(pos);
        self.emit(StoreEvent::ConversationDeleted {
            id,
            timestamp: Utc::now(),
        });
        if self.current == Some(id) {
            self.current = None;
            self.emit(StoreEvent::CurrentChanged {
                id: None,
                timestamp: Utc::now(),
            });
        }
        Some(removed)
    }

    /// Mark `id` as the current conversation. No-op if `id` is unknown.
    pub fn set_current(&mut self, id: ConversationId) -> bool {
        if !self.contains(id) {
            return false;
        }
        if self.current != Some(id) {
            self.current = Some(id);
            self.emit(StoreEvent::CurrentChanged {
                id: Some(id),
                timestamp: Utc::now(),
            });
        }
        true
    }

    /// Leave no conversation marked current.
    pub fn clear_current(&mut self) {
        if self.current.take().is_some() {
            self.emit(StoreEvent::CurrentChanged {
                id: None,
                timestamp: Utc::now(),
            });
        }
    }

    pub fn current(&self) -> Option<ConversationId> {
        self.current
    }

    pub fn is_current(&self, id: ConversationId) -> bool {
        self.current == Some(id)
    }

    pub fn checkpoint(&self) -> StoreCheckpoint {
        StoreCheckpoint {
            conversations: self.conversations.clone(),
            current: self.current,
        }
    }

    /// Restore a checkpoint. Observers are not notified of the rollback.
    pub fn rollback(&mut self, checkpoint: StoreCheckpoint) {
        self.conversations = checkpoint.conversations;
        self.current = checkpoint.current;
    }

    fn sort(&mut self) {
        // Stable: equal timestamps keep their insertion order.
        self.conversations
            .sort_by(|a, b| b.created_at.cmp(&a.created_at));
    }

    fn emit(&self, event: StoreEvent) {
        debug!(event = event.event_name(), "Record store changed");
        // No receivers is fine.
        let _ = self.events.send(event);
    }
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("len", &self.conversations.len())
            .field("current", &self.current)
            .finish()
    }
}
