use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::ConversationId;

/// Change notifications emitted by the record store.
///
/// Observers (sidebar renderers, persistence triggers, logs) subscribe to
/// these instead of polling shared state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum StoreEvent {
    /// A conversation was inserted or replaced.
    ConversationSaved {
        id: ConversationId,
        message_count: usize,
        created: bool,
        timestamp: DateTime<Utc>,
    },

    /// A conversation was removed.
    ConversationDeleted {
        id: ConversationId,
        timestamp: DateTime<Utc>,
    },

    /// The current conversation changed. `None` means no conversation is current.
    CurrentChanged {
        id: Option<ConversationId>,
        timestamp: DateTime<Utc>,
    },

    /// A conversation received a new title.
    TitleUpdated {
        id: ConversationId,
        title: String,
        timestamp: DateTime<Utc>,
    },
}

impl StoreEvent {
    /// Returns the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            StoreEvent::ConversationSaved { timestamp, .. }
            | StoreEvent::ConversationDeleted { timestamp, .. }
            | StoreEvent::CurrentChanged { timestamp, .. }
            | StoreEvent::TitleUpdated { timestamp, .. } => *timestamp,
        }
    }

    /// Returns a human-readable event name for logging.
    pub fn event_name(&self) -> &'static str {
        match self {
            StoreEvent::ConversationSaved { .. } => "conversation_saved",
            StoreEvent::ConversationDeleted { .. } => "conversation_deleted",
            StoreEvent::CurrentChanged { .. } => "current_changed",
            StoreEvent::TitleUpdated { .. } => "title_updated",
        }
    }
}
