//! Durable snapshots of the active session and the saved conversations.
//!
//! Every flush rebuilds the full snapshot and writes it in one atomic
//! `set_many`; nothing is patched in place. Writes are best-effort: a failing
//! store is logged and the in-memory state stays authoritative.

use std::sync::Arc;

use tracing::{debug, info, warn};

use parley_core::config::UiConfig;
use parley_core::types::{Conversation, ConversationId, Message};

use crate::kv::KeyValueStore;

pub const KEY_ACTIVE_MESSAGES: &str = "parley.active_messages";
pub const KEY_ACTIVE_CONVERSATION: &str = "parley.active_conversation_id";
pub const KEY_CONVERSATIONS: &str = "parley.conversations";
pub const KEY_SEARCH_TEXT: &str = "parley.search_text";
pub const KEY_SIDEBAR_WIDTH: &str = "parley.sidebar_width";

/// Stored in place of a conversation id when the active session is unsaved.
pub const NO_ACTIVE_CONVERSATION: &str = "none";

/// Everything needed to rebuild the session after a restart.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub messages: Vec<Message>,
    pub active_id: Option<ConversationId>,
    pub conversations: Vec<Conversation>,
}

/// Reads and writes [`SessionSnapshot`]s and UI preferences.
pub struct PersistenceLayer {
    kv: Arc<dyn KeyValueStore>,
    ui: UiConfig,
}

impl PersistenceLayer {
    pub fn new(kv: Arc<dyn KeyValueStore>, ui: UiConfig) -> Self {
        Self { kv, ui }
    }

    /// Write the full snapshot. Returns `false` if the store rejected it.
    pub fn flush(&self, snapshot: &SessionSnapshot) -> bool {
        let encoded = match encode(snapshot) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Failed to encode session snapshot");
                return false;
            }
        };
        let entries: Vec<(&str, String)> = vec![
            (KEY_ACTIVE_MESSAGES, encoded.0),
            (KEY_ACTIVE_CONVERSATION, encoded.1),
            (KEY_CONVERSATIONS, encoded.2),
        ];
        match self.kv.set_many(&entries) {
            Ok(()) => {
                debug!(
                    messages = snapshot.messages.len(),
                    conversations = snapshot.conversations.len(),
                    "Session snapshot flushed"
                );
                true
            }
            Err(e) => {
                warn!(error = %e, "Session snapshot flush failed; keeping in-memory state");
                false
            }
        }
    }

    /// Read the last flushed snapshot.
    ///
    /// Missing or unreadable parts come back empty. An active id that no
    /// longer names a saved conversation is dropped, leaving the restored
    /// messages as an unsaved session.
    pub fn restore(&self) -> SessionSnapshot {
        let conversations: Vec<Conversation> = self.read_json(KEY_CONVERSATIONS).unwrap_or_default();
        let messages: Vec<Message> = self.read_json(KEY_ACTIVE_MESSAGES).unwrap_or_default();

        let mut active_id = self
            .read(KEY_ACTIVE_CONVERSATION)
            .filter(|raw| raw.trim() != NO_ACTIVE_CONVERSATION)
            .and_then(|raw| {
                let parsed = ConversationId::parse(&raw);
                if parsed.is_none() {
                    warn!(value = %raw, "Ignoring malformed active conversation id");
                }
                parsed
            });

        if let Some(id) = active_id {
            if !conversations.iter().any(|c| c.id == id) {
                warn!(id = %id, "Active conversation missing from saved set; restoring as unsaved");
                active_id = None;
            }
        }

        info!(
            messages = messages.len(),
            conversations = conversations.len(),
            active = active_id.is_some(),
            "Session snapshot restored"
        );

        SessionSnapshot {
            messages,
            active_id,
            conversations,
        }
    }

    pub fn save_search_text(&self, text: &str) -> bool {
        self.write(KEY_SEARCH_TEXT, text)
    }

    pub fn load_search_text(&self) -> String {
        self.read(KEY_SEARCH_TEXT).unwrap_or_default()
    }

    /// Persist a sidebar width, clamped to the configured range.
    /// Returns the width actually stored.
    pub fn save_sidebar_width(&self, width: u32) -> u32 {
        let width = self.ui.clamp_width(width);
        self.write(KEY_SIDEBAR_WIDTH, &width.to_string());
        width
    }

    pub fn load_sidebar_width(&self) -> u32 {
        self.read(KEY_SIDEBAR_WIDTH)
            .and_then(|raw| raw.trim().parse::<u32>().ok())
            .map(|w| self.ui.clamp_width(w))
            .unwrap_or(self.ui.sidebar_width)
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.kv.get(key) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Durable storage read failed");
                None
            }
        }
    }

    fn read_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.read(key)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "Discarding unreadable snapshot entry");
                None
            }
        }
    }

    fn write(&self, key: &str, value: &str) -> bool {
        match self.kv.set(key, value) {
            Ok(()) => true,
            Err(e) => {
                warn!(key, error = %e, "Durable storage write failed");
                false
            }
        }
    }
}

fn encode(snapshot: &SessionSnapshot) -> serde_json::Result<(String, String, String)> {
    let messages = serde_json::to_string(&snapshot.messages)?;
    let active = snapshot
        .active_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| NO_ACTIVE_CONVERSATION.to_string());
    let conversations = serde_json::to_string(&snapshot.conversations)?;
    Ok((messages, active, conversations))
}
