use std::fmt;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Label used when there is nothing to derive a title from.
pub const UNTITLED_CHAT: &str = "Untitled Chat";

// =============================================================================
// Newtype Wrappers - Identity
// =============================================================================

/// Unique identifier for a chat message. Unique within a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Unique identifier for a committed conversation. Unique across the record store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub Uuid);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s.trim()).ok().map(Self)
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// =============================================================================
// Enums
// =============================================================================

/// Who authored a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

// =============================================================================
// Messages
// =============================================================================

/// One decoded item of an answer. A single question may fan out into several
/// of these (a summary followed by per-product results).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplyItem {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<String>,
}

impl ReplyItem {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

/// A single chat message.
///
/// User messages carry `question_text`; assistant messages carry
/// `answer_text` and optionally an image, a match score and a confidence
/// label. Assistant messages point back at the user message they answer
/// through `reply_to`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    #[serde(default)]
    pub question_text: String,
    #[serde(default)]
    pub answer_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub like_count: u32,
    #[serde(default)]
    pub dislike_count: u32,
    #[serde(default)]
    pub liked: bool,
    #[serde(default)]
    pub disliked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<MessageId>,
}

impl Message {
    /// Create a user-role message with a fresh id.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            role: Role::User,
            question_text: text.into(),
            answer_text: String::new(),
            image_ref: None,
            match_score: None,
            confidence: None,
            timestamp: Utc::now(),
            like_count: 0,
            dislike_count: 0,
            liked: false,
            disliked: false,
            reply_to: None,
        }
    }

    /// Create an assistant-role message from a decoded reply item.
    pub fn assistant(item: ReplyItem, reply_to: Option<MessageId>) -> Self {
        Self {
            id: MessageId::new(),
            role: Role::Assistant,
            question_text: String::new(),
            answer_text: item.text,
            image_ref: item.image_ref,
            match_score: item.match_score,
            confidence: item.confidence,
            timestamp: Utc::now(),
            like_count: 0,
            dislike_count: 0,
            liked: false,
            disliked: false,
            reply_to,
        }
    }

    /// The text a reader sees for this message.
    pub fn text(&self) -> &str {
        match self.role {
            Role::User => &self.question_text,
            Role::Assistant => &self.answer_text,
        }
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }

    /// Toggle the "like" flag. Clears a prior dislike.
    pub fn toggle_like(&mut self) {
        if self.liked {
            self.liked = false;
            self.like_count = self.like_count.saturating_sub(1);
            return;
        }
        self.liked = true;
        self.like_count = self.like_count.saturating_add(1);
        if self.disliked {
            self.disliked = false;
            self.dislike_count = self.dislike_count.saturating_sub(1);
        }
    }

    /// Toggle the "dislike" flag. Clears a prior like.
    pub fn toggle_dislike(&mut self) {
        if self.disliked {
            self.disliked = false;
            self.dislike_count = self.dislike_count.saturating_sub(1);
            return;
        }
        self.disliked = true;
        self.dislike_count = self.dislike_count.saturating_add(1);
        if self.liked {
            self.liked = false;
            self.like_count = self.like_count.saturating_sub(1);
        }
    }
}

/// Text of the first user message in `messages`, if any.
pub fn first_user_text(messages: &[Message]) -> Option<&str> {
    messages.iter().find(|m| m.is_user()).map(|m| m.question_text.as_str())
}

/// Assistant messages that answer the user message `user_id`, in render order.
pub fn replies_to(messages: &[Message], user_id: MessageId) -> impl Iterator<Item = &Message> {
    messages
        .iter()
        .filter(move |m| m.role == Role::Assistant && m.reply_to == Some(user_id))
}

/// Timestamp-derived title used until a generated title replaces it.
pub fn default_title(started_at: DateTime<Utc>) -> String {
    format!(
        "Chat on {}",
        started_at.with_timezone(&Local).format("%Y-%m-%d %H:%M")
    )
}

// =============================================================================
// Conversations
// =============================================================================

/// A committed chat record.
///
/// Whether a conversation is the current one is tracked by the record store,
/// not stored on the record itself.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub title: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub last_saved_at: DateTime<Utc>,
}

impl Conversation {
    /// Build a conversation from messages, saved now.
    pub fn new(id: ConversationId, title: impl Into<String>, messages: Vec<Message>) -> Self {
        let now = Utc::now();
        let mut title = title.into();
        if title.trim().is_empty() {
            title = UNTITLED_CHAT.to_string();
        }
        Self {
            id,
            title,
            messages,
            created_at: now,
            last_saved_at: now,
        }
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn user_message_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_user()).count()
    }

    pub fn first_user_text(&self) -> Option<&str> {
        first_user_text(&self.messages)
    }
}
