//! Session controller: the state machine around the chat being edited.
//!
//! Owns the active message list and the record store, and decides when the
//! active session is committed into a conversation record. Asynchronous work
//! (answers, titles) is correlated through tickets so a late result can never
//! land in a session the user has already left.
//!
//! ```text
//! Empty --append--> Active --commit--> Committed(id)
//!   ^                  |                    |
//!   +---- new chat ----+--------------------+
//! ```

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use parley_core::config::SessionConfig;
use parley_core::error::ParleyError;
use parley_core::types::{
    default_title, first_user_text, Conversation, ConversationId, Message, MessageId, ReplyItem,
    UNTITLED_CHAT,
};
use parley_storage::persistence::SessionSnapshot;
use parley_storage::record_store::{RecordStore, StoreCheckpoint};

use crate::error::ChatError;

// =============================================================================
// Tickets and outcomes
// =============================================================================

/// Identifies one incarnation of the active session.
///
/// Bumped on every switch, new chat and deletion of the active conversation.
/// Results tagged with an older token are stale.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionToken(u64);

/// An outstanding question.
#[derive(Clone, Debug)]
pub struct TurnTicket {
    pub token: SessionToken,
    pub user_message: MessageId,
    pub question: String,
}

/// A title request for a freshly committed conversation.
///
/// Applied by conversation id rather than checked against the active
/// session: a title issued on commit-before-switch always resolves after its
/// conversation has stopped being active.
#[derive(Clone, Debug, PartialEq)]
pub struct TitleTicket {
    pub conversation_id: ConversationId,
    pub seed: Option<String>,
    pub started_at: DateTime<Utc>,
}

/// Something the front end shows once and lets the user dismiss.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub message: String,
}

impl Notification {
    pub fn from_error(err: &ChatError) -> Self {
        let message = if err.is_transient() {
            "The assistant is unavailable right now. Please ask again in a moment.".to_string()
        } else {
            format!("The assistant could not answer: {}", err)
        };
        Self { message }
    }
}

/// How a completed question was applied.
#[derive(Clone, Debug, PartialEq)]
pub enum TurnOutcome {
    /// Replies were appended to the session.
    Applied { replies: usize },
    /// The call failed; a fallback reply was appended.
    Failed(Notification),
    /// The session changed while the call was outstanding; the result was dropped.
    Stale,
}

/// Result of a navigation request.
#[derive(Clone, Debug, PartialEq)]
pub enum Transition {
    Unchanged,
    /// The session changed. A conversation committed on the way out may
    /// still need its title generated.
    Changed { title: Option<TitleTicket> },
}

impl Transition {
    pub fn changed(&self) -> bool {
        matches!(self, Transition::Changed { .. })
    }

    pub fn title_ticket(self) -> Option<TitleTicket> {
        match self {
            Transition::Changed { title } => title,
            Transition::Unchanged => None,
        }
    }
}

/// Externally visible controller state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// No messages and no conversation.
    Empty,
    /// Unsaved messages.
    Active,
    /// Bound to a stored conversation.
    Committed(ConversationId),
    /// Mid save-then-load.
    Switching,
}

struct SessionCheckpoint {
    messages: Vec<Message>,
    active_id: Option<ConversationId>,
    started_at: Option<DateTime<Utc>>,
}

// =============================================================================
// SessionController
// =============================================================================

pub struct SessionController {
    store: RecordStore,
    messages: Vec<Message>,
    active_id: Option<ConversationId>,
    started_at: Option<DateTime<Utc>>,
    epoch: u64,
    in_flight: Option<MessageId>,
    switching: bool,
    config: SessionConfig,
}

impl SessionController {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            store: RecordStore::new(),
            messages: Vec::new(),
            active_id: None,
            started_at: None,
            epoch: 0,
            in_flight: None,
            switching: false,
            config,
        }
    }

    /// Rebuild a controller from a restored snapshot.
    pub fn restore(snapshot: SessionSnapshot, config: SessionConfig) -> Self {
        let mut store = RecordStore::from_conversations(snapshot.conversations);
        let active_id = snapshot.active_id.filter(|id| store.set_current(*id));
        let started_at = snapshot.messages.first().map(|m| m.timestamp);
        info!(
            messages = snapshot.messages.len(),
            conversations = store.len(),
            committed = active_id.is_some(),
            "Session restored"
        );
        Self {
            store,
            messages: snapshot.messages,
            active_id,
            started_at,
            epoch: 0,
            in_flight: None,
            switching: false,
            config,
        }
    }

    // -- Read access --

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn active_id(&self) -> Option<ConversationId> {
        self.active_id
    }

    pub fn token(&self) -> SessionToken {
        SessionToken(self.epoch)
    }

    pub fn is_sending(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn state(&self) -> SessionState {
        if self.switching {
            return SessionState::Switching;
        }
        match self.active_id {
            Some(id) => SessionState::Committed(id),
            None if self.messages.is_empty() => SessionState::Empty,
            None => SessionState::Active,
        }
    }

    /// Whether the active session holds more messages than were recorded for
    /// it at its last commit. Equal counts never trigger a save.
    pub fn has_unsaved_growth(&self) -> bool {
        let saved = self
            .active_id
            .and_then(|id| self.store.message_count(id))
            .unwrap_or(0);
        !self.messages.is_empty() && self.messages.len() > saved
    }

    /// Everything the persistence layer writes on a flush.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            messages: self.messages.clone(),
            active_id: self.active_id,
            conversations: self.store.list().to_vec(),
        }
    }

    // -- Messages --

    /// Append a user message. Returns `None` (and changes nothing) for
    /// blank or over-long text, or while a question is outstanding.
    pub fn append_user_message(&mut self, text: &str) -> Option<MessageId> {
        let text = text.trim();
        if text.is_empty() || self.in_flight.is_some() {
            return None;
        }
        if text.chars().count() > self.config.max_message_length {
            debug!(limit = self.config.max_message_length, "Rejecting over-long message");
            return None;
        }
        let message = Message::user(text);
        let id = message.id;
        if self.messages.is_empty() {
            self.started_at = Some(message.timestamp);
        }
        self.messages.push(message);
        debug!(message_id = %id, count = self.messages.len(), "User message appended");
        Some(id)
    }

    /// Append replies to the most recent user message. An empty `items`
    /// appends the configured fallback answer instead, so every turn is
    /// answered. Returns how many messages were appended.
    pub fn append_assistant_replies(&mut self, items: Vec<ReplyItem>) -> usize {
        let reply_to = self
            .messages
            .iter()
            .rev()
            .find(|m| m.is_user())
            .map(|m| m.id);
        self.append_replies(items, reply_to)
    }

    fn append_replies(&mut self, items: Vec<ReplyItem>, reply_to: Option<MessageId>) -> usize {
        let items = if items.is_empty() {
            vec![ReplyItem::text(self.config.fallback_answer.clone())]
        } else {
            items
        };
        let count = items.len();
        self.messages
            .extend(items.into_iter().map(|item| Message::assistant(item, reply_to)));
        debug!(replies = count, "Assistant replies appended");
        count
    }

    /// Append a user message and mark it as awaiting an answer.
    pub fn begin_turn(&mut self, text: &str) -> Option<TurnTicket> {
        let user_message = self.append_user_message(text)?;
        self.in_flight = Some(user_message);
        Some(TurnTicket {
            token: self.token(),
            user_message,
            question: text.trim().to_string(),
        })
    }

    /// Apply the result of a question issued by [`SessionController::begin_turn`].
    pub fn complete_turn(
        &mut self,
        ticket: TurnTicket,
        result: Result<Vec<ReplyItem>, ChatError>,
    ) -> TurnOutcome {
        if ticket.token != self.token() {
            debug!(message_id = %ticket.user_message, "Dropping answer for a session that is no longer active");
            return TurnOutcome::Stale;
        }
        self.in_flight = None;
        match result {
            Ok(items) => TurnOutcome::Applied {
                replies: self.append_replies(items, Some(ticket.user_message)),
            },
            Err(e) => {
                warn!(error = %e, "Question failed");
                self.append_replies(Vec::new(), Some(ticket.user_message));
                TurnOutcome::Failed(Notification::from_error(&e))
            }
        }
    }

    /// Toggle "like" on an active-session message. Unknown ids are a no-op.
    pub fn toggle_like(&mut self, message_id: MessageId) -> bool {
        self.react(message_id, Message::toggle_like)
    }

    /// Toggle "dislike" on an active-session message. Unknown ids are a no-op.
    pub fn toggle_dislike(&mut self, message_id: MessageId) -> bool {
        self.react(message_id, Message::toggle_dislike)
    }

    fn react(&mut self, message_id: MessageId, toggle: fn(&mut Message)) -> bool {
        let Some(message) = self.messages.iter_mut().find(|m| m.id == message_id) else {
            return false;
        };
        toggle(message);
        // Keep an already-committed copy in step.
        if let Some(id) = self.active_id {
            self.store.update_message(id, message);
        }
        true
    }

    // -- Navigation --

    /// Commit any unsaved growth, then load `target` as the active session.
    ///
    /// A no-op when `target` is already active or does not exist. On error
    /// the session and store are rolled back to their prior state.
    pub fn request_switch(&mut self, target: ConversationId) -> Result<Transition, ParleyError> {
        if self.active_id == Some(target) {
            return Ok(Transition::Unchanged);
        }
        let Some(conversation) = self.store.find(target) else {
            debug!(id = %target, "Ignoring switch to unknown conversation");
            return Ok(Transition::Unchanged);
        };
        let messages = conversation.messages.clone();
        let started_at = conversation.messages.first().map(|m| m.timestamp);

        self.atomically(|this| {
            let title = this.commit()?;
            this.messages = messages;
            this.active_id = Some(target);
            this.started_at = started_at;
            this.store.set_current(target);
            this.next_session();
            info!(id = %target, messages = this.messages.len(), "Switched conversation");
            Ok(Transition::Changed { title })
        })
    }

    /// Commit any unsaved growth, then clear the active session.
    pub fn start_new_chat(&mut self) -> Result<Transition, ParleyError> {
        if self.messages.is_empty() && self.active_id.is_none() && self.store.current().is_none() {
            return Ok(Transition::Unchanged);
        }
        self.atomically(|this| {
            let title = this.commit()?;
            this.clear_session();
            this.store.clear_current();
            info!("Started new chat");
            Ok(Transition::Changed { title })
        })
    }

    /// Delete a stored conversation. Deleting the active one also clears
    /// the session. Unknown ids are a no-op returning `false`.
    pub fn delete_conversation(&mut self, id: ConversationId) -> bool {
        if self.store.delete(id).is_none() {
            return false;
        }
        if self.active_id == Some(id) {
            self.clear_session();
        }
        info!(id = %id, "Conversation deleted");
        true
    }

    /// Overwrite the title of the conversation a ticket was issued for.
    ///
    /// The result only ever touches that conversation. If it has since been
    /// deleted the title is dropped.
    pub fn apply_title(&mut self, ticket: &TitleTicket, title: &str) -> bool {
        let applied = self.store.rename(ticket.conversation_id, title);
        if applied {
            debug!(id = %ticket.conversation_id, title, "Title applied");
        } else {
            debug!(id = %ticket.conversation_id, "Dropping title for missing conversation");
        }
        applied
    }

    /// Commit unsaved growth with the default title, without waiting on any
    /// remote call. Used right before the final flush.
    pub fn commit_on_unload(&mut self) -> bool {
        if !self.has_unsaved_growth() {
            return false;
        }
        match self.atomically(|this| this.commit()) {
            Ok(_) => {
                info!(id = ?self.active_id, "Committed session on unload");
                true
            }
            Err(e) => {
                warn!(error = %e, "Commit on unload failed");
                false
            }
        }
    }

    // -- Internals --

    /// Write unsaved growth into the store.
    ///
    /// An already-committed session is upserted under its id. An unsaved one
    /// gets a fresh id and a default title, and a ticket is returned so the
    /// caller can upgrade the title later.
    fn commit(&mut self) -> Result<Option<TitleTicket>, ParleyError> {
        if !self.has_unsaved_growth() {
            return Ok(None);
        }
        let now = Utc::now();

        if let Some(existing) = self.active_id.and_then(|id| self.store.find(id)) {
            let conversation = Conversation {
                id: existing.id,
                title: existing.title.clone(),
                messages: self.messages.clone(),
                created_at: existing.created_at,
                last_saved_at: now,
            };
            debug!(id = %conversation.id, messages = conversation.messages.len(), "Committing session");
            self.store.upsert(conversation);
            return Ok(None);
        }

        let id = ConversationId::new();
        let started_at = self.started_at.unwrap_or(now);
        let seed = first_user_text(&self.messages).map(str::to_string);
        let title = match seed {
            Some(_) => default_title(started_at),
            None => UNTITLED_CHAT.to_string(),
        };
        self.store
            .insert_new(Conversation::new(id, title, self.messages.clone()))?;
        self.active_id = Some(id);
        info!(id = %id, messages = self.messages.len(), "Committed new conversation");

        Ok(seed.map(|seed| TitleTicket {
            conversation_id: id,
            seed: Some(seed),
            started_at,
        }))
    }

    /// Run a multi-step mutation, restoring session and store on error.
    fn atomically<T>(
        &mut self,
        op: impl FnOnce(&mut Self) -> Result<T, ParleyError>,
    ) -> Result<T, ParleyError> {
        let session = SessionCheckpoint {
            messages: self.messages.clone(),
            active_id: self.active_id,
            started_at: self.started_at,
        };
        let store: StoreCheckpoint = self.store.checkpoint();
        self.switching = true;
        let result = op(self);
        self.switching = false;
        if let Err(e) = &result {
            warn!(error = %e, "Session operation failed; rolling back");
            self.messages = session.messages;
            self.active_id = session.active_id;
            self.started_at = session.started_at;
            self.store.rollback(store);
        }
        result
    }

    fn clear_session(&mut self) {
        self.messages.clear();
        self.active_id = None;
        self.started_at = None;
        self.next_session();
    }

    /// Invalidate every outstanding ticket for the current session.
    fn next_session(&mut self) {
        self.epoch += 1;
        self.in_flight = None;
    }
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("state", &self.state())
            .field("messages", &self.messages.len())
            .field("conversations", &self.store.len())
            .field("epoch", &self.epoch)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> SessionController {
        SessionController::new(SessionConfig::default())
    }

    /// Ask and answer one question with `replies` reply items.
    fn turn(ctl: &mut SessionController, question: &str, replies: usize) {
        let ticket = ctl.begin_turn(question).unwrap();
        let items = (0..replies)
            .map(|i| ReplyItem::text(format!("{} reply {}", question, i)))
            .collect();
        ctl.complete_turn(ticket, Ok(items));
    }

    /// Commit the active session by starting a new chat, returning its id.
    fn commit_current(ctl: &mut SessionController) -> ConversationId {
        let before: Vec<_> = ctl.store().list().iter().map(|c| c.id).collect();
        ctl.start_new_chat().unwrap();
        ctl.store()
            .list()
            .iter()
            .map(|c| c.id)
            .find(|id| !before.contains(id))
            .unwrap()
    }

    fn current_count(ctl: &SessionController) -> usize {
        ctl.store()
            .list()
            .iter()
            .filter(|c| ctl.store().is_current(c.id))
            .count()
    }

    // ---- Appending ----

    #[test]
    fn test_blank_message_is_rejected() {
        let mut ctl = controller();
        assert!(ctl.append_user_message("   ").is_none());
        assert!(ctl.append_user_message("").is_none());
        assert!(ctl.messages().is_empty());
        assert_eq!(ctl.state(), SessionState::Empty);
    }

    #[test]
    fn test_first_message_activates_session() {
        let mut ctl = controller();
        ctl.append_user_message("Which Aperol stands exist?").unwrap();
        assert_eq!(ctl.state(), SessionState::Active);
        assert_eq!(ctl.messages()[0].question_text, "Which Aperol stands exist?");
    }

    #[test]
    fn test_over_long_message_is_rejected() {
        let mut ctl = SessionController::new(SessionConfig {
            max_message_length: 5,
            ..SessionConfig::default()
        });
        assert!(ctl.append_user_message("123456").is_none());
        assert!(ctl.append_user_message("12345").is_some());
    }

    #[test]
    fn test_send_in_flight_blocks_second_message() {
        let mut ctl = controller();
        let _ticket = ctl.begin_turn("first").unwrap();
        assert!(ctl.is_sending());
        assert!(ctl.begin_turn("second").is_none());
        assert!(ctl.append_user_message("second").is_none());
        assert_eq!(ctl.messages().len(), 1);
    }

    #[test]
    fn test_replies_follow_their_question() {
        let mut ctl = controller();
        let ticket = ctl.begin_turn("stands").unwrap();
        let outcome = ctl.complete_turn(
            ticket.clone(),
            Ok(vec![ReplyItem::text("summary"), ReplyItem::text("item")]),
        );
        assert_eq!(outcome, TurnOutcome::Applied { replies: 2 });
        assert!(!ctl.is_sending());
        let texts: Vec<_> = ctl.messages().iter().map(|m| m.text()).collect();
        assert_eq!(texts, vec!["stands", "summary", "item"]);
        assert!(ctl.messages()[1..]
            .iter()
            .all(|m| m.reply_to == Some(ticket.user_message)));
    }

    #[test]
    fn test_empty_answer_appends_fallback() {
        let mut ctl = controller();
        let ticket = ctl.begin_turn("martini").unwrap();
        assert_eq!(ctl.complete_turn(ticket, Ok(vec![])), TurnOutcome::Applied { replies: 1 });
        assert_eq!(ctl.messages().len(), 2);
        assert_eq!(ctl.messages()[1].answer_text, SessionConfig::default().fallback_answer);
    }

    #[test]
    fn test_failed_answer_keeps_question_and_notifies() {
        let mut ctl = controller();
        let ticket = ctl.begin_turn("martini").unwrap();
        let outcome = ctl.complete_turn(ticket, Err(ChatError::Transport("timeout".into())));
        assert!(matches!(outcome, TurnOutcome::Failed(_)));
        assert_eq!(ctl.messages().len(), 2);
        assert!(ctl.messages()[0].is_user());
        assert_eq!(ctl.messages()[1].answer_text, SessionConfig::default().fallback_answer);
        assert!(!ctl.is_sending());
    }

    #[test]
    fn test_append_assistant_replies_links_latest_question() {
        let mut ctl = controller();
        ctl.append_user_message("one").unwrap();
        let second = ctl.append_user_message("two").unwrap();
        assert_eq!(ctl.append_assistant_replies(vec![ReplyItem::text("a")]), 1);
        assert_eq!(ctl.messages()[2].reply_to, Some(second));
    }

    // ---- Stale answers ----

    #[test]
    fn test_answer_after_new_chat_is_stale() {
        let mut ctl = controller();
        let ticket = ctl.begin_turn("negroni").unwrap();
        ctl.start_new_chat().unwrap();
        assert!(!ctl.is_sending());

        let outcome = ctl.complete_turn(ticket, Ok(vec![ReplyItem::text("late")]));
        assert_eq!(outcome, TurnOutcome::Stale);
        assert!(ctl.messages().is_empty());
    }

    #[test]
    fn test_answer_after_switch_is_stale() {
        let mut ctl = controller();
        turn(&mut ctl, "campari", 1);
        let a = commit_current(&mut ctl);

        let ticket = ctl.begin_turn("aperol").unwrap();
        ctl.request_switch(a).unwrap();
        assert_eq!(ctl.complete_turn(ticket, Ok(vec![])), TurnOutcome::Stale);
        assert_eq!(ctl.messages().len(), 2);
    }

    // ---- Switching ----

    #[test]
    fn test_switch_commits_unsaved_growth() {
        let mut ctl = controller();
        turn(&mut ctl, "campari", 1);
        let a = commit_current(&mut ctl);
        turn(&mut ctl, "aperol", 1);

        ctl.request_switch(a).unwrap();
        assert_eq!(ctl.store().len(), 2);
        assert_eq!(ctl.active_id(), Some(a));
        assert_eq!(ctl.state(), SessionState::Committed(a));
        assert!(ctl.store().is_current(a));
    }

    #[test]
    fn test_switch_commit_before_switch_grows_record() {
        let mut ctl = controller();
        ctl.append_user_message("campari").unwrap();
        let a = commit_current(&mut ctl);
        assert_eq!(ctl.store().message_count(a), Some(1));
        turn(&mut ctl, "other", 1);
        let b = commit_current(&mut ctl);

        ctl.request_switch(a).unwrap();
        ctl.append_user_message("more").unwrap();
        ctl.append_assistant_replies(vec![ReplyItem::text("answer")]);
        assert_eq!(ctl.messages().len(), 3);

        ctl.request_switch(b).unwrap();
        assert_eq!(ctl.store().message_count(a), Some(3));
    }

    #[test]
    fn test_switch_without_growth_keeps_saved_at() {
        let mut ctl = controller();
        turn(&mut ctl, "campari", 1);
        let a = commit_current(&mut ctl);
        turn(&mut ctl, "aperol", 1);
        let b = commit_current(&mut ctl);

        ctl.request_switch(a).unwrap();
        let saved_at = ctl.store().find(a).unwrap().last_saved_at;
        ctl.request_switch(b).unwrap();
        assert_eq!(ctl.store().find(a).unwrap().last_saved_at, saved_at);
    }

    #[test]
    fn test_switch_twice_is_idempotent() {
        let mut ctl = controller();
        turn(&mut ctl, "campari", 1);
        let a = commit_current(&mut ctl);
        turn(&mut ctl, "aperol", 1);

        ctl.request_switch(a).unwrap();
        let once = ctl.snapshot();
        let token = ctl.token();
        assert_eq!(ctl.request_switch(a).unwrap(), Transition::Unchanged);
        assert_eq!(ctl.snapshot(), once);
        assert_eq!(ctl.token(), token);
    }

    #[test]
    fn test_switch_to_unknown_is_noop() {
        let mut ctl = controller();
        turn(&mut ctl, "campari", 1);
        let before = ctl.snapshot();
        assert_eq!(
            ctl.request_switch(ConversationId::new()).unwrap(),
            Transition::Unchanged
        );
        assert_eq!(ctl.snapshot(), before);
    }

    #[test]
    fn test_switch_from_unsaved_issues_title_ticket() {
        let mut ctl = controller();
        turn(&mut ctl, "campari", 1);
        let a = commit_current(&mut ctl);
        turn(&mut ctl, "Which Aperol stands?", 2);

        let ticket = ctl.request_switch(a).unwrap().title_ticket().unwrap();
        assert_eq!(ticket.seed.as_deref(), Some("Which Aperol stands?"));
        let stored = ctl.store().find(ticket.conversation_id).unwrap();
        assert_eq!(stored.title, default_title(ticket.started_at));
        assert_eq!(stored.message_count(), 3);
    }

    // ---- New chat ----

    #[test]
    fn test_new_chat_commits_and_clears() {
        let mut ctl = controller();
        turn(&mut ctl, "campari", 1);
        let transition = ctl.start_new_chat().unwrap();
        assert!(transition.changed());
        assert!(transition.title_ticket().is_some());
        assert_eq!(ctl.state(), SessionState::Empty);
        assert_eq!(ctl.store().len(), 1);
        assert_eq!(current_count(&ctl), 0);
    }

    #[test]
    fn test_new_chat_on_empty_session_is_noop() {
        let mut ctl = controller();
        assert_eq!(ctl.start_new_chat().unwrap(), Transition::Unchanged);
        assert!(ctl.store().is_empty());
    }

    #[test]
    fn test_new_chat_from_committed_without_growth() {
        let mut ctl = controller();
        turn(&mut ctl, "campari", 1);
        let a = commit_current(&mut ctl);
        ctl.request_switch(a).unwrap();

        let transition = ctl.start_new_chat().unwrap();
        assert_eq!(transition, Transition::Changed { title: None });
        assert_eq!(ctl.store().len(), 1);
        assert!(ctl.store().current().is_none());
    }

    // ---- Delete ----

    #[test]
    fn test_delete_active_clears_session() {
        let mut ctl = controller();
        turn(&mut ctl, "campari", 1);
        let a = commit_current(&mut ctl);
        ctl.request_switch(a).unwrap();

        assert!(ctl.delete_conversation(a));
        assert_eq!(ctl.state(), SessionState::Empty);
        assert!(ctl.store().is_empty());
    }

    #[test]
    fn test_delete_other_keeps_session() {
        let mut ctl = controller();
        turn(&mut ctl, "campari", 1);
        let a = commit_current(&mut ctl);
        turn(&mut ctl, "aperol", 1);

        assert!(ctl.delete_conversation(a));
        assert_eq!(ctl.messages().len(), 2);
        assert_eq!(ctl.state(), SessionState::Active);
    }

    #[test]
    fn test_delete_unknown_is_noop() {
        let mut ctl = controller();
        turn(&mut ctl, "campari", 1);
        assert!(!ctl.delete_conversation(ConversationId::new()));
        assert_eq!(ctl.messages().len(), 2);
    }

    // ---- Reactions ----

    #[test]
    fn test_like_on_disliked_swaps() {
        let mut ctl = controller();
        turn(&mut ctl, "campari", 1);
        let reply = ctl.messages()[1].id;

        assert!(ctl.toggle_dislike(reply));
        assert!(ctl.toggle_like(reply));
        let m = &ctl.messages()[1];
        assert!(m.liked && !m.disliked);
        assert_eq!((m.like_count, m.dislike_count), (1, 0));
    }

    #[test]
    fn test_reaction_on_unknown_message_is_noop() {
        let mut ctl = controller();
        turn(&mut ctl, "campari", 1);
        assert!(!ctl.toggle_like(MessageId::new()));
    }

    #[test]
    fn test_reaction_reaches_committed_record() {
        let mut ctl = controller();
        turn(&mut ctl, "campari", 1);
        let a = commit_current(&mut ctl);
        ctl.request_switch(a).unwrap();
        let reply = ctl.messages()[1].id;

        ctl.toggle_like(reply);
        assert!(!ctl.has_unsaved_growth());
        assert!(ctl.store().find(a).unwrap().messages[1].liked);
    }

    // ---- Titles ----

    #[test]
    fn test_title_applies_only_to_tagged_conversation() {
        let mut ctl = controller();
        turn(&mut ctl, "campari", 1);
        let a = commit_current(&mut ctl);
        turn(&mut ctl, "aperol", 1);
        let ticket = ctl.request_switch(a).unwrap().title_ticket().unwrap();
        let b = ticket.conversation_id;
        let a_title = ctl.store().find(a).unwrap().title.clone();

        // A title for b resolves while a is active: only b is renamed.
        assert!(ctl.apply_title(&ticket, "Aperol Stands"));
        assert_eq!(ctl.store().find(b).unwrap().title, "Aperol Stands");
        assert_eq!(ctl.store().find(a).unwrap().title, a_title);
    }

    #[test]
    fn test_title_for_deleted_conversation_is_dropped() {
        let mut ctl = controller();
        turn(&mut ctl, "campari", 1);
        let ticket = ctl.start_new_chat().unwrap().title_ticket().unwrap();
        ctl.delete_conversation(ticket.conversation_id);
        assert!(!ctl.apply_title(&ticket, "Campari"));
    }

    // ---- Unload ----

    #[test]
    fn test_commit_on_unload() {
        let mut ctl = controller();
        turn(&mut ctl, "campari", 1);
        assert!(ctl.commit_on_unload());
        let id = ctl.active_id().unwrap();
        assert_eq!(ctl.store().message_count(id), Some(2));
        assert!(ctl.store().find(id).unwrap().title.starts_with("Chat on "));
        // Nothing new to save the second time.
        assert!(!ctl.commit_on_unload());
    }

    // ---- Snapshots ----

    #[test]
    fn test_snapshot_restore_round_trip() {
        let mut ctl = controller();
        turn(&mut ctl, "campari", 2);
        let a = commit_current(&mut ctl);
        ctl.request_switch(a).unwrap();

        let snapshot = ctl.snapshot();
        let restored = SessionController::restore(snapshot.clone(), SessionConfig::default());
        assert_eq!(restored.messages(), ctl.messages());
        assert_eq!(restored.active_id(), Some(a));
        assert!(restored.store().is_current(a));
        assert_eq!(restored.snapshot(), snapshot);
    }

    #[test]
    fn test_restore_unknown_active_id_is_unsaved() {
        let snapshot = SessionSnapshot {
            messages: vec![Message::user("orphan")],
            active_id: Some(ConversationId::new()),
            conversations: vec![],
        };
        let ctl = SessionController::restore(snapshot, SessionConfig::default());
        assert_eq!(ctl.active_id(), None);
        assert_eq!(ctl.state(), SessionState::Active);
    }

    // ---- Invariants ----

    #[test]
    fn test_at_most_one_current_through_navigation() {
        let mut ctl = controller();
        let mut ids = Vec::new();
        for q in ["campari", "aperol", "negroni"] {
            turn(&mut ctl, q, 1);
            ids.push(commit_current(&mut ctl));
            assert!(current_count(&ctl) <= 1);
        }
        for id in ids.iter().chain(ids.iter().rev()) {
            ctl.request_switch(*id).unwrap();
            turn(&mut ctl, "follow-up", 1);
            assert_eq!(current_count(&ctl), 1);
        }
        ctl.start_new_chat().unwrap();
        assert_eq!(current_count(&ctl), 0);

        let mut seen = std::collections::HashSet::new();
        assert!(ctl.store().list().iter().all(|c| seen.insert(c.id)));
    }

    #[test]
    fn test_tokens_advance_on_navigation() {
        let mut ctl = controller();
        let t0 = ctl.token();
        turn(&mut ctl, "campari", 1);
        assert_eq!(ctl.token(), t0);
        ctl.start_new_chat().unwrap();
        assert_ne!(ctl.token(), t0);
    }
}
