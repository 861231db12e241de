//! Chat orchestrator: central coordinator wiring controller, backend, titles
//! and persistence.
//!
//! The controller sits behind a mutex that is never held across an await:
//! a question is issued under the lock, answered outside it, and applied
//! under the lock again, so navigation stays possible while a send is
//! outstanding.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use parley_core::config::{ParleyConfig, SessionConfig};
use parley_core::types::{ConversationId, Message, MessageId};
use parley_storage::persistence::PersistenceLayer;
use parley_storage::search::SearchIndex;

use crate::client::ChatBackend;
use crate::error::ChatError;
use crate::session::{SessionController, SessionState, TitleTicket, Transition, TurnOutcome};
use crate::title::TitleGenerator;

/// One row of the conversation list.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub title: String,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
    pub is_current: bool,
}

/// Central chat orchestrator.
pub struct ChatOrchestrator {
    controller: Arc<Mutex<SessionController>>,
    backend: Arc<dyn ChatBackend>,
    titles: Arc<TitleGenerator>,
    persistence: Arc<PersistenceLayer>,
    /// Held across snapshot and write so flushes land in snapshot order.
    flush_gate: Arc<Mutex<()>>,
    search: Mutex<SearchIndex>,
    title_tasks: Mutex<Vec<JoinHandle<()>>>,
    config: SessionConfig,
}

impl ChatOrchestrator {
    /// Restore the last flushed session and wire up the collaborators.
    pub fn new(
        config: &ParleyConfig,
        backend: Arc<dyn ChatBackend>,
        persistence: Arc<PersistenceLayer>,
    ) -> Self {
        let snapshot = persistence.restore();
        let controller = SessionController::restore(snapshot, config.session.clone());
        let search = SearchIndex::new(persistence.load_search_text());
        let titles = TitleGenerator::new(Arc::clone(&backend), config.session.title_seed_chars);

        Self {
            controller: Arc::new(Mutex::new(controller)),
            backend,
            titles: Arc::new(titles),
            persistence,
            flush_gate: Arc::new(Mutex::new(())),
            search: Mutex::new(search),
            title_tasks: Mutex::new(Vec::new()),
            config: config.session.clone(),
        }
    }

    /// Ask a question in the active session and apply the answer.
    ///
    /// Validation failures are returned as errors and change nothing. A
    /// failed remote call is not an error: it yields
    /// [`TurnOutcome::Failed`] with a fallback reply already appended.
    pub async fn send(&self, text: &str) -> Result<TurnOutcome, ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let limit = self.config.max_message_length;
        if text.chars().count() > limit {
            return Err(ChatError::MessageTooLong(limit));
        }

        let ticket = {
            let mut controller = self.lock()?;
            controller.begin_turn(text).ok_or(ChatError::SendInFlight)?
        };
        self.flush_if_enabled();

        let result = self.backend.ask_question(&ticket.question).await;

        let outcome = {
            let mut controller = self.lock()?;
            controller.complete_turn(ticket, result)
        };
        match &outcome {
            TurnOutcome::Applied { replies } => debug!(replies, "Answer applied"),
            TurnOutcome::Failed(n) => info!(notice = %n.message, "Answer failed"),
            TurnOutcome::Stale => debug!("Answer arrived after navigation"),
        }
        self.flush_if_enabled();
        Ok(outcome)
    }

    /// Switch to a stored conversation. Returns whether the session changed.
    pub fn switch_to(&self, id: ConversationId) -> Result<bool, ChatError> {
        let transition = self.lock()?.request_switch(id)?;
        Ok(self.finish(transition))
    }

    /// Commit the active session and start an empty one.
    pub fn new_chat(&self) -> Result<bool, ChatError> {
        let transition = self.lock()?.start_new_chat()?;
        Ok(self.finish(transition))
    }

    /// Delete a stored conversation. Unknown ids return `false`.
    pub fn delete(&self, id: ConversationId) -> Result<bool, ChatError> {
        let deleted = self.lock()?.delete_conversation(id);
        if deleted {
            self.flush_if_enabled();
        }
        Ok(deleted)
    }

    pub fn toggle_like(&self, message_id: MessageId) -> Result<bool, ChatError> {
        let changed = self.lock()?.toggle_like(message_id);
        if changed {
            self.flush_if_enabled();
        }
        Ok(changed)
    }

    pub fn toggle_dislike(&self, message_id: MessageId) -> Result<bool, ChatError> {
        let changed = self.lock()?.toggle_dislike(message_id);
        if changed {
            self.flush_if_enabled();
        }
        Ok(changed)
    }

    /// Set the search text and return the matching conversations.
    pub fn search(&self, query: &str) -> Result<Vec<ConversationSummary>, ChatError> {
        {
            let mut search = self
                .search
                .lock()
                .map_err(|e| ChatError::Storage(format!("search lock poisoned: {}", e)))?;
            search.set_query(query);
        }
        self.persistence.save_search_text(query);
        self.conversations()
    }

    /// Conversations matching the current search text, most recent first.
    pub fn conversations(&self) -> Result<Vec<ConversationSummary>, ChatError> {
        let search = self
            .search
            .lock()
            .map_err(|e| ChatError::Storage(format!("search lock poisoned: {}", e)))?;
        let controller = self.lock()?;
        let store = controller.store();
        Ok(search
            .view(store)
            .into_iter()
            .map(|c| ConversationSummary {
                id: c.id,
                title: c.title.clone(),
                message_count: c.message_count(),
                created_at: c.created_at,
                is_current: store.is_current(c.id),
            })
            .collect())
    }

    pub fn search_text(&self) -> String {
        self.search
            .lock()
            .map(|s| s.query().to_string())
            .unwrap_or_default()
    }

    pub fn active_messages(&self) -> Result<Vec<Message>, ChatError> {
        Ok(self.lock()?.messages().to_vec())
    }

    pub fn active_id(&self) -> Result<Option<ConversationId>, ChatError> {
        Ok(self.lock()?.active_id())
    }

    pub fn state(&self) -> Result<SessionState, ChatError> {
        Ok(self.lock()?.state())
    }

    pub fn is_sending(&self) -> bool {
        self.lock().map(|c| c.is_sending()).unwrap_or(false)
    }

    pub fn sidebar_width(&self) -> u32 {
        self.persistence.load_sidebar_width()
    }

    /// Store a sidebar width and return the clamped value actually kept.
    pub fn set_sidebar_width(&self, width: u32) -> u32 {
        self.persistence.save_sidebar_width(width)
    }

    pub async fn health_check(&self) -> Result<(), ChatError> {
        self.backend.health_check().await
    }

    /// Wait for every pending title request to finish.
    pub async fn settle_titles(&self) {
        let tasks: Vec<_> = match self.title_tasks.lock() {
            Ok(mut tasks) => tasks.drain(..).collect(),
            Err(_) => return,
        };
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Title task did not complete");
            }
        }
    }

    /// Commit unsaved growth and write the final snapshot.
    ///
    /// Pending title requests are abandoned; conversations they were for
    /// keep their default titles.
    pub fn shutdown(&self) -> bool {
        if let Ok(mut tasks) = self.title_tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
        match self.lock() {
            Ok(mut controller) => {
                controller.commit_on_unload();
            }
            Err(e) => warn!(error = %e, "Skipping unload commit"),
        }
        let flushed = self.flush();
        info!(flushed, "Chat session shut down");
        flushed
    }

    /// Write the current snapshot. Returns `false` if it could not be stored.
    pub fn flush(&self) -> bool {
        flush_snapshot(&self.flush_gate, &self.controller, &self.persistence)
    }

    // -- Private helpers --

    fn lock(&self) -> Result<MutexGuard<'_, SessionController>, ChatError> {
        self.controller
            .lock()
            .map_err(|e| ChatError::Storage(format!("session lock poisoned: {}", e)))
    }

    fn flush_if_enabled(&self) {
        if self.config.flush_on_mutation {
            self.flush();
        }
    }

    fn finish(&self, transition: Transition) -> bool {
        let changed = transition.changed();
        if let Some(ticket) = transition.title_ticket() {
            self.spawn_title(ticket);
        }
        if changed {
            self.flush_if_enabled();
        }
        changed
    }

    /// Resolve a title on a background task and apply it to the conversation
    /// it was issued for.
    fn spawn_title(&self, ticket: TitleTicket) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!(id = %ticket.conversation_id, "No runtime; keeping default title");
            return;
        };
        let controller = Arc::clone(&self.controller);
        let titles = Arc::clone(&self.titles);
        let persistence = Arc::clone(&self.persistence);
        let gate = Arc::clone(&self.flush_gate);
        let flush = self.config.flush_on_mutation;

        let handle = runtime.spawn(async move {
            let title = titles
                .generate(ticket.seed.as_deref(), ticket.started_at)
                .await;
            let applied = match controller.lock() {
                Ok(mut controller) => controller.apply_title(&ticket, &title),
                Err(e) => {
                    warn!(error = %e, "Session lock poisoned; dropping title");
                    false
                }
            };
            if applied && flush {
                flush_snapshot(&gate, &controller, &persistence);
            }
        });

        if let Ok(mut tasks) = self.title_tasks.lock() {
            tasks.retain(|t| !t.is_finished());
            tasks.push(handle);
        }
    }
}

/// Snapshot under the session lock, write outside it.
///
/// The gate is held across both steps: a snapshot taken later is never
/// overwritten by one taken earlier. Lock order is gate, then session.
fn flush_snapshot(
    gate: &Mutex<()>,
    controller: &Mutex<SessionController>,
    persistence: &PersistenceLayer,
) -> bool {
    let _gate = match gate.lock() {
        Ok(guard) => guard,
        Err(e) => {
            warn!(error = %e, "Flush gate poisoned; skipping flush");
            return false;
        }
    };
    let snapshot = match controller.lock() {
        Ok(controller) => controller.snapshot(),
        Err(e) => {
            warn!(error = %e, "Session lock poisoned; skipping flush");
            return false;
        }
    };
    persistence.flush(&snapshot)
}

// =============================================================================
// Tests
// =============================================================================
