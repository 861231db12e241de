//! Conversation session management for Parley.
//!
//! Provides the session controller state machine, the remote question and
//! title backend, title generation, and the orchestrator that ties them to
//! the record store and durable snapshots.

pub mod client;
pub mod error;
pub mod mock;
pub mod orchestrator;
pub mod session;
pub mod title;

pub use client::{
    decode_answer, decode_title, ChatBackend, EnvToken, HttpBackend, StaticToken, TokenProvider,
};
pub use error::ChatError;
pub use mock::ScriptedBackend;
pub use orchestrator::{ChatOrchestrator, ConversationSummary};
pub use session::{
    Notification, SessionController, SessionState, SessionToken, TitleTicket, Transition,
    TurnOutcome, TurnTicket,
};
pub use title::{truncate_seed, TitleGenerator};
