//! Parley Storage crate - saved conversations, title search, durable snapshots.
//!
//! Provides the in-memory record store with its change notifications, the
//! title filter over it, and the persistence layer that flushes session
//! snapshots into a key/value store (SQLite in WAL mode, or in-process).

pub mod db;
pub mod kv;
pub mod migrations;
pub mod persistence;
pub mod record_store;
pub mod search;

pub use db::Database;
pub use kv::{KeyValueStore, MemoryKvStore, SqliteKvStore};
pub use persistence::{PersistenceLayer, SessionSnapshot};
pub use record_store::{RecordStore, StoreCheckpoint};
pub use search::{filter, SearchIndex};
