//! Title search over saved conversations.
//!
//! Case-insensitive substring match against titles only. Message bodies are
//! not part of the match surface, so cost scales with the number of
//! conversations rather than the number of messages.

use parley_core::types::Conversation;

use crate::record_store::RecordStore;

/// Conversations whose title contains `query`, in the order given.
///
/// An empty or whitespace-only query returns every conversation.
pub fn filter<'a>(conversations: &'a [Conversation], query: &str) -> Vec<&'a Conversation> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return conversations.iter().collect();
    }
    conversations
        .iter()
        .filter(|c| c.title.to_lowercase().contains(&needle))
        .collect()
}

/// The current search text and the view it derives from a record store.
///
/// Nothing is cached: every call to [`SearchIndex::view`] recomputes the
/// filter from the current inputs.
#[derive(Debug, Clone, Default)]
pub struct SearchIndex {
    query: String,
}

impl SearchIndex {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
    }

    pub fn is_active(&self) -> bool {
        !self.query.trim().is_empty()
    }

    pub fn view<'a>(&self, store: &'a RecordStore) -> Vec<&'a Conversation> {
        filter(store.list(), &self.query)
    }
}
