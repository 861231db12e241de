//! Short labels for committed conversations.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use parley_core::types::{default_title, UNTITLED_CHAT};

use crate::client::ChatBackend;

/// Turns the opening question of a conversation into a title.
pub struct TitleGenerator {
    backend: Arc<dyn ChatBackend>,
    seed_chars: usize,
}

impl TitleGenerator {
    /// `seed_chars` bounds how much of the opening question is sent; zero
    /// sends it whole.
    pub fn new(backend: Arc<dyn ChatBackend>, seed_chars: usize) -> Self {
        Self {
            backend,
            seed_chars,
        }
    }

    /// Generate a title for a conversation started at `started_at`.
    ///
    /// Without seed text this returns [`UNTITLED_CHAT`] without calling the
    /// backend. A failed or empty remote result falls back to the
    /// timestamp-derived default and is only logged.
    pub async fn generate(&self, seed: Option<&str>, started_at: DateTime<Utc>) -> String {
        let Some(seed) = seed.map(str::trim).filter(|s| !s.is_empty()) else {
            return UNTITLED_CHAT.to_string();
        };
        let seed = truncate_seed(seed, self.seed_chars);

        match self.backend.generate_title(&seed).await {
            Ok(title) if !title.trim().is_empty() => {
                debug!(title = %title, "Title generated");
                title.trim().to_string()
            }
            Ok(_) => {
                warn!("Title service returned an empty title; using default");
                default_title(started_at)
            }
            Err(e) => {
                warn!(error = %e, "Title generation failed; using default");
                default_title(started_at)
            }
        }
    }
}

/// At most `max_chars` characters of `text`, cut on a char boundary.
pub fn truncate_seed(text: &str, max_chars: usize) -> String {
    if max_chars == 0 {
        return text.to_string();
    }
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedBackend;

    #[test]
    fn test_truncate_seed() {
        assert_eq!(truncate_seed("negroni", 3), "neg");
        assert_eq!(truncate_seed("negroni", 50), "negroni");
        assert_eq!(truncate_seed("negroni", 0), "negroni");
        assert_eq!(truncate_seed("caffè latte", 5), "caffè");
    }

    #[tokio::test]
    async fn test_generate_uses_remote_title() {
        let backend = Arc::new(ScriptedBackend::new().with_title("Campari Stands"));
        let titles = TitleGenerator::new(backend.clone(), 200);
        let title = titles
            .generate(Some("Which Campari stands are there?"), Utc::now())
            .await;
        assert_eq!(title, "Campari Stands");
        assert_eq!(backend.title_seeds(), vec!["Which Campari stands are there?"]);
    }

    #[tokio::test]
    async fn test_generate_without_seed_skips_remote() {
        let backend = Arc::new(ScriptedBackend::new().with_title("Never used"));
        let titles = TitleGenerator::new(backend.clone(), 200);
        assert_eq!(titles.generate(None, Utc::now()).await, UNTITLED_CHAT);
        assert_eq!(titles.generate(Some("   "), Utc::now()).await, UNTITLED_CHAT);
        assert!(backend.title_seeds().is_empty());
    }

    #[tokio::test]
    async fn test_generate_falls_back_on_failure() {
        let backend = Arc::new(ScriptedBackend::new());
        let titles = TitleGenerator::new(backend, 200);
        let started = Utc::now();
        let title = titles.generate(Some("aperol"), started).await;
        assert_eq!(title, default_title(started));
    }

    #[tokio::test]
    async fn test_generate_falls_back_on_blank_title() {
        let backend = Arc::new(ScriptedBackend::new().with_title("  "));
        let titles = TitleGenerator::new(backend, 200);
        let started = Utc::now();
        assert_eq!(titles.generate(Some("aperol"), started).await, default_title(started));
    }

    #[tokio::test]
    async fn test_generate_truncates_seed() {
        let backend = Arc::new(ScriptedBackend::new().with_title("Short"));
        let titles = TitleGenerator::new(backend.clone(), 10);
        titles.generate(Some(&"x".repeat(500)), Utc::now()).await;
        assert_eq!(backend.title_seeds()[0].len(), 10);
    }
}
