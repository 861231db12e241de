use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ParleyError, Result};

/// Top-level configuration for the Parley chat client.
///
/// Loaded from `~/.parley/config.toml` by default. Each section corresponds
/// to one concern of the client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParleyConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub ui: UiConfig,
}

impl ParleyConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ParleyConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| ParleyError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Check values that would make the client unusable.
    pub fn validate(&self) -> Result<()> {
        if self.backend.base_url.trim().is_empty() {
            return Err(ParleyError::Config("backend.base_url is empty".into()));
        }
        if self.backend.timeout_secs == 0 {
            return Err(ParleyError::Config(
                "backend.timeout_secs must be greater than zero".into(),
            ));
        }
        if self.ui.min_sidebar_width > self.ui.max_sidebar_width {
            return Err(ParleyError::Config(format!(
                "ui.min_sidebar_width ({}) exceeds ui.max_sidebar_width ({})",
                self.ui.min_sidebar_width, self.ui.max_sidebar_width
            )));
        }
        if self.session.max_message_length == 0 {
            return Err(ParleyError::Config(
                "session.max_message_length must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory holding the durable snapshot database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.parley/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Remote question-answering service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the service, without a trailing path.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Name of the environment variable holding the bearer token.
    pub token_env: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            timeout_secs: 60,
            token_env: "PARLEY_TOKEN".to_string(),
        }
    }
}

/// Session behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Assistant text appended when a question gets no usable answer.
    pub fallback_answer: String,
    /// Maximum accepted question length in characters.
    pub max_message_length: usize,
    /// Flush the durable snapshot after every mutation, not only on exit.
    pub flush_on_mutation: bool,
    /// Maximum characters of the first message sent for title generation.
    pub title_seed_chars: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            fallback_answer: "Sorry, I couldn't find an answer to that. Please try rephrasing your question.".to_string(),
            max_message_length: 2000,
            flush_on_mutation: true,
            title_seed_chars: 200,
        }
    }
}

/// Presentation preferences persisted alongside the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Sidebar width used when no preference has been saved.
    pub sidebar_width: u32,
    pub min_sidebar_width: u32,
    pub max_sidebar_width: u32,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            sidebar_width: 280,
            min_sidebar_width: 200,
            max_sidebar_width: 600,
        }
    }
}

impl UiConfig {
    /// Clamp a requested sidebar width into the configured range.
    pub fn clamp_width(&self, width: u32) -> u32 {
        width.clamp(self.min_sidebar_width, self.max_sidebar_width.max(self.min_sidebar_width))
    }
}
