//! Remote question-answering backend.
//!
//! [`ChatBackend`] is the seam the session layer talks through; [`HttpBackend`]
//! implements it over the catalogue service's HTTP API. Response bodies are
//! decoded by the free functions [`decode_answer`] and [`decode_title`] so
//! the wire format can be tested without a server.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use parley_core::config::BackendConfig;
use parley_core::types::ReplyItem;

use crate::error::ChatError;

/// Title the service returns when it could not produce one.
const SERVICE_UNTITLED: &str = "Untitled";

/// Placeholder the service uses for absent product fields.
const SERVICE_MISSING: &str = "N/A";

/// Source of the bearer token attached to every request.
pub trait TokenProvider: Send + Sync {
    /// Current token, or `None` to send the request unauthenticated.
    fn token(&self) -> Option<String>;
}

/// A fixed token.
#[derive(Clone)]
pub struct StaticToken(pub String);

impl TokenProvider for StaticToken {
    fn token(&self) -> Option<String> {
        Some(self.0.clone()).filter(|t| !t.is_empty())
    }
}

/// A token read from an environment variable on every request.
#[derive(Debug, Clone)]
pub struct EnvToken {
    var: String,
}

impl EnvToken {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl TokenProvider for EnvToken {
    fn token(&self) -> Option<String> {
        std::env::var(&self.var).ok().filter(|t| !t.trim().is_empty())
    }
}

/// The two remote calls the session layer issues, plus a liveness probe.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Ask a question. A single question may fan out into several items.
    async fn ask_question(&self, question: &str) -> Result<Vec<ReplyItem>, ChatError>;

    /// Derive a short title from the opening text of a conversation.
    async fn generate_title(&self, seed: &str) -> Result<String, ChatError>;

    async fn health_check(&self) -> Result<(), ChatError>;
}

// =============================================================================
// HttpBackend
// =============================================================================

/// [`ChatBackend`] over HTTP with bearer-token auth.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
    token: Arc<dyn TokenProvider>,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig, token: Arc<dyn TokenProvider>) -> Result<Self, ChatError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ChatError::Transport(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, ChatError> {
        let url = format!("{}/{}", self.base_url, path);
        let mut request = self.client.get(&url).query(query);
        if let Some(token) = self.token.token() {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!(path, status = status.as_u16(), detail = %detail, "Backend request failed");
            return Err(ChatError::Http {
                status: status.as_u16(),
            });
        }
        Ok(response.json::<Value>().await?)
    }
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn ask_question(&self, question: &str) -> Result<Vec<ReplyItem>, ChatError> {
        let body = self
            .get_json("ask_question", &[("question", question.trim())])
            .await?;
        let items = decode_answer(&body)?;
        debug!(items = items.len(), "Answer received");
        Ok(items)
    }

    async fn generate_title(&self, seed: &str) -> Result<String, ChatError> {
        let body = self
            .get_json("generate_title", &[("summary", seed.trim())])
            .await?;
        decode_title(&body)
    }

    async fn health_check(&self) -> Result<(), ChatError> {
        let body = self.get_json("health_check", &[]).await?;
        check_status(&body)
    }
}

// =============================================================================
// Wire decoding
// =============================================================================

fn check_status(body: &Value) -> Result<(), ChatError> {
    match body.get("status").and_then(Value::as_str) {
        Some("ok") => Ok(()),
        Some(other) => Err(ChatError::Decode(format!("status '{}'", other))),
        None => Err(ChatError::Decode("missing status".into())),
    }
}

/// Decode an `ask_question` body into reply items, in service order.
///
/// A plain-string answer is the service's own apology and becomes one item.
/// A structured answer becomes a summary item followed by one item per
/// product.
pub fn decode_answer(body: &Value) -> Result<Vec<ReplyItem>, ChatError> {
    check_status(body)?;
    let answer = body
        .get("result")
        .and_then(|r| r.get("answer"))
        .ok_or_else(|| ChatError::Decode("missing result.answer".into()))?;

    match answer {
        Value::String(text) => Ok(non_empty(text)
            .map(|t| vec![ReplyItem::text(t)])
            .unwrap_or_default()),
        Value::Object(obj) => {
            let mut items = Vec::new();
            if let Some(summary) = obj
                .get("natural_language_response")
                .and_then(Value::as_str)
                .and_then(non_empty)
            {
                items.push(ReplyItem {
                    text: summary,
                    confidence: obj
                        .get("confidence")
                        .and_then(Value::as_str)
                        .and_then(present),
                    ..ReplyItem::default()
                });
            }
            let products = obj.get("products").and_then(Value::as_array);
            for product in products.into_iter().flatten() {
                let Some(text) = product
                    .get("product_summary")
                    .and_then(Value::as_str)
                    .and_then(present)
                else {
                    continue;
                };
                items.push(ReplyItem {
                    text,
                    image_ref: product
                        .get("image_url")
                        .and_then(Value::as_str)
                        .and_then(present),
                    match_score: product.get("match_score").and_then(parse_score),
                    confidence: None,
                });
            }
            Ok(items)
        }
        other => Err(ChatError::Decode(format!("unexpected answer type: {}", other))),
    }
}

/// Decode a `generate_title` body. The title may be nested as
/// `{"title": {"title": ..}}` or given directly as a string.
pub fn decode_title(body: &Value) -> Result<String, ChatError> {
    check_status(body)?;
    let raw = match body.get("title") {
        Some(Value::String(s)) => s.as_str(),
        Some(Value::Object(obj)) => obj.get("title").and_then(Value::as_str).unwrap_or_default(),
        _ => return Err(ChatError::Decode("missing title".into())),
    };
    let title = raw.trim().trim_matches('"').trim();
    if title.is_empty() || title == SERVICE_UNTITLED {
        return Err(ChatError::Decode("service produced no title".into()));
    }
    Ok(title.to_string())
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// Like [`non_empty`], but also rejects the service's "N/A" placeholder.
fn present(s: &str) -> Option<String> {
    non_empty(s).filter(|v| v != SERVICE_MISSING)
}

fn parse_score(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ---- Answers ----

    #[test]
    fn test_decode_structured_answer_fans_out() {
        let body = json!({
            "status": "ok",
            "result": {
                "answer": {
                    "natural_language_response": "I found 2 Campari products.",
                    "confidence": "High",
                    "confidence_reason": "exact brand match",
                    "products": [
                        {
                            "Brand": "Campari",
                            "product_summary": "Lighthouse stand",
                            "image_url": "https://img/lighthouse.png",
                            "match_score": "0.87"
                        },
                        {
                            "Brand": "Campari",
                            "product_summary": "Counter display",
                            "image_url": "N/A",
                            "match_score": 0.61
                        }
                    ]
                },
                "relevant_docs_count": 2
            }
        });
        let items = decode_answer(&body).unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].text, "I found 2 Campari products.");
        assert_eq!(items[0].confidence.as_deref(), Some("High"));
        assert_eq!(items[1].text, "Lighthouse stand");
        assert_eq!(items[1].image_ref.as_deref(), Some("https://img/lighthouse.png"));
        assert_eq!(items[1].match_score, Some(0.87));
        assert_eq!(items[2].image_ref, None);
        assert_eq!(items[2].match_score, Some(0.61));
    }

    #[test]
    fn test_decode_string_answer_is_single_item() {
        let body = json!({
            "status": "ok",
            "result": {"answer": "Sorry, no matching products.", "relevant_docs_count": 0}
        });
        let items = decode_answer(&body).unwrap();
        assert_eq!(items, vec![ReplyItem::text("Sorry, no matching products.")]);
    }

    #[test]
    fn test_decode_empty_answer_yields_no_items() {
        let body = json!({"status": "ok", "result": {"answer": "   "}});
        assert!(decode_answer(&body).unwrap().is_empty());

        let body = json!({"status": "ok", "result": {"answer": {"products": []}}});
        assert!(decode_answer(&body).unwrap().is_empty());
    }

    #[test]
    fn test_decode_skips_products_without_summary() {
        let body = json!({
            "status": "ok",
            "result": {"answer": {
                "natural_language_response": "One match.",
                "confidence": "N/A",
                "products": [{"product_summary": "N/A"}, {"product_summary": "Bar mat"}]
            }}
        });
        let items = decode_answer(&body).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].confidence, None);
        assert_eq!(items[1].text, "Bar mat");
        assert_eq!(items[1].match_score, None);
    }

    #[test]
    fn test_decode_answer_rejects_bad_status() {
        let body = json!({"status": "error", "result": {"answer": "x"}});
        assert!(matches!(decode_answer(&body), Err(ChatError::Decode(_))));
    }

    #[test]
    fn test_decode_answer_rejects_missing_answer() {
        let body = json!({"status": "ok", "result": {}});
        assert!(matches!(decode_answer(&body), Err(ChatError::Decode(_))));
        let body = json!({"status": "ok", "result": {"answer": 42}});
        assert!(matches!(decode_answer(&body), Err(ChatError::Decode(_))));
    }

    // ---- Titles ----

    #[test]
    fn test_decode_nested_title() {
        let body = json!({"status": "ok", "title": {"title": "\"Campari Stands\""}});
        assert_eq!(decode_title(&body).unwrap(), "Campari Stands");
    }

    #[test]
    fn test_decode_flat_title() {
        let body = json!({"status": "ok", "title": "  Aperol Displays "});
        assert_eq!(decode_title(&body).unwrap(), "Aperol Displays");
    }

    #[test]
    fn test_decode_untitled_is_failure() {
        let body = json!({"status": "ok", "title": {"title": "Untitled"}});
        assert!(decode_title(&body).is_err());
        let body = json!({"status": "ok", "title": {"title": ""}});
        assert!(decode_title(&body).is_err());
        let body = json!({"status": "ok"});
        assert!(decode_title(&body).is_err());
    }

    // ---- Tokens ----

    #[test]
    fn test_static_token() {
        assert_eq!(StaticToken("abc".into()).token().as_deref(), Some("abc"));
        assert_eq!(StaticToken(String::new()).token(), None);
    }

    #[test]
    fn test_env_token_missing_var() {
        let provider = EnvToken::new("PARLEY_TEST_TOKEN_THAT_IS_NEVER_SET");
        assert_eq!(provider.token(), None);
    }

    // ---- Construction ----

    #[test]
    fn test_http_backend_trims_trailing_slash() {
        let config = BackendConfig {
            base_url: "http://localhost:8000/".into(),
            ..BackendConfig::default()
        };
        let backend = HttpBackend::new(&config, Arc::new(StaticToken("t".into()))).unwrap();
        assert_eq!(backend.base_url(), "http://localhost:8000");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_transport_error() {
        let config = BackendConfig {
            base_url: "http://127.0.0.1:9".into(),
            timeout_secs: 2,
            ..BackendConfig::default()
        };
        let backend = HttpBackend::new(&config, Arc::new(EnvToken::new("UNSET_VAR"))).unwrap();
        let err = backend.health_check().await.unwrap_err();
        assert!(matches!(err, ChatError::Transport(_)));
    }
}
