//! Scripted in-process backend for tests and offline runs.
//!
//! Answers are served from a queue (falling back to a fixed answer), titles
//! from a fixed string. Either call can be held behind a gate so tests can
//! interleave navigation with an outstanding request.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use parley_core::types::ReplyItem;

use crate::client::ChatBackend;
use crate::error::ChatError;

/// [`ChatBackend`] that replays scripted responses.
#[derive(Default)]
pub struct ScriptedBackend {
    answers: Mutex<VecDeque<Result<Vec<ReplyItem>, ChatError>>>,
    default_answer: Vec<ReplyItem>,
    title: Option<String>,
    answer_gate: Option<Arc<Semaphore>>,
    title_gate: Option<Arc<Semaphore>>,
    questions: Mutex<Vec<String>>,
    title_seeds: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    /// A backend that answers with nothing and fails every title request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every unscripted question with `items`.
    pub fn with_default_answer(mut self, items: Vec<ReplyItem>) -> Self {
        self.default_answer = items;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Block each answer until [`ScriptedBackend::release_answer`] is called.
    pub fn with_gated_answers(mut self) -> Self {
        self.answer_gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    /// Block each title until [`ScriptedBackend::release_title`] is called.
    pub fn with_gated_titles(mut self) -> Self {
        self.title_gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    /// Queue the response for the next question.
    pub fn push_answer(&self, answer: Result<Vec<ReplyItem>, ChatError>) {
        if let Ok(mut answers) = self.answers.lock() {
            answers.push_back(answer);
        }
    }

    pub fn release_answer(&self) {
        if let Some(gate) = &self.answer_gate {
            gate.add_permits(1);
        }
    }

    pub fn release_title(&self) {
        if let Some(gate) = &self.title_gate {
            gate.add_permits(1);
        }
    }

    /// Questions received so far, in order.
    pub fn questions(&self) -> Vec<String> {
        self.questions.lock().map(|q| q.clone()).unwrap_or_default()
    }

    /// Title seeds received so far, in order.
    pub fn title_seeds(&self) -> Vec<String> {
        self.title_seeds.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

async fn pass(gate: &Option<Arc<Semaphore>>) -> Result<(), ChatError> {
    if let Some(gate) = gate {
        gate.acquire()
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))?
            .forget();
    }
    Ok(())
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn ask_question(&self, question: &str) -> Result<Vec<ReplyItem>, ChatError> {
        if let Ok(mut questions) = self.questions.lock() {
            questions.push(question.to_string());
        }
        pass(&self.answer_gate).await?;
        let scripted = self.answers.lock().ok().and_then(|mut a| a.pop_front());
        scripted.unwrap_or_else(|| Ok(self.default_answer.clone()))
    }

    async fn generate_title(&self, seed: &str) -> Result<String, ChatError> {
        if let Ok(mut seeds) = self.title_seeds.lock() {
            seeds.push(seed.to_string());
        }
        pass(&self.title_gate).await?;
        self.title
            .clone()
            .ok_or_else(|| ChatError::Transport("title service unavailable".into()))
    }

    async fn health_check(&self) -> Result<(), ChatError> {
        Ok(())
    }
}
