//! Testing utilities for the story pipeline.
//!
//! This module provides tools for integration testing:
//! - `ScriptedModel` and `ScriptedLocalModel` for deterministic runs without API calls
//! - `MemoryStore` and `FailingStore` for observing or breaking persistence
//! - Response builders and assertion helpers

use crate::agent::{GenerationPath, LocalModel, TextModel, FACT_TOOL};
use crate::orchestrator::StoryOutcome;
use crate::persist::{PersistError, RunRecord, StoryRecord, StoryStore};
use async_trait::async_trait;
use claude::{ContentBlock, Request, Response, StopReason, ToolChoice, Usage};
use ollama::{GenerateRequest, GenerateResponse};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

const SCRIPTED_MODEL: &str = "scripted-model";

static TOOL_USE_IDS: AtomicUsize = AtomicUsize::new(0);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One scripted reaction of a remote model.
#[derive(Debug, Clone)]
pub enum Scripted {
    /// Return this response.
    Reply(Response),
    /// Fail with a network error carrying this message.
    Fail(String),
    /// Fail with a timeout.
    Timeout,
    /// Never answer.
    Hang,
    /// Ask for `topic` with no text whenever tool use is allowed; once the
    /// request switches tool use off, answer with `story`.
    ToolsWhileAllowed { topic: String, story: String },
}

/// A remote model that plays back a script.
///
/// Every request is recorded so tests can inspect what was sent. Once the
/// script runs out, the `then` reaction (a network failure by default)
/// repeats forever.
pub struct ScriptedModel {
    name: String,
    script: Mutex<VecDeque<Scripted>>,
    then: Scripted,
    requests: Mutex<Vec<Request>>,
}

impl ScriptedModel {
    pub fn new(script: impl IntoIterator<Item = Scripted>) -> Self {
        Self {
            name: SCRIPTED_MODEL.to_string(),
            script: Mutex::new(script.into_iter().collect()),
            then: Scripted::Fail("no more scripted responses".to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Script that answers with each response in turn.
    pub fn replies(responses: impl IntoIterator<Item = Response>) -> Self {
        Self::new(responses.into_iter().map(Scripted::Reply))
    }

    /// A model that is down for every call.
    pub fn unavailable() -> Self {
        Self::new([])
    }

    /// What to do once the script is exhausted.
    pub fn then(mut self, reaction: Scripted) -> Self {
        self.then = reaction;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }

    pub fn requests(&self) -> Vec<Request> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl TextModel for ScriptedModel {
    async fn complete(&self, request: Request) -> Result<Response, claude::Error> {
        let tools_allowed = request.tools.is_some() && request.tool_choice != Some(ToolChoice::None);
        lock(&self.requests).push(request);
        let next = lock(&self.script)
            .pop_front()
            .unwrap_or_else(|| self.then.clone());

        match next {
            Scripted::Reply(response) => Ok(response),
            Scripted::Fail(message) => Err(claude::Error::Network(message)),
            Scripted::Timeout => Err(claude::Error::Timeout),
            Scripted::Hang => std::future::pending().await,
            Scripted::ToolsWhileAllowed { topic, story } => Ok(if tools_allowed {
                tool_call_response("", &topic)
            } else {
                text_response(story)
            }),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// One scripted reaction of the local model.
#[derive(Debug, Clone)]
pub enum LocalScript {
    Reply(String),
    /// The server is unreachable.
    Fail,
    Hang,
}

/// A local model that plays back a script, then reports itself unreachable.
pub struct ScriptedLocalModel {
    script: Mutex<VecDeque<LocalScript>>,
    requests: Mutex<Vec<GenerateRequest>>,
    ready: bool,
}

impl ScriptedLocalModel {
    pub fn new(script: impl IntoIterator<Item = LocalScript>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
            ready: true,
        }
    }

    /// A local model that answers with `text`.
    pub fn answering(text: impl Into<String>) -> Self {
        Self::new([LocalScript::Reply(text.into())])
    }

    /// A local server that is down.
    pub fn unreachable() -> Self {
        Self {
            ready: false,
            ..Self::new([])
        }
    }

    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }

    pub fn requests(&self) -> Vec<GenerateRequest> {
        lock(&self.requests).clone()
    }
}

fn unreachable_error() -> ollama::Error {
    ollama::Error::Unreachable {
        host: "http://127.0.0.1:11434".to_string(),
        message: "connection refused".to_string(),
    }
}

#[async_trait]
impl LocalModel for ScriptedLocalModel {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, ollama::Error> {
        lock(&self.requests).push(request);
        let next = lock(&self.script).pop_front();
        match next {
            Some(LocalScript::Reply(text)) => Ok(GenerateResponse {
                model: "llama3.2".to_string(),
                text,
                done: true,
            }),
            Some(LocalScript::Hang) => std::future::pending().await,
            Some(LocalScript::Fail) | None => Err(unreachable_error()),
        }
    }

    fn name(&self) -> &str {
        "llama3.2"
    }

    async fn ensure_ready(&self) -> Result<(), ollama::Error> {
        if self.ready {
            Ok(())
        } else {
            Err(unreachable_error())
        }
    }
}

/// Store that keeps everything in memory.
#[derive(Default)]
pub struct MemoryStore {
    stories: Mutex<Vec<StoryRecord>>,
    runs: Mutex<Vec<RunRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stories(&self) -> Vec<StoryRecord> {
        lock(&self.stories).clone()
    }

    pub fn runs(&self) -> Vec<RunRecord> {
        lock(&self.runs).clone()
    }
}

#[async_trait]
impl StoryStore for MemoryStore {
    async fn append_story(&self, record: &StoryRecord) -> Result<i64, PersistError> {
        let mut stories = lock(&self.stories);
        stories.push(record.clone());
        Ok(stories.len() as i64)
    }

    async fn append_run(&self, record: &RunRecord) -> Result<(), PersistError> {
        lock(&self.runs).push(record.clone());
        Ok(())
    }
}

/// Store whose every write fails.
#[derive(Default)]
pub struct FailingStore {
    attempts: AtomicUsize,
}

impl FailingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes attempted so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StoryStore for FailingStore {
    async fn append_story(&self, _record: &StoryRecord) -> Result<i64, PersistError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(PersistError::Unavailable("disk full".to_string()))
    }

    async fn append_run(&self, _record: &RunRecord) -> Result<(), PersistError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(PersistError::Unavailable("disk full".to_string()))
    }
}

// ============================================================================
// Response builders
// ============================================================================

fn response(content: Vec<ContentBlock>, stop_reason: StopReason) -> Response {
    Response {
        id: "msg_scripted".to_string(),
        model: SCRIPTED_MODEL.to_string(),
        content,
        stop_reason,
        usage: Usage::default(),
    }
}

/// A plain text answer.
pub fn text_response(text: impl Into<String>) -> Response {
    response(
        vec![ContentBlock::Text { text: text.into() }],
        StopReason::EndTurn,
    )
}

/// An answer that stops to look up `topic`, with optional text before the call.
pub fn tool_call_response(text: impl Into<String>, topic: &str) -> Response {
    let text = text.into();
    let mut content = Vec::new();
    if !text.is_empty() {
        content.push(ContentBlock::Text { text });
    }
    content.push(ContentBlock::ToolUse {
        id: format!("toolu_{}", TOOL_USE_IDS.fetch_add(1, Ordering::SeqCst)),
        name: FACT_TOOL.to_string(),
        input: json!({ "topic": topic }),
    });
    response(content, StopReason::ToolUse)
}

/// A judge answer in the line format.
pub fn judge_response(score: f32, feedback: &str) -> Response {
    let verdict = if score >= 7.0 {
        "APPROVED"
    } else {
        "NEEDS_REVISION"
    };
    text_response(format!(
        "OVERALL_SCORE: {score}/10\nSAFETY: 10/10\nVERDICT: {verdict}\nFEEDBACK: {feedback}"
    ))
}

// ============================================================================
// Assertion helpers
// ============================================================================

/// Assert the outcome came from the primary path.
#[track_caller]
pub fn assert_primary(outcome: &StoryOutcome) {
    assert_eq!(
        outcome.path(),
        GenerationPath::Primary,
        "expected a primary story, got {outcome:?}"
    );
}

/// Assert the outcome came from the fallback path and was never judged.
#[track_caller]
pub fn assert_fallback(outcome: &StoryOutcome) {
    assert_eq!(
        outcome.path(),
        GenerationPath::Fallback,
        "expected a fallback story, got {outcome:?}"
    );
    assert!(outcome.verdict().is_none(), "fallback story carries a verdict");
    assert!(!outcome.story().judged, "fallback story marked as judged");
}

/// Assert the final score, within float tolerance.
#[track_caller]
pub fn assert_score(outcome: &StoryOutcome, expected: f32) {
    let score = outcome
        .verdict()
        .map(|v| v.score)
        .unwrap_or_else(|| panic!("expected a verdict with score {expected}, got none"));
    assert!(
        (score - expected).abs() < f32::EPSILON,
        "expected score {expected}, got {score}"
    );
}
