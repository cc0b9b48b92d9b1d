//! Immutable description of one model call.

use claude::{Message, Request};
use serde::{Deserialize, Serialize};

/// Which persona a request speaks with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonaKind {
    Storyteller,
    Judge,
    FactChecker,
}

/// Sampling parameters for one call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: usize,
}

/// A single prompt to a model, built fresh for every attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    prompt: String,
    persona: PersonaKind,
    params: GenerationParams,
    feedback: Vec<String>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, persona: PersonaKind, params: GenerationParams) -> Self {
        Self {
            prompt: prompt.into(),
            persona,
            params,
            feedback: Vec::new(),
        }
    }

    /// Attach judge feedback from earlier attempts, oldest first.
    pub fn with_feedback(mut self, feedback: impl IntoIterator<Item = String>) -> Self {
        self.feedback = feedback
            .into_iter()
            .filter(|f| !f.trim().is_empty())
            .collect();
        self
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn persona(&self) -> PersonaKind {
        self.persona
    }

    pub fn params(&self) -> GenerationParams {
        self.params
    }

    pub fn feedback(&self) -> &[String] {
        &self.feedback
    }

    /// The user turn: the prompt followed by any accumulated feedback.
    pub fn render(&self) -> String {
        if self.feedback.is_empty() {
            return self.prompt.clone();
        }

        let mut out = self.prompt.clone();
        out.push_str("\n\n## Reviewer feedback to address\n");
        for (i, item) in self.feedback.iter().enumerate() {
            out.push_str(&format!("{}. {}\n", i + 1, item.trim()));
        }
        out
    }

    /// Convert into a Claude request with the given system prompt.
    pub fn to_claude(&self, system: &str, model: Option<&str>) -> Request {
        let mut request = Request::new(vec![Message::user(self.render())])
            .with_system(system)
            .with_temperature(self.params.temperature)
            .with_max_tokens(self.params.max_tokens);
        if let Some(model) = model {
            request = request.with_model(model);
        }
        request
    }
}
