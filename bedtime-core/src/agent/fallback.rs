//! Local fallback generator.
//!
//! Used only when the remote storyteller cannot produce a first draft. No
//! tools and no judge: whatever the local model writes is the story.

use super::model::{bounded, LocalModel};
use super::story::StoryResult;
use crate::config::PipelineConfig;
use crate::persona::StoryConstraints;
use ollama::GenerateRequest;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const TOP_P: f32 = 0.95;

#[derive(Debug, Error)]
pub enum FallbackError {
    #[error("local model unavailable: {0}")]
    Unavailable(#[from] ollama::Error),

    #[error("local model returned an empty story")]
    EmptyResponse,
}

pub struct FallbackStoryteller {
    model: Arc<dyn LocalModel>,
    model_override: Option<String>,
    temperature: Option<f32>,
    max_tokens: usize,
    call_timeout: Duration,
}

impl FallbackStoryteller {
    pub fn new(model: Arc<dyn LocalModel>, config: &PipelineConfig) -> Self {
        Self {
            model,
            model_override: config.local_model.clone(),
            temperature: config.storyteller_temperature,
            max_tokens: config.max_story_tokens,
            call_timeout: config.call_timeout,
        }
    }

    pub fn model_name(&self) -> &str {
        self.model_override
            .as_deref()
            .unwrap_or_else(|| self.model.name())
    }

    /// Write a story in a single local call.
    pub async fn generate(
        &self,
        request_text: &str,
        constraints: &StoryConstraints,
    ) -> Result<StoryResult, FallbackError> {
        bounded(self.call_timeout, ollama::Error::Timeout, self.model.ensure_ready()).await?;

        let mut system = String::from(include_str!("prompts/fallback.txt"));
        system.push('\n');
        system.push_str(&constraints.render_instructions());

        let mut request = GenerateRequest::new(format!(
            "Write a bedtime story for this request: {}",
            request_text.trim()
        ))
        .with_system(system)
        .with_temperature(
            self.temperature
                .unwrap_or_else(|| constraints.persona.temperature()),
        )
        .with_top_p(TOP_P)
        .with_max_tokens(self.max_tokens);
        if let Some(model) = &self.model_override {
            request = request.with_model(model.clone());
        }

        tracing::info!(model = %self.model_name(), "generating with local fallback");

        let response = bounded(
            self.call_timeout,
            ollama::Error::Timeout,
            self.model.generate(request),
        )
        .await?;

        let text = response.text.trim().to_string();
        if text.is_empty() {
            return Err(FallbackError::EmptyResponse);
        }

        let model = if response.model.is_empty() {
            self.model_name().to_string()
        } else {
            response.model
        };
        Ok(StoryResult::fallback(text, model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::GenerationPath;
    use crate::testing::{LocalScript, ScriptedLocalModel};

    #[tokio::test]
    async fn test_fallback_story() {
        let local = Arc::new(ScriptedLocalModel::new([LocalScript::Reply(
            "The Sleepy Owl\n\nOnce upon a time...".to_string(),
        )]));
        let fallback = FallbackStoryteller::new(local.clone(), &PipelineConfig::default());

        let story = fallback
            .generate("an owl", &StoryConstraints::default())
            .await
            .unwrap();

        assert_eq!(story.path, GenerationPath::Fallback);
        assert!(!story.judged);
        assert!(story.invocations.is_empty());

        let sent = local.requests();
        assert_eq!(sent[0].top_p, Some(0.95));
        assert_eq!(sent[0].temperature, Some(0.8));
        assert!(sent[0].prompt.contains("an owl"));
    }

    #[tokio::test]
    async fn test_unreachable_and_empty() {
        let local = Arc::new(ScriptedLocalModel::new([LocalScript::Fail]));
        let fallback = FallbackStoryteller::new(local, &PipelineConfig::default());
        let err = fallback
            .generate("an owl", &StoryConstraints::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FallbackError::Unavailable(_)));

        let local = Arc::new(ScriptedLocalModel::new([LocalScript::Reply("  ".to_string())]));
        let fallback = FallbackStoryteller::new(local, &PipelineConfig::default());
        let err = fallback
            .generate("an owl", &StoryConstraints::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FallbackError::EmptyResponse));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_local_model_times_out() {
        let local = Arc::new(ScriptedLocalModel::new([LocalScript::Hang]));
        let fallback = FallbackStoryteller::new(local, &PipelineConfig::default());
        let err = fallback
            .generate("an owl", &StoryConstraints::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FallbackError::Unavailable(ollama::Error::Timeout)
        ));
    }
}
