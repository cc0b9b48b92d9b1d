//! Primary story generator backed by the remote model.

use super::bridge::{ToolBridge, ToolInvocation};
use super::fact_checker::FactChecker;
use super::model::{bounded, TextModel};
use super::request::{GenerationParams, GenerationRequest, PersonaKind};
use super::story::{GenerationPath, StoryResult};
use super::tools::grounding_section;
use crate::config::PipelineConfig;
use crate::facts::{self, Fact};
use crate::persona::StoryConstraints;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("storyteller unavailable: {0}")]
    Unavailable(#[from] claude::Error),

    #[error("storyteller returned an empty story")]
    EmptyResponse,
}

/// A previous attempt and the feedback it collected.
#[derive(Debug, Clone, Copy)]
pub struct Revision<'a> {
    pub previous_story: &'a str,
    /// Feedback from every judged attempt so far, oldest first.
    pub feedback: &'a [String],
}

/// Writes stories with the remote model, looking up facts as it goes.
pub struct Storyteller {
    model: Arc<dyn TextModel>,
    bridge: ToolBridge,
    model_override: Option<String>,
    temperature: Option<f32>,
    max_tokens: usize,
    call_timeout: Duration,
    tools_enabled: bool,
    prefetch_facts: bool,
    fact_checker: Option<FactChecker>,
}

impl Storyteller {
    pub fn new(model: Arc<dyn TextModel>, config: &PipelineConfig) -> Self {
        let fact_checker = config
            .verify_facts
            .then(|| FactChecker::new(model.clone(), config));
        Self {
            model,
            bridge: ToolBridge::new(config.max_tool_rounds, config.call_timeout),
            model_override: config.model.clone(),
            temperature: config.storyteller_temperature,
            max_tokens: config.max_story_tokens,
            call_timeout: config.call_timeout,
            tools_enabled: config.tools_enabled,
            prefetch_facts: config.prefetch_facts,
            fact_checker,
        }
    }

    /// The system prompt: fixed persona plus the parent's personalization.
    pub fn system_prompt(&self, constraints: &StoryConstraints) -> String {
        let mut prompt = String::new();
        prompt.push_str(include_str!("prompts/storyteller.txt"));
        prompt.push('\n');
        prompt.push_str(&constraints.render_instructions());
        prompt
    }

    /// Write one story. `revision` is `None` for the first attempt.
    pub async fn generate(
        &self,
        request_text: &str,
        constraints: &StoryConstraints,
        revision: Option<&Revision<'_>>,
    ) -> Result<StoryResult, GenerationError> {
        let mut prompt = request_text.trim().to_string();
        let mut grounding = Vec::new();
        let mut verified = Vec::new();
        let mut feedback = Vec::new();

        match revision {
            None => {
                if self.prefetch_facts {
                    let mut found = facts::detect_topics(request_text);
                    if let Some(checker) = &self.fact_checker {
                        (found, verified) = check_facts(checker, found).await;
                    }
                    if let Some(section) = grounding_section(&found, &verified) {
                        prompt.push_str("\n\n");
                        prompt.push_str(&section);
                    }
                    grounding = found.iter().map(|f| f.key.to_string()).collect();
                }
            }
            Some(revision) => {
                prompt.push_str("\n\n");
                prompt.push_str(include_str!("prompts/revision.txt"));
                prompt.push_str(revision.previous_story.trim());
                prompt.push('\n');
                feedback = revision.feedback.to_vec();
            }
        }

        let params = GenerationParams {
            temperature: self
                .temperature
                .unwrap_or_else(|| constraints.persona.temperature()),
            max_tokens: self.max_tokens,
        };
        let request = GenerationRequest::new(prompt, PersonaKind::Storyteller, params)
            .with_feedback(feedback);
        let claude_request = request.to_claude(
            &self.system_prompt(constraints),
            self.model_override.as_deref(),
        );

        let (text, invocations, rounds, model) = if self.tools_enabled {
            let output = self
                .bridge
                .run(self.model.as_ref(), claude_request)
                .await
                .map_err(|e| {
                    tracing::debug!(error = %e, "storyteller bridge failed");
                    GenerationError::Unavailable(e.into_model_error())
                })?;
            (output.text, output.invocations, output.rounds, output.model)
        } else {
            let response = bounded(
                self.call_timeout,
                claude::Error::Timeout,
                self.model.complete(claude_request),
            )
            .await?;
            (response.text(), Vec::<ToolInvocation>::new(), 1, response.model)
        };

        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(GenerationError::EmptyResponse);
        }

        let model = if model.is_empty() {
            self.model.name().to_string()
        } else {
            model
        };

        Ok(StoryResult {
            text,
            path: GenerationPath::Primary,
            invocations,
            grounding,
            verified,
            model,
            judged: false,
            rounds,
        })
    }
}

/// Run each prefetched fact past the checker. Facts judged inaccurate are
/// dropped. A failed check keeps the fact without marking it verified.
async fn check_facts(
    checker: &FactChecker,
    found: Vec<&'static Fact>,
) -> (Vec<&'static Fact>, Vec<String>) {
    let mut kept = Vec::with_capacity(found.len());
    let mut verified = Vec::new();
    for fact in found {
        match checker.verify(fact).await {
            Ok(check) if check.is_rejected() => {
                tracing::warn!(fact = fact.key, concerns = ?check.concerns, "dropping inaccurate fact");
            }
            Ok(check) => {
                if check.is_verified() {
                    verified.push(fact.key.to_string());
                }
                kept.push(fact);
            }
            Err(e) => {
                tracing::warn!(fact = fact.key, error = %e, "fact check failed, using fact unchecked");
                kept.push(fact);
            }
        }
    }
    (kept, verified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persona::{StoryPersona, StoryValue};
    use crate::testing::{text_response, tool_call_response, Scripted, ScriptedModel};
    use claude::ContentBlock;

    fn first_user_text(request: &claude::Request) -> String {
        match &request.messages[0].content[0] {
            ContentBlock::Text { text } => text.clone(),
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_first_attempt_prefetches_grounding() {
        let model = Arc::new(ScriptedModel::replies([text_response("The Moon Dance\n\nOnce...")]));
        let teller = Storyteller::new(model.clone(), &PipelineConfig::default());

        let story = teller
            .generate("A bunny who visits the moon", &StoryConstraints::default(), None)
            .await
            .unwrap();

        assert_eq!(story.path, GenerationPath::Primary);
        assert_eq!(story.grounding, vec!["moon".to_string()]);
        assert!(!story.judged);

        let sent = model.requests();
        let user = first_user_text(&sent[0]);
        assert!(user.contains("## Educational facts"));
        assert!(sent[0].system.as_deref().unwrap().contains("Balanced Storyteller"));
        assert_eq!(sent[0].temperature, Some(0.8));
    }

    #[tokio::test]
    async fn test_revision_carries_story_and_feedback() {
        let model = Arc::new(ScriptedModel::replies([text_response("A better story")]));
        let teller = Storyteller::new(model.clone(), &PipelineConfig::default());
        let feedback = vec!["Make the ending calmer".to_string()];
        let revision = Revision {
            previous_story: "The old story",
            feedback: &feedback,
        };

        let story = teller
            .generate("A bunny who visits the moon", &StoryConstraints::default(), Some(&revision))
            .await
            .unwrap();

        assert!(story.grounding.is_empty());
        let user = first_user_text(&model.requests()[0]);
        assert!(user.contains("The old story"));
        assert!(user.contains("1. Make the ending calmer"));
        assert!(!user.contains("## Educational facts"));
    }

    #[tokio::test]
    async fn test_persona_sets_temperature_unless_overridden() {
        let model = Arc::new(ScriptedModel::replies([
            text_response("one"),
            text_response("two"),
        ]));
        let constraints = StoryConstraints::new()
            .with_persona(StoryPersona::CreativeDreamer)
            .with_values([StoryValue::Courage]);

        let teller = Storyteller::new(model.clone(), &PipelineConfig::default());
        teller.generate("dragons", &constraints, None).await.unwrap();

        let config = PipelineConfig::default().with_storyteller_temperature(0.3);
        let teller = Storyteller::new(model.clone(), &config);
        teller.generate("dragons", &constraints, None).await.unwrap();

        let sent = model.requests();
        assert_eq!(sent[0].temperature, Some(0.9));
        assert_eq!(sent[1].temperature, Some(0.3));
    }

    #[tokio::test]
    async fn test_tools_disabled_sends_no_tools() {
        let model = Arc::new(ScriptedModel::replies([text_response("story")]));
        let config = PipelineConfig::default().with_tools(false);
        let teller = Storyteller::new(model.clone(), &config);

        let story = teller
            .generate("whales", &StoryConstraints::default(), None)
            .await
            .unwrap();
        assert_eq!(story.rounds, 1);
        assert!(model.requests()[0].tools.is_none());
    }

    #[tokio::test]
    async fn test_failures_are_unavailable() {
        let model = Arc::new(ScriptedModel::new([Scripted::Fail("500".to_string())]));
        let teller = Storyteller::new(model, &PipelineConfig::default());
        let err = teller
            .generate("whales", &StoryConstraints::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Unavailable(_)));

        let model = Arc::new(ScriptedModel::replies([text_response("   \n ")]));
        let teller = Storyteller::new(model, &PipelineConfig::default());
        let err = teller
            .generate("whales", &StoryConstraints::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_invocations_are_reported() {
        let model = Arc::new(ScriptedModel::replies([
            tool_call_response("", "octopus"),
            text_response("Ollie the octopus had three hearts."),
        ]));
        let teller = Storyteller::new(model, &PipelineConfig::default());
        let story = teller
            .generate("a sea story", &StoryConstraints::default(), None)
            .await
            .unwrap();
        assert_eq!(story.topics(), vec!["octopus"]);
        assert_eq!(story.rounds, 2);
    }

    #[tokio::test]
    async fn test_fact_check_marks_and_drops_prefetched_facts() {
        let model = Arc::new(ScriptedModel::replies([
            text_response("SCORE: 9/10\nAGE_APPROPRIATE: yes\nVERDICT: VERIFIED"),
            text_response("SCORE: 2/10\nVERDICT: INACCURATE"),
            text_response("Pip the penguin waved at the moon."),
        ]));
        let config = PipelineConfig::default().with_fact_check(true);
        let teller = Storyteller::new(model.clone(), &config);

        let story = teller
            .generate("penguins on the moon", &StoryConstraints::default(), None)
            .await
            .unwrap();

        assert_eq!(story.grounding, vec!["moon".to_string()]);
        assert_eq!(story.verified, vec!["moon".to_string()]);

        let sent = model.requests();
        assert_eq!(sent.len(), 3);
        assert!(first_user_text(&sent[0]).contains("Topic: moon"));
        assert!(first_user_text(&sent[1]).contains("Topic: penguins"));
        let user = first_user_text(&sent[2]);
        assert!(user.contains("- moon (space, verified)"));
        assert!(!user.contains("penguins (animals)"));
    }

    #[tokio::test]
    async fn test_failed_fact_check_keeps_fact_unmarked() {
        let model = Arc::new(ScriptedModel::new([
            Scripted::Fail("overloaded".to_string()),
            Scripted::Reply(text_response("The Moon Dance")),
        ]));
        let config = PipelineConfig::default().with_fact_check(true);
        let teller = Storyteller::new(model.clone(), &config);

        let story = teller
            .generate("A bunny who visits the moon", &StoryConstraints::default(), None)
            .await
            .unwrap();

        assert_eq!(story.grounding, vec!["moon".to_string()]);
        assert!(story.verified.is_empty());
        let user = first_user_text(&model.requests()[1]);
        assert!(user.contains("- moon (space):"));
    }

    #[tokio::test]
    async fn test_revisions_skip_fact_check() {
        let model = Arc::new(ScriptedModel::replies([text_response("A calmer story")]));
        let config = PipelineConfig::default().with_fact_check(true);
        let teller = Storyteller::new(model.clone(), &config);
        let revision = Revision {
            previous_story: "The old story",
            feedback: &[],
        };

        teller
            .generate("A bunny who visits the moon", &StoryConstraints::default(), Some(&revision))
            .await
            .unwrap();
        assert_eq!(model.call_count(), 1);
    }
}
