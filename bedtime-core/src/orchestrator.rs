//! The story pipeline control loop.
//!
//! A request is drafted by the primary storyteller, scored by the judge and
//! revised with the judge's feedback until it meets the quality threshold or
//! the iteration cap is reached. If the very first draft cannot be produced,
//! the local fallback writes the story instead and nothing is judged.

use crate::agent::{
    FallbackError, FallbackStoryteller, GenerationError, GenerationPath, Judge, JudgeVerdict,
    LocalModel, Revision, Storyteller, StoryResult, TextModel,
};
use crate::config::{ConfigError, PipelineConfig};
use crate::persist::{RunRecord, StoryRecord, StoryStore};
use crate::persona::StoryConstraints;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What the caller asked for.
#[derive(Debug, Clone, PartialEq)]
pub struct StoryRequest {
    pub prompt: String,
    pub constraints: StoryConstraints,
}

impl StoryRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            constraints: StoryConstraints::default(),
        }
    }

    pub fn with_constraints(mut self, constraints: StoryConstraints) -> Self {
        self.constraints = constraints;
        self
    }
}

/// The story handed back to the caller.
#[derive(Debug, Clone)]
pub enum StoryOutcome {
    /// Written by the remote storyteller.
    Primary {
        story: StoryResult,
        /// `None` only if the judge never produced a usable score.
        verdict: Option<JudgeVerdict>,
        /// Drafts produced, first included. Never exceeds the configured cap.
        iterations: u32,
        /// Judge feedback for every scored draft, oldest first.
        feedback_history: Vec<String>,
    },
    /// Written by the local model after the primary path failed.
    Fallback { story: StoryResult, reason: String },
}

impl StoryOutcome {
    pub fn story(&self) -> &StoryResult {
        match self {
            StoryOutcome::Primary { story, .. } | StoryOutcome::Fallback { story, .. } => story,
        }
    }

    pub fn into_story(self) -> StoryResult {
        match self {
            StoryOutcome::Primary { story, .. } | StoryOutcome::Fallback { story, .. } => story,
        }
    }

    pub fn text(&self) -> &str {
        &self.story().text
    }

    pub fn path(&self) -> GenerationPath {
        self.story().path
    }

    pub fn verdict(&self) -> Option<&JudgeVerdict> {
        match self {
            StoryOutcome::Primary { verdict, .. } => verdict.as_ref(),
            StoryOutcome::Fallback { .. } => None,
        }
    }

    /// Primary drafts produced; zero on the fallback path.
    pub fn iterations(&self) -> u32 {
        match self {
            StoryOutcome::Primary { iterations, .. } => *iterations,
            StoryOutcome::Fallback { .. } => 0,
        }
    }

    pub fn feedback_history(&self) -> &[String] {
        match self {
            StoryOutcome::Primary {
                feedback_history, ..
            } => feedback_history,
            StoryOutcome::Fallback { .. } => &[],
        }
    }

    pub fn meets_threshold(&self) -> bool {
        self.verdict().is_some_and(|v| v.meets_threshold)
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no story could be written: primary failed ({primary}) and fallback failed ({source})")]
    FallbackUnavailable {
        primary: GenerationError,
        #[source]
        source: FallbackError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    GeneratingPrimary,
    Judging,
    RefiningPrimary,
    GeneratingFallback,
    Done,
}

struct Transitions {
    request_id: Uuid,
    state: State,
}

impl Transitions {
    fn new(request_id: Uuid) -> Self {
        Self {
            request_id,
            state: State::Start,
        }
    }

    fn enter(&mut self, next: State) {
        debug!(request_id = %self.request_id, from = ?self.state, to = ?next, "pipeline transition");
        self.state = next;
    }
}

#[derive(Debug, Clone)]
struct Attempt {
    story: StoryResult,
    verdict: Option<JudgeVerdict>,
}

impl Attempt {
    /// Whether this attempt should replace `best`. Scored beats unscored;
    /// equal rank goes to the later attempt.
    fn outranks(&self, best: &Attempt) -> bool {
        match (&self.verdict, &best.verdict) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(new), Some(old)) => new.score >= old.score,
        }
    }
}

/// Progress of one refinement loop.
struct RefinementState {
    iterations: u32,
    best: Attempt,
    latest_text: String,
    latest_met: bool,
    feedback_history: Vec<String>,
}

impl RefinementState {
    fn new(first: Attempt) -> Self {
        let mut state = Self {
            iterations: 1,
            latest_text: first.story.text.clone(),
            latest_met: false,
            feedback_history: Vec::new(),
            best: first.clone(),
        };
        state.note(&first);
        state
    }

    fn record(&mut self, attempt: Attempt) {
        self.iterations += 1;
        self.latest_text = attempt.story.text.clone();
        self.note(&attempt);
        if attempt.outranks(&self.best) {
            self.best = attempt;
        }
    }

    fn note(&mut self, attempt: &Attempt) {
        self.latest_met = attempt
            .verdict
            .as_ref()
            .is_some_and(|v| v.meets_threshold);
        if let Some(verdict) = &attempt.verdict {
            self.feedback_history.push(verdict.feedback.clone());
        }
    }

    fn finished(&self, cap: u32) -> bool {
        self.latest_met || self.iterations >= cap
    }

    fn into_outcome(self) -> StoryOutcome {
        StoryOutcome::Primary {
            story: self.best.story,
            verdict: self.best.verdict,
            iterations: self.iterations,
            feedback_history: self.feedback_history,
        }
    }
}

/// Runs requests through storyteller, judge, refinement and fallback.
///
/// `generate` takes `&self`, so one orchestrator behind an `Arc` can serve
/// concurrent requests.
pub struct Orchestrator {
    config: PipelineConfig,
    storyteller: Storyteller,
    judge: Judge,
    fallback: FallbackStoryteller,
    store: Option<Arc<dyn StoryStore>>,
}

impl Orchestrator {
    /// Build an orchestrator. The primary model also serves as judge unless
    /// `with_judge_model` replaces it.
    pub fn new(
        primary: Arc<dyn TextModel>,
        local: Arc<dyn LocalModel>,
        config: PipelineConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            storyteller: Storyteller::new(primary.clone(), &config),
            judge: Judge::new(primary, &config),
            fallback: FallbackStoryteller::new(local, &config),
            store: None,
            config,
        })
    }

    pub fn with_judge_model(mut self, judge: Arc<dyn TextModel>) -> Self {
        self.judge = Judge::new(judge, &self.config);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn StoryStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Produce a story for `request`.
    ///
    /// The only error is both generators failing; judge failures, refinement
    /// failures and store failures are absorbed.
    pub async fn generate(&self, request: &StoryRequest) -> Result<StoryOutcome, PipelineError> {
        let request_id = Uuid::new_v4();
        let started = Instant::now();
        let mut transitions = Transitions::new(request_id);

        info!(
            %request_id,
            persona = %request.constraints.persona,
            tools = self.config.tools_enabled,
            "story requested"
        );

        transitions.enter(State::GeneratingPrimary);
        let result = match self
            .storyteller
            .generate(&request.prompt, &request.constraints, None)
            .await
        {
            Ok(first) => Ok(self.refine(request, first, &mut transitions).await),
            Err(primary) => {
                warn!(%request_id, error = %primary, "primary storyteller failed; using local fallback");
                transitions.enter(State::GeneratingFallback);
                match self
                    .fallback
                    .generate(&request.prompt, &request.constraints)
                    .await
                {
                    Ok(story) => Ok(StoryOutcome::Fallback {
                        story,
                        reason: primary.to_string(),
                    }),
                    Err(source) => Err(PipelineError::FallbackUnavailable { primary, source }),
                }
            }
        };
        transitions.enter(State::Done);

        let elapsed = started.elapsed().as_secs_f64();
        match &result {
            Ok(outcome) => info!(
                %request_id,
                path = %outcome.path(),
                iterations = outcome.iterations(),
                score = outcome.verdict().map(|v| v.score),
                elapsed_secs = elapsed,
                "story finished"
            ),
            Err(e) => tracing::error!(%request_id, error = %e, "story request failed"),
        }

        self.persist(request_id, request, &result, elapsed).await;
        result
    }

    async fn refine(
        &self,
        request: &StoryRequest,
        first: StoryResult,
        transitions: &mut Transitions,
    ) -> StoryOutcome {
        let cap = self.config.max_iterations;
        let first = self.judge_attempt(request, first, 1, transitions).await;
        let mut state = RefinementState::new(first);

        while !state.finished(cap) {
            transitions.enter(State::RefiningPrimary);
            let revision = Revision {
                previous_story: &state.latest_text,
                feedback: &state.feedback_history,
            };
            let story = match self
                .storyteller
                .generate(&request.prompt, &request.constraints, Some(&revision))
                .await
            {
                Ok(story) => story,
                Err(e) => {
                    warn!(
                        request_id = %transitions.request_id,
                        iteration = state.iterations + 1,
                        error = %e,
                        "refinement failed; keeping the best draft so far"
                    );
                    break;
                }
            };

            let attempt = self
                .judge_attempt(request, story, state.iterations + 1, transitions)
                .await;
            state.record(attempt);
        }

        state.into_outcome()
    }

    async fn judge_attempt(
        &self,
        request: &StoryRequest,
        mut story: StoryResult,
        iteration: u32,
        transitions: &mut Transitions,
    ) -> Attempt {
        transitions.enter(State::Judging);
        let verdict = match self.judge.evaluate(&story.text, &request.prompt).await {
            Ok(verdict) => {
                story.judged = true;
                Some(verdict)
            }
            Err(e) => {
                warn!(
                    request_id = %transitions.request_id,
                    iteration,
                    error = %e,
                    "judge failed; treating draft as below threshold"
                );
                None
            }
        };

        info!(
            request_id = %transitions.request_id,
            iteration,
            words = story.word_count(),
            lookups = story.invocations.len(),
            score = verdict.as_ref().map(|v| v.score),
            threshold = self.judge.threshold(),
            "draft judged"
        );

        Attempt { story, verdict }
    }

    async fn persist(
        &self,
        request_id: Uuid,
        request: &StoryRequest,
        result: &Result<StoryOutcome, PipelineError>,
        elapsed_secs: f64,
    ) {
        let Some(store) = &self.store else {
            return;
        };

        if let Ok(outcome) = result {
            let story = outcome.story();
            let record = StoryRecord {
                request_id,
                created_at: Utc::now(),
                prompt: request.prompt.clone(),
                constraints: request.constraints.clone(),
                story: story.text.clone(),
                path: story.path,
                model: story.model.clone(),
                score: outcome.verdict().map(|v| v.score),
                meets_threshold: outcome.meets_threshold(),
                iterations: outcome.iterations(),
                feedback: outcome.feedback_history().to_vec(),
                invocations: story.invocations.clone(),
                grounding: story.grounding.clone(),
                tools_enabled: self.config.tools_enabled && story.path == GenerationPath::Primary,
                quality_threshold: self.config.quality_threshold,
                max_iterations: self.config.max_iterations,
            };
            if let Err(e) = store.append_story(&record).await {
                warn!(%request_id, error = %e, "failed to save story");
            }
        }

        let run = RunRecord {
            request_id,
            created_at: Utc::now(),
            prompt: request.prompt.clone(),
            success: result.is_ok(),
            path: result.as_ref().ok().map(StoryOutcome::path),
            model: result.as_ref().ok().map(|o| o.story().model.clone()),
            error: result.as_ref().err().map(ToString::to_string),
            elapsed_secs,
            tools_enabled: self.config.tools_enabled,
        };
        if let Err(e) = store.append_run(&run).await {
            warn!(%request_id, error = %e, "failed to save run");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{parse_verdict, StoryResult};

    fn attempt(text: &str, score: Option<f32>) -> Attempt {
        Attempt {
            story: StoryResult {
                text: text.to_string(),
                path: GenerationPath::Primary,
                invocations: Vec::new(),
                grounding: Vec::new(),
                verified: Vec::new(),
                model: "m".to_string(),
                judged: score.is_some(),
                rounds: 1,
            },
            verdict: score.map(|s| {
                parse_verdict(&format!("OVERALL_SCORE: {s}/10\nFEEDBACK: try {s}"), 7.0).unwrap()
            }),
        }
    }

    #[test]
    fn test_best_attempt_late_tie_break() {
        let mut state = RefinementState::new(attempt("first", Some(5.0)));
        state.record(attempt("second", Some(5.0)));
        state.record(attempt("third", Some(4.0)));
        assert_eq!(state.best.story.text, "second");
        assert_eq!(state.iterations, 3);
        assert_eq!(state.latest_text, "third");
        assert_eq!(state.feedback_history.len(), 3);
    }

    #[test]
    fn test_unscored_ranks_below_scored() {
        let mut state = RefinementState::new(attempt("scored", Some(3.0)));
        state.record(attempt("unscored", None));
        assert_eq!(state.best.story.text, "scored");

        let mut state = RefinementState::new(attempt("a", None));
        state.record(attempt("b", None));
        assert_eq!(state.best.story.text, "b");
        state.record(attempt("c", Some(2.0)));
        assert_eq!(state.best.story.text, "c");
        assert_eq!(state.feedback_history, vec!["try 2".to_string()]);
    }

    #[test]
    fn test_finished_on_threshold_or_cap() {
        let state = RefinementState::new(attempt("great", Some(9.0)));
        assert!(state.finished(3));

        let mut state = RefinementState::new(attempt("meh", Some(5.0)));
        assert!(!state.finished(3));
        state.record(attempt("meh again", Some(5.5)));
        assert!(!state.finished(3));
        state.record(attempt("still meh", Some(6.0)));
        assert!(state.finished(3));

        let state = RefinementState::new(attempt("only", Some(1.0)));
        assert!(state.finished(1));
    }

    #[test]
    fn test_outcome_accessors() {
        let outcome = RefinementState::new(attempt("story", Some(8.0))).into_outcome();
        assert_eq!(outcome.path(), GenerationPath::Primary);
        assert_eq!(outcome.iterations(), 1);
        assert!(outcome.meets_threshold());
        assert_eq!(outcome.text(), "story");

        let fallback = StoryOutcome::Fallback {
            story: StoryResult::fallback("local".to_string(), "llama3.2".to_string()),
            reason: "down".to_string(),
        };
        assert!(fallback.verdict().is_none());
        assert_eq!(fallback.iterations(), 0);
        assert!(fallback.feedback_history().is_empty());
    }
}
