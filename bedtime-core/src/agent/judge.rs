//! Story judge: scores a story against a fixed rubric.
//!
//! The judge is asked for a line-oriented format, but models drift, so the
//! parser also accepts a JSON object and, as a last resort, any `N/10`.

use super::model::{bounded, TextModel};
use super::request::{GenerationParams, GenerationRequest, PersonaKind};
use crate::config::PipelineConfig;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const SCORE_MIN: f32 = 1.0;
pub const SCORE_MAX: f32 = 10.0;

lazy_static! {
    static ref SCORE_LINE: Regex =
        Regex::new(r"(?im)^[\s*#_-]*(OVERALL(?:[ _]SCORE)?|SCORE)[\s*_]*:[\s*]*(-?\d+(?:\.\d+)?)").unwrap();
    static ref CRITERION_LINE: Regex = Regex::new(
        r"(?im)^[\s*#_-]*(AGE[ _]APPROPRIATENESS|EDUCATIONAL[ _]VALUE|NARRATIVE[ _]QUALITY|SAFETY|ENGAGEMENT|STRUCTURE)[\s*_]*:[\s*]*(-?\d+(?:\.\d+)?)"
    )
    .unwrap();
    static ref VERDICT_LINE: Regex = Regex::new(r"(?im)^[\s*#_-]*VERDICT[\s*_]*:[\s*]*(.+)$").unwrap();
    static ref FEEDBACK_SECTION: Regex = Regex::new(r"(?ims)^[\s*#_-]*FEEDBACK[\s*_]*:[\s*]*(.*)\z").unwrap();
    static ref CRITERION_PREFIX: Regex = Regex::new(
        r"(?i)^[\s*#_-]*(AGE[ _]APPROPRIATENESS|EDUCATIONAL[ _]VALUE|NARRATIVE[ _]QUALITY|SAFETY|ENGAGEMENT|STRUCTURE)\b"
    )
    .unwrap();
    static ref OUT_OF_TEN: Regex = Regex::new(r"(-?\d+(?:\.\d+)?)\s*/\s*10\b").unwrap();
    static ref SCORE_ANYWHERE: Regex = Regex::new(r"(?i)\bscore\b\s*[:=]?\s*(-?\d+(?:\.\d+)?)").unwrap();
}

/// The judge's stated verdict, when it gives one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerdictLabel {
    Approved,
    NeedsRevision,
}

/// Per-criterion scores; any the judge omitted are `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CriterionScores {
    pub age_appropriateness: Option<f32>,
    pub educational_value: Option<f32>,
    pub narrative_quality: Option<f32>,
    pub safety: Option<f32>,
    pub engagement: Option<f32>,
    pub structure: Option<f32>,
}

impl CriterionScores {
    fn set(&mut self, name: &str, score: f32) {
        let slot = match normalize_key(name).as_str() {
            "age_appropriateness" => &mut self.age_appropriateness,
            "educational_value" => &mut self.educational_value,
            "narrative_quality" => &mut self.narrative_quality,
            "safety" => &mut self.safety,
            "engagement" => &mut self.engagement,
            "structure" => &mut self.structure,
            _ => return,
        };
        if (SCORE_MIN..=SCORE_MAX).contains(&score) {
            *slot = Some(score);
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A parsed judgement of one story.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeVerdict {
    /// Overall score, always within `SCORE_MIN..=SCORE_MAX`.
    pub score: f32,
    pub criteria: CriterionScores,
    pub label: Option<VerdictLabel>,
    pub feedback: String,
    pub meets_threshold: bool,
}

#[derive(Debug, Error, PartialEq)]
pub enum VerdictParseError {
    #[error("no score found in judge response")]
    NoScore,

    #[error("judge score {0} is outside 1-10")]
    OutOfRange(f32),
}

#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("judge call failed: {0}")]
    Model(#[from] claude::Error),

    #[error("could not parse judge response: {0}")]
    Parse(#[from] VerdictParseError),
}

pub struct Judge {
    model: Arc<dyn TextModel>,
    model_override: Option<String>,
    params: GenerationParams,
    threshold: f32,
    call_timeout: Duration,
}

impl Judge {
    pub fn new(model: Arc<dyn TextModel>, config: &PipelineConfig) -> Self {
        Self {
            model,
            model_override: config.judge_model.clone().or_else(|| config.model.clone()),
            params: GenerationParams {
                temperature: config.judge_temperature,
                max_tokens: config.max_judge_tokens,
            },
            threshold: config.quality_threshold,
            call_timeout: config.call_timeout,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Score a story written for `request_text`.
    pub async fn evaluate(
        &self,
        story_text: &str,
        request_text: &str,
    ) -> Result<JudgeVerdict, JudgeError> {
        let prompt = format!(
            "Evaluate this bedtime story.\n\nParent's request: {}\n\nStory:\n{}\n",
            request_text.trim(),
            story_text.trim()
        );
        let request = GenerationRequest::new(prompt, PersonaKind::Judge, self.params)
            .to_claude(include_str!("prompts/judge.txt"), self.model_override.as_deref());

        let response = bounded(
            self.call_timeout,
            claude::Error::Timeout,
            self.model.complete(request),
        )
        .await?;

        let verdict = parse_verdict(&response.text(), self.threshold)?;
        tracing::debug!(
            score = verdict.score,
            label = ?verdict.label,
            meets = verdict.meets_threshold,
            "judge verdict"
        );
        Ok(verdict)
    }
}

/// Parse a judge response into a verdict.
///
/// Tries a JSON object first (optionally fenced), then the line format,
/// then any `N/10` or `score: N` in the text.
pub fn parse_verdict(text: &str, threshold: f32) -> Result<JudgeVerdict, VerdictParseError> {
    let parsed = parse_json(text)
        .or_else(|| parse_lines(text))
        .or_else(|| parse_loose(text));

    let Some((score, criteria, label, feedback)) = parsed else {
        return Err(VerdictParseError::NoScore);
    };

    if !score.is_finite() || !(SCORE_MIN..=SCORE_MAX).contains(&score) {
        return Err(VerdictParseError::OutOfRange(score));
    }

    let feedback = match feedback {
        Some(f) if !f.trim().is_empty() => f.trim().to_string(),
        _ => text.trim().to_string(),
    };

    Ok(JudgeVerdict {
        score,
        criteria,
        label,
        feedback,
        meets_threshold: score >= threshold,
    })
}

type Parsed = (f32, CriterionScores, Option<VerdictLabel>, Option<String>);

fn parse_json(text: &str) -> Option<Parsed> {
    let value: Value = serde_json::from_str(extract_json(text)).ok()?;
    let obj = value.as_object()?;

    let score = ["overall_score", "score", "overall"]
        .iter()
        .find_map(|k| obj.get(*k).and_then(number))?;

    let mut criteria = CriterionScores::default();
    let scores = obj.get("scores").and_then(Value::as_object).unwrap_or(obj);
    for (key, value) in scores {
        if let Some(n) = number(value) {
            criteria.set(key, n);
        }
    }

    let label = obj
        .get("verdict")
        .and_then(Value::as_str)
        .and_then(parse_label);
    let feedback = obj
        .get("feedback")
        .and_then(Value::as_str)
        .map(str::to_string);

    Some((score, criteria, label, feedback))
}

fn parse_lines(text: &str) -> Option<Parsed> {
    let score = SCORE_LINE
        .captures(text)
        .and_then(|c| c.get(2))
        .and_then(|m| m.as_str().parse().ok())?;

    let mut criteria = CriterionScores::default();
    for caps in CRITERION_LINE.captures_iter(text) {
        if let (Some(name), Some(n)) = (caps.get(1), caps.get(2)) {
            if let Ok(n) = n.as_str().parse() {
                criteria.set(name.as_str(), n);
            }
        }
    }

    let label = VERDICT_LINE
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| parse_label(m.as_str()));
    let feedback = FEEDBACK_SECTION
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string());

    Some((score, criteria, label, feedback))
}

/// Last resort. Criterion lines are skipped; a line mentioning "overall"
/// wins over any other, and among those the last one counts.
fn parse_loose(text: &str) -> Option<Parsed> {
    let mut overall = None;
    let mut other = None;
    for line in text.lines() {
        if CRITERION_PREFIX.is_match(line) {
            continue;
        }
        let Some(score) = OUT_OF_TEN
            .captures_iter(line)
            .last()
            .or_else(|| SCORE_ANYWHERE.captures(line))
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<f32>().ok())
        else {
            continue;
        };
        if line.to_lowercase().contains("overall") {
            overall = Some(score);
        } else if other.is_none() {
            other = Some(score);
        }
    }
    let score = overall.or(other)?;
    Some((score, CriterionScores::default(), None, None))
}

fn parse_label(s: &str) -> Option<VerdictLabel> {
    let s = s.to_uppercase().replace([' ', '-'], "_");
    if s.contains("NEEDS_REVISION") || s.contains("REVISE") {
        Some(VerdictLabel::NeedsRevision)
    } else if s.contains("APPROVED") {
        Some(VerdictLabel::Approved)
    } else {
        None
    }
}

fn number(value: &Value) -> Option<f32> {
    match value {
        Value::Number(n) => n.as_f64().map(|n| n as f32),
        Value::String(s) => s.split('/').next()?.trim().parse().ok(),
        _ => None,
    }
}

fn normalize_key(name: &str) -> String {
    name.trim().to_lowercase().replace([' ', '-'], "_")
}

/// Extract JSON from text that might be wrapped in markdown code blocks.
fn extract_json(text: &str) -> &str {
    let text = text.trim();

    // Handle ```json ... ``` blocks
    if let Some(start) = text.find("```json") {
        let content_start = start + 7;
        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim();
        }
    }

    // Handle ``` ... ``` blocks (without json specifier)
    if let Some(start) = text.find("```") {
        let content_start = start + 3;
        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim();
        }
    }

    // Bare object somewhere in prose
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            return &text[start..=end];
        }
    }

    text
}
