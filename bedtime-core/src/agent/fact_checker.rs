//! Fact checker: asks the remote model to confirm a table fact before it
//! goes into a story prompt.

use super::model::{bounded, TextModel};
use super::request::{GenerationParams, GenerationRequest, PersonaKind};
use crate::config::PipelineConfig;
use crate::facts::Fact;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const CHECK_MAX_TOKENS: usize = 500;

lazy_static! {
    static ref VERDICT: Regex = Regex::new(
        r"(?im)^[\s*#_-]*VERDICT[\s*_]*:[\s*]*(VERIFIED|NEEDS[ _]CORRECTION|INACCURATE)"
    )
    .unwrap();
    static ref SCORE: Regex =
        Regex::new(r"(?im)^[\s*#_-]*SCORE[\s*_]*:[\s*]*(\d+(?:\.\d+)?)").unwrap();
    static ref AGE_APPROPRIATE: Regex =
        Regex::new(r"(?im)^[\s*#_-]*AGE[ _]APPROPRIATE[\s*_]*:[\s*]*(yes|no)\b").unwrap();
    static ref CONCERNS: Regex = Regex::new(r"(?im)^[\s*#_-]*CONCERNS[\s*_]*:[\s*]*(.*)$").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactCheckVerdict {
    Verified,
    NeedsCorrection,
    Inaccurate,
}

/// The checker's view of one fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactCheck {
    pub key: String,
    pub verdict: FactCheckVerdict,
    /// Accuracy out of 10, when the checker gave one.
    pub score: Option<f32>,
    pub age_appropriate: bool,
    pub concerns: Option<String>,
}

impl FactCheck {
    pub fn is_verified(&self) -> bool {
        self.verdict == FactCheckVerdict::Verified && self.age_appropriate
    }

    /// Facts judged wrong are left out of the prompt.
    pub fn is_rejected(&self) -> bool {
        self.verdict == FactCheckVerdict::Inaccurate
    }
}

#[derive(Debug, Error)]
pub enum FactCheckError {
    #[error("fact check call failed: {0}")]
    Model(#[from] claude::Error),

    #[error("fact check for '{0}' had no verdict")]
    NoVerdict(String),
}

pub struct FactChecker {
    model: Arc<dyn TextModel>,
    model_override: Option<String>,
    params: GenerationParams,
    call_timeout: Duration,
}

impl FactChecker {
    pub fn new(model: Arc<dyn TextModel>, config: &PipelineConfig) -> Self {
        Self {
            model,
            model_override: config.judge_model.clone().or_else(|| config.model.clone()),
            params: GenerationParams {
                temperature: config.judge_temperature,
                max_tokens: CHECK_MAX_TOKENS,
            },
            call_timeout: config.call_timeout,
        }
    }

    pub async fn verify(&self, fact: &Fact) -> Result<FactCheck, FactCheckError> {
        let prompt = format!(
            "Verify this educational fact for children aged 5 to 10.\n\nTopic: {}\nFact: {}\n",
            fact.key, fact.text
        );
        let request = GenerationRequest::new(prompt, PersonaKind::FactChecker, self.params)
            .to_claude(include_str!("prompts/fact_checker.txt"), self.model_override.as_deref());

        let response = bounded(
            self.call_timeout,
            claude::Error::Timeout,
            self.model.complete(request),
        )
        .await?;

        let check = parse_fact_check(fact.key, &response.text())?;
        tracing::debug!(
            fact = fact.key,
            verdict = ?check.verdict,
            score = ?check.score,
            "fact checked"
        );
        Ok(check)
    }
}

/// Parse the checker's line format. A reply without a verdict is an error
/// rather than an implicit pass.
pub fn parse_fact_check(key: &str, text: &str) -> Result<FactCheck, FactCheckError> {
    let verdict = VERDICT
        .captures(text)
        .map(|caps| match caps[1].to_uppercase().replace(' ', "_").as_str() {
            "VERIFIED" => FactCheckVerdict::Verified,
            "INACCURATE" => FactCheckVerdict::Inaccurate,
            _ => FactCheckVerdict::NeedsCorrection,
        })
        .ok_or_else(|| FactCheckError::NoVerdict(key.to_string()))?;

    let score = SCORE
        .captures(text)
        .and_then(|caps| caps[1].parse::<f32>().ok())
        .filter(|s| (1.0..=10.0).contains(s));

    let age_appropriate = AGE_APPROPRIATE
        .captures(text)
        .map_or(true, |caps| !caps[1].eq_ignore_ascii_case("no"));

    let concerns = CONCERNS
        .captures(text)
        .map(|caps| caps[1].trim().trim_matches(|c| c == '[' || c == ']').trim().to_string())
        .filter(|c| !c.is_empty() && !c.eq_ignore_ascii_case("none"));

    Ok(FactCheck {
        key: key.to_string(),
        verdict,
        score,
        age_appropriate,
        concerns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts;
    use crate::testing::{text_response, Scripted, ScriptedModel};

    #[test]
    fn test_parse_verified_fact() {
        let check = parse_fact_check(
            "moon",
            "ACCURACY: true\nSCORE: 9/10\nAGE_APPROPRIATE: yes\nCONCERNS: none\nVERDICT: VERIFIED",
        )
        .unwrap();
        assert_eq!(check.verdict, FactCheckVerdict::Verified);
        assert_eq!(check.score, Some(9.0));
        assert!(check.concerns.is_none());
        assert!(check.is_verified());
        assert!(!check.is_rejected());
    }

    #[test]
    fn test_parse_correction_with_concerns() {
        let check = parse_fact_check(
            "mars",
            "**SCORE:** 6/10\n**AGE_APPROPRIATE:** yes\n**CONCERNS:** [The day length is rounded]\n**VERDICT:** NEEDS_CORRECTION",
        )
        .unwrap();
        assert_eq!(check.verdict, FactCheckVerdict::NeedsCorrection);
        assert_eq!(check.concerns.as_deref(), Some("The day length is rounded"));
        assert!(!check.is_verified());
        assert!(!check.is_rejected());
    }

    #[test]
    fn test_not_age_appropriate_is_not_verified() {
        let check = parse_fact_check("lions", "AGE_APPROPRIATE: no\nVERDICT: VERIFIED").unwrap();
        assert!(!check.age_appropriate);
        assert!(!check.is_verified());
    }

    #[test]
    fn test_missing_verdict_is_an_error() {
        let err = parse_fact_check("sun", "SCORE: 10/10\nLooks fine to me.").unwrap_err();
        assert!(matches!(err, FactCheckError::NoVerdict(key) if key == "sun"));
    }

    #[tokio::test]
    async fn test_verify_sends_the_fact_at_low_temperature() {
        let model = Arc::new(ScriptedModel::replies([text_response(
            "SCORE: 3/10\nVERDICT: INACCURATE",
        )]));
        let checker = FactChecker::new(model.clone(), &PipelineConfig::default());
        let moon = facts::lookup("moon").unwrap();

        let check = checker.verify(moon).await.unwrap();
        assert!(check.is_rejected());

        let sent = model.requests();
        assert_eq!(sent[0].temperature, Some(0.2));
        assert_eq!(sent[0].max_tokens, CHECK_MAX_TOKENS);
        assert!(sent[0].tools.is_none());
        assert!(sent[0].system.as_deref().unwrap().contains("VERDICT"));
    }

    #[tokio::test]
    async fn test_model_failure_surfaces() {
        let model = Arc::new(ScriptedModel::new([Scripted::Fail("503".to_string())]));
        let checker = FactChecker::new(model, &PipelineConfig::default());
        let err = checker.verify(facts::lookup("whales").unwrap()).await.unwrap_err();
        assert!(matches!(err, FactCheckError::Model(_)));
    }
}
