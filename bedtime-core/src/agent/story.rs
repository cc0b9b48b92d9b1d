//! Generated stories and where they came from.

use super::bridge::ToolInvocation;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which generator produced a story.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationPath {
    Primary,
    Fallback,
}

impl GenerationPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationPath::Primary => "primary",
            GenerationPath::Fallback => "fallback",
        }
    }
}

impl fmt::Display for GenerationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GenerationPath {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary" => Ok(GenerationPath::Primary),
            "fallback" => Ok(GenerationPath::Fallback),
            other => Err(format!("unknown generation path '{other}'")),
        }
    }
}

/// One generated story.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryResult {
    pub text: String,
    pub path: GenerationPath,
    /// Facts the model asked for during this attempt.
    pub invocations: Vec<ToolInvocation>,
    /// Fact keys placed in the prompt up front.
    pub grounding: Vec<String>,
    /// Grounding keys a fact check confirmed.
    #[serde(default)]
    pub verified: Vec<String>,
    pub model: String,
    /// Set once a judge has scored this story. Always false on the fallback path.
    pub judged: bool,
    /// Model round trips this attempt took.
    pub rounds: u32,
}

impl StoryResult {
    pub(crate) fn fallback(text: String, model: String) -> Self {
        Self {
            text,
            path: GenerationPath::Fallback,
            invocations: Vec::new(),
            grounding: Vec::new(),
            verified: Vec::new(),
            model,
            judged: false,
            rounds: 1,
        }
    }

    /// Topics the model looked up, in the order it asked.
    pub fn topics(&self) -> Vec<&str> {
        self.invocations.iter().map(|i| i.topic.as_str()).collect()
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}
