//! Story agents.
//!
//! Contains the storyteller with its fact-lookup tool loop, the local
//! fallback storyteller, the judge that scores drafts and an optional
//! checker for prefetched facts.

mod bridge;
mod fact_checker;
mod fallback;
mod judge;
mod model;
mod request;
mod story;
mod storyteller;
pub mod tools;

pub use bridge::{BridgeError, BridgeOutput, Termination, ToolBridge, ToolInvocation};
pub use fact_checker::{
    parse_fact_check, FactCheck, FactCheckError, FactCheckVerdict, FactChecker,
};
pub use fallback::{FallbackError, FallbackStoryteller};
pub use judge::{
    parse_verdict, CriterionScores, Judge, JudgeError, JudgeVerdict, VerdictLabel,
    VerdictParseError, SCORE_MAX, SCORE_MIN,
};
pub use model::{LocalModel, TextModel};
pub use request::{GenerationParams, GenerationRequest, PersonaKind};
pub use story::{GenerationPath, StoryResult};
pub use storyteller::{GenerationError, Revision, Storyteller};
pub use tools::{FactTools, FACT_TOOL};
