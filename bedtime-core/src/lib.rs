//! Bedtime story pipeline.
//!
//! This crate provides:
//! - A storyteller that grounds stories in a static educational facts table
//!   through a bounded tool-call loop
//! - A judge that scores drafts and a refinement loop driven by its feedback
//! - A local fallback storyteller for when the remote model is unavailable
//! - Story history persistence
//!
//! # Quick Start
//!
//! ```ignore
//! use bedtime_core::{Orchestrator, PipelineConfig, StoryRequest};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let claude = Arc::new(claude::Claude::from_env()?);
//!     let ollama = Arc::new(ollama::Ollama::from_env());
//!     let orchestrator = Orchestrator::new(claude, ollama, PipelineConfig::default())?;
//!
//!     let outcome = orchestrator
//!         .generate(&StoryRequest::new("A penguin who wants to visit the moon"))
//!         .await?;
//!     println!("{}", outcome.text());
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod config;
pub mod facts;
pub mod orchestrator;
pub mod persist;
pub mod persona;
pub mod testing;

// Primary public API
pub use agent::{
    GenerationPath, JudgeVerdict, LocalModel, StoryResult, TextModel, ToolInvocation,
};
pub use config::{ConfigError, PipelineConfig};
pub use orchestrator::{Orchestrator, PipelineError, StoryOutcome, StoryRequest};
pub use persist::{PersistError, SqliteStore, StoryStore};
pub use persona::{Interest, StoryConstraints, StoryPersona, StoryValue};
