//! Bedtime story CLI.
//!
//! ```bash
//! bedtime "A penguin who wants to visit the moon" --persona curious --interest space
//! echo "A shy dragon" | bedtime --name Maya --value courage
//! bedtime history --min-score 8
//! bedtime check
//! ```
//!
//! Needs `ANTHROPIC_API_KEY` for the remote storyteller; without it (or when
//! the API is down) stories come from the local Ollama model.

mod cli;
mod logging;
mod render;

use anyhow::{bail, Context, Result};
use bedtime_core::{
    Orchestrator, PipelineConfig, SqliteStore, StoryConstraints, StoryRequest, StoryStore,
};
use clap::Parser;
use claude::Claude;
use cli::{Cli, Command, TellArgs};
use ollama::Ollama;
use std::io::{self, IsTerminal, Read};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// How long `check` waits for the local server.
const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    logging::init(cli.verbose);

    let (command, db, no_save) = cli.into_command();
    match command {
        Command::Tell(args) => tell(args, &db, no_save).await,
        Command::History { limit, min_score } => {
            let store = open_store(&db)?;
            render::history(&store.recent(limit, min_score).await?);
            Ok(())
        }
        Command::Show { id } => {
            let store = open_store(&db)?;
            match store.get(id).await? {
                Some(stored) => {
                    render::stored(&stored);
                    Ok(())
                }
                None => bail!("no story with id {id}"),
            }
        }
        Command::Stats => {
            let store = open_store(&db)?;
            render::stats(&store.stats().await?);
            Ok(())
        }
        Command::Delete { id } => {
            let store = open_store(&db)?;
            if !store.delete(id).await? {
                bail!("no story with id {id}");
            }
            println!("Deleted story #{id}.");
            Ok(())
        }
        Command::Clear { yes } => {
            if !yes {
                bail!("this removes every stored story and run; pass --yes to confirm");
            }
            let store = open_store(&db)?;
            let removed = store.clear().await?;
            println!("Removed {removed} stories.");
            Ok(())
        }
        Command::Personas => {
            render::personas();
            Ok(())
        }
        Command::Check => check().await,
    }
}

async fn check() -> Result<()> {
    let config = build_config(&TellArgs::default())?;
    let (claude, api_key) = match Claude::from_env() {
        Ok(client) => (client, true),
        Err(_) => (Claude::new(""), false),
    };
    let ollama = Ollama::from_env()
        .with_model(config.local_model_name())
        .with_timeout(CHECK_TIMEOUT);

    let ollama_up = ollama.is_available().await;
    let local_model = if ollama_up {
        match ollama.has_model().await {
            Ok(found) => Some(found),
            Err(e) => {
                warn!("could not list local models: {e}");
                None
            }
        }
    } else {
        None
    };

    let readiness = render::Readiness {
        api_key,
        api_base: claude.base_url(),
        ollama_host: ollama.host(),
        ollama_up,
        local_model,
    };
    render::check(&readiness, &config);
    if !readiness.any_storyteller() {
        bail!("no storyteller is usable: set ANTHROPIC_API_KEY or start Ollama");
    }
    Ok(())
}

async fn tell(args: TellArgs, db: &Path, no_save: bool) -> Result<()> {
    let prompt = read_prompt(args.prompt.as_deref())?;
    let config = build_config(&args)?;
    let constraints = build_constraints(&args);

    let claude = match Claude::from_env() {
        Ok(client) => client,
        Err(e) => {
            // Every remote call then fails fast and the local model takes over.
            warn!("{e}; stories will come from the local model");
            Claude::new("")
        }
    };
    let claude = claude
        .with_model(config.model_name())
        .with_timeout(config.call_timeout);
    let ollama = Ollama::from_env()
        .with_model(config.local_model_name())
        .with_timeout(config.call_timeout);

    let mut orchestrator = Orchestrator::new(Arc::new(claude), Arc::new(ollama), config)?;
    if !no_save {
        match SqliteStore::open(db) {
            Ok(store) => {
                let store: Arc<dyn StoryStore> = Arc::new(store);
                orchestrator = orchestrator.with_store(store);
            }
            Err(e) => warn!(db = %db.display(), "story history disabled: {e}"),
        }
    }

    info!(
        persona = %constraints.persona,
        tools = orchestrator.config().tools_enabled,
        "writing a story"
    );
    let request = StoryRequest::new(prompt).with_constraints(constraints);
    let outcome = orchestrator
        .generate(&request)
        .await
        .context("could not write a story")?;

    render::outcome(&outcome);
    Ok(())
}

fn read_prompt(arg: Option<&str>) -> Result<String> {
    let prompt = match arg {
        Some(p) => p.to_string(),
        None => {
            let mut stdin = io::stdin();
            if stdin.is_terminal() {
                eprintln!("What should tonight's story be about? (Ctrl-D to finish)");
            }
            let mut buf = String::new();
            stdin
                .read_to_string(&mut buf)
                .context("failed to read the story request from stdin")?;
            buf
        }
    };
    let prompt = prompt.trim();
    if prompt.is_empty() {
        bail!("the story request is empty");
    }
    Ok(prompt.to_string())
}

fn build_config(args: &TellArgs) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::from_env().context("bad BEDTIME_* setting")?;
    if args.no_tools {
        config = config.with_tools(false);
    }
    if args.verify_facts {
        config = config.with_fact_check(true);
    }
    if let Some(threshold) = args.threshold {
        config = config.with_quality_threshold(threshold);
    }
    if let Some(max) = args.max_iterations {
        config = config.with_max_iterations(max);
    }
    if let Some(model) = &args.model {
        config = config.with_model(model);
    }
    if let Some(model) = &args.judge_model {
        config = config.with_judge_model(model);
    }
    if let Some(model) = &args.local_model {
        config = config.with_local_model(model);
    }
    config.validate()?;
    Ok(config)
}

fn build_constraints(args: &TellArgs) -> StoryConstraints {
    let mut constraints = StoryConstraints::new();
    if let Some(persona) = args.persona {
        constraints = constraints.with_persona(persona);
    }
    if !args.values.is_empty() {
        constraints = constraints.with_values(args.values.iter().copied());
    }
    if !args.interests.is_empty() {
        constraints = constraints.with_interests(args.interests.iter().copied());
    }
    if let Some(name) = &args.name {
        constraints = constraints.with_child_name(name);
    }
    if let Some(custom) = &args.custom {
        constraints = constraints.with_custom_elements(custom);
    }
    constraints
}

fn open_store(db: &Path) -> Result<SqliteStore> {
    SqliteStore::open(db).with_context(|| format!("failed to open {}", db.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bedtime_core::{Interest, StoryPersona, StoryValue};

    #[test]
    fn test_build_constraints_keeps_defaults_when_unset() {
        let constraints = build_constraints(&TellArgs::default());
        assert_eq!(constraints, StoryConstraints::default());
    }

    #[test]
    fn test_build_constraints_applies_flags() {
        let args = TellArgs {
            persona: Some(StoryPersona::CuriousLearner),
            values: vec![StoryValue::Honesty],
            interests: vec![Interest::Space, Interest::Space],
            name: Some("Maya".to_string()),
            ..TellArgs::default()
        };
        let constraints = build_constraints(&args);
        assert_eq!(constraints.persona, StoryPersona::CuriousLearner);
        assert_eq!(constraints.values, vec![StoryValue::Honesty]);
        assert_eq!(constraints.interests, vec![Interest::Space]);
        assert_eq!(constraints.child_name.as_deref(), Some("Maya"));
    }

    #[test]
    fn test_verify_facts_flag_turns_checking_on() {
        let args = TellArgs {
            verify_facts: true,
            ..TellArgs::default()
        };
        assert!(build_config(&args).unwrap().verify_facts);
    }

    #[test]
    fn test_read_prompt_rejects_blank() {
        assert!(read_prompt(Some("   ")).is_err());
        assert_eq!(read_prompt(Some("  a sleepy owl ")).unwrap(), "a sleepy owl");
    }
}
