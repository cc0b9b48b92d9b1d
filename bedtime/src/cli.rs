//! Command line interface.

use bedtime_core::{Interest, StoryPersona, StoryValue};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "bedtime")]
#[command(version, about = "Bedtime stories, fact-checked and reviewed before lights out")]
pub struct Cli {
    /// Story history database
    #[arg(long, global = true, default_value = "stories.db", env = "BEDTIME_DB")]
    pub db: PathBuf,

    /// Do not record the story or the run
    #[arg(long, global = true)]
    pub no_save: bool,

    /// Debug logging (ignored when BEDTIME_LOG is set)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,

    /// Used when no subcommand is given
    #[command(flatten)]
    pub tell: TellArgs,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Write a story (the default)
    Tell(TellArgs),
    /// List recent stories
    History {
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,

        /// Only stories scoring at least this
        #[arg(long)]
        min_score: Option<f32>,
    },
    /// Print a stored story
    Show { id: i64 },
    /// Totals over the story history
    Stats,
    /// Remove one stored story
    Delete { id: i64 },
    /// Remove every stored story and run
    Clear {
        #[arg(long)]
        yes: bool,
    },
    /// List personas, values and interests
    Personas,
    /// Report which storytellers are usable and the settings in effect
    Check,
}

#[derive(Debug, Clone, Default, Args)]
pub struct TellArgs {
    /// What the story should be about; read from stdin when omitted
    pub prompt: Option<String>,

    /// Storyteller persona, e.g. adventurous or gentle_friend
    #[arg(short, long)]
    pub persona: Option<StoryPersona>,

    /// A value to weave in (repeatable)
    #[arg(long = "value")]
    pub values: Vec<StoryValue>,

    /// One of the child's interests (repeatable)
    #[arg(long = "interest")]
    pub interests: Vec<Interest>,

    /// The child's name, for a starring role
    #[arg(long)]
    pub name: Option<String>,

    /// Anything else the story should include
    #[arg(long)]
    pub custom: Option<String>,

    /// Write without the fact lookup tool
    #[arg(long)]
    pub no_tools: bool,

    /// Have the remote model check prefetched facts first
    #[arg(long)]
    pub verify_facts: bool,

    /// Judge score a story must reach (1-10)
    #[arg(long)]
    pub threshold: Option<f32>,

    /// Maximum drafts, first included
    #[arg(long)]
    pub max_iterations: Option<u32>,

    /// Remote storyteller model
    #[arg(long)]
    pub model: Option<String>,

    /// Remote judge model
    #[arg(long)]
    pub judge_model: Option<String>,

    /// Local fallback model
    #[arg(long)]
    pub local_model: Option<String>,
}

impl Cli {
    /// The story arguments in effect, from `tell` or the top level.
    pub fn into_command(self) -> (Command, PathBuf, bool) {
        let command = self.command.unwrap_or(Command::Tell(self.tell));
        (command, self.db, self.no_save)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("bedtime").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_bare_prompt_tells() {
        let cli = parse(&["A penguin on the moon", "--persona", "gentle", "--value", "courage"]);
        let (command, db, no_save) = cli.into_command();
        assert_eq!(db, PathBuf::from("stories.db"));
        assert!(!no_save);
        match command {
            Command::Tell(args) => {
                assert_eq!(args.prompt.as_deref(), Some("A penguin on the moon"));
                assert_eq!(args.persona, Some(StoryPersona::GentleFriend));
                assert_eq!(args.values, vec![StoryValue::Courage]);
            }
            other => panic!("expected tell, got {other:?}"),
        }
    }

    #[test]
    fn test_explicit_tell() {
        let cli = parse(&["tell", "dinosaurs", "--no-tools", "--verify-facts", "--threshold", "8.5"]);
        match cli.into_command().0 {
            Command::Tell(args) => {
                assert!(args.no_tools);
                assert!(args.verify_facts);
                assert_eq!(args.threshold, Some(8.5));
            }
            other => panic!("expected tell, got {other:?}"),
        }
    }

    #[test]
    fn test_store_subcommands() {
        let cli = parse(&["--db", "/tmp/x.db", "history", "-n", "3", "--min-score", "7"]);
        let (command, db, _) = cli.into_command();
        assert_eq!(db, PathBuf::from("/tmp/x.db"));
        assert!(matches!(
            command,
            Command::History { limit: 3, min_score: Some(s) } if s == 7.0
        ));

        assert!(matches!(parse(&["show", "4"]).into_command().0, Command::Show { id: 4 }));
        assert!(matches!(
            parse(&["clear", "--yes"]).into_command().0,
            Command::Clear { yes: true }
        ));
        assert!(matches!(parse(&["check"]).into_command().0, Command::Check));
    }

    #[test]
    fn test_unknown_interest_is_rejected() {
        let err = Cli::try_parse_from(["bedtime", "x", "--interest", "tax law"]).unwrap_err();
        assert!(err.to_string().contains("tax law"));
    }
}
