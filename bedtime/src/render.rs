//! Terminal output.
//!
//! Story text goes to stdout; everything about the story goes to stderr so
//! `bedtime "..." > story.txt` captures only the story.

use bedtime_core::persist::{StoreStats, StoredStory};
use bedtime_core::{
    GenerationPath, Interest, PipelineConfig, StoryOutcome, StoryPersona, StoryValue,
};

const RULE: &str = "----------------------------------------";

pub fn outcome(outcome: &StoryOutcome) {
    let story = outcome.story();
    println!("{}", story.text.trim());

    eprintln!();
    eprintln!("{RULE}");
    eprintln!("Written by: {} ({})", story.model, story.path);
    if let Some(note) = path_note(story.path) {
        eprintln!("{note}");
    }
    match outcome {
        StoryOutcome::Primary {
            verdict,
            iterations,
            ..
        } => {
            match verdict {
                Some(v) => eprintln!(
                    "Score: {:.1}/10{}",
                    v.score,
                    if v.meets_threshold { "" } else { " (below threshold)" }
                ),
                None => eprintln!("Score: not judged"),
            }
            eprintln!("Drafts: {iterations}");
        }
        StoryOutcome::Fallback { reason, .. } => {
            eprintln!("Score: not judged (local fallback)");
            eprintln!("Reason: {reason}");
        }
    }

    let revisions = outcome.feedback_history();
    if revisions.len() > 1 {
        eprintln!("Reviewer notes:");
        for (i, note) in revisions.iter().enumerate() {
            eprintln!("  {}. {}", i + 1, first_line(note));
        }
    }

    if !story.invocations.is_empty() {
        eprintln!("Fact lookups:");
        for call in &story.invocations {
            match &call.fact {
                Some(fact) => eprintln!("  [round {}] {}: {}", call.round, call.topic, fact),
                None => eprintln!("  [round {}] {}: no fact", call.round, call.topic),
            }
        }
    }
    if !story.grounding.is_empty() {
        eprintln!("Grounded in: {}", story.grounding.join(", "));
    }
    if !story.verified.is_empty() {
        eprintln!("Facts checked: {}", story.verified.join(", "));
    }
    eprintln!("Words: {}", story.word_count());
}

pub fn history(stories: &[StoredStory]) {
    if stories.is_empty() {
        println!("No stories yet.");
        return;
    }
    for stored in stories {
        let r = &stored.record;
        println!(
            "#{:<4} {}  {:>5}  {:<8}  {}",
            stored.id,
            r.created_at.format("%Y-%m-%d %H:%M"),
            score_label(r.score),
            r.path.as_str(),
            truncate(&r.prompt, 50),
        );
    }
}

pub fn stored(stored: &StoredStory) {
    let r = &stored.record;
    println!("Story #{} ({})", stored.id, r.created_at.format("%Y-%m-%d %H:%M UTC"));
    println!("Prompt: {}", r.prompt);
    println!("Persona: {}", r.constraints.persona);
    if let Some(name) = &r.constraints.child_name {
        println!("For: {name}");
    }
    println!(
        "Model: {} ({})  Score: {}  Drafts: {}",
        r.model,
        r.path,
        score_label(r.score),
        r.iterations
    );
    if !r.invocations.is_empty() {
        let topics: Vec<&str> = r.invocations.iter().map(|c| c.topic.as_str()).collect();
        println!("Fact lookups: {}", topics.join(", "));
    }
    println!("{RULE}");
    println!("{}", r.story.trim());
}

pub fn stats(stats: &StoreStats) {
    println!("Stories:        {}", stats.total_stories);
    println!(
        "Runs:           {} ({} ok, {} failed)",
        stats.total_runs, stats.successful_runs, stats.failed_runs
    );
    match stats.average_score {
        Some(avg) => println!("Average score:  {avg:.1}"),
        None => println!("Average score:  -"),
    }
    println!("With tools:     {}", stats.tools_enabled_count);
    println!("Local fallback: {}", stats.fallback_count);
    if !stats.stories_by_model.is_empty() {
        println!("By model:");
        for (model, count) in &stats.stories_by_model {
            println!("  {model}: {count}");
        }
    }
}

pub fn personas() {
    println!("Personas:");
    for p in StoryPersona::ALL {
        let marker = if p == StoryPersona::default() { " (default)" } else { "" };
        println!("  {:<22} {}{}", p.key(), p.description(), marker);
    }
    println!();
    println!(
        "Values:    {}",
        StoryValue::ALL.iter().map(|v| v.key()).collect::<Vec<_>>().join(", ")
    );
    println!(
        "Interests: {}",
        Interest::ALL.iter().map(|i| i.key()).collect::<Vec<_>>().join(", ")
    );
}

/// What `bedtime check` found out about the two storytellers.
pub struct Readiness<'a> {
    pub api_key: bool,
    pub api_base: &'a str,
    pub ollama_host: &'a str,
    pub ollama_up: bool,
    /// Whether the local model is pulled; `None` when it could not be asked.
    pub local_model: Option<bool>,
}

impl Readiness<'_> {
    pub fn any_storyteller(&self) -> bool {
        self.api_key || self.local_model == Some(true)
    }
}

pub fn check(readiness: &Readiness, config: &PipelineConfig) {
    print!("{}", readiness_report(readiness, config));
}

fn readiness_report(r: &Readiness, config: &PipelineConfig) -> String {
    let yes_no = |b: bool| if b { "yes" } else { "no" };
    let local = match (r.ollama_up, r.local_model) {
        (false, _) => format!("unreachable at {}", r.ollama_host),
        (true, Some(true)) => format!("ready at {}", r.ollama_host),
        (true, Some(false)) => format!(
            "{} is not pulled (ollama pull {})",
            config.local_model_name(),
            config.local_model_name()
        ),
        (true, None) => format!("up at {}, model list unavailable", r.ollama_host),
    };

    let mut out = String::new();
    out.push_str(&format!(
        "Remote:  {}\n",
        if r.api_key {
            format!("API key set, {}", r.api_base)
        } else {
            "ANTHROPIC_API_KEY not set".to_string()
        }
    ));
    out.push_str(&format!("Local:   {local}\n"));
    out.push_str(&format!("{RULE}\n"));
    out.push_str(&format!("Storyteller model: {}\n", config.model_name()));
    out.push_str(&format!("Judge model:       {}\n", config.judge_model_name()));
    out.push_str(&format!("Local model:       {}\n", config.local_model_name()));
    out.push_str(&format!("Max drafts:        {}\n", config.max_iterations));
    out.push_str(&format!("Threshold:         {:.1}\n", config.quality_threshold));
    out.push_str(&format!("Tool rounds:       {}\n", config.max_tool_rounds));
    out.push_str(&format!("Call timeout:      {}s\n", config.call_timeout.as_secs()));
    out.push_str(&format!("Fact tool:         {}\n", yes_no(config.tools_enabled)));
    out.push_str(&format!("Prefetch facts:    {}\n", yes_no(config.prefetch_facts)));
    out.push_str(&format!("Check facts:       {}\n", yes_no(config.verify_facts)));
    out
}

fn score_label(score: Option<f32>) -> String {
    score.map_or_else(|| "-".to_string(), |s| format!("{s:.1}"))
}

fn first_line(text: &str) -> &str {
    text.lines().find(|l| !l.trim().is_empty()).unwrap_or("").trim()
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}

/// Extra line shown under a story that did not come from the remote storyteller.
fn path_note(path: GenerationPath) -> Option<&'static str> {
    match path {
        GenerationPath::Primary => None,
        GenerationPath::Fallback => {
            Some("The remote storyteller was unavailable, so this story was written locally.")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a penguin who wants to fly", 10), "a pengu...");
    }

    #[test]
    fn test_first_line_skips_blanks() {
        assert_eq!(first_line("\n\n  Tighten the ending.\nMore."), "Tighten the ending.");
        assert_eq!(first_line(""), "");
    }

    #[test]
    fn test_path_note_only_for_fallback() {
        assert!(path_note(GenerationPath::Primary).is_none());
        assert!(path_note(GenerationPath::Fallback).is_some());
    }

    #[test]
    fn test_readiness_report() {
        let config = PipelineConfig::default().with_fact_check(true);
        let ready = Readiness {
            api_key: false,
            api_base: "https://api.anthropic.com/v1",
            ollama_host: "http://localhost:11434",
            ollama_up: true,
            local_model: Some(false),
        };
        let report = readiness_report(&ready, &config);
        assert!(report.contains("ANTHROPIC_API_KEY not set"));
        assert!(report.contains("llama3.2 is not pulled"));
        assert!(report.contains("Check facts:       yes"));
        assert!(!ready.any_storyteller());

        let ready = Readiness {
            api_key: true,
            ollama_up: false,
            local_model: None,
            ..ready
        };
        let report = readiness_report(&ready, &config);
        assert!(report.contains("API key set, https://api.anthropic.com/v1"));
        assert!(report.contains("unreachable at http://localhost:11434"));
        assert!(ready.any_storyteller());
    }

    #[test]
    fn test_score_label() {
        assert_eq!(score_label(Some(8.0)), "8.0");
        assert_eq!(score_label(Some(6.5)), "6.5");
        assert_eq!(score_label(None), "-");
    }
}
