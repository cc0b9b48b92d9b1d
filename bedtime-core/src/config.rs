//! Pipeline configuration.

use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_LOCAL_MODEL: &str = "llama3.2";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be at least 1")]
    ZeroLimit { name: &'static str },

    #[error("quality threshold must be between 1 and 10, got {0}")]
    Threshold(f32),

    #[error("{name} must be between 0 and 1, got {value}")]
    Temperature { name: &'static str, value: f32 },

    #[error("call timeout must be non-zero")]
    ZeroTimeout,

    #[error("invalid value for {var}: '{value}'")]
    Env { var: &'static str, value: String },
}

/// Knobs for one orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Maximum primary attempts, first generation included.
    pub max_iterations: u32,
    /// Judge score at or above which a story is accepted.
    pub quality_threshold: f32,
    /// Round trips the tool bridge may take per attempt.
    pub max_tool_rounds: u32,
    /// Overrides the persona temperature when set.
    pub storyteller_temperature: Option<f32>,
    pub judge_temperature: f32,
    pub max_story_tokens: usize,
    pub max_judge_tokens: usize,
    /// Upper bound on every remote call.
    pub call_timeout: Duration,
    pub tools_enabled: bool,
    /// Put facts for topics found in the request into the first prompt.
    pub prefetch_facts: bool,
    /// Check prefetched facts with the remote model before using them.
    pub verify_facts: bool,
    pub model: Option<String>,
    pub judge_model: Option<String>,
    pub local_model: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            quality_threshold: 7.0,
            max_tool_rounds: 3,
            storyteller_temperature: None,
            judge_temperature: 0.2,
            max_story_tokens: 2000,
            max_judge_tokens: 1000,
            call_timeout: Duration::from_secs(90),
            tools_enabled: true,
            prefetch_facts: true,
            verify_facts: false,
            model: None,
            judge_model: None,
            local_model: None,
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overlaid with `BEDTIME_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(v) = env_parse(&get, "BEDTIME_MAX_ITERATIONS")? {
            config.max_iterations = v;
        }
        if let Some(v) = env_parse(&get, "BEDTIME_THRESHOLD")? {
            config.quality_threshold = v;
        }
        if let Some(v) = env_parse(&get, "BEDTIME_TOOL_ROUNDS")? {
            config.max_tool_rounds = v;
        }
        if let Some(secs) = env_parse::<u64>(&get, "BEDTIME_TIMEOUT_SECS")? {
            config.call_timeout = Duration::from_secs(secs);
        }
        if let Some(v) = non_empty(&get, "BEDTIME_MODEL") {
            config.model = Some(v);
        }
        if let Some(v) = non_empty(&get, "BEDTIME_JUDGE_MODEL") {
            config.judge_model = Some(v);
        }
        if let Some(v) = non_empty(&get, "BEDTIME_LOCAL_MODEL") {
            config.local_model = Some(v);
        }
        if let Some(raw) = non_empty(&get, "BEDTIME_DISABLE_TOOLS") {
            config.tools_enabled = !parse_flag("BEDTIME_DISABLE_TOOLS", &raw)?;
        }
        if let Some(raw) = non_empty(&get, "BEDTIME_VERIFY_FACTS") {
            config.verify_facts = parse_flag("BEDTIME_VERIFY_FACTS", &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_quality_threshold(mut self, threshold: f32) -> Self {
        self.quality_threshold = threshold;
        self
    }

    pub fn with_max_tool_rounds(mut self, rounds: u32) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    pub fn with_storyteller_temperature(mut self, temperature: f32) -> Self {
        self.storyteller_temperature = Some(temperature);
        self
    }

    pub fn with_judge_temperature(mut self, temperature: f32) -> Self {
        self.judge_temperature = temperature;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_tools(mut self, enabled: bool) -> Self {
        self.tools_enabled = enabled;
        self
    }

    pub fn with_prefetch(mut self, enabled: bool) -> Self {
        self.prefetch_facts = enabled;
        self
    }

    pub fn with_fact_check(mut self, enabled: bool) -> Self {
        self.verify_facts = enabled;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_judge_model(mut self, model: impl Into<String>) -> Self {
        self.judge_model = Some(model.into());
        self
    }

    pub fn with_local_model(mut self, model: impl Into<String>) -> Self {
        self.local_model = Some(model.into());
        self
    }

    /// The storyteller model, falling back to the default.
    pub fn model_name(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    /// The judge model, falling back to the storyteller model.
    pub fn judge_model_name(&self) -> &str {
        self.judge_model.as_deref().unwrap_or_else(|| self.model_name())
    }

    pub fn local_model_name(&self) -> &str {
        self.local_model.as_deref().unwrap_or(DEFAULT_LOCAL_MODEL)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iterations == 0 {
            return Err(ConfigError::ZeroLimit {
                name: "max_iterations",
            });
        }
        if self.max_tool_rounds == 0 {
            return Err(ConfigError::ZeroLimit {
                name: "max_tool_rounds",
            });
        }
        if self.max_story_tokens == 0 {
            return Err(ConfigError::ZeroLimit {
                name: "max_story_tokens",
            });
        }
        if self.max_judge_tokens == 0 {
            return Err(ConfigError::ZeroLimit {
                name: "max_judge_tokens",
            });
        }
        if !(1.0..=10.0).contains(&self.quality_threshold) {
            return Err(ConfigError::Threshold(self.quality_threshold));
        }
        if let Some(t) = self.storyteller_temperature {
            check_temperature("storyteller_temperature", t)?;
        }
        check_temperature("judge_temperature", self.judge_temperature)?;
        if self.call_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}

fn check_temperature(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Temperature { name, value })
    }
}

fn non_empty(get: &impl Fn(&str) -> Option<String>, var: &str) -> Option<String> {
    get(var)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match non_empty(get, var) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Env { var, value: raw }),
    }
}

fn parse_flag(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Env {
            var,
            value: raw.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_iterations, 3);
        assert_eq!(config.quality_threshold, 7.0);
        assert_eq!(config.max_tool_rounds, 3);
        assert_eq!(config.judge_temperature, 0.2);
        assert_eq!(config.call_timeout, Duration::from_secs(90));
        assert!(config.tools_enabled);
        assert!(!config.verify_facts);
        assert_eq!(config.model_name(), DEFAULT_MODEL);
        assert_eq!(config.judge_model_name(), DEFAULT_MODEL);
        assert_eq!(config.local_model_name(), "llama3.2");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = PipelineConfig::new()
            .with_max_iterations(5)
            .with_quality_threshold(8.5)
            .with_tools(false)
            .with_model("claude-haiku")
            .with_local_model("qwen3:4b");
        assert_eq!(config.max_iterations, 5);
        assert_eq!(config.quality_threshold, 8.5);
        assert!(!config.tools_enabled);
        assert_eq!(config.judge_model_name(), "claude-haiku");
        assert_eq!(config.local_model_name(), "qwen3:4b");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert_eq!(
            PipelineConfig::new().with_max_iterations(0).validate(),
            Err(ConfigError::ZeroLimit {
                name: "max_iterations"
            })
        );
        assert_eq!(
            PipelineConfig::new().with_quality_threshold(11.0).validate(),
            Err(ConfigError::Threshold(11.0))
        );
        assert!(PipelineConfig::new().with_max_tool_rounds(0).validate().is_err());
        assert!(PipelineConfig::new()
            .with_judge_temperature(1.5)
            .validate()
            .is_err());
        assert!(PipelineConfig::new()
            .with_call_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn test_env_overlay() {
        let config = PipelineConfig::from_lookup(lookup(&[
            ("BEDTIME_MAX_ITERATIONS", "4"),
            ("BEDTIME_THRESHOLD", "8"),
            ("BEDTIME_TIMEOUT_SECS", "30"),
            ("BEDTIME_JUDGE_MODEL", "claude-judge"),
            ("BEDTIME_DISABLE_TOOLS", "yes"),
            ("BEDTIME_VERIFY_FACTS", "on"),
            ("BEDTIME_MODEL", "  "),
        ]))
        .unwrap();
        assert_eq!(config.max_iterations, 4);
        assert_eq!(config.quality_threshold, 8.0);
        assert_eq!(config.call_timeout, Duration::from_secs(30));
        assert_eq!(config.judge_model_name(), "claude-judge");
        assert!(config.model.is_none());
        assert!(!config.tools_enabled);
        assert!(config.verify_facts);
    }

    #[test]
    fn test_env_rejects_garbage() {
        let err = PipelineConfig::from_lookup(lookup(&[("BEDTIME_TOOL_ROUNDS", "lots")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::Env {
                var: "BEDTIME_TOOL_ROUNDS",
                value: "lots".to_string()
            }
        );
        assert!(PipelineConfig::from_lookup(lookup(&[("BEDTIME_MAX_ITERATIONS", "0")])).is_err());
    }
}
