//! Configuration loader
//!
//! Loads the YAML configuration that defines available models, council
//! presets (agents + moderator + strategy), connection settings for the
//! completion backend, and session defaults.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::runner::FallbackConfig;

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Validation(String),
}

/// Available council collaboration strategies.
///
/// This is a closed set: an unrecognized strategy tag fails when the
/// config is deserialized, not at session time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Multi-round debate: agents see and engage prior rounds.
    Debate,
    /// Sequential refinement: each agent builds on the previous one.
    Pipeline,
    /// Independent responses, moderator picks the consensus.
    Vote,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Debate => "debate",
            StrategyKind::Pipeline => "pipeline",
            StrategyKind::Vote => "vote",
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An LLM model available on the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Human-readable display name.
    pub name: String,
    /// Backend model identifier used in API calls.
    pub identifier: String,
    /// Tags describing what this model excels at.
    #[serde(default)]
    pub strengths: Vec<String>,
    /// Maximum context window in tokens.
    #[serde(default = "default_context_length")]
    pub context_length: u32,
    /// Parameter count as a display string (e.g., "3.8B").
    #[serde(default)]
    pub size: String,
}

fn default_context_length() -> u32 {
    4096
}

/// One agent slot in a council preset: model + role + persona.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Key referencing a model in the config's `models` section.
    pub model: String,
    /// Display name for this agent.
    pub role: String,
    /// System prompt defining the agent's behavior.
    pub persona: String,
}

/// The moderator slot: synthesizes the session into a final answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeratorConfig {
    pub model: String,
    pub persona: String,
}

/// A pre-configured council setup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouncilPreset {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_strategy")]
    pub strategy: StrategyKind,
    /// Number of debate rounds (debate strategy only).
    #[serde(default = "default_debate_rounds")]
    pub debate_rounds: u32,
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
    pub moderator: Option<ModeratorConfig>,
}

fn default_strategy() -> StrategyKind {
    StrategyKind::Debate
}

fn default_debate_rounds() -> u32 {
    2
}

/// Connection settings for the LM Studio backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LmStudioConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// LM Studio accepts any string here.
    #[serde(default = "default_api_key")]
    pub api_key: String,
}

impl Default for LmStudioConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: default_api_key(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:1234/v1".to_string()
}

fn default_api_key() -> String {
    "lm-studio".to_string()
}

/// Default parameters applied to sessions unless overridden.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Defaults {
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Default council preset key.
    #[serde(default = "default_council")]
    pub council: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            council: default_council(),
        }
    }
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_council() -> String {
    "general".to_string()
}

/// Top-level configuration container.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CouncilConfig {
    #[serde(default)]
    pub lm_studio: LmStudioConfig,
    #[serde(default)]
    pub models: HashMap<String, ModelInfo>,
    #[serde(default)]
    pub councils: HashMap<String, CouncilPreset>,
    #[serde(default)]
    pub defaults: Defaults,
    /// Degenerate-output detection tuning for the turn runner.
    #[serde(default)]
    pub fallback: FallbackConfig,
}

impl CouncilConfig {
    /// Load and parse a YAML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&raw)
    }

    /// Parse a YAML config string.
    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(raw)?;
        Ok(config)
    }

    /// Strict validation for fail-fast callers (the CLI).
    ///
    /// The engine itself tolerates unresolved model keys at session
    /// start by emitting an error event; this check lets operators
    /// catch broken presets before serving any session.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, preset) in &self.councils {
            if preset.agents.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "council '{key}' has no agents configured"
                )));
            }
            for agent in &preset.agents {
                if !self.models.contains_key(&agent.model) {
                    return Err(ConfigError::Validation(format!(
                        "council '{key}' agent '{}' references unknown model '{}'",
                        agent.role, agent.model
                    )));
                }
            }
            if let Some(moderator) = &preset.moderator {
                if !self.models.contains_key(&moderator.model) {
                    return Err(ConfigError::Validation(format!(
                        "council '{key}' moderator references unknown model '{}'",
                        moderator.model
                    )));
                }
            }
        }
        Ok(())
    }

    /// Resolve a model key to its backend identifier.
    pub fn model_identifier(&self, model_key: &str) -> Option<&str> {
        self.models.get(model_key).map(|m| m.identifier.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
lm_studio:
  base_url: "http://localhost:1234/v1"
models:
  phi4-mini:
    name: "Phi-4 Mini Reasoning"
    identifier: "phi-4-mini-reasoning"
    context_length: 8192
    size: "3.8B"
  qwen:
    name: "Qwen 2.5 7B"
    identifier: "qwen2.5-7b-instruct"
councils:
  general:
    name: "General Council"
    strategy: debate
    debate_rounds: 2
    agents:
      - model: phi4-mini
        role: "Analyst"
        persona: "You are a sharp analytical thinker."
      - model: qwen
        role: "Creative"
        persona: "You think laterally."
    moderator:
      model: qwen
      persona: "You synthesize discussions."
defaults:
  temperature: 0.6
  max_tokens: 1024
  council: general
"#;

    #[test]
    fn test_parse_sample() {
        let config = CouncilConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.models.len(), 2);
        assert_eq!(config.model_identifier("phi4-mini"), Some("phi-4-mini-reasoning"));
        let preset = &config.councils["general"];
        assert_eq!(preset.strategy, StrategyKind::Debate);
        assert_eq!(preset.debate_rounds, 2);
        assert_eq!(preset.agents.len(), 2);
        assert!(preset.moderator.is_some());
        assert_eq!(config.defaults.temperature, 0.6);
        config.validate().unwrap();
    }

    #[test]
    fn test_unknown_strategy_rejected_at_parse() {
        let raw = SAMPLE.replace("strategy: debate", "strategy: tournament");
        let err = CouncilConfig::from_yaml(&raw).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_defaults_applied() {
        let config = CouncilConfig::from_yaml("models: {}\ncouncils: {}").unwrap();
        assert_eq!(config.lm_studio.base_url, "http://localhost:1234/v1");
        assert_eq!(config.lm_studio.api_key, "lm-studio");
        assert_eq!(config.defaults.max_tokens, 2048);
        assert_eq!(config.defaults.temperature, 0.7);
    }

    #[test]
    fn test_fallback_section_parsed() {
        let raw = r#"
models: {}
councils: {}
fallback:
  placeholder_tokens: ["[[pad]]"]
  min_meaningful_len: 16
"#;
        let config = CouncilConfig::from_yaml(raw).unwrap();
        assert_eq!(config.fallback.placeholder_tokens, ["[[pad]]"]);
        assert_eq!(config.fallback.min_meaningful_len, 16);

        // Absent section and partial section both fill in defaults.
        let config = CouncilConfig::from_yaml("models: {}").unwrap();
        assert_eq!(config.fallback.min_meaningful_len, 32);
        assert!(config
            .fallback
            .placeholder_tokens
            .contains(&"<think>".to_string()));
        let config =
            CouncilConfig::from_yaml("fallback: { min_meaningful_len: 8 }").unwrap();
        assert_eq!(config.fallback.min_meaningful_len, 8);
        assert!(!config.fallback.placeholder_tokens.is_empty());
    }

    #[test]
    fn test_validate_unknown_agent_model() {
        let raw = SAMPLE.replace("- model: qwen", "- model: missing");
        let config = CouncilConfig::from_yaml(&raw).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("unknown model 'missing'"));
    }

    #[test]
    fn test_validate_empty_agents() {
        let raw = r#"
models: {}
councils:
  empty:
    name: "Empty"
"#;
        let config = CouncilConfig::from_yaml(raw).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("no agents"));
    }

    #[test]
    fn test_load_from_file() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = CouncilConfig::load(file.path()).unwrap();
        assert_eq!(config.councils.len(), 1);
    }

    #[test]
    fn test_load_missing_file() {
        let err = CouncilConfig::load("/nonexistent/config.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_strategy_kind_display() {
        assert_eq!(StrategyKind::Debate.to_string(), "debate");
        assert_eq!(StrategyKind::Pipeline.to_string(), "pipeline");
        assert_eq!(StrategyKind::Vote.to_string(), "vote");
    }
}
