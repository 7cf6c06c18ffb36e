//! Council engine: session entry point
//!
//! Resolves a preset key into concrete agents and a moderator
//! (applying per-session model overrides), selects the strategy, and
//! exposes one entry point that yields the session's lazy event
//! stream. Configuration problems never escape as raised errors: they
//! surface as a single `error` event and the stream ends cleanly.

use std::collections::HashMap;
use std::sync::Arc;

use async_stream::stream;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::agent::Agent;
use crate::config::{AgentConfig, CouncilConfig, ModeratorConfig};
use crate::events::CouncilEvent;
use crate::port::{CompletionPort, LmStudioPort};
use crate::prompt::MessageBuilder;
use crate::runner::{FallbackConfig, TurnRunner};
use crate::strategy::{build_strategy, StrategyContext};

/// Override slot key for the moderator in a `model_overrides` map;
/// agent slots are keyed by their index rendered as a string.
pub const MODERATOR_SLOT: &str = "moderator";

/// Session resolution errors. These are reported to the caller as a
/// single `error` event, never raised through the stream.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Council '{council}' not found. Available: {available:?}")]
    UnknownCouncil {
        council: String,
        available: Vec<String>,
    },

    #[error("Model '{model}' not found in configuration. Available models: {available:?}")]
    UnknownModel {
        model: String,
        available: Vec<String>,
    },

    #[error("Council '{council}' has no moderator configured.")]
    MissingModerator { council: String },
}

/// One session request, as received from the surrounding transport.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionRequest {
    /// The user's question or task for the council.
    pub task: String,
    /// Council preset key (e.g. "general", "coding").
    pub council: String,
    /// Override the default sampling temperature.
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Override the default per-response token cap.
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Override the preset's debate round count.
    #[serde(default)]
    pub rounds: Option<u32>,
    /// Per-slot model swaps: agent index as a string, or
    /// [`MODERATOR_SLOT`], mapping to a model key from the config.
    #[serde(default)]
    pub model_overrides: HashMap<String, String>,
}

impl SessionRequest {
    pub fn new(council: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            council: council.into(),
            temperature: None,
            max_tokens: None,
            rounds: None,
            model_overrides: HashMap::new(),
        }
    }
}

/// Backend connectivity snapshot.
#[derive(Debug, Clone)]
pub struct BackendHealth {
    pub connected: bool,
    pub models: Vec<String>,
}

/// Main orchestrator for running council sessions.
///
/// Long-lived: one engine serves many sessions over one shared
/// completion port. Each session's turns run strictly sequentially,
/// but independent sessions may run concurrently.
pub struct CouncilEngine {
    config: CouncilConfig,
    port: Arc<dyn CompletionPort>,
    fallback: FallbackConfig,
}

impl CouncilEngine {
    /// Build an engine talking to the configured LM Studio backend.
    pub fn new(config: CouncilConfig) -> Self {
        let port = Arc::new(LmStudioPort::new(&config.lm_studio));
        Self::with_port(config, port)
    }

    /// Build an engine over an arbitrary completion port (tests,
    /// alternative backends).
    pub fn with_port(config: CouncilConfig, port: Arc<dyn CompletionPort>) -> Self {
        let fallback = config.fallback.clone();
        Self {
            config,
            port,
            fallback,
        }
    }

    /// Replace the degenerate-output detection tuning.
    pub fn with_fallback(mut self, fallback: FallbackConfig) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn config(&self) -> &CouncilConfig {
        &self.config
    }

    fn sorted_keys<V>(map: &HashMap<String, V>) -> Vec<String> {
        let mut keys: Vec<_> = map.keys().cloned().collect();
        keys.sort();
        keys
    }

    fn resolve_identifier(&self, model_key: &str) -> Result<String, EngineError> {
        self.config
            .model_identifier(model_key)
            .map(str::to_string)
            .ok_or_else(|| EngineError::UnknownModel {
                model: model_key.to_string(),
                available: Self::sorted_keys(&self.config.models),
            })
    }

    /// The model key for a slot after applying overrides. An override
    /// naming an unknown model key is ignored (logged, not failed) so
    /// a bad override degrades to the preset's configured model.
    fn effective_model_key<'a>(
        &'a self,
        slot: &str,
        configured: &'a str,
        overrides: &'a HashMap<String, String>,
    ) -> &'a str {
        match overrides.get(slot) {
            Some(override_key) if self.config.models.contains_key(override_key) => {
                info!(slot, from = configured, to = %override_key, "model override applied");
                override_key
            }
            Some(override_key) => {
                warn!(slot, %override_key, "model override ignored: key not in model registry");
                configured
            }
            None => configured,
        }
    }

    fn build_agents(
        &self,
        agent_configs: &[AgentConfig],
        overrides: &HashMap<String, String>,
    ) -> Result<Vec<Agent>, EngineError> {
        agent_configs
            .iter()
            .enumerate()
            .map(|(idx, ac)| {
                let slot = idx.to_string();
                let model_key = self.effective_model_key(&slot, &ac.model, overrides);
                let identifier = self.resolve_identifier(model_key)?;
                Ok(Agent::new(&ac.role, model_key, identifier, &ac.persona))
            })
            .collect()
    }

    fn build_moderator(
        &self,
        moderator_config: &ModeratorConfig,
        overrides: &HashMap<String, String>,
    ) -> Result<Agent, EngineError> {
        let model_key =
            self.effective_model_key(MODERATOR_SLOT, &moderator_config.model, overrides);
        let identifier = self.resolve_identifier(model_key)?;
        Ok(Agent::moderator(model_key, identifier, &moderator_config.persona))
    }

    /// Run a council session, streaming events in real time.
    ///
    /// This is the single entry point: resolves the preset, applies
    /// overrides, emits a `status` event describing the resolved
    /// session, and delegates to the strategy. All failures surface as
    /// events; the stream itself never errors.
    pub fn run(&self, request: SessionRequest) -> BoxStream<'_, CouncilEvent> {
        Box::pin(stream! {
            let Some(preset) = self.config.councils.get(&request.council) else {
                yield CouncilEvent::error(
                    EngineError::UnknownCouncil {
                        council: request.council.clone(),
                        available: Self::sorted_keys(&self.config.councils),
                    }
                    .to_string(),
                );
                return;
            };

            let temperature = request
                .temperature
                .unwrap_or(self.config.defaults.temperature);
            let max_tokens = request.max_tokens.unwrap_or(self.config.defaults.max_tokens);
            let rounds = request.rounds.unwrap_or(preset.debate_rounds);

            let session_id = Uuid::new_v4();
            info!(
                %session_id,
                council = %request.council,
                strategy = %preset.strategy,
                agents = preset.agents.len(),
                rounds,
                "starting council session"
            );

            let roles: Vec<String> = preset.agents.iter().map(|a| a.role.clone()).collect();
            yield CouncilEvent::status(format!(
                "Starting {} ({} strategy)",
                preset.name, preset.strategy
            ))
            .meta("session_id", session_id.to_string())
            .meta("council", request.council.clone())
            .meta("strategy", preset.strategy.as_str())
            .meta("agents", Value::from(roles))
            .meta("debate_rounds", rounds);

            let agents = match self.build_agents(&preset.agents, &request.model_overrides) {
                Ok(agents) => agents,
                Err(e) => {
                    yield CouncilEvent::error(format!("Configuration error: {e}"));
                    return;
                }
            };

            let Some(moderator_config) = &preset.moderator else {
                yield CouncilEvent::error(
                    EngineError::MissingModerator {
                        council: request.council.clone(),
                    }
                    .to_string(),
                );
                return;
            };
            let moderator = match self.build_moderator(moderator_config, &request.model_overrides)
            {
                Ok(moderator) => moderator,
                Err(e) => {
                    yield CouncilEvent::error(format!("Configuration error: {e}"));
                    return;
                }
            };

            let runner = TurnRunner::new(self.port.clone(), temperature, max_tokens)
                .with_fallback(self.fallback.clone());
            let ctx = StrategyContext {
                runner,
                agents,
                moderator,
                builder: MessageBuilder::default(),
            };
            let strategy = build_strategy(preset.strategy, ctx);

            let mut events = strategy.execute(&request.task, rounds);
            while let Some(event) = events.next().await {
                yield event;
            }
        })
    }

    /// Catalog of configured council presets, for discovery surfaces.
    pub fn councils(&self) -> Vec<(String, &crate::config::CouncilPreset)> {
        let mut entries: Vec<_> = self
            .config
            .councils
            .iter()
            .map(|(k, v)| (k.clone(), v))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Catalog of configured models.
    pub fn models(&self) -> Vec<(String, &crate::config::ModelInfo)> {
        let mut entries: Vec<_> = self
            .config
            .models
            .iter()
            .map(|(k, v)| (k.clone(), v))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Unload a model from the backend, accepting either a config key
    /// or a raw backend identifier.
    pub async fn unload_model(&self, model: &str) -> bool {
        let identifier = self.config.model_identifier(model).unwrap_or(model);
        self.port.unload(identifier).await
    }

    /// Backend connectivity and currently known models.
    pub async fn health(&self) -> BackendHealth {
        let connected = self.port.health_check().await;
        let models = if connected {
            self.port.list_models().await
        } else {
            Vec::new()
        };
        BackendHealth { connected, models }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CouncilConfig {
        CouncilConfig::from_yaml(
            r#"
models:
  phi4-mini: { name: "Phi", identifier: "phi-4-mini" }
  qwen: { name: "Qwen", identifier: "qwen2.5-7b" }
councils:
  general:
    name: "General Council"
    strategy: vote
    agents:
      - { model: phi4-mini, role: "Analyst", persona: "p1" }
      - { model: qwen, role: "Creative", persona: "p2" }
    moderator: { model: qwen, persona: "pm" }
"#,
        )
        .unwrap()
    }

    fn engine() -> CouncilEngine {
        CouncilEngine::new(config())
    }

    #[test]
    fn test_override_applied_when_known() {
        let engine = engine();
        let overrides = HashMap::from([("0".to_string(), "qwen".to_string())]);
        let agents = engine
            .build_agents(&engine.config.councils["general"].agents, &overrides)
            .unwrap();
        assert_eq!(agents[0].model_key, "qwen");
        assert_eq!(agents[0].model_identifier, "qwen2.5-7b");
        // Slot 1 untouched.
        assert_eq!(agents[1].model_key, "qwen");
    }

    #[test]
    fn test_override_ignored_when_unknown() {
        let engine = engine();
        let overrides = HashMap::from([("0".to_string(), "nonexistent".to_string())]);
        let agents = engine
            .build_agents(&engine.config.councils["general"].agents, &overrides)
            .unwrap();
        assert_eq!(agents[0].model_key, "phi4-mini");
    }

    #[test]
    fn test_moderator_override_slot() {
        let engine = engine();
        let overrides = HashMap::from([(MODERATOR_SLOT.to_string(), "phi4-mini".to_string())]);
        let preset = &engine.config.councils["general"];
        let moderator = engine
            .build_moderator(preset.moderator.as_ref().unwrap(), &overrides)
            .unwrap();
        assert_eq!(moderator.model_key, "phi4-mini");
        assert_eq!(moderator.role, "Moderator");
    }

    #[test]
    fn test_unknown_model_key_is_error() {
        let engine = engine();
        let err = engine.resolve_identifier("missing").unwrap_err();
        assert!(matches!(err, EngineError::UnknownModel { .. }));
        assert!(err.to_string().contains("'missing'"));
    }

    #[test]
    fn test_configured_fallback_reaches_runner() {
        let raw = r#"
models: {}
councils: {}
fallback:
  placeholder_tokens: ["[[pad]]"]
  min_meaningful_len: 16
"#;
        let engine = CouncilEngine::new(CouncilConfig::from_yaml(raw).unwrap());
        assert_eq!(engine.fallback.placeholder_tokens, ["[[pad]]"]);
        assert_eq!(engine.fallback.min_meaningful_len, 16);
        assert!(engine.fallback.is_degenerate("[[pad]]"));
        assert!(!engine.fallback.is_degenerate("<think>"));
    }

    #[test]
    fn test_catalogs_sorted() {
        let engine = engine();
        let models: Vec<_> = engine.models().into_iter().map(|(k, _)| k).collect();
        assert_eq!(models, ["phi4-mini", "qwen"]);
        assert_eq!(engine.councils()[0].0, "general");
    }
}
