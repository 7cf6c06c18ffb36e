//! Turn runner: executes exactly one agent turn
//!
//! Drives a single request/response cycle against the completion port
//! and always emits a deterministic event sequence, no matter what the
//! backend does: model-ready bracketing, start, streamed chunks, and a
//! done event carrying the full response and an error flag.
//!
//! Streaming backends sometimes yield nothing usable (an empty
//! stream, or a lone control token like `<think>`) while a
//! non-streaming call against the identical prompt returns real
//! content. After the stream ends, the runner inspects what it
//! accumulated and, if the result looks degenerate, issues one
//! non-stream fallback call rather than surfacing a hollow response.

use std::sync::Arc;

use async_stream::stream;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::agent::Agent;
use crate::events::{CouncilEvent, EventKind};
use crate::port::{is_error_chunk, CompletionPort};
use crate::prompt::ChatMessage;

/// Which role context a turn executes under. Selects the event kinds
/// the runner emits, so chunk events come out correctly typed instead
/// of being remapped after the fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRole {
    Agent,
    Moderator,
}

impl TurnRole {
    /// Start event kind, if the runner emits one for this role. The
    /// moderator's start is announced by the strategy before the turn
    /// begins, so the runner stays silent for it.
    fn start_kind(&self) -> Option<EventKind> {
        match self {
            TurnRole::Agent => Some(EventKind::AgentStart),
            TurnRole::Moderator => None,
        }
    }

    fn chunk_kind(&self) -> EventKind {
        match self {
            TurnRole::Agent => EventKind::AgentChunk,
            TurnRole::Moderator => EventKind::ModeratorChunk,
        }
    }

    fn done_kind(&self) -> EventKind {
        match self {
            TurnRole::Agent => EventKind::AgentDone,
            TurnRole::Moderator => EventKind::ModeratorDone,
        }
    }
}

/// Tuning for the degenerate-output fallback.
///
/// The placeholder token set is a workaround for specific backend
/// quirks, not a law of the protocol, so it lives in configuration
/// (an optional `fallback` section in the YAML config).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    /// Responses equal to any of these (after trimming) are unusable.
    #[serde(default = "default_placeholder_tokens")]
    pub placeholder_tokens: Vec<String>,
    /// Responses shorter than this that still contain a placeholder
    /// token are treated as truncated control-token output.
    #[serde(default = "default_min_meaningful_len")]
    pub min_meaningful_len: usize,
}

fn default_placeholder_tokens() -> Vec<String> {
    vec![
        "<think>".to_string(),
        "</think>".to_string(),
        "<think></think>".to_string(),
    ]
}

fn default_min_meaningful_len() -> usize {
    32
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            placeholder_tokens: default_placeholder_tokens(),
            min_meaningful_len: default_min_meaningful_len(),
        }
    }
}

impl FallbackConfig {
    /// Whether a streamed response is judged unusable.
    pub fn is_degenerate(&self, streamed: &str) -> bool {
        let trimmed = streamed.trim();
        if trimmed.is_empty() {
            return true;
        }
        if self.placeholder_tokens.iter().any(|t| t == trimmed) {
            return true;
        }
        let lower = trimmed.to_lowercase();
        trimmed.chars().count() < self.min_meaningful_len
            && self
                .placeholder_tokens
                .iter()
                .any(|t| lower.contains(&t.to_lowercase()))
    }
}

/// Executes single agent turns against the completion port.
#[derive(Clone)]
pub struct TurnRunner {
    port: Arc<dyn CompletionPort>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub fallback: FallbackConfig,
}

impl TurnRunner {
    pub fn new(port: Arc<dyn CompletionPort>, temperature: f32, max_tokens: u32) -> Self {
        Self {
            port,
            temperature,
            max_tokens,
            fallback: FallbackConfig::default(),
        }
    }

    pub fn with_fallback(mut self, fallback: FallbackConfig) -> Self {
        self.fallback = fallback;
        self
    }

    /// Run one turn for `agent`, yielding its event sequence.
    ///
    /// Sequence: `MODEL_LOADING`, `MODEL_LOADED`, start (agents only),
    /// zero or more chunks, one done event with the full response and
    /// `metadata.error`. In-band error chunks mark the turn as failed
    /// but never abort the stream loop; a failed turn still completes
    /// with a done event so the session can continue.
    pub fn run_turn<'a>(
        &'a self,
        agent: &'a Agent,
        messages: Vec<ChatMessage>,
        round: u32,
        role: TurnRole,
    ) -> BoxStream<'a, CouncilEvent> {
        Box::pin(stream! {
            yield CouncilEvent::new(EventKind::ModelLoading)
                .agent(&agent.role)
                .content(format!("Loading model {}...", agent.model_identifier))
                .meta("model", agent.model_identifier.clone());

            // Best effort: a load failure here is not fatal, the chat
            // call reports the real problem in-band.
            if !self.port.ensure_ready(&agent.model_identifier).await {
                warn!(model = %agent.model_identifier, "model readiness could not be confirmed");
            }

            yield CouncilEvent::new(EventKind::ModelLoaded)
                .agent(&agent.role)
                .content(format!("Model {} ready", agent.model_identifier))
                .meta("model", agent.model_identifier.clone());

            if let Some(start) = role.start_kind() {
                yield CouncilEvent::new(start)
                    .agent(&agent.role)
                    .round(round)
                    .meta("model", agent.model_key.clone());
            }

            let mut full_response = String::new();
            let mut has_error = false;

            let mut chunks = self.port.stream_chat(
                &agent.model_identifier,
                &messages,
                self.temperature,
                self.max_tokens,
            );
            while let Some(chunk) = chunks.next().await {
                if chunk.is_empty() {
                    continue;
                }
                if is_error_chunk(&chunk) {
                    has_error = true;
                }
                full_response.push_str(&chunk);
                yield CouncilEvent::new(role.chunk_kind())
                    .agent(&agent.role)
                    .round(round)
                    .content(chunk);
            }
            drop(chunks);

            if !has_error && self.fallback.is_degenerate(&full_response) {
                debug!(
                    agent = %agent.role,
                    streamed_len = full_response.len(),
                    "streamed response degenerate; attempting non-stream fallback"
                );
                let fallback_response = self
                    .port
                    .chat_once(
                        &agent.model_identifier,
                        &messages,
                        self.temperature,
                        self.max_tokens,
                    )
                    .await;

                if !fallback_response.is_empty() {
                    let streamed_nonempty = !full_response.trim().is_empty();
                    let content_to_emit = if streamed_nonempty
                        && fallback_response.starts_with(&full_response)
                    {
                        // The fallback extends what already streamed:
                        // emit only the missing tail.
                        fallback_response[full_response.len()..].to_string()
                    } else if streamed_nonempty {
                        // Streamed text was unusable; replace it, with
                        // a break so the transcript stays readable.
                        format!("\n{fallback_response}")
                    } else {
                        fallback_response.clone()
                    };

                    info!(agent = %agent.role, "non-stream fallback recovered a response");
                    full_response = fallback_response;
                    yield CouncilEvent::new(role.chunk_kind())
                        .agent(&agent.role)
                        .round(round)
                        .content(content_to_emit);
                }
            }

            yield CouncilEvent::new(role.done_kind())
                .agent(&agent.role)
                .round(round)
                .content(full_response)
                .meta("model", agent.model_key.clone())
                .meta("error", has_error);
        })
    }
}
