//! Event types for council sessions
//!
//! Every observable step of a session (round boundaries, per-agent
//! streaming, moderator synthesis, model lifecycle) is surfaced as a
//! [`CouncilEvent`]. Events are immutable once constructed and are
//! yielded in strict chronological order by the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Discriminant for council events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// General status update (session resolved, strategy selected).
    Status,
    /// A round is beginning.
    RoundStart,
    /// A round has completed.
    RoundDone,
    /// An agent is about to respond.
    AgentStart,
    /// A streaming text chunk from an agent.
    AgentChunk,
    /// An agent has finished responding.
    AgentDone,
    /// The moderator is starting its synthesis.
    ModeratorStart,
    /// A streaming chunk from the moderator.
    ModeratorChunk,
    /// The moderator has finished.
    ModeratorDone,
    /// The entire council session is complete.
    CouncilDone,
    /// An error occurred.
    Error,
    /// A model is being loaded on the backend.
    ModelLoading,
    /// A model has finished loading.
    ModelLoaded,
    /// A model is being unloaded.
    ModelUnloading,
    /// A model has been unloaded.
    ModelUnloaded,
}

impl EventKind {
    /// Wire name of this event kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Status => "status",
            EventKind::RoundStart => "round_start",
            EventKind::RoundDone => "round_done",
            EventKind::AgentStart => "agent_start",
            EventKind::AgentChunk => "agent_chunk",
            EventKind::AgentDone => "agent_done",
            EventKind::ModeratorStart => "moderator_start",
            EventKind::ModeratorChunk => "moderator_chunk",
            EventKind::ModeratorDone => "moderator_done",
            EventKind::CouncilDone => "council_done",
            EventKind::Error => "error",
            EventKind::ModelLoading => "model_loading",
            EventKind::ModelLoaded => "model_loaded",
            EventKind::ModelUnloading => "model_unloading",
            EventKind::ModelUnloaded => "model_unloaded",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single event emitted during a council session.
///
/// `agent` and `round` are zero/empty when not applicable. `metadata`
/// is an open map carrying extras such as the model identifier or an
/// error flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouncilEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default)]
    pub agent: String,
    #[serde(default)]
    pub round: u32,
    #[serde(default)]
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl CouncilEvent {
    /// Create an event with the given kind and empty fields.
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            agent: String::new(),
            round: 0,
            content: String::new(),
            timestamp: Utc::now(),
            metadata: Map::new(),
        }
    }

    /// Attach an agent role name.
    pub fn agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = agent.into();
        self
    }

    /// Attach a round number.
    pub fn round(mut self, round: u32) -> Self {
        self.round = round;
        self
    }

    /// Attach text content.
    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    /// Attach one metadata entry.
    pub fn meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// A `status` event with the given message.
    pub fn status(content: impl Into<String>) -> Self {
        Self::new(EventKind::Status).content(content)
    }

    /// An `error` event with the given message.
    pub fn error(content: impl Into<String>) -> Self {
        Self::new(EventKind::Error).content(content)
    }

    /// Whether this event carries streamed text (agent or moderator chunk).
    pub fn is_chunk(&self) -> bool {
        matches!(self.kind, EventKind::AgentChunk | EventKind::ModeratorChunk)
    }

    /// The `error` metadata flag, if present.
    pub fn error_flag(&self) -> bool {
        self.metadata
            .get("error")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}
