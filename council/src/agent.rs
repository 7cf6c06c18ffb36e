//! Agent values
//!
//! An agent is a model bound to a role and a persona (system prompt).
//! The same underlying model can play different roles with different
//! personas. Agents are immutable once created; the strategy running
//! the session owns them exclusively.

use serde::{Deserialize, Serialize};

/// A single participant in a council session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    /// Display name for this agent (e.g., "Analyst", "Devil's Advocate").
    pub role: String,
    /// Config key referencing the model (e.g., "phi4-mini").
    pub model_key: String,
    /// Backend model identifier used in API calls.
    pub model_identifier: String,
    /// System prompt defining this agent's behavior.
    pub persona: String,
}

impl Agent {
    pub fn new(
        role: impl Into<String>,
        model_key: impl Into<String>,
        model_identifier: impl Into<String>,
        persona: impl Into<String>,
    ) -> Self {
        Self {
            role: role.into(),
            model_key: model_key.into(),
            model_identifier: model_identifier.into(),
            persona: persona.into(),
        }
    }

    /// Build the distinguished moderator agent for synthesis turns.
    pub fn moderator(
        model_key: impl Into<String>,
        model_identifier: impl Into<String>,
        persona: impl Into<String>,
    ) -> Self {
        Self::new("Moderator", model_key, model_identifier, persona)
    }
}

impl std::fmt::Display for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.role, self.model_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_moderator_role() {
        let m = Agent::moderator("qwen", "qwen2.5-7b-instruct", "Synthesize.");
        assert_eq!(m.role, "Moderator");
        assert_eq!(m.to_string(), "Moderator (qwen)");
    }
}
