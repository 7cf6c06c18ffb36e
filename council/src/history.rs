//! Session transcript
//!
//! The transcript is the append-only log of completed agent turns for
//! one session. It is owned by the strategy driving the session and
//! exposed to prompt construction only as read-only slices, bounded by
//! round number where the strategy requires isolation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::StrategyKind;

/// One agent's completed output within a round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnMessage {
    /// Role name of the agent that produced this turn.
    pub role: String,
    /// Model key the agent was bound to.
    pub model_key: String,
    /// Round (or pipeline step) this turn belongs to, 1-indexed.
    pub round: u32,
    /// Full text of the agent's response.
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl TurnMessage {
    pub fn new(role: impl Into<String>, model_key: impl Into<String>, round: u32, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            model_key: model_key.into(),
            round,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Append-only, round-ordered log of turns for one session.
///
/// Entries are never removed or edited after append. Appends must
/// arrive in non-decreasing round order; the strategies guarantee this
/// structurally by running turns sequentially.
#[derive(Debug, Default, Clone)]
pub struct Transcript {
    entries: Vec<TurnMessage>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a completed turn.
    pub fn append(&mut self, message: TurnMessage) {
        debug_assert!(
            self.entries.last().map_or(true, |last| message.round >= last.round),
            "transcript appends must be round-ordered"
        );
        self.entries.push(message);
    }

    /// All entries, in emission order.
    pub fn entries(&self) -> &[TurnMessage] {
        &self.entries
    }

    /// Entries from rounds strictly before `round`.
    ///
    /// Used by the debate strategy so that round k prompts never
    /// reference output from round k or later.
    pub fn before_round(&self, round: u32) -> &[TurnMessage] {
        let end = self.entries.partition_point(|m| m.round < round);
        &self.entries[..end]
    }

    /// The most recent entry, if any.
    pub fn last(&self) -> Option<&TurnMessage> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The complete result of a council session, assembled by the caller
/// from the event stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouncilResult {
    /// The original task submitted to the council.
    pub task: String,
    /// Which council preset was used.
    pub council_name: String,
    /// Which strategy was used.
    pub strategy: StrategyKind,
    /// All agent messages in chronological order.
    pub messages: Vec<TurnMessage>,
    /// The moderator's final synthesis.
    pub moderator_response: String,
    /// How many rounds the session went through.
    pub total_rounds: u32,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(role: &str, round: u32) -> TurnMessage {
        TurnMessage::new(role, "m", round, format!("{role} r{round}"))
    }

    #[test]
    fn test_append_order_preserved() {
        let mut t = Transcript::new();
        t.append(msg("Analyst", 1));
        t.append(msg("Creative", 1));
        t.append(msg("Analyst", 2));

        let roles: Vec<_> = t.entries().iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, ["Analyst", "Creative", "Analyst"]);
        assert_eq!(t.len(), 3);
    }

    #[test]
    fn test_before_round_bounds() {
        let mut t = Transcript::new();
        t.append(msg("A", 1));
        t.append(msg("B", 1));
        t.append(msg("A", 2));
        t.append(msg("B", 2));

        assert!(t.before_round(1).is_empty());
        assert_eq!(t.before_round(2).len(), 2);
        assert_eq!(t.before_round(3).len(), 4);
        assert!(t.before_round(2).iter().all(|m| m.round < 2));
    }

    #[test]
    fn test_empty_transcript() {
        let t = Transcript::new();
        assert!(t.is_empty());
        assert!(t.last().is_none());
        assert!(t.before_round(5).is_empty());
    }
}
