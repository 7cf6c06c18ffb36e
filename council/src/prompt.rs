//! Prompt construction for agent turns
//!
//! Builds the bounded message list for one agent turn or for the
//! moderator's synthesis. History rendering enforces a per-entry
//! character budget so the combined prompt never overflows the
//! backend's effective context window, no matter how long the
//! discussion ran.

use serde::{Deserialize, Serialize};

use crate::history::TurnMessage;

/// Marker appended when an entry's content is cut to fit its budget.
pub const TRUNCATION_MARKER: &str = "\n[...response truncated for context limit...]";

/// Floor for the per-entry character budget.
const MIN_ENTRY_BUDGET: usize = 400;

/// Chat role in an OpenAI-style message list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One entry in the message list sent to the completion backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// Builds bounded prompts for agent turns and moderator synthesis.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    /// Total character budget for intra-round history rendering.
    pub history_budget: usize,
    /// Total character budget for full-session synthesis context.
    pub synthesis_budget: usize,
}

impl Default for MessageBuilder {
    fn default() -> Self {
        Self {
            history_budget: 2000,
            synthesis_budget: 3000,
        }
    }
}

impl MessageBuilder {
    /// Per-entry character budget for a history of `entry_count` turns.
    ///
    /// `max(400, total / max(entry_count, 1))`; the floor also guards
    /// the empty-history case against division by zero.
    fn per_entry_budget(total: usize, entry_count: usize) -> usize {
        std::cmp::max(MIN_ENTRY_BUDGET, total / std::cmp::max(entry_count, 1))
    }

    /// Build the message list for one agent turn.
    ///
    /// Round 1 (or an empty history): persona system entry plus the
    /// task. Round > 1: the system entry gains a multi-round
    /// instruction, and the user entry replays the prior discussion
    /// with each entry clipped to its budget.
    pub fn build_turn(
        &self,
        task: &str,
        persona: &str,
        round: u32,
        history: &[TurnMessage],
        extra_context: Option<&str>,
    ) -> Vec<ChatMessage> {
        let mut system_content = persona.to_string();

        if round > 1 {
            system_content.push_str(&format!(
                "\n\nThis is round {round} of a multi-round discussion. \
                 You have seen other agents' responses from previous rounds. \
                 Consider their points carefully. You may agree, disagree, \
                 or refine your position. Be specific about what you agree or \
                 disagree with and why."
            ));
        }

        let user_content = if round <= 1 || history.is_empty() {
            let base = format!("Task: {task}");
            match extra_context {
                Some(ctx) => format!("{ctx}\n\n{base}"),
                None => base,
            }
        } else {
            let budget = Self::per_entry_budget(self.history_budget, history.len());
            let mut body = format!("Original Task: {task}\n\n");
            body.push_str("=== Previous Discussion (summarized if long) ===\n\n");

            for msg in history {
                body.push_str(&format!(
                    "**{}** (Round {}) said:\n{}\n\n",
                    msg.role,
                    msg.round,
                    clip(&msg.content, budget)
                ));
            }

            body.push_str(
                "=== Your Turn ===\n\
                 Based on the discussion above, provide your response. \
                 Address specific points made by other agents. \
                 You can agree, disagree, add nuance, or change your position.",
            );

            match extra_context {
                Some(ctx) => format!("{ctx}\n\n{body}"),
                None => body,
            }
        };

        vec![
            ChatMessage::system(system_content),
            ChatMessage::user(user_content),
        ]
    }

    /// Build the moderator's synthesis prompt over the whole session.
    ///
    /// Same truncation discipline as [`build_turn`](Self::build_turn),
    /// but spanning every round, with `--- Round N ---` markers at
    /// round boundaries. `strategy_label` only affects the framing
    /// text, never the truncation arithmetic.
    pub fn build_synthesis(
        &self,
        task: &str,
        persona: &str,
        all_messages: &[TurnMessage],
        strategy_label: &str,
    ) -> Vec<ChatMessage> {
        let budget = Self::per_entry_budget(self.synthesis_budget, all_messages.len());

        let mut body = format!("Original Task: {task}\n\n");
        body.push_str("=== Council Discussion (summarized if long) ===\n\n");

        let mut current_round = 0;
        for msg in all_messages {
            if msg.round != current_round {
                current_round = msg.round;
                body.push_str(&format!("--- Round {current_round} ---\n\n"));
            }
            body.push_str(&format!(
                "**{}** said:\n{}\n\n",
                msg.role,
                clip(&msg.content, budget)
            ));
        }

        body.push_str(&format!(
            "=== Your Task as Moderator ===\n\
             Synthesize the above {strategy_label} discussion into a clear, \
             comprehensive final answer. \
             Highlight key areas of agreement and disagreement. \
             Provide a definitive recommendation or conclusion. \
             Make your response well-structured and actionable."
        ));

        vec![ChatMessage::system(persona), ChatMessage::user(body)]
    }
}

/// Clip `content` to `budget` characters, appending the truncation
/// marker when cut. Operates on characters, not bytes, so multi-byte
/// code points are never split.
fn clip(content: &str, budget: usize) -> String {
    match content.char_indices().nth(budget) {
        None => content.to_string(),
        Some((byte_idx, _)) => format!("{}{TRUNCATION_MARKER}", &content[..byte_idx]),
    }
}
