//! Council collaboration strategies
//!
//! A strategy decides the order agents speak in, what context each
//! turn sees, and how many rounds run before the moderator synthesis.
//! Every strategy is a lazy event stream: nothing executes until the
//! caller polls, each event is a suspension point, and dropping the
//! stream cancels the session.

mod debate;
mod pipeline;
mod vote;

pub use debate::DebateStrategy;
pub use pipeline::PipelineStrategy;
pub use vote::VoteStrategy;

use async_stream::stream;
use futures::stream::BoxStream;
use futures::StreamExt;

use crate::agent::Agent;
use crate::config::StrategyKind;
use crate::events::{CouncilEvent, EventKind};
use crate::history::Transcript;
use crate::prompt::MessageBuilder;
use crate::runner::{TurnRole, TurnRunner};

/// A collaboration strategy over one fixed set of agents.
///
/// `execute` yields events in strict chronological order and always
/// terminates with a `council_done` event (unless cancelled).
pub trait Strategy: Send + Sync {
    fn execute<'a>(&'a self, task: &'a str, rounds: u32) -> BoxStream<'a, CouncilEvent>;
}

/// Everything a strategy needs to run turns: the runner, the
/// participating agents (owned exclusively for the session), the
/// moderator, and the prompt builder.
pub struct StrategyContext {
    pub runner: TurnRunner,
    pub agents: Vec<Agent>,
    pub moderator: Agent,
    pub builder: MessageBuilder,
}

impl StrategyContext {
    /// Stream the moderator synthesis phase over the full transcript.
    ///
    /// Emits `MODERATOR_START` with the given announcement, then the
    /// runner's moderator-typed events (`MODEL_LOADING`/`LOADED`,
    /// `MODERATOR_CHUNK`*, `MODERATOR_DONE`).
    pub(crate) fn moderate<'a>(
        &'a self,
        task: &'a str,
        transcript: &'a Transcript,
        strategy_label: &'static str,
        announcement: &'static str,
    ) -> BoxStream<'a, CouncilEvent> {
        Box::pin(stream! {
            yield CouncilEvent::new(EventKind::ModeratorStart)
                .agent(&self.moderator.role)
                .content(announcement);

            let messages = self.builder.build_synthesis(
                task,
                &self.moderator.persona,
                transcript.entries(),
                strategy_label,
            );

            let mut turn = self
                .runner
                .run_turn(&self.moderator, messages, 0, TurnRole::Moderator);
            while let Some(event) = turn.next().await {
                yield event;
            }
        })
    }
}

/// Select the strategy implementation for a closed strategy kind.
///
/// The kind set is closed at configuration time (unknown tags already
/// failed deserialization), so this lookup is total.
pub fn build_strategy(kind: StrategyKind, ctx: StrategyContext) -> Box<dyn Strategy> {
    match kind {
        StrategyKind::Debate => Box::new(DebateStrategy::new(ctx)),
        StrategyKind::Pipeline => Box::new(PipelineStrategy::new(ctx)),
        StrategyKind::Vote => Box::new(VoteStrategy::new(ctx)),
    }
}
