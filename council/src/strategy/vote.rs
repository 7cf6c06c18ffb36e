//! Independent vote strategy
//!
//! Every agent answers the task with no visibility into the others'
//! responses, then the moderator weighs the independent answers into
//! a consensus. One round, no cross-agent context, fastest strategy.

use async_stream::stream;
use futures::stream::BoxStream;
use futures::StreamExt;
use tracing::info;

use super::{Strategy, StrategyContext};
use crate::events::{CouncilEvent, EventKind};
use crate::history::{Transcript, TurnMessage};
use crate::runner::TurnRole;

pub struct VoteStrategy {
    ctx: StrategyContext,
}

impl VoteStrategy {
    pub fn new(ctx: StrategyContext) -> Self {
        Self { ctx }
    }
}

impl Strategy for VoteStrategy {
    fn execute<'a>(&'a self, task: &'a str, _rounds: u32) -> BoxStream<'a, CouncilEvent> {
        Box::pin(stream! {
            let mut transcript = Transcript::new();

            yield CouncilEvent::new(EventKind::RoundStart)
                .round(1)
                .content("Collecting independent votes")
                .meta("total_agents", self.ctx.agents.len());

            for agent in &self.ctx.agents {
                info!(agent = %agent.role, "collecting independent vote");
                // No history: each vote depends only on the agent's
                // own persona and the task.
                let messages = self
                    .ctx
                    .builder
                    .build_turn(task, &agent.persona, 1, &[], None);

                let mut full_response = String::new();
                let mut turn = self.ctx.runner.run_turn(agent, messages, 1, TurnRole::Agent);
                while let Some(event) = turn.next().await {
                    if event.kind == EventKind::AgentDone {
                        full_response = event.content.clone();
                    }
                    yield event;
                }

                transcript.append(TurnMessage::new(
                    &agent.role,
                    &agent.model_key,
                    1,
                    full_response,
                ));
            }

            yield CouncilEvent::new(EventKind::RoundDone)
                .round(1)
                .content("All votes collected");

            let mut moderation = self.ctx.moderate(
                task,
                &transcript,
                "vote",
                "Analyzing votes and building consensus...",
            );
            while let Some(event) = moderation.next().await {
                yield event;
            }

            yield CouncilEvent::new(EventKind::CouncilDone)
                .content("Voting session complete")
                .meta("total_agents", self.ctx.agents.len())
                .meta("total_messages", transcript.len());
        })
    }
}
