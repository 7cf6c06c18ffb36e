//! Multi-round debate strategy
//!
//! Round 1: every agent answers the task independently. Rounds 2..N:
//! every agent sees all prior rounds' turns and argues, refines, or
//! concedes. The moderator then synthesizes the whole exchange.
//!
//! Round k prompts are built only from the transcript slice strictly
//! before round k, so a round never references its own in-progress
//! output.

use async_stream::stream;
use futures::stream::BoxStream;
use futures::StreamExt;
use tracing::info;

use super::{Strategy, StrategyContext};
use crate::events::{CouncilEvent, EventKind};
use crate::history::{Transcript, TurnMessage};
use crate::runner::TurnRole;

pub struct DebateStrategy {
    ctx: StrategyContext,
}

impl DebateStrategy {
    pub fn new(ctx: StrategyContext) -> Self {
        Self { ctx }
    }
}

impl Strategy for DebateStrategy {
    fn execute<'a>(&'a self, task: &'a str, rounds: u32) -> BoxStream<'a, CouncilEvent> {
        let rounds = rounds.max(1);
        Box::pin(stream! {
            let mut transcript = Transcript::new();

            for round in 1..=rounds {
                info!(round, total = rounds, "debate round starting");
                yield CouncilEvent::new(EventKind::RoundStart)
                    .round(round)
                    .content(format!("Round {round} of {rounds}"))
                    .meta("total_rounds", rounds);

                for agent in &self.ctx.agents {
                    let messages = self.ctx.builder.build_turn(
                        task,
                        &agent.persona,
                        round,
                        transcript.before_round(round),
                        None,
                    );

                    let mut full_response = String::new();
                    let mut turn =
                        self.ctx
                            .runner
                            .run_turn(agent, messages, round, TurnRole::Agent);
                    while let Some(event) = turn.next().await {
                        if event.kind == EventKind::AgentDone {
                            full_response = event.content.clone();
                        }
                        yield event;
                    }

                    transcript.append(TurnMessage::new(
                        &agent.role,
                        &agent.model_key,
                        round,
                        full_response,
                    ));
                }

                yield CouncilEvent::new(EventKind::RoundDone)
                    .round(round)
                    .content(format!("Round {round} complete"));
            }

            let mut moderation = self.ctx.moderate(
                task,
                &transcript,
                "debate",
                "Synthesizing debate...",
            );
            while let Some(event) = moderation.next().await {
                yield event;
            }

            yield CouncilEvent::new(EventKind::CouncilDone)
                .content("Council session complete")
                .meta("total_rounds", rounds)
                .meta("total_agents", self.ctx.agents.len())
                .meta("total_messages", transcript.len());
        })
    }
}
