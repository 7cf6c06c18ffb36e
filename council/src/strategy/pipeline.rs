//! Sequential pipeline strategy
//!
//! One pass, N steps: each agent receives only the immediately
//! preceding agent's output, framed with its position in the chain.
//! Good for architect → reviewer → optimizer style refinement where
//! cross-talk would add noise rather than signal.

use async_stream::stream;
use futures::stream::BoxStream;
use futures::StreamExt;
use tracing::info;

use super::{Strategy, StrategyContext};
use crate::events::{CouncilEvent, EventKind};
use crate::history::{Transcript, TurnMessage};
use crate::runner::TurnRole;

pub struct PipelineStrategy {
    ctx: StrategyContext,
}

impl PipelineStrategy {
    pub fn new(ctx: StrategyContext) -> Self {
        Self { ctx }
    }

    /// Step-position framing prepended to the task. Step 1 creates,
    /// later steps see exactly the previous step's output and nothing
    /// earlier.
    fn step_context(&self, step: usize, previous_role: Option<&str>, previous_output: &str) -> String {
        let total = self.ctx.agents.len();
        match previous_role {
            None => format!(
                "You are step {step} of {total} in a pipeline. \
                 You are the first to respond. Create the initial solution."
            ),
            Some(role) => format!(
                "You are step {step} of {total} in a pipeline. \
                 The previous agent ({role}) produced the following output. \
                 Build upon, review, or refine their work according to your \
                 role.\n\nPrevious agent's output:\n{previous_output}"
            ),
        }
    }
}

impl Strategy for PipelineStrategy {
    fn execute<'a>(&'a self, task: &'a str, _rounds: u32) -> BoxStream<'a, CouncilEvent> {
        Box::pin(stream! {
            let mut transcript = Transcript::new();
            let mut previous_output = String::new();

            yield CouncilEvent::new(EventKind::RoundStart)
                .round(1)
                .content("Pipeline processing")
                .meta("total_agents", self.ctx.agents.len());

            for (idx, agent) in self.ctx.agents.iter().enumerate() {
                let step = idx + 1;
                info!(step, agent = %agent.role, "pipeline step starting");

                let previous_role = (idx > 0).then(|| self.ctx.agents[idx - 1].role.as_str());
                let context = self.step_context(step, previous_role, &previous_output);
                let messages =
                    self.ctx
                        .builder
                        .build_turn(task, &agent.persona, 1, &[], Some(&context));

                let mut full_response = String::new();
                let mut turn =
                    self.ctx
                        .runner
                        .run_turn(agent, messages, step as u32, TurnRole::Agent);
                while let Some(event) = turn.next().await {
                    if event.kind == EventKind::AgentDone {
                        full_response = event.content.clone();
                    }
                    yield event;
                }

                previous_output = full_response.clone();
                transcript.append(TurnMessage::new(
                    &agent.role,
                    &agent.model_key,
                    step as u32,
                    full_response,
                ));
            }

            yield CouncilEvent::new(EventKind::RoundDone)
                .round(1)
                .content("Pipeline complete");

            let mut moderation = self.ctx.moderate(
                task,
                &transcript,
                "pipeline",
                "Preparing final result...",
            );
            while let Some(event) = moderation.next().await {
                yield event;
            }

            yield CouncilEvent::new(EventKind::CouncilDone)
                .content("Pipeline session complete")
                .meta("total_steps", self.ctx.agents.len())
                .meta("total_messages", transcript.len());
        })
    }
}
