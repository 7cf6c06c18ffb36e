//! Multi-agent LLM orchestration engine
//!
//! Coordinates several independent model "agents" through configurable
//! collaboration strategies, streaming intermediate output to the
//! caller as it is generated:
//!
//! - **debate**: multi-round exchange where agents see and engage
//!   prior rounds before a moderator synthesizes
//! - **pipeline**: sequential refinement, each agent building on the
//!   previous agent's output
//! - **vote**: independent answers with a moderator consensus pass
//!
//! Sessions are lazy event streams: nothing runs until the caller
//! polls, every agent turn is strictly sequential, and dropping the
//! stream cancels the session without issuing further backend calls.
//!
//! # Example
//!
//! ```no_run
//! use council::{CouncilConfig, CouncilEngine, SessionRequest};
//! use futures::StreamExt;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let config = CouncilConfig::load("config.yaml")?;
//! let engine = CouncilEngine::new(config);
//!
//! let mut events = engine.run(SessionRequest::new("general", "Best database for my app?"));
//! while let Some(event) = events.next().await {
//!     println!("{}: {}", event.kind, event.content);
//! }
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod config;
pub mod engine;
pub mod events;
pub mod history;
pub mod port;
pub mod prompt;
pub mod runner;
pub mod strategy;

pub use agent::Agent;
pub use config::{ConfigError, CouncilConfig, CouncilPreset, ModelInfo, StrategyKind};
pub use engine::{BackendHealth, CouncilEngine, EngineError, SessionRequest, MODERATOR_SLOT};
pub use events::{CouncilEvent, EventKind};
pub use history::{CouncilResult, Transcript, TurnMessage};
pub use port::{CompletionPort, LmStudioPort, ERROR_MARKER};
pub use prompt::{ChatMessage, ChatRole, MessageBuilder};
pub use runner::{FallbackConfig, TurnRole, TurnRunner};
pub use strategy::{build_strategy, Strategy, StrategyContext};
