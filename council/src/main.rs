//! Council CLI
//!
//! Streams a council session to the terminal, and offers small
//! discovery subcommands for the configured presets, models, and
//! backend health.
//!
//! ```bash
//! council run --config config.yaml --council general "Should I use React or Vue?"
//! council run -c config.yaml --council coding --override 0=qwen --override moderator=phi4-mini "..."
//! council councils -c config.yaml
//! council health -c config.yaml
//! ```

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use tracing_subscriber::EnvFilter;

use council::{
    CouncilConfig, CouncilEngine, CouncilResult, EventKind, SessionRequest, TurnMessage,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Multi-agent LLM council over local models", long_about = None)]
struct Args {
    /// Path to the YAML configuration file.
    #[arg(short, long, global = true, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a council session and stream it to stdout.
    Run {
        /// The task or question for the council.
        task: String,

        /// Council preset key (defaults to the config's default).
        #[arg(long)]
        council: Option<String>,

        /// Sampling temperature override.
        #[arg(long)]
        temperature: Option<f32>,

        /// Max tokens per response override.
        #[arg(long)]
        max_tokens: Option<u32>,

        /// Debate rounds override.
        #[arg(long)]
        rounds: Option<u32>,

        /// Per-slot model override, `INDEX=model-key` or
        /// `moderator=model-key`. Repeatable.
        #[arg(long = "override", value_name = "SLOT=MODEL")]
        overrides: Vec<String>,

        /// Print the assembled session result as JSON at the end.
        #[arg(long)]
        json: bool,
    },
    /// List configured council presets.
    Councils,
    /// List configured models.
    Models,
    /// Unload a model from backend memory.
    Unload {
        /// Model key from the config, or a raw backend identifier.
        model: String,
    },
    /// Check backend connectivity.
    Health,
}

fn parse_overrides(raw: &[String]) -> Result<HashMap<String, String>> {
    let mut overrides = HashMap::new();
    for entry in raw {
        let (slot, model) = entry
            .split_once('=')
            .with_context(|| format!("invalid override '{entry}', expected SLOT=MODEL"))?;
        overrides.insert(slot.to_string(), model.to_string());
    }
    Ok(overrides)
}

async fn run_session(engine: &CouncilEngine, request: SessionRequest, json: bool) -> Result<()> {
    let task = request.task.clone();
    let council = request.council.clone();
    let strategy = engine
        .config()
        .councils
        .get(&council)
        .map(|p| p.strategy)
        .unwrap_or(council::StrategyKind::Debate);

    let mut messages: Vec<TurnMessage> = Vec::new();
    let mut moderator_response = String::new();
    let mut total_rounds = 0;
    let mut failed = false;

    let mut events = engine.run(request);
    let stdout = std::io::stdout();
    while let Some(event) = events.next().await {
        match event.kind {
            EventKind::Status => println!("* {}", event.content),
            EventKind::RoundStart => println!("\n=== {} ===", event.content),
            EventKind::RoundDone => {
                total_rounds = total_rounds.max(event.round);
            }
            EventKind::AgentStart => println!("\n--- {} ---", event.agent),
            EventKind::ModeratorStart => println!("\n--- Moderator ---"),
            EventKind::AgentChunk | EventKind::ModeratorChunk => {
                print!("{}", event.content);
                let _ = stdout.lock().flush();
            }
            EventKind::AgentDone => {
                println!();
                messages.push(TurnMessage::new(
                    &event.agent,
                    event
                        .metadata
                        .get("model")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default(),
                    event.round,
                    &event.content,
                ));
            }
            EventKind::ModeratorDone => {
                println!();
                moderator_response = event.content.clone();
            }
            EventKind::CouncilDone => println!("\n* {}", event.content),
            EventKind::Error => {
                eprintln!("error: {}", event.content);
                failed = true;
            }
            EventKind::ModelLoading
            | EventKind::ModelLoaded
            | EventKind::ModelUnloading
            | EventKind::ModelUnloaded => {
                tracing::debug!(kind = %event.kind, "{}", event.content);
            }
        }
    }

    if json {
        let result = CouncilResult {
            task,
            council_name: council,
            strategy,
            messages,
            moderator_response,
            total_rounds,
            timestamp: chrono::Utc::now(),
        };
        println!("{}", serde_json::to_string_pretty(&result)?);
    }

    if failed {
        bail!("session ended with errors");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = CouncilConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    config.validate()?;
    let engine = CouncilEngine::new(config);

    match args.command {
        Command::Run {
            task,
            council,
            temperature,
            max_tokens,
            rounds,
            overrides,
            json,
        } => {
            let council =
                council.unwrap_or_else(|| engine.config().defaults.council.clone());
            let request = SessionRequest {
                task,
                council,
                temperature,
                max_tokens,
                rounds,
                model_overrides: parse_overrides(&overrides)?,
            };
            run_session(&engine, request, json).await
        }
        Command::Councils => {
            for (key, preset) in engine.councils() {
                let roles: Vec<_> = preset.agents.iter().map(|a| a.role.as_str()).collect();
                println!(
                    "{key}: {} [{}] agents={roles:?} rounds={}",
                    preset.name, preset.strategy, preset.debate_rounds
                );
            }
            Ok(())
        }
        Command::Models => {
            for (key, model) in engine.models() {
                println!(
                    "{key}: {} ({}) ctx={}",
                    model.name, model.identifier, model.context_length
                );
            }
            Ok(())
        }
        Command::Unload { model } => {
            if engine.unload_model(&model).await {
                println!("unloaded {model}");
                Ok(())
            } else {
                bail!("failed to unload {model}")
            }
        }
        Command::Health => {
            let health = engine.health().await;
            if health.connected {
                println!("backend: connected ({} models)", health.models.len());
                for model in health.models {
                    println!("  {model}");
                }
                Ok(())
            } else {
                bail!("backend unreachable")
            }
        }
    }
}
