// SPDX-License-Identifier: MIT

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use kinetic_flow::adk::store::MemoryStateStore;
use kinetic_flow::kinetic::config::Config;
use kinetic_flow::kinetic::server::{self, AppState};
use kinetic_flow::kinetic::workflow::loader::WorkflowLoader;
use kinetic_flow::kinetic::workflow::types::ExecutionMetadata;

/// How often expired records are swept while serving
const PURGE_INTERVAL: Duration = Duration::from_secs(300);
const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML config file; KINETIC_* environment variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP API
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run a workflow file to completion and print the execution record
    Run {
        /// Path to the workflow file (YAML or JSON)
        #[arg(short, long)]
        file: PathBuf,

        /// Workflow input as a JSON object
        #[arg(short, long)]
        input: Option<String>,
    },
    /// Pursue a goal with the ReAct loop and print its trace
    React {
        /// Goal text, e.g. "transcribe video"
        #[arg(short, long)]
        goal: String,

        /// Goal context as a JSON object, e.g. '{"sourceUrl": "..."}'
        #[arg(long)]
        context: Option<String>,
    },
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    let mut config = match path {
        Some(p) => Config::load(p)?,
        None => Config::default(),
    };
    config.apply_env()?;
    Ok(config)
}

fn parse_object(raw: Option<&str>, what: &str) -> anyhow::Result<Map<String, Value>> {
    let Some(raw) = raw else {
        return Ok(Map::new());
    };
    match serde_json::from_str::<Value>(raw).with_context(|| format!("{} is not valid JSON", what))? {
        Value::Object(map) => Ok(map),
        _ => bail!("{} must be a JSON object", what),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let config = load_config(args.config.as_ref())?;

    let store = Arc::new(MemoryStateStore::new());
    let state = AppState::from_config(&config, store.clone())?;

    match args.command {
        Commands::Serve { port } => {
            let sweeper = store.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(PURGE_INTERVAL);
                loop {
                    ticker.tick().await;
                    sweeper.purge_expired().await;
                }
            });

            server::serve(state, port.unwrap_or(config.port)).await?;
        }
        Commands::Run { file, input } => {
            let definition = WorkflowLoader::new()
                .load_workflow(&file)
                .with_context(|| format!("failed to load {}", file.display()))?;
            let input = parse_object(input.as_deref(), "--input")?;

            let id = state
                .workflows
                .execute_workflow(definition, input, ExecutionMetadata::with_source("cli"))
                .await?;
            log::info!("Execution {} submitted", id);

            let execution = loop {
                match state.workflows.get_execution(&id).await? {
                    Some(exec) if exec.status.is_terminal() => break exec,
                    Some(_) => tokio::time::sleep(POLL_INTERVAL).await,
                    None => bail!("execution {} disappeared from the store", id),
                }
            };
            println!("{}", serde_json::to_string_pretty(&execution)?);
        }
        Commands::React { goal, context } => {
            let context = parse_object(context.as_deref(), "--context")?;
            let id = state.react.execute_goal(&goal, context).await?;
            log::info!("ReAct execution {} submitted", id);

            let trace = loop {
                match state.react.get_trace(&id).await? {
                    Some(trace) if trace.status.is_terminal() => break trace,
                    Some(_) => tokio::time::sleep(POLL_INTERVAL).await,
                    None => bail!("ReAct execution {} disappeared from the store", id),
                }
            };
            println!("{}", serde_json::to_string_pretty(&trace)?);
        }
    }

    Ok(())
}
