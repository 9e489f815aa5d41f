use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use calcflow::agent::Agent;
use calcflow::config::Config;
use calcflow::core::{ExpressionId, ExpressionSnapshot, ExpressionStatus};
use calcflow::orchestration::{Coordinator, CoordinatorEvent, WorkerEvent, WorkerPool};
use calcflow::{clog, clog_debug, server, Error, Result};

/// Poll interval for in-process workers.
const EVAL_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Calcflow - distributed arithmetic expression calculator
#[derive(Parser, Debug)]
#[command(name = "calcflow")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    CALCFLOW_DEBUG=1     Enable debug logging (alternative to --debug)\n    CALCFLOW_DEBUG=trace Also log HTTP payloads and tree state")]
pub struct Cli {
    /// Enable debug logging
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Config file (defaults to ~/.calcflow/calcflow.toml)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Serve the orchestrator HTTP API
    Orchestrator {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Poll an orchestrator for tasks and compute them
    Agent {
        /// Orchestrator base URL
        #[arg(short, long)]
        orchestrator: Option<String>,

        /// Number of concurrent workers
        #[arg(long)]
        computing_power: Option<usize>,
    },

    /// Evaluate an expression with in-process workers
    Eval {
        /// The arithmetic expression, e.g. "(1+2)*3"
        expression: String,

        /// Number of concurrent workers
        #[arg(short, long)]
        workers: Option<usize>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    calcflow::log::init_with_debug(cli.debug, config.log_path());
    if calcflow::log::is_debug() {
        clog_debug!("calcflow starting (debug mode enabled): {:?}", cli.command);
    }

    let rt = tokio::runtime::Runtime::new()?;
    match cli.command {
        Command::Orchestrator { port } => {
            let port = port.unwrap_or(config.orchestrator.port);
            let coordinator = Coordinator::new(config.timings.clone());
            rt.block_on(server::serve(coordinator, port))
        }
        Command::Agent {
            orchestrator,
            computing_power,
        } => {
            let url = orchestrator.unwrap_or_else(|| config.agent.orchestrator_url.clone());
            let computing_power = computing_power.unwrap_or(config.agent.computing_power);
            let poll_interval = Duration::from_millis(config.agent.poll_interval_ms);
            rt.block_on(run_agent(url, computing_power, poll_interval))
        }
        Command::Eval {
            expression,
            workers,
        } => {
            let workers = workers.unwrap_or(config.agent.computing_power);
            let snapshot = rt.block_on(run_eval(&expression, &config, workers))?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
            Ok(())
        }
    }
}

/// Run polling workers against a remote orchestrator until Ctrl-C.
async fn run_agent(url: String, computing_power: usize, poll_interval: Duration) -> Result<()> {
    let agent = Agent::new(url)?;
    clog!(
        "Agent polling {} with {} workers",
        agent.base_url(),
        computing_power
    );

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                clog!("Shutting down agent");
            }
            cancel.cancel();
        });
    }

    let pool = WorkerPool::new(Arc::new(agent), computing_power, poll_interval);
    let counts = pool.run(cancel).await;
    clog!(
        "Agent stopped after {} tasks",
        counts.iter().sum::<usize>()
    );
    Ok(())
}

/// Reduce one expression with an in-process coordinator and worker pool.
async fn run_eval(source: &str, config: &Config, workers: usize) -> Result<ExpressionSnapshot> {
    let (event_tx, mut events) = mpsc::channel(256);
    let (worker_tx, mut worker_events) = mpsc::channel(256);

    let coordinator = Coordinator::with_events(config.timings.clone(), event_tx);
    let id = coordinator.submit(source).await?;
    let snapshot = coordinator.get(id).await?;
    if snapshot.status == ExpressionStatus::Completed {
        return Ok(snapshot);
    }

    let pool = WorkerPool::new(Arc::new(coordinator.clone()), workers, EVAL_POLL_INTERVAL)
        .with_events(worker_tx);
    let cancel = CancellationToken::new();
    let handle = {
        let cancel = cancel.clone();
        tokio::spawn(async move { pool.run(cancel).await })
    };

    let outcome = wait_for_completion(&coordinator, id, &mut events, &mut worker_events).await;
    cancel.cancel();
    let _ = handle.await;
    outcome
}

async fn wait_for_completion(
    coordinator: &Coordinator,
    id: ExpressionId,
    events: &mut mpsc::Receiver<CoordinatorEvent>,
    worker_events: &mut mpsc::Receiver<WorkerEvent>,
) -> Result<ExpressionSnapshot> {
    loop {
        tokio::select! {
            Some(event) = events.recv() => {
                if let CoordinatorEvent::ExpressionCompleted { id: done, .. } = event {
                    if done == id {
                        return coordinator.get(id).await;
                    }
                }
            }
            Some(event) = worker_events.recv() => match event {
                WorkerEvent::TaskFailed { task_id, error, .. } => {
                    return Err(Error::Orchestrator(format!("task {} failed: {}", task_id, error)));
                }
                // Coordinator events are best effort, so confirm via the snapshot
                WorkerEvent::TaskCompleted { .. } => {
                    let snapshot = coordinator.get(id).await?;
                    if snapshot.status == ExpressionStatus::Completed {
                        return Ok(snapshot);
                    }
                }
            },
            else => {
                return Err(Error::Orchestrator("workers stopped before completion".to_string()));
            }
        }
    }
}
