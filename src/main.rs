use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use wavebatch_core::config::AppConfig;
use wavebatch_core::event::EventBus;
use wavebatch_core::types::{BatchEvent, BatchReply, BatchRequest, ExecutionMode};
use wavebatch_engine::BatchOrchestrator;
use wavebatch_tools::ToolRegistry;

const DEFAULT_CONFIG: &str = "wavebatch.toml";

#[derive(Parser)]
#[command(name = "wavebatch", version, about = "Dependency-aware batch executor for tool calls")]
struct Cli {
    /// Path to config file (defaults to ./wavebatch.toml when present)
    #[arg(short, long, env = "WAVEBATCH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a batch read from FILE (or stdin) and print the response
    Run {
        /// JSON batch submission; `-` or omitted reads stdin
        file: Option<PathBuf>,
        /// Override the execution mode (sequential, parallel, auto)
        #[arg(long)]
        mode: Option<ExecutionMode>,
        /// Override the concurrency bound
        #[arg(long)]
        max_concurrent: Option<usize>,
        /// Halt dispatch after the first failed operation
        #[arg(long)]
        stop_on_error: bool,
        /// Print progress to stderr while the batch runs
        #[arg(long)]
        progress: bool,
        /// Print the response on a single line
        #[arg(long)]
        compact: bool,
    },
    /// Validate a batch and print its waves without running any tool
    Plan {
        /// JSON batch submission
        file: PathBuf,
    },
    /// List the available tools
    Tools,
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the JSON response.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("wavebatch=info,warn")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    // Handle completions before config loading
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "wavebatch", &mut io::stdout());
        return Ok(());
    }

    // An explicitly named config must exist; the default one is optional.
    let config = match &cli.config {
        Some(path) => AppConfig::load(path),
        None => AppConfig::load_or_default(Path::new(DEFAULT_CONFIG)),
    }
    .context("loading configuration")?;
    debug!(mode = %config.execution.default_mode, "Configuration ready");

    let registry = Arc::new(ToolRegistry::with_builtins());

    match cli.command {
        Commands::Run {
            file,
            mode,
            max_concurrent,
            stop_on_error,
            progress,
            compact,
        } => {
            let mut request = read_request(file.as_deref())?;
            if mode.is_some() {
                request.execution_mode = mode;
            }
            if max_concurrent.is_some() {
                request.max_concurrent = max_concurrent;
            }
            if stop_on_error {
                request.stop_on_error = Some(true);
            }

            let mut orchestrator = BatchOrchestrator::new(registry, config);
            let printer = if progress {
                let bus = Arc::new(EventBus::default());
                let rx = bus.subscribe();
                orchestrator = orchestrator.with_event_bus(bus);
                Some(tokio::spawn(print_progress(rx)))
            } else {
                None
            };

            let reply = orchestrator.submit(request).await;
            // Dropping the orchestrator closes the bus and ends the printer.
            drop(orchestrator);
            if let Some(handle) = printer {
                handle.await.ok();
            }

            print_json(&reply, compact)?;
            if reply.is_rejected() {
                std::process::exit(1);
            }
        }
        Commands::Plan { file } => {
            let request = read_request(Some(&file))?;
            let orchestrator = BatchOrchestrator::new(registry, config);
            match orchestrator.plan(&request) {
                Ok((graph, schedule)) => {
                    let waves: Vec<serde_json::Value> = schedule
                        .waves
                        .iter()
                        .map(|wave| {
                            let operations: Vec<serde_json::Value> = wave
                                .operations
                                .iter()
                                .map(|&i| {
                                    let node = &graph.nodes()[i];
                                    serde_json::json!({
                                        "id": node.id,
                                        "tool": request.operations[i].tool,
                                        "depends_on": node.dependencies,
                                    })
                                })
                                .collect();
                            serde_json::json!({"wave": wave.number, "operations": operations})
                        })
                        .collect();
                    let plan = serde_json::json!({
                        "mode": schedule.mode,
                        "max_concurrent": schedule.concurrency,
                        "num_waves": schedule.num_waves(),
                        "waves": waves,
                    });
                    print_json(&plan, false)?;
                }
                Err(e) => {
                    print_json(&BatchReply::rejected(&e), false)?;
                    std::process::exit(1);
                }
            }
        }
        Commands::Tools => {
            let definitions = registry.definitions();
            let width = definitions.iter().map(|d| d.name.len()).max().unwrap_or(0);
            for def in &definitions {
                println!("  {:width$}  {}", def.name, def.description, width = width);
            }
            println!();
            println!("  {} tools available", definitions.len());
        }
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}

fn read_request(path: Option<&Path>) -> anyhow::Result<BatchRequest> {
    let content = match path {
        Some(p) if p != Path::new("-") => std::fs::read_to_string(p)
            .with_context(|| format!("reading batch from {}", p.display()))?,
        _ => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("reading batch from stdin")?;
            buf
        }
    };
    let request: BatchRequest =
        serde_json::from_str(&content).context("parsing batch submission")?;
    info!(operations = request.operations.len(), "Batch submission loaded");
    Ok(request)
}

fn print_json<T: serde::Serialize>(value: &T, compact: bool) -> anyhow::Result<()> {
    let text = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    println!("{}", text);
    Ok(())
}

async fn print_progress(mut rx: tokio::sync::broadcast::Receiver<BatchEvent>) {
    use tokio::sync::broadcast::error::RecvError;

    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(n)) => {
                eprintln!("[progress: {} events dropped]", n);
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        match event {
            BatchEvent::BatchStarted {
                operations,
                mode,
                max_concurrent,
            } => {
                eprintln!(
                    "[batch: {} operations, mode {}, max {} in flight]",
                    operations, mode, max_concurrent
                );
            }
            BatchEvent::WaveStarted { wave, size } => {
                eprintln!("[wave {}: {} operations]", wave, size);
            }
            BatchEvent::OperationStarted { id, tool, .. } => {
                eprintln!("  [{}: {}]", id, tool);
            }
            BatchEvent::OperationFinished {
                id,
                status,
                elapsed_ms,
            } => {
                eprintln!("  [{}: {} in {:.1}ms]", id, status, elapsed_ms);
            }
            BatchEvent::OperationSkipped { id, reason, .. } => {
                eprintln!("  [{}: skipped, {}]", id, reason);
            }
            BatchEvent::BatchHalted { failed_id } => {
                eprintln!("[halted after '{}' failed]", failed_id);
            }
            BatchEvent::BatchFinished { summary } => {
                eprintln!(
                    "[done: {} succeeded, {} failed, {} timed out in {:.1}ms]",
                    summary.succeeded,
                    summary.failed,
                    summary.timed_out,
                    summary.total_execution_time_ms
                );
                break;
            }
        }
    }
}
