//! nvagent: an LLM lab assistant for NV-center experiments.
//!
//! The model proposes actions (messages, file reads and writes, experiment
//! scripts, plot analysis); a human approves anything with side effects.

mod actions;
mod agent;
mod audit;
mod commands;
mod config;
mod dispatch;
mod init;
mod layout;
mod prompt;
mod setup;
mod transcript;

use clap::{Parser, Subcommand};
use nv_operator::ConsoleOperator;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Debug, Parser)]
#[command(name = "nvagent", version, about = "LLM assistant for NV-center experiments")]
struct Cli {
    /// Config file (default: ./nvagent.toml, optional).
    #[arg(long, global = true, env = "NVAGENT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start an interactive session (default).
    Chat,
    /// Write a starter nvagent.toml (never overwrites).
    Init {
        #[arg(default_value = ".")]
        path: PathBuf,
    },
    /// Search saved conversations without starting a session.
    Search {
        query: String,
        #[arg(long)]
        top_k: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing()?;
    install_panic_hook();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Chat);

    match command {
        Command::Chat => chat(cli.config).await,
        Command::Init { path } => {
            let report = init::initialize_at_root(&path).await?;
            if report.created.is_empty() {
                println!("nvagent init: already initialized at {}", report.root.display());
            } else {
                for path in &report.created {
                    println!("created {}", path.display());
                }
            }
            println!("next: edit {} and set your API keys", config::DEFAULT_CONFIG_FILE);
            Ok(())
        }
        Command::Search { query, top_k } => search(cli.config, &query, top_k).await,
    }
}

async fn chat(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let cfg = config::NvAgentConfig::load(config_path).await?;
    let operator = Arc::new(ConsoleOperator::new());
    let mut agent = setup::build_agent(&cfg, operator, chrono::Local::now()).await?;

    println!("NV experiment agent ready (session {}).", agent.session_id());
    println!("Type a request, /help for commands, or exit to quit.");

    let end = agent.run_until(interrupted()).await;
    tracing::info!(
        end = end.as_str(),
        turns = agent.transcript().len(),
        "session closed"
    );
    Ok(())
}

async fn search(
    config_path: Option<PathBuf>,
    query: &str,
    top_k: Option<usize>,
) -> anyhow::Result<()> {
    let cfg = config::NvAgentConfig::load(config_path).await?;
    let layout = layout::SessionLayout::plan(&cfg.workspace, chrono::Local::now())?;
    let assembler = setup::build_assembler(&cfg, &layout)?;
    let context = assembler
        .build_context(query, top_k.unwrap_or(cfg.memory.top_k).max(1))
        .await;
    if context.is_empty() {
        println!("No matching history in {}.", layout.embeddings_dir.display());
    } else {
        println!("{}", context.text);
    }
    Ok(())
}

/// Resolves on Ctrl-C. Never resolves when the handler cannot be installed.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "ctrl-c handler unavailable");
        std::future::pending::<()>().await;
    }
    tracing::info!("interrupt received");
}

fn init_tracing() -> anyhow::Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(v) => v,
        Err(_) => EnvFilter::new(
            "info,nvagent=debug,nv_app=debug,nv_tools=debug,nv_memory=debug,nv_llm=debug",
        ),
    };
    let log_format = std::env::var("NVAGENT_LOG_FORMAT")
        .unwrap_or_else(|_| "compact".to_string())
        .to_ascii_lowercase();

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_span_events(FmtSpan::CLOSE)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_span_list(true)
                .init();
        }
        "pretty" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_span_events(FmtSpan::CLOSE)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .pretty()
                .init();
        }
        "compact" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(true)
                .compact()
                .init();
        }
        other => {
            return Err(anyhow::anyhow!(
                "unsupported NVAGENT_LOG_FORMAT={other:?}; expected one of: json, pretty, compact"
            ));
        }
    }

    tracing::debug!(
        log_format = %log_format,
        env_filter = ?std::env::var("RUST_LOG").ok(),
        "tracing initialized"
    );
    Ok(())
}

fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        let payload = panic_payload_to_string(panic_info.payload());
        tracing::error!(
            panic_location = %location,
            panic_payload = %payload,
            "panic captured"
        );
        default_hook(panic_info);
    }));
}

fn panic_payload_to_string(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        return msg.to_string();
    }
    if let Some(msg) = payload.downcast_ref::<String>() {
        return msg.clone();
    }
    "non-string panic payload".to_string()
}
