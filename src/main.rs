#![forbid(unsafe_code)]

//! `agent-switchboard` console connector binary.
//!
//! Reads `channel[@user] text` lines from stdin, routes each through the
//! session pool, and prints replies and session events to stdout. Logs go
//! to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, info_span, warn, Instrument};
use tracing_subscriber::{fmt, EnvFilter};

use agent_switchboard::config::GlobalConfig;
use agent_switchboard::connector::queue::ChannelQueues;
use agent_switchboard::connector::{format_event, parse_line, OutboundReply};
use agent_switchboard::events::{event_channel, EventReceiver};
use agent_switchboard::orchestrator::launcher::ProcessLauncher;
use agent_switchboard::orchestrator::pool::{PoolSettings, SessionPool};
use agent_switchboard::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "agent-switchboard", about = "Route chat channels to ACP agents", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the configured sessions root.
    #[arg(long)]
    sessions_root: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("agent-switchboard starting");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    if let Some(root) = args.sessions_root {
        config.sessions_root = root;
    }
    info!(
        agent_cli = %config.agent_cli,
        sessions_root = %config.sessions_root.display(),
        "configuration loaded"
    );

    let (events_tx, events_rx) = event_channel();
    let launcher = Arc::new(ProcessLauncher::from_config(&config));
    let pool = Arc::new(SessionPool::new(
        PoolSettings::from_config(&config),
        launcher,
        events_tx,
    ));

    match pool.sweep_stale(config.retention_days) {
        Ok(removed) => info!(removed, "startup retention sweep done"),
        Err(err) => warn!(%err, "startup retention sweep failed"),
    }

    let (replies_tx, replies_rx) = mpsc::unbounded_channel();
    let queues = ChannelQueues::new(Arc::clone(&pool), replies_tx);
    let printer = tokio::spawn(print_output(replies_rx, events_rx));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            () = &mut shutdown => {
                info!("shutdown signal received");
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if let Some(message) = parse_line(&line) {
                        queues.dispatch(message).await;
                    } else if !line.trim().is_empty() {
                        eprintln!("expected: <channel>[@user] <text>");
                    }
                }
                Ok(None) => {
                    info!("stdin closed");
                    break;
                }
                Err(err) => {
                    error!(%err, "failed to read stdin");
                    break;
                }
            },
        }
    }

    graceful_shutdown(&pool).await;
    drop(queues);
    printer.abort();
    Ok(())
}

async fn graceful_shutdown(pool: &SessionPool) {
    async {
        let channels = pool.channel_keys().await;
        info!(channels = channels.len(), "disconnecting channel sessions");
        pool.shutdown_all().await;
    }
    .instrument(info_span!("graceful_shutdown"))
    .await;
}

async fn print_output(
    mut replies: mpsc::UnboundedReceiver<OutboundReply>,
    mut events: EventReceiver,
) {
    loop {
        tokio::select! {
            Some(reply) = replies.recv() => {
                println!("[{}] {}", reply.channel_key, reply.text);
                for image in &reply.images {
                    println!("[{}] (attach) {image}", reply.channel_key);
                }
            }
            Some(event) = events.recv() => {
                if let Some(line) = format_event(&event) {
                    println!("{line}");
                }
            }
            else => break,
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
