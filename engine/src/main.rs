//! Entry point: ambient flags only (hostname, port, state dir, log
//! retention) — no content subcommands. Content moves through the
//! Approval Queue and the Operations Agent's inbox, never through a CLI
//! verb. This daemon has exactly one mode: serve.

use std::net::SocketAddr;

use anyhow::Context;
use clap::Parser;
use sentrypost_ai::{boot, config, http};
use sentrypost_observability::{canonical_logs_dir_from_root, init_process_logging, ProcessKind};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "sentrypost-engine")]
#[command(about = "Autonomous social-media operator core")]
struct Cli {
    #[arg(long, env = "SENTRYPOST_HOSTNAME")]
    hostname: Option<String>,
    #[arg(long, env = "SENTRYPOST_PORT")]
    port: Option<u16>,
    #[arg(long, env = "SENTRYPOST_STATE_DIR")]
    state_dir: Option<String>,
    #[arg(long, default_value_t = 30)]
    log_retention_days: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let state_dir = config::resolve_state_dir(cli.state_dir.clone());

    let logs_dir = canonical_logs_dir_from_root(&state_dir);
    let (_guard, log_info) = init_process_logging(ProcessKind::Engine, &logs_dir, cli.log_retention_days)?;
    info!(?log_info, "sentrypost-engine starting");

    let booted = boot::boot(state_dir).await?;

    let hostname = cli.hostname.unwrap_or_else(|| booted.state.config.hostname.clone());
    let port = cli.port.unwrap_or(booted.state.config.port);
    let addr: SocketAddr = format!("{hostname}:{port}").parse().context("invalid hostname or port")?;

    let server_state = booted.state.clone();
    let result = http::serve(addr, server_state).await;

    boot::shutdown(booted).await;
    result
}
