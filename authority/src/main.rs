//! TablePOS licensing authority
//!
//! Serves trial, activation and password-reset endpoints to point-of-sale
//! clients and trial mutations to operators, backed by a SQLite database.
//!
//! Usage:
//!   TABLEPOS_SERIAL_SECRET=... TABLEPOS_UNLOCK_SECRET=... TABLEPOS_ADMIN_TOKEN=... \
//!     tablepos-authority --port 8080 --database license.db

use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use anyhow::{Context, Result};
use clap::Parser;
use tablepos_authority::{build_router, AppState};
use tablepos_license::{CodeSecret, LicenseConfig, LicensePolicy, SqliteLicenseStore};
use tablepos_types::SystemClock;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "tablepos-authority")]
#[command(about = "TablePOS licensing authority")]
struct Args {
    /// HTTP port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// Path to the SQLite license database
    #[arg(short, long, default_value = "tablepos-license.db")]
    database: PathBuf,

    /// Optional JSON policy file (trial length, grace window, poll interval)
    #[arg(long)]
    policy: Option<PathBuf>,

    /// HMAC secret for serial codes
    #[arg(long, env = "TABLEPOS_SERIAL_SECRET", hide_env_values = true)]
    serial_secret: String,

    /// HMAC secret for unlock codes
    #[arg(long, env = "TABLEPOS_UNLOCK_SECRET", hide_env_values = true)]
    unlock_secret: String,

    /// Bearer token required on admin endpoints
    #[arg(long, env = "TABLEPOS_ADMIN_TOKEN", hide_env_values = true)]
    admin_token: String,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    info!("TablePOS authority starting...");

    let policy = match &args.policy {
        Some(path) => LicensePolicy::from_json_file(path)
            .with_context(|| format!("failed to load policy from {}", path.display()))?,
        None => LicensePolicy::default(),
    };
    let config = LicenseConfig::new(
        CodeSecret::new(args.serial_secret.into_bytes()),
        CodeSecret::new(args.unlock_secret.into_bytes()),
        policy,
    )
    .context("invalid licensing configuration")?;

    let store = SqliteLicenseStore::open(&args.database)
        .with_context(|| format!("failed to open database {}", args.database.display()))?;
    info!(path = %args.database.display(), "license database opened");

    let state = AppState::new(Arc::new(store), Arc::new(SystemClock), config, args.admin_token)
        .context("invalid admin token")?;
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", args.bind, args.port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "HTTP API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("TablePOS authority stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
