use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::info;

use news_stager::api::{build_router, AppState};
use news_stager::{config, lookup};

#[derive(Debug, Parser)]
#[command(author, version, about = "Admin API for staging and reconciling article selections")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Override `app.bind` (host:port)
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let lookup = lookup::open(&cfg).await?;
    let bind = args.bind.clone().unwrap_or_else(|| cfg.app.bind.clone());
    let checkpoint = cfg.checkpoint_path();
    let app = build_router(AppState::new(cfg, lookup));

    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {}", bind))?;
    info!(%bind, checkpoint = %checkpoint.display(), "admin api listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("admin api server failed")?;

    info!("admin api stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(?err, "failed to install ctrl-c handler");
        std::future::pending::<()>().await;
    }
    info!("received ctrl-c, shutting down");
}
