use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

use news_stager::config;
use news_stager::model::{items_from_submission, SelectionBatch};
use news_stager::stage::{BackupOutcome, StageMode, Stager};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Stage a selection file as the checkpoint without reconciling it"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Selection JSON (`{"selected": [...]}` or legacy `{"items": [...]}`); stdin when omitted
    #[arg(long)]
    input: Option<PathBuf>,

    /// Write here instead of `app.checkpoint_path`
    #[arg(long)]
    out: Option<PathBuf>,
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

    let raw = match &args.input {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buf)
                .await
                .context("failed to read selection from stdin")?;
            buf
        }
    };
    let body: serde_json::Value = serde_json::from_str(&raw).context("selection is not valid JSON")?;
    let items = items_from_submission(body)?;

    let stager = Stager::new(args.out.clone().unwrap_or_else(|| cfg.checkpoint_path()));
    let mut batch = SelectionBatch::new(items);
    let unresolved = batch.missing_ids().len();
    let receipt = stager.stage(&mut batch, StageMode::AcceptPartial).await?;

    if let BackupOutcome::Failed { error } = &receipt.backup {
        warn!(%error, "previous checkpoint was not backed up");
    }
    if unresolved > 0 {
        info!(unresolved, "staged items without ids; run resolve_selection to reconcile");
    }
    println!("staged {} item(s) to {}", receipt.count, receipt.path.display());
    Ok(())
}
