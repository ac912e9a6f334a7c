use anyhow::Result;
use chrono::{TimeZone, Utc};
use clap::Parser;
use std::path::PathBuf;

use news_stager::config;
use news_stager::stage::Stager;

#[derive(Parser, Debug)]
#[command(about = "Show the staged checkpoint and its backup history")]
struct Args {
    /// Path to YAML config
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Inspect this file instead of `app.checkpoint_path`
    #[arg(long)]
    path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    let stager = Stager::new(args.path.unwrap_or_else(|| cfg.checkpoint_path()));

    println!("Checkpoint: {}", stager.path().display());
    match stager.load().await? {
        None => println!("  (not staged yet)"),
        Some(batch) => {
            let staged_at = batch
                .staged_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "unknown".into());
            println!("  stagedAt: {}", staged_at);
            println!(
                "  items: {} ({} without id)",
                batch.len(),
                batch.missing_ids().len()
            );
            for (i, item) in batch.selected.iter().enumerate() {
                let id = item
                    .id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "-".into());
                println!("  {:>3}. [{:>6}] {} - {}", i, id, item.slug, item.title);
            }
        }
    }

    let backups = stager.backups().await?;
    println!("Backups: {}", backups.len());
    for backup in backups {
        let when = Utc
            .timestamp_millis_opt(backup.stamp_ms)
            .single()
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "?".into());
        println!("  {}  {}", when, backup.path.display());
    }
    Ok(())
}
