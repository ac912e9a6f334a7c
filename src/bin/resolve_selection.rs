use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info, warn};

use news_stager::config;
use news_stager::lookup;
use news_stager::pipeline::resolve_checkpoint;
use news_stager::stage::Stager;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Resolve the staged selection against the article store and write it back when complete"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Report only; never rewrite the checkpoint
    #[arg(long)]
    dry_run: bool,

    /// Print the enriched batch as JSON after the report
    #[arg(long)]
    print_batch: bool,
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
    let stager = Stager::new(cfg.checkpoint_path());

    info!(path = %stager.path().display(), dry_run = args.dry_run, "resolving staged selection");
    let outcome = resolve_checkpoint(&stager, lookup.as_ref(), &cfg.reconcile, args.dry_run).await?;
    let report = &outcome.report;

    for entry in &report.resolved {
        println!("#{:<3} -> id {} ({})", entry.index, entry.id, entry.strategy.as_str());
    }
    for entry in &report.unresolved {
        println!("#{:<3} NOT FOUND  slug={} title={}", entry.index, entry.slug, entry.title);
    }
    for entry in &report.ambiguous {
        println!(
            "#{:<3} AMBIGUOUS  slug={} candidates={:?}",
            entry.index, entry.slug, entry.candidates
        );
    }
    for entry in &report.lookup_failures {
        println!("#{:<3} LOOKUP FAILED  slug={} error={}", entry.index, entry.slug, entry.error);
    }
    for index in &report.skipped {
        println!("#{:<3} SKIPPED  (no id, slug or title)", index);
    }

    if args.print_batch {
        println!("{}", serde_json::to_string_pretty(&outcome.batch)?);
    }

    match &outcome.written {
        Some(receipt) => {
            info!(count = receipt.count, path = %receipt.path.display(), "checkpoint rewritten");
            Ok(())
        }
        None if outcome.is_complete() => {
            warn!("all items resolved; dry run left the checkpoint untouched");
            Ok(())
        }
        None => {
            error!(
                resolved = report.resolved.len(),
                total = report.total,
                "selection incomplete; checkpoint left untouched"
            );
            std::process::exit(2);
        }
    }
}
