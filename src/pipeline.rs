use anyhow::{anyhow, Result};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::config::Reconcile as Thresholds;
use crate::lookup::ArticleLookup;
use crate::model::SelectionBatch;
use crate::reconcile::{ReconcileReport, Reconciler};
use crate::stage::{StageMode, StageReceipt, Stager};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveOutcome {
    pub report: ReconcileReport,
    pub written: Option<StageReceipt>,
    pub batch: SelectionBatch,
}

impl ResolveOutcome {
    pub fn is_complete(&self) -> bool {
        self.report.is_complete()
    }
}

/// Reconcile the staged checkpoint against the authoritative store and write
/// it back, but only when every item resolved. A partial batch leaves the
/// checkpoint exactly as it was.
#[instrument(skip_all, fields(path = %stager.path().display(), dry_run = dry_run))]
pub async fn resolve_checkpoint(
    stager: &Stager,
    lookup: &dyn ArticleLookup,
    thresholds: &Thresholds,
    dry_run: bool,
) -> Result<ResolveOutcome> {
    let mut batch = stager
        .load()
        .await?
        .ok_or_else(|| anyhow!("no staged selection at {}", stager.path().display()))?;

    let mut reconciler = Reconciler::new(lookup, thresholds.clone());
    let report = reconciler.reconcile(&mut batch.selected).await;

    if !report.is_complete() {
        warn!(
            total = report.total,
            resolved = report.resolved.len(),
            "selection not fully resolved; checkpoint not rewritten"
        );
        return Ok(ResolveOutcome {
            report,
            written: None,
            batch,
        });
    }
    if dry_run {
        info!(total = report.total, "dry run; checkpoint not rewritten");
        return Ok(ResolveOutcome {
            report,
            written: None,
            batch,
        });
    }

    let receipt = stager.stage(&mut batch, StageMode::RequireResolved).await?;
    Ok(ResolveOutcome {
        report,
        written: Some(receipt),
        batch,
    })
}
