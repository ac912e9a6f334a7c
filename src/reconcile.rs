//! Resolve loosely identified selection items to authoritative article rows.
//!
//! Each item walks a fixed chain of strategies and stops at the first one
//! that decides:
//!
//! 1. [`Strategy::ExactId`]: primary-key lookup; adopts the row wholesale.
//! 2. [`Strategy::ExactSlug`]: slug equality, then legacy-slug equality.
//! 3. [`Strategy::NormalizedSlug`]: compare slugs lower-cased with
//!    non-alphanumerics stripped.
//! 4. [`Strategy::TokenOverlap`]: count candidate tokens contained in each
//!    known slug; accept the unique best score at or above the threshold.
//!
//! Anything else is [`Resolution::NotFound`]. A backend error for one item is
//! recorded and the run continues with the next.
use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::config::Reconcile as Thresholds;
use crate::db::ArticleRow;
use crate::lookup::ArticleLookup;
use crate::model::{normalize_slug, slug_tokens, SelectionItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    ExactId,
    ExactSlug,
    NormalizedSlug,
    TokenOverlap,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::ExactId => "exact-id",
            Strategy::ExactSlug => "exact-slug",
            Strategy::NormalizedSlug => "normalized-slug",
            Strategy::TokenOverlap => "token-overlap",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved { row: ArticleRow, strategy: Strategy },
    Ambiguous { candidates: Vec<i64> },
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedEntry {
    pub index: usize,
    pub id: i64,
    pub strategy: Strategy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedEntry {
    pub index: usize,
    pub slug: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AmbiguousEntry {
    pub index: usize,
    pub slug: String,
    pub title: String,
    pub candidates: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LookupFailure {
    pub index: usize,
    pub slug: String,
    pub title: String,
    pub error: String,
}

/// Outcome of one reconciliation run. Not-found and backend failures are kept
/// apart so operators can tell "no such article" from "store unreachable".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub total: usize,
    pub resolved: Vec<ResolvedEntry>,
    pub unresolved: Vec<UnresolvedEntry>,
    pub ambiguous: Vec<AmbiguousEntry>,
    pub lookup_failures: Vec<LookupFailure>,
    pub skipped: Vec<usize>,
}

impl ReconcileReport {
    /// Every item resolved in this run.
    pub fn is_complete(&self) -> bool {
        self.resolved.len() == self.total
    }
}

pub struct Reconciler<'a> {
    lookup: &'a dyn ArticleLookup,
    thresholds: Thresholds,
    catalog: Option<Vec<ArticleRow>>,
}

impl<'a> Reconciler<'a> {
    pub fn new(lookup: &'a dyn ArticleLookup, thresholds: Thresholds) -> Self {
        Self {
            lookup,
            thresholds,
            catalog: None,
        }
    }

    /// Enrich `items` in place. Items are never removed or reordered.
    #[instrument(skip_all, fields(items = items.len()))]
    pub async fn reconcile(&mut self, items: &mut [SelectionItem]) -> ReconcileReport {
        let mut report = ReconcileReport {
            total: items.len(),
            ..Default::default()
        };

        for (index, item) in items.iter_mut().enumerate() {
            if !item.has_identity() {
                warn!(index, "selection item has no id, slug or title; skipping");
                report.skipped.push(index);
                continue;
            }
            item.ensure_slug();

            match self.resolve_item(item).await {
                Ok(Resolution::Resolved { row, strategy }) => {
                    debug!(index, id = row.id, strategy = strategy.as_str(), "resolved");
                    apply_row(item, &row, strategy);
                    report.resolved.push(ResolvedEntry {
                        index,
                        id: row.id,
                        strategy,
                    });
                }
                Ok(Resolution::Ambiguous { candidates }) => {
                    warn!(index, slug = %item.slug, ?candidates, "ambiguous match; not guessing");
                    report.ambiguous.push(AmbiguousEntry {
                        index,
                        slug: item.slug.clone(),
                        title: item.title.clone(),
                        candidates,
                    });
                }
                Ok(Resolution::NotFound) => {
                    info!(index, slug = %item.slug, "no authoritative article found");
                    report.unresolved.push(UnresolvedEntry {
                        index,
                        slug: item.slug.clone(),
                        title: item.title.clone(),
                    });
                }
                Err(err) => {
                    warn!(?err, index, slug = %item.slug, "lookup backend failed; leaving item unresolved");
                    report.lookup_failures.push(LookupFailure {
                        index,
                        slug: item.slug.clone(),
                        title: item.title.clone(),
                        error: format!("{:#}", err),
                    });
                }
            }
        }

        info!(
            total = report.total,
            resolved = report.resolved.len(),
            unresolved = report.unresolved.len(),
            ambiguous = report.ambiguous.len(),
            lookup_failures = report.lookup_failures.len(),
            skipped = report.skipped.len(),
            "reconciliation finished"
        );
        report
    }

    /// Run the strategy chain for a single item without mutating it.
    pub async fn resolve_item(&mut self, item: &SelectionItem) -> Result<Resolution> {
        if let Some(id) = item.id {
            if let Some(row) = self.lookup.by_id(id).await? {
                return Ok(Resolution::Resolved {
                    row,
                    strategy: Strategy::ExactId,
                });
            }
            debug!(id, "id not present in store; falling back to slug strategies");
        }

        let candidates = item.candidate_slugs();
        if candidates.is_empty() {
            return Ok(Resolution::NotFound);
        }

        let exact = self.exact_slug(&candidates).await?;
        if exact != Resolution::NotFound {
            return Ok(exact);
        }

        let thresholds = self.thresholds.clone();
        let catalog = self.catalog().await?;
        let normalized = match_normalized(&candidates, catalog);
        if normalized != Resolution::NotFound {
            return Ok(normalized);
        }
        Ok(match_token_overlap(&item.slug, catalog, &thresholds))
    }

    async fn exact_slug(&self, candidates: &[String]) -> Result<Resolution> {
        for slug in candidates {
            if let Some(row) = self.lookup.by_slug(slug).await? {
                return Ok(Resolution::Resolved {
                    row,
                    strategy: Strategy::ExactSlug,
                });
            }
        }
        for slug in candidates {
            let mut rows = self.lookup.by_old_slug(slug).await?;
            match rows.len() {
                0 => continue,
                1 => {
                    return Ok(Resolution::Resolved {
                        row: rows.remove(0),
                        strategy: Strategy::ExactSlug,
                    })
                }
                _ => {
                    return Ok(Resolution::Ambiguous {
                        candidates: rows.iter().map(|r| r.id).collect(),
                    })
                }
            }
        }
        Ok(Resolution::NotFound)
    }

    /// Load the catalog once per run; a failed load is retried on next use.
    async fn catalog(&mut self) -> Result<&[ArticleRow]> {
        if self.catalog.is_none() {
            let rows = self.lookup.catalog().await?;
            debug!(rows = rows.len(), "loaded article catalog");
            self.catalog = Some(rows);
        }
        Ok(self.catalog.as_deref().unwrap_or_default())
    }
}

/// Accept a row whose slug or legacy slug normalizes to the same string as any candidate.
pub fn match_normalized(candidates: &[String], catalog: &[ArticleRow]) -> Resolution {
    let wanted: Vec<String> = candidates
        .iter()
        .map(|s| normalize_slug(s))
        .filter(|s| !s.is_empty())
        .collect();
    if wanted.is_empty() {
        return Resolution::NotFound;
    }

    let hits: Vec<&ArticleRow> = catalog
        .iter()
        .filter(|row| {
            row.known_slugs()
                .any(|known| wanted.contains(&normalize_slug(known)))
        })
        .collect();

    match hits.as_slice() {
        [] => Resolution::NotFound,
        [row] => Resolution::Resolved {
            row: (*row).clone(),
            strategy: Strategy::NormalizedSlug,
        },
        many => Resolution::Ambiguous {
            candidates: many.iter().map(|r| r.id).collect(),
        },
    }
}

/// Number of `tokens` that occur as substrings of `known` (case-insensitive).
pub fn token_score(tokens: &[String], known: &str) -> usize {
    let known = known.to_lowercase();
    tokens.iter().filter(|t| known.contains(t.as_str())).count()
}

/// Pick the row with the highest token score, if it clears `min_token_score`
/// and no other row ties with it.
pub fn match_token_overlap(slug: &str, catalog: &[ArticleRow], thresholds: &Thresholds) -> Resolution {
    let tokens = slug_tokens(slug, thresholds.min_token_len);
    if tokens.is_empty() {
        return Resolution::NotFound;
    }

    let mut best_score = 0;
    let mut best: Vec<&ArticleRow> = Vec::new();
    for row in catalog {
        let score = row
            .known_slugs()
            .map(|known| token_score(&tokens, known))
            .max()
            .unwrap_or(0);
        if score == 0 || score < best_score {
            continue;
        }
        if score > best_score {
            best_score = score;
            best.clear();
        }
        best.push(row);
    }

    if best_score < thresholds.min_token_score {
        return Resolution::NotFound;
    }
    match best.as_slice() {
        [] => Resolution::NotFound,
        [row] => Resolution::Resolved {
            row: (*row).clone(),
            strategy: Strategy::TokenOverlap,
        },
        many => Resolution::Ambiguous {
            candidates: many.iter().map(|r| r.id).collect(),
        },
    }
}

/// Copy authoritative fields onto the item. An exact-id hit overwrites title
/// and summary; the other strategies only fill them when empty. A replaced
/// slug is kept as a legacy slug.
pub fn apply_row(item: &mut SelectionItem, row: &ArticleRow, strategy: Strategy) {
    let previous_slug = std::mem::replace(&mut item.slug, row.slug.clone());
    item.id = Some(row.id);
    item.remember_old_slug(&previous_slug);
    if let Some(old) = &row.oldslug {
        if item.old_slug.as_deref() != Some(old.as_str()) {
            if let Some(prev) = item.old_slug.replace(old.clone()) {
                item.remember_old_slug(&prev);
            }
        }
    }

    if strategy == Strategy::ExactId {
        item.title = row.title.clone();
        if row.excerpt.is_some() {
            item.summary = row.excerpt.clone();
        }
        return;
    }
    if item.title.trim().is_empty() {
        item.title = row.title.clone();
    }
    if item.summary.as_deref().map_or(true, |s| s.trim().is_empty()) {
        if let Some(excerpt) = &row.excerpt {
            item.summary = Some(excerpt.clone());
        }
    }
}
