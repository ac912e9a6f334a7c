use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

static NON_ALNUM_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("valid slug regex"));

/// A candidate article chosen for staging.
///
/// Unknown keys are kept in `extra` so that enrichment never drops data the
/// selector wrote. Decoding goes through [`SelectionItemWire`] so a record may
/// carry both spellings of `summary`/`excerpt` and `oldslug`/`oldSlug`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(from = "SelectionItemWire")]
pub struct SelectionItem {
    pub id: Option<i64>,
    pub slug: String,
    #[serde(rename = "oldslug", skip_serializing_if = "Option::is_none")]
    pub old_slug: Option<String>,
    #[serde(rename = "oldSlugs", skip_serializing_if = "Vec::is_empty")]
    pub old_slugs: Vec<String>,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Accepted input shape of a [`SelectionItem`], with every key spelling
/// decoded separately.
#[derive(Debug, Deserialize)]
struct SelectionItemWire {
    #[serde(default, deserialize_with = "lenient_id")]
    id: Option<i64>,
    #[serde(default)]
    slug: String,
    #[serde(default)]
    oldslug: Option<String>,
    #[serde(rename = "oldSlug", default)]
    old_slug_camel: Option<String>,
    #[serde(rename = "oldSlugs", default)]
    old_slugs: Vec<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    excerpt: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// The canonical key wins; a differing value under the other key is kept in
/// `extra` under its own name.
fn merge_spellings(
    canonical: Option<String>,
    other: Option<String>,
    other_key: &str,
    extra: &mut Map<String, Value>,
) -> Option<String> {
    match (canonical, other) {
        (Some(kept), Some(dropped)) => {
            if kept != dropped {
                extra.insert(other_key.to_string(), Value::String(dropped));
            }
            Some(kept)
        }
        (kept, None) => kept,
        (None, other) => other,
    }
}

impl From<SelectionItemWire> for SelectionItem {
    fn from(wire: SelectionItemWire) -> Self {
        let mut extra = wire.extra;
        let old_slug = merge_spellings(wire.oldslug, wire.old_slug_camel, "oldSlug", &mut extra);
        let summary = merge_spellings(wire.summary, wire.excerpt, "excerpt", &mut extra);
        Self {
            id: wire.id,
            slug: wire.slug,
            old_slug,
            old_slugs: wire.old_slugs,
            title: wire.title,
            summary,
            extra,
        }
    }
}

impl SelectionItem {
    pub fn new(slug: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    /// True when the item carries at least one of id, slug or title.
    pub fn has_identity(&self) -> bool {
        self.id.is_some() || !self.slug.trim().is_empty() || !self.title.trim().is_empty()
    }

    /// Derive a provisional slug from the title when none was supplied.
    pub fn ensure_slug(&mut self) {
        if self.slug.trim().is_empty() && !self.title.trim().is_empty() {
            self.slug = slugify(&self.title);
        }
    }

    /// The primary slug followed by any legacy slugs, trimmed and de-duplicated.
    pub fn candidate_slugs(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let legacy = self.old_slug.iter().chain(self.old_slugs.iter());
        for slug in std::iter::once(&self.slug).chain(legacy) {
            let slug = slug.trim();
            if !slug.is_empty() && !out.iter().any(|s| s == slug) {
                out.push(slug.to_string());
            }
        }
        out
    }

    /// Record a slug as legacy unless it is already known.
    pub fn remember_old_slug(&mut self, slug: &str) {
        let slug = slug.trim();
        if slug.is_empty() || slug == self.slug {
            return;
        }
        if self.old_slug.as_deref() == Some(slug) || self.old_slugs.iter().any(|s| s == slug) {
            return;
        }
        self.old_slugs.push(slug.to_string());
    }
}

/// Accept integers and numeric strings; anything else reads as "no id".
fn lenient_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }))
}

/// The staged unit written to the checkpoint file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SelectionBatch {
    pub selected: Vec<SelectionItem>,
    #[serde(rename = "stagedAt", default, skip_serializing_if = "Option::is_none")]
    pub staged_at: Option<DateTime<Utc>>,
}

impl SelectionBatch {
    pub fn new(selected: Vec<SelectionItem>) -> Self {
        Self {
            selected,
            staged_at: None,
        }
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    /// Indices of items that still lack an id.
    pub fn missing_ids(&self) -> Vec<usize> {
        self.selected
            .iter()
            .enumerate()
            .filter(|(_, item)| item.id.is_none())
            .map(|(i, _)| i)
            .collect()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("request body must be a JSON object")]
    NotAnObject,
    #[error("`selected` (or `items`) must be an array")]
    NotAnArray,
    #[error("selected[{index}] is not a selection item: {reason}")]
    BadItem { index: usize, reason: String },
}

/// Extract the submitted items from a staging request body.
/// `selected` is preferred; `items` is the legacy alias.
pub fn items_from_submission(body: Value) -> Result<Vec<SelectionItem>, SubmissionError> {
    let Value::Object(mut body) = body else {
        return Err(SubmissionError::NotAnObject);
    };
    let raw = body
        .remove("selected")
        .or_else(|| body.remove("items"))
        .unwrap_or(Value::Null);
    let Value::Array(entries) = raw else {
        return Err(SubmissionError::NotAnArray);
    };
    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            if !entry.is_object() {
                return Err(SubmissionError::BadItem {
                    index,
                    reason: "expected an object".into(),
                });
            }
            serde_json::from_value(entry).map_err(|err| SubmissionError::BadItem {
                index,
                reason: err.to_string(),
            })
        })
        .collect()
}

/// Lower-case ASCII alphanumerics joined by single dashes.
pub fn slugify(text: &str) -> String {
    let lowered = text.to_lowercase();
    NON_ALNUM_RUN
        .replace_all(&lowered, "-")
        .trim_matches('-')
        .to_string()
}

/// Lower-case and strip everything that is not alphanumeric.
pub fn normalize_slug(slug: &str) -> String {
    let lowered = slug.to_lowercase();
    NON_ALNUM_RUN.replace_all(&lowered, "").into_owned()
}

/// Split a slug on `-`/`_` into lower-cased, de-duplicated tokens of at least `min_len` chars.
pub fn slug_tokens(slug: &str, min_len: usize) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for token in slug.split(['-', '_']) {
        let token = token.trim().to_lowercase();
        if token.chars().count() >= min_len && !tokens.contains(&token) {
            tokens.push(token);
        }
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn item_accepts_aliases_and_numeric_string_id() {
        let item: SelectionItem = serde_json::from_value(json!({
            "id": "42",
            "slug": "eth-etf",
            "oldSlug": "ethereum-etf-approved",
            "title": "ETH ETF",
            "excerpt": "short",
            "source": "coindesk"
        }))
        .unwrap();
        assert_eq!(item.id, Some(42));
        assert_eq!(item.old_slug.as_deref(), Some("ethereum-etf-approved"));
        assert_eq!(item.summary.as_deref(), Some("short"));
        assert_eq!(item.extra.get("source"), Some(&json!("coindesk")));

        let out = serde_json::to_value(&item).unwrap();
        assert_eq!(out["oldslug"], "ethereum-etf-approved");
        assert_eq!(out["summary"], "short");
        assert_eq!(out["source"], "coindesk");
        assert!(out.get("oldSlugs").is_none());
    }

    #[test]
    fn item_with_both_summary_spellings_keeps_summary() {
        let items = items_from_submission(json!({"selected": [
            {"slug": "article-5", "title": "Title 5", "summary": "s", "excerpt": "e"},
            {"slug": "article-7", "title": "Title 7", "summary": "same", "excerpt": "same"}
        ]}))
        .unwrap();
        assert_eq!(items[0].summary.as_deref(), Some("s"));
        assert_eq!(items[0].extra.get("excerpt"), Some(&json!("e")));
        assert_eq!(items[1].summary.as_deref(), Some("same"));
        assert!(items[1].extra.is_empty());

        // Written back and read again, the item is unchanged.
        let out = serde_json::to_value(&items[0]).unwrap();
        assert_eq!(out["summary"], "s");
        assert_eq!(out["excerpt"], "e");
        let again: SelectionItem = serde_json::from_value(out).unwrap();
        assert_eq!(again, items[0]);
    }

    #[test]
    fn item_with_both_old_slug_spellings_keeps_oldslug() {
        let item: SelectionItem = serde_json::from_value(json!({
            "slug": "eth-etf",
            "oldslug": "ethereum-etf",
            "oldSlug": "eth-etf-approved"
        }))
        .unwrap();
        assert_eq!(item.old_slug.as_deref(), Some("ethereum-etf"));
        assert_eq!(item.extra.get("oldSlug"), Some(&json!("eth-etf-approved")));

        let item: SelectionItem = serde_json::from_value(json!({
            "slug": "eth-etf",
            "oldSlug": "eth-etf-approved"
        }))
        .unwrap();
        assert_eq!(item.old_slug.as_deref(), Some("eth-etf-approved"));
        assert!(item.extra.is_empty());
    }

    #[test]
    fn non_numeric_id_reads_as_none() {
        let item: SelectionItem =
            serde_json::from_value(json!({"id": "abc", "slug": "x"})).unwrap();
        assert_eq!(item.id, None);
        let item: SelectionItem = serde_json::from_value(json!({"id": null, "slug": "x"})).unwrap();
        assert_eq!(item.id, None);
        let out = serde_json::to_value(&item).unwrap();
        assert!(out["id"].is_null());
    }

    #[test]
    fn candidate_slugs_dedupes_and_keeps_order() {
        let mut item = SelectionItem::new("btc-halving", "Halving");
        item.old_slug = Some("bitcoin-halving".into());
        item.old_slugs = vec!["btc-halving".into(), " ".into(), "halving-2024".into()];
        assert_eq!(
            item.candidate_slugs(),
            vec!["btc-halving", "bitcoin-halving", "halving-2024"]
        );
    }

    #[test]
    fn ensure_slug_derives_from_title() {
        let mut item = SelectionItem::new("", "  Solana Hits $200, Again! ");
        item.ensure_slug();
        assert_eq!(item.slug, "solana-hits-200-again");

        let mut item = SelectionItem::new("keep-me", "Other Title");
        item.ensure_slug();
        assert_eq!(item.slug, "keep-me");
    }

    #[test]
    fn identity_requires_some_field() {
        assert!(!SelectionItem::default().has_identity());
        assert!(SelectionItem { id: Some(3), ..Default::default() }.has_identity());
        assert!(SelectionItem::new("", "t").has_identity());
    }

    #[test]
    fn normalize_and_tokens() {
        assert_eq!(normalize_slug("Bitcoin_ETF-Flows!"), "bitcoinetfflows");
        assert_eq!(
            slug_tokens("sec-to-approve_bitcoin-etf-bitcoin", 3),
            vec!["sec", "approve", "bitcoin", "etf"]
        );
    }

    #[test]
    fn submission_prefers_selected_then_items() {
        let items = items_from_submission(json!({"items": [{"slug": "a"}]})).unwrap();
        assert_eq!(items[0].slug, "a");

        let items =
            items_from_submission(json!({"selected": [{"slug": "b"}], "items": [{"slug": "a"}]}))
                .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].slug, "b");
    }

    #[test]
    fn submission_rejects_bad_shapes() {
        assert_eq!(
            items_from_submission(json!({"selected": {"slug": "a"}})),
            Err(SubmissionError::NotAnArray)
        );
        assert_eq!(items_from_submission(json!({})), Err(SubmissionError::NotAnArray));
        assert_eq!(items_from_submission(json!([1])), Err(SubmissionError::NotAnObject));
        assert!(matches!(
            items_from_submission(json!({"selected": [{"slug": "a"}, 7]})),
            Err(SubmissionError::BadItem { index: 1, .. })
        ));
    }

    #[test]
    fn batch_missing_ids() {
        let mut batch = SelectionBatch::new(vec![
            SelectionItem::new("a", "A"),
            SelectionItem::new("b", "B"),
        ]);
        batch.selected[1].id = Some(9);
        assert_eq!(batch.missing_ids(), vec![0]);
    }
}
