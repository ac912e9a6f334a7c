//! Row models returned by the article repositories.

use serde::{Deserialize, Serialize};

/// One canonical article as held by the authoritative store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRow {
    pub id: i64,
    pub slug: String,
    #[serde(default, alias = "oldSlug")]
    pub oldslug: Option<String>,
    pub title: String,
    #[serde(default, alias = "summary")]
    pub excerpt: Option<String>,
}

impl ArticleRow {
    /// Slug and legacy slug, whichever are present.
    pub fn known_slugs(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.slug.as_str()).chain(
            self.oldslug
                .as_deref()
                .filter(|s| !s.trim().is_empty()),
        )
    }
}
