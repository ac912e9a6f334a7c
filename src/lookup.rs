//! Lookup seam over the authoritative article store.
//!
//! The reconciler only talks to [`ArticleLookup`]; the SQLite repository and
//! the external content API both sit behind it.
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::config::{Config, StoreKind};
use crate::content_api::ContentApiClient;
use crate::db::{self, ArticleRow, Pool};

#[async_trait]
pub trait ArticleLookup: Send + Sync {
    async fn by_id(&self, id: i64) -> Result<Option<ArticleRow>>;

    async fn by_slug(&self, slug: &str) -> Result<Option<ArticleRow>>;

    /// All rows whose legacy slug equals `slug`.
    async fn by_old_slug(&self, slug: &str) -> Result<Vec<ArticleRow>>;

    /// Every known article; used by the fuzzy strategies.
    async fn catalog(&self) -> Result<Vec<ArticleRow>>;
}

/// Lookups served from the local SQLite article store.
#[derive(Debug, Clone)]
pub struct SqliteArticles {
    pool: Pool,
}

impl SqliteArticles {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ArticleLookup for SqliteArticles {
    async fn by_id(&self, id: i64) -> Result<Option<ArticleRow>> {
        db::find_article_by_id(&self.pool, id).await
    }

    async fn by_slug(&self, slug: &str) -> Result<Option<ArticleRow>> {
        db::find_article_by_slug(&self.pool, slug).await
    }

    async fn by_old_slug(&self, slug: &str) -> Result<Vec<ArticleRow>> {
        db::find_articles_by_oldslug(&self.pool, slug).await
    }

    async fn catalog(&self) -> Result<Vec<ArticleRow>> {
        db::list_articles(&self.pool).await
    }
}

/// Build the lookup backend named by `store.kind`.
pub async fn open(cfg: &Config) -> Result<Arc<dyn ArticleLookup>> {
    match cfg.store.kind {
        StoreKind::Sqlite => {
            let url = cfg.database_url();
            let pool = db::init_pool(&url).await?;
            db::run_migrations(&pool).await?;
            let articles = db::count_articles(&pool).await?;
            info!(database_url = %url, articles, "using sqlite article store");
            Ok(Arc::new(SqliteArticles::new(pool)))
        }
        StoreKind::ContentApi => {
            let api = cfg
                .content_api
                .as_ref()
                .context("content_api section missing")?;
            let client = ContentApiClient::from_config(api)?;
            info!(base_url = %api.base_url, "using content api article store");
            Ok(Arc::new(client))
        }
    }
}
