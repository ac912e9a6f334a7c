use super::model::ArticleRow;
use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::instrument;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let options = SqliteConnectOptions::from_str(&normalized)
        .with_context(|| format!("invalid database url {}", normalized))?
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(options)
        .await
        .with_context(|| format!("failed to open article store {}", normalized))?;
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the parent
/// directory exists. Leaves in-memory URLs untouched. Returns possibly-updated URL.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = crate::config::expand_home(path_part);
    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn article_from_row(row: &SqliteRow) -> ArticleRow {
    ArticleRow {
        id: row.get("id"),
        slug: row.get("slug"),
        oldslug: row
            .try_get::<Option<String>, _>("oldslug")
            .ok()
            .flatten()
            .filter(|s| !s.trim().is_empty()),
        title: row.get("title"),
        excerpt: row.try_get::<Option<String>, _>("excerpt").ok().flatten(),
    }
}

#[instrument(skip_all)]
pub async fn find_article_by_id(pool: &Pool, id: i64) -> Result<Option<ArticleRow>> {
    let row = sqlx::query("SELECT id, slug, oldslug, title, excerpt FROM articles WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(article_from_row))
}

#[instrument(skip_all)]
pub async fn find_article_by_slug(pool: &Pool, slug: &str) -> Result<Option<ArticleRow>> {
    let row =
        sqlx::query("SELECT id, slug, oldslug, title, excerpt FROM articles WHERE slug = ?")
            .bind(slug)
            .fetch_optional(pool)
            .await?;
    Ok(row.as_ref().map(article_from_row))
}

/// Every row whose legacy slug equals `oldslug`. More than one row means the
/// legacy slug is ambiguous.
#[instrument(skip_all)]
pub async fn find_articles_by_oldslug(pool: &Pool, oldslug: &str) -> Result<Vec<ArticleRow>> {
    let rows = sqlx::query(
        "SELECT id, slug, oldslug, title, excerpt FROM articles WHERE oldslug = ? ORDER BY id",
    )
    .bind(oldslug)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(article_from_row).collect())
}

#[instrument(skip_all)]
pub async fn list_articles(pool: &Pool) -> Result<Vec<ArticleRow>> {
    let rows = sqlx::query("SELECT id, slug, oldslug, title, excerpt FROM articles ORDER BY id")
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(article_from_row).collect())
}

#[instrument(skip_all)]
pub async fn insert_article(
    pool: &Pool,
    slug: &str,
    oldslug: Option<&str>,
    title: &str,
    excerpt: Option<&str>,
) -> Result<i64> {
    let rec = sqlx::query(
        "INSERT INTO articles (slug, oldslug, title, excerpt) VALUES (?, ?, ?, ?) RETURNING id",
    )
    .bind(slug)
    .bind(oldslug)
    .bind(title)
    .bind(excerpt)
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to insert article {}", slug))?;
    Ok(rec.get("id"))
}

#[instrument(skip_all)]
pub async fn count_articles(pool: &Pool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM articles")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_pool() -> Pool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    #[test]
    fn prepare_url_passes_memory_through() {
        assert_eq!(prepare_sqlite_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(prepare_sqlite_url("postgres://x"), "postgres://x");
    }

    #[test]
    fn prepare_url_keeps_query() {
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("nested").join("a.db");
        let url = format!("sqlite://{}?mode=rwc", path.display());
        let out = prepare_sqlite_url(&url);
        assert_eq!(out, url);
        assert!(td.path().join("nested").exists());
    }

    #[tokio::test]
    async fn lookups_by_id_slug_and_oldslug() {
        let pool = setup_pool().await;
        let id = insert_article(&pool, "btc-100k", Some("bitcoin-hits-100k"), "BTC 100k", None)
            .await
            .unwrap();
        insert_article(&pool, "eth-merge", Some(""), "Merge", Some("pos"))
            .await
            .unwrap();

        let row = find_article_by_id(&pool, id).await.unwrap().unwrap();
        assert_eq!(row.slug, "btc-100k");
        assert_eq!(row.oldslug.as_deref(), Some("bitcoin-hits-100k"));

        let row = find_article_by_slug(&pool, "eth-merge").await.unwrap().unwrap();
        assert_eq!(row.oldslug, None);
        assert_eq!(row.excerpt.as_deref(), Some("pos"));

        let rows = find_articles_by_oldslug(&pool, "bitcoin-hits-100k").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, id);

        assert!(find_article_by_id(&pool, 999).await.unwrap().is_none());
        assert_eq!(list_articles(&pool).await.unwrap().len(), 2);
        assert_eq!(count_articles(&pool).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn duplicate_slug_is_rejected() {
        let pool = setup_pool().await;
        insert_article(&pool, "dup", None, "A", None).await.unwrap();
        assert!(insert_article(&pool, "dup", None, "B", None).await.is_err());
    }
}
