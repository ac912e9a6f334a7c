use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ContentApi;
use crate::db::ArticleRow;
use crate::lookup::ArticleLookup;
use crate::content_api::model::{ArticleResp, ArticlesResp};

pub mod model;

/// Read-only client for the site's content API.
#[derive(Clone)]
pub struct ContentApiClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl fmt::Debug for ContentApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentApiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl ContentApiClient {
    pub fn new(base_url: Url, token: String, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("news-stager/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .no_proxy()
            .build()
            .context("failed to build content api client")?;
        Ok(Self {
            http,
            base_url,
            token,
        })
    }

    pub fn from_config(cfg: &ContentApi) -> Result<Self> {
        let mut raw = cfg.base_url.trim().to_string();
        // Url::join replaces the last segment unless the base ends with '/'.
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let base_url = Url::parse(&raw)
            .with_context(|| format!("invalid content api base url {}", cfg.base_url))?;
        Self::new(
            base_url,
            cfg.token.clone(),
            Duration::from_secs(cfg.timeout_secs),
        )
    }

    pub fn build_get(&self, path: &str, query: &[(&str, &str)]) -> Result<reqwest::Request> {
        let endpoint = self
            .base_url
            .join(path)
            .context("invalid content api base URL")?;
        let mut builder = self
            .http
            .get(endpoint)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/json");
        if !query.is_empty() {
            builder = builder.query(query);
        }
        builder.build().context("failed to build content api request")
    }

    /// Execute a GET; a 404 maps to `None`, any other non-2xx is an error.
    async fn execute(&self, request: reqwest::Request) -> Result<Option<reqwest::Response>> {
        debug!(url = %request.url(), "sending content api request");
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach content api")?;

        let status = res.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            let body = res.text().await.unwrap_or_default();
            warn!("rate limited by content api: {}", body);
            return Err(anyhow!("received 429 from content api: {}", body));
        }
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("content api error {}: {}", status, body));
        }
        Ok(Some(res))
    }

    pub async fn fetch_article(&self, id: i64) -> Result<Option<ArticleRow>> {
        let request = self.build_get(&format!("api/articles/{}", id), &[])?;
        let Some(res) = self.execute(request).await? else {
            return Ok(None);
        };
        let payload: ArticleResp = res
            .json()
            .await
            .context("invalid content api article response")?;
        Ok(Some(payload.into_row()))
    }

    /// Rows whose `field` equals `value` exactly. The API may match loosely, so
    /// results are filtered again on our side.
    pub async fn search(&self, field: &str, value: &str) -> Result<Vec<ArticleRow>> {
        let request = self.build_get("api/articles", &[(field, value)])?;
        let Some(res) = self.execute(request).await? else {
            return Ok(Vec::new());
        };
        let payload: ArticlesResp = res
            .json()
            .await
            .context("invalid content api search response")?;
        Ok(payload
            .articles
            .into_iter()
            .filter(|row| match field {
                "oldslug" => row.oldslug.as_deref() == Some(value),
                _ => row.slug == value,
            })
            .collect())
    }

    pub async fn list_articles(&self) -> Result<Vec<ArticleRow>> {
        let request = self.build_get("api/articles", &[])?;
        let Some(res) = self.execute(request).await? else {
            return Err(anyhow!("content api has no article listing"));
        };
        let payload: ArticlesResp = res
            .json()
            .await
            .context("invalid content api listing response")?;
        Ok(payload.articles)
    }
}

#[async_trait]
impl ArticleLookup for ContentApiClient {
    async fn by_id(&self, id: i64) -> Result<Option<ArticleRow>> {
        self.fetch_article(id).await
    }

    async fn by_slug(&self, slug: &str) -> Result<Option<ArticleRow>> {
        Ok(self.search("slug", slug).await?.into_iter().next())
    }

    async fn by_old_slug(&self, slug: &str) -> Result<Vec<ArticleRow>> {
        self.search("oldslug", slug).await
    }

    async fn catalog(&self) -> Result<Vec<ArticleRow>> {
        self.list_articles().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> ContentApiClient {
        ContentApiClient::from_config(&ContentApi {
            base_url: base.into(),
            token: "secret".into(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn build_get_sets_headers_and_query() {
        let client = client("https://cms.example.com");
        let request = client
            .build_get("api/articles", &[("slug", "btc-etf")])
            .unwrap();
        assert_eq!(request.method(), reqwest::Method::GET);
        assert_eq!(request.url().path(), "/api/articles");
        assert_eq!(request.url().query(), Some("slug=btc-etf"));
        assert_eq!(
            request
                .headers()
                .get("Authorization")
                .and_then(|h| h.to_str().ok())
                .unwrap(),
            "Bearer secret"
        );
    }

    #[test]
    fn base_path_is_kept_when_joining() {
        let client = client("https://example.com/cms");
        let request = client.build_get("api/articles/7", &[]).unwrap();
        assert_eq!(request.url().path(), "/cms/api/articles/7");
        assert_eq!(request.url().query(), None);
    }

    #[test]
    fn debug_redacts_token() {
        let rendered = format!("{:?}", client("https://cms.example.com/"));
        assert!(!rendered.contains("secret"));
    }

    #[test]
    fn article_resp_accepts_wrapped_and_bare() {
        let wrapped: ArticleResp = serde_json::from_str(
            r#"{"article":{"id":1,"slug":"a","title":"A","oldSlug":"old-a"}}"#,
        )
        .unwrap();
        let row = wrapped.into_row();
        assert_eq!(row.oldslug.as_deref(), Some("old-a"));

        let bare: ArticleResp =
            serde_json::from_str(r#"{"id":2,"slug":"b","title":"B","summary":"s"}"#).unwrap();
        assert_eq!(bare.into_row().excerpt.as_deref(), Some("s"));
    }
}
