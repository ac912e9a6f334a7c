use axum::extract::{Path, Query};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use reqwest::Url;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;

use news_stager::config::Reconcile;
use news_stager::content_api::ContentApiClient;
use news_stager::lookup::ArticleLookup;
use news_stager::model::SelectionItem;
use news_stager::reconcile::{Reconciler, Strategy};

const TOKEN: &str = "test-token";

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map_or(false, |v| v == format!("Bearer {}", TOKEN))
}

async fn article(Path(id): Path<i64>, headers: HeaderMap) -> impl IntoResponse {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({}))).into_response();
    }
    match id {
        11 => Json(json!({
            "article": { "id": 11, "slug": "port-expansion-approved", "title": "Port expansion approved" }
        }))
        .into_response(),
        12 => Json(json!({
            "id": 12, "slug": "tram-line-delayed", "oldSlug": "tram-delay", "title": "Tram line delayed",
            "summary": "Opening pushed to next year."
        }))
        .into_response(),
        500 => (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response(),
        _ => (StatusCode::NOT_FOUND, "").into_response(),
    }
}

async fn articles(Query(query): Query<HashMap<String, String>>, headers: HeaderMap) -> impl IntoResponse {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({}))).into_response();
    }
    let all = vec![
        json!({ "id": 11, "slug": "port-expansion-approved", "title": "Port expansion approved" }),
        json!({ "id": 12, "slug": "tram-line-delayed", "oldslug": "tram-delay", "title": "Tram line delayed" }),
        // Loose server-side matching: also returned for the "tram-line" prefix.
        json!({ "id": 13, "slug": "tram-line-delayed-again", "title": "Tram line delayed again" }),
    ];
    let matched: Vec<_> = all
        .into_iter()
        .filter(|row| match (query.get("slug"), query.get("oldslug")) {
            (Some(slug), _) => row["slug"].as_str().unwrap().starts_with(slug.as_str()),
            (_, Some(old)) => row["oldslug"].as_str().map_or(false, |o| o.starts_with(old.as_str())),
            _ => true,
        })
        .collect();
    Json(json!({ "articles": matched })).into_response()
}

async fn spawn_fake_api() -> Url {
    let app = Router::new()
        .route("/cms/api/articles", get(articles))
        .route("/cms/api/articles/:id", get(article));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Url::parse(&format!("http://{}/cms/", addr)).unwrap()
}

async fn client() -> ContentApiClient {
    let base = spawn_fake_api().await;
    ContentApiClient::new(base, TOKEN.into(), Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn fetch_accepts_wrapped_and_bare_rows() {
    let api = client().await;

    let wrapped = api.by_id(11).await.unwrap().unwrap();
    assert_eq!(wrapped.slug, "port-expansion-approved");

    let bare = api.by_id(12).await.unwrap().unwrap();
    assert_eq!(bare.oldslug.as_deref(), Some("tram-delay"));
    assert_eq!(bare.excerpt.as_deref(), Some("Opening pushed to next year."));
}

#[tokio::test]
async fn missing_article_is_none_and_server_error_propagates() {
    let api = client().await;
    assert!(api.by_id(404).await.unwrap().is_none());

    let err = api.by_id(500).await.unwrap_err();
    assert!(format!("{:#}", err).contains("500"));
}

#[tokio::test]
async fn slug_search_filters_loose_matches() {
    let api = client().await;

    let row = api.by_slug("tram-line-delayed").await.unwrap().unwrap();
    assert_eq!(row.id, 12);
    assert!(api.by_slug("tram-line").await.unwrap().is_none());

    let rows = api.by_old_slug("tram-delay").await.unwrap();
    assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![12]);
    assert_eq!(api.catalog().await.unwrap().len(), 3);
}

#[tokio::test]
async fn reconciles_against_remote_store() {
    let api = client().await;
    let mut items = vec![
        SelectionItem::new("tram-delay", ""),
        SelectionItem::new("Port-Expansion-Approved", ""),
    ];

    let mut reconciler = Reconciler::new(&api, Reconcile::default());
    let report = reconciler.reconcile(&mut items).await;

    assert!(report.is_complete());
    assert_eq!(report.resolved[0].strategy, Strategy::ExactSlug);
    assert_eq!(report.resolved[1].strategy, Strategy::NormalizedSlug);
    assert_eq!(items[0].id, Some(12));
    assert_eq!(items[1].slug, "port-expansion-approved");
}

#[tokio::test]
async fn wrong_token_is_an_error() {
    let base = spawn_fake_api().await;
    let api = ContentApiClient::new(base, "nope".into(), Duration::from_secs(5)).unwrap();
    assert!(api.by_id(11).await.is_err());
}
