//! Integration tests for the internal HTTP trigger.

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use http_body_util::BodyExt;
use score_service::http::{build_router, HttpServerState, TRIGGER_PATH};
use score_service::{EntityKind, InMemoryScoreStore, ScoreBatchConfig, ScoreBatchJob};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

const SECRET: &str = "trigger-secret";

fn seeded_store() -> Arc<InMemoryScoreStore> {
    let store = Arc::new(InMemoryScoreStore::new());
    for kind in EntityKind::ALL {
        let entity = store.insert_entity(kind, Utc::now());
        let pillar = store.insert_pillar(kind, 1.0);
        store.rate(kind, Uuid::new_v4(), entity, pillar, 7.5);
    }
    store
}

fn app(store: Arc<InMemoryScoreStore>, secret: Option<&str>, development: bool) -> Router {
    let config = ScoreBatchConfig {
        retry: resilience::RetryConfig {
            max_retries: 0,
            ..Default::default()
        },
        ..Default::default()
    };
    build_router(HttpServerState {
        job: Arc::new(ScoreBatchJob::new(store, config)),
        trigger_secret: secret.map(str::to_string),
        allow_unauthenticated: development,
    })
}

fn trigger(auth: Option<(&str, String)>) -> Request<Body> {
    let mut builder = Request::builder().method(Method::POST).uri(TRIGGER_PATH);
    if let Some((name, value)) = auth {
        builder = builder.header(name, value);
    }
    builder.body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_check_needs_no_secret() {
    let response = app(seeded_store(), Some(SECRET), false)
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn trigger_without_secret_is_unauthorized() {
    let store = seeded_store();
    let response = app(store.clone(), Some(SECRET), false)
        .oneshot(trigger(None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(store.call_count(), 0);
}

#[tokio::test]
async fn trigger_with_wrong_secret_is_unauthorized() {
    let response = app(seeded_store(), Some(SECRET), true)
        .oneshot(trigger(Some(("x-internal-api-key", "nope".to_string()))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn trigger_with_api_key_runs_batch() {
    let response = app(seeded_store(), Some(SECRET), false)
        .oneshot(trigger(Some(("x-internal-api-key", SECRET.to_string()))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert!(json["totalDurationMs"].is_u64());
    assert!(json["startedAt"].is_string());
    for kind in ["series", "characters", "seasons", "episodes"] {
        assert_eq!(json["perType"][kind]["success"], true, "{kind}");
        assert_eq!(json["perType"][kind]["updatedCount"], 1, "{kind}");
        assert_eq!(json["perType"][kind]["rankedCount"], 1, "{kind}");
    }
}

#[tokio::test]
async fn trigger_with_bearer_token_runs_batch() {
    let response = app(seeded_store(), Some(SECRET), false)
        .oneshot(trigger(Some((
            header::AUTHORIZATION.as_str(),
            format!("Bearer {SECRET}"),
        ))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn development_allows_unauthenticated_trigger() {
    let response = app(seeded_store(), None, true)
        .oneshot(trigger(None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn missing_secret_outside_development_is_refused() {
    let store = seeded_store();
    let response = app(store.clone(), None, false)
        .oneshot(trigger(None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"trigger secret not configured");
    assert_eq!(store.call_count(), 0);
}

#[tokio::test]
async fn partial_failure_reports_multi_status() {
    let store = seeded_store();
    store.make_kind_unavailable(EntityKind::Season);

    let response = app(store, Some(SECRET), false)
        .oneshot(trigger(Some(("x-internal-api-key", SECRET.to_string()))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::MULTI_STATUS);

    let json = body_json(response).await;
    assert_eq!(json["success"], false);
    assert_eq!(json["perType"]["seasons"]["success"], false);
    assert!(json["perType"]["seasons"]["error"]
        .as_str()
        .unwrap()
        .contains("08001"));
    assert_eq!(json["perType"]["series"]["success"], true);
    assert!(json["perType"]["series"].get("error").is_none());
}

#[tokio::test]
async fn total_failure_reports_server_error() {
    let store = seeded_store();
    for kind in EntityKind::ALL {
        store.make_kind_unavailable(kind);
    }

    let response = app(store, Some(SECRET), false)
        .oneshot(trigger(Some(("x-internal-api-key", SECRET.to_string()))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response).await;
    assert_eq!(json["success"], false);
}
