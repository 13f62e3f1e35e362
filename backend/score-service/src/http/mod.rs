/// Internal HTTP API for triggering the score batch
///
/// Security: the trigger endpoint requires the shared trigger secret via the
/// `X-Internal-API-Key` header or an `Authorization: Bearer` token. Health
/// checks are unauthenticated.
use crate::jobs::ScoreBatchJob;
use crate::models::BatchOutcome;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

pub const TRIGGER_PATH: &str = "/internal/score-batch";

/// Shared HTTP server state
#[derive(Clone)]
pub struct HttpServerState {
    pub job: Arc<ScoreBatchJob>,
    pub trigger_secret: Option<String>,
    /// Accept triggers without a secret when none is configured (development)
    pub allow_unauthenticated: bool,
}

/// Build the HTTP router with health and trigger endpoints
pub fn build_router(state: HttpServerState) -> Router {
    let state = Arc::new(state);

    Router::new()
        .route("/health", get(health_check))
        .route(TRIGGER_PATH, post(run_batch))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth_middleware,
        ))
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Runs one batch; the body is always the batch result
async fn run_batch(State(state): State<Arc<HttpServerState>>) -> Response {
    info!("Score batch triggered over HTTP");
    let result = state.job.run().await;

    let status = match result.outcome() {
        BatchOutcome::Succeeded => StatusCode::OK,
        BatchOutcome::Degraded => StatusCode::MULTI_STATUS,
        BatchOutcome::Failed => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(result)).into_response()
}

/// Validates the trigger secret for everything except the health check
async fn auth_middleware(
    State(state): State<Arc<HttpServerState>>,
    request: Request,
    next: Next,
) -> Response {
    if request.uri().path() == "/health" {
        return next.run(request).await;
    }

    let Some(expected) = state.trigger_secret.as_deref() else {
        if state.allow_unauthenticated {
            warn!("Trigger secret not configured - allowing unauthenticated request");
            return next.run(request).await;
        }
        warn!("Trigger secret not configured - blocking trigger requests");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "trigger secret not configured",
        )
            .into_response();
    };

    if provided_secret(request.headers()) != Some(expected) {
        warn!(
            path = %request.uri().path(),
            "Unauthorized trigger request - invalid secret"
        );
        return (StatusCode::UNAUTHORIZED, "invalid trigger secret").into_response();
    }

    next.run(request).await
}

fn provided_secret(headers: &HeaderMap) -> Option<&str> {
    if let Some(key) = headers
        .get("x-internal-api-key")
        .and_then(|v| v.to_str().ok())
    {
        return Some(key);
    }
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Start HTTP server for internal APIs, serving until `shutdown` resolves
pub async fn start_http_server<F>(
    state: HttpServerState,
    host: &str,
    port: u16,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(state);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Starting internal HTTP API server on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

    info!("HTTP server stopped accepting connections");
    Ok(())
}

/// Resolves on SIGINT (Ctrl-C) or, on Unix, SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT, starting graceful shutdown"),
        () = terminate => info!("Received SIGTERM, starting graceful shutdown"),
    }
}
