use std::sync::Arc;

use axum::{extract::State, http::Method, routing::get, Json, Router};
use serde::Serialize;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use tagtrail_store::Database;

use crate::error::ServerError;
use crate::fetcher::{FetcherState, FetcherStatus};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Database>>,
    /// `None` when no upstream is configured.
    pub fetcher: Option<Arc<FetcherState>>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/fetcher/status", get(fetcher_status))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    trackers: u64,
}

#[derive(Serialize)]
struct FetcherStatusResponse {
    enabled: bool,
    #[serde(flatten)]
    status: Option<FetcherStatus>,
}

async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>, ServerError> {
    let trackers = state.db.lock().await.count_trackers()?;
    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        trackers,
    }))
}

async fn fetcher_status(State(state): State<AppState>) -> Json<FetcherStatusResponse> {
    let status = match &state.fetcher {
        Some(fetcher) => Some(fetcher.status().await),
        None => None,
    };
    Json(FetcherStatusResponse {
        enabled: state.fetcher.is_some(),
        status,
    })
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn state(fetcher: Option<Arc<FetcherState>>) -> AppState {
        let db = Database::open_in_memory().unwrap();
        db.create_tracker("key-a").unwrap();
        AppState {
            db: Arc::new(Mutex::new(db)),
            fetcher,
        }
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = get_json(build_router(state(None)), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["trackers"], 1);
    }

    #[tokio::test]
    async fn test_fetcher_disabled() {
        let (status, body) = get_json(build_router(state(None)), "/fetcher/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["enabled"], false);
        assert!(body.get("running").is_none());
    }

    #[tokio::test]
    async fn test_fetcher_idle() {
        let app = build_router(state(Some(Arc::new(FetcherState::default()))));
        let (_, body) = get_json(app, "/fetcher/status").await;
        assert_eq!(body["enabled"], true);
        assert_eq!(body["running"], false);
        assert_eq!(body["skipped_ticks"], 0);
        assert!(body["last_summary"].is_null());
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let app = build_router(state(None));
        let response = app
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
