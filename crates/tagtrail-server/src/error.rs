use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tagtrail_store::StoreError;
use thiserror::Error;

/// Errors surfaced by the HTTP layer.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::Storage(_) => {
                tracing::error!(error = %self, "storage error while serving request");
                (StatusCode::INTERNAL_SERVER_ERROR, "Storage error".to_string())
            }
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Errors from one fetch batch.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The report network could not be reached or answered with garbage.
    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Upstream request timed out")]
    Timeout,

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Upstream(e.to_string())
        }
    }
}
