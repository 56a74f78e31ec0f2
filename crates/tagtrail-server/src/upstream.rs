//! Client for the report network.
//!
//! The network is queried with a batch of advertisement keys and answers with
//! every report it currently holds for them. Reports are re-delivered until
//! they age out upstream, so callers must deduplicate.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

/// One report as delivered by the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamReport {
    pub payload: String,
    pub published: DateTime<Utc>,
    pub description: Option<String>,
}

/// Reports grouped by advertisement key. Every requested key is present.
pub type ReportsByKey = HashMap<String, Vec<UpstreamReport>>;

/// Anything that can answer a batch query. Implemented over HTTP for
/// production and by in-memory fakes in tests.
pub trait ReportSource: Send + Sync + 'static {
    fn fetch_reports(
        &self,
        advertisement_keys: &[String],
    ) -> impl Future<Output = Result<ReportsByKey, FetchError>> + Send;
}

#[derive(Serialize)]
struct ReportsRequest<'a> {
    ids: &'a [String],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawReport {
    id: String,
    payload: String,
    /// Milliseconds since the Unix epoch.
    date_published: i64,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawReportsResponse {
    #[serde(default)]
    results: Vec<RawReport>,
}

/// HTTP implementation: `POST <url>` with `{"ids": [...]}`.
pub struct HttpReportSource {
    client: reqwest::Client,
    url: String,
}

impl HttpReportSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tagtrail-server/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl ReportSource for HttpReportSource {
    async fn fetch_reports(
        &self,
        advertisement_keys: &[String],
    ) -> Result<ReportsByKey, FetchError> {
        let response = self
            .client
            .post(&self.url)
            .json(&ReportsRequest {
                ids: advertisement_keys,
            })
            .send()
            .await?
            .error_for_status()?;

        let body: RawReportsResponse = response.json().await?;
        Ok(group_reports(advertisement_keys, body))
    }
}

/// Group raw results by id. Requested keys without results map to an empty
/// list; results for keys that were not requested are dropped.
pub(crate) fn group_reports(requested: &[String], body: RawReportsResponse) -> ReportsByKey {
    let mut grouped: ReportsByKey = requested
        .iter()
        .map(|key| (key.clone(), Vec::new()))
        .collect();

    for raw in body.results {
        let Some(published) = DateTime::<Utc>::from_timestamp_millis(raw.date_published) else {
            tracing::warn!(
                id = %raw.id,
                date_published = raw.date_published,
                "report with out-of-range timestamp dropped"
            );
            continue;
        };
        match grouped.get_mut(&raw.id) {
            Some(list) => list.push(UpstreamReport {
                payload: raw.payload,
                published,
                description: raw.description,
            }),
            None => tracing::warn!(id = %raw.id, "report for unrequested key ignored"),
        }
    }

    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> RawReportsResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_group_fills_every_requested_key() {
        let body = parse(
            r#"{
                "results": [
                    {"datePublished": 1700000000000, "payload": "AAAA", "description": "found", "id": "k1", "statusCode": 0},
                    {"datePublished": 1700000001000, "payload": "BBBB", "description": "found", "id": "k1", "statusCode": 0}
                ],
                "statusCode": "200"
            }"#,
        );
        let requested = vec!["k1".to_string(), "k2".to_string()];
        let grouped = group_reports(&requested, body);

        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped["k1"].len(), 2);
        assert!(grouped["k2"].is_empty());
        assert_eq!(grouped["k1"][0].published.timestamp(), 1_700_000_000);
        assert_eq!(grouped["k1"][1].payload, "BBBB");
    }

    #[test]
    fn test_unrequested_key_is_ignored() {
        let body = parse(
            r#"{"results": [{"datePublished": 0, "payload": "AAAA", "id": "other"}], "statusCode": "200"}"#,
        );
        let grouped = group_reports(&["k1".to_string()], body);
        assert_eq!(grouped.len(), 1);
        assert!(grouped["k1"].is_empty());
    }

    #[test]
    fn test_missing_results_field() {
        let grouped = group_reports(&["k1".to_string()], parse(r#"{"statusCode": "200"}"#));
        assert!(grouped["k1"].is_empty());
    }

    #[test]
    fn test_request_body_shape() {
        let ids = vec!["a".to_string(), "b".to_string()];
        let json = serde_json::to_value(ReportsRequest { ids: &ids }).unwrap();
        assert_eq!(json, serde_json::json!({"ids": ["a", "b"]}));
    }

    /// Serve a fake report network on an ephemeral local port.
    async fn spawn_network() -> std::net::SocketAddr {
        use axum::http::StatusCode;
        use axum::routing::post;
        use axum::{Json, Router};
        use serde_json::{json, Value};

        let app = Router::new()
            .route("/fail", post(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
            .route(
                "/slow",
                post(|| async {
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    Json(json!({"results": []}))
                }),
            )
            .route(
                "/reports",
                post(|Json(request): Json<Value>| async move {
                    assert_eq!(request, json!({"ids": ["k1", "k2"]}));
                    Json(json!({
                        "results": [
                            {"datePublished": 1700000000000u64, "payload": "AAAA", "description": "found", "id": "k1"}
                        ],
                        "statusCode": "200"
                    }))
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn keys() -> Vec<String> {
        vec!["k1".to_string(), "k2".to_string()]
    }

    #[tokio::test]
    async fn test_http_source_groups_response() {
        let addr = spawn_network().await;
        let source =
            HttpReportSource::new(format!("http://{addr}/reports"), Duration::from_secs(5)).unwrap();

        let grouped = source.fetch_reports(&keys()).await.unwrap();
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped["k1"].len(), 1);
        assert_eq!(grouped["k1"][0].payload, "AAAA");
        assert_eq!(grouped["k1"][0].description.as_deref(), Some("found"));
        assert!(grouped["k2"].is_empty());
    }

    #[tokio::test]
    async fn test_http_error_status_is_upstream_error() {
        let addr = spawn_network().await;
        let source =
            HttpReportSource::new(format!("http://{addr}/fail"), Duration::from_secs(5)).unwrap();

        let err = source.fetch_reports(&keys()).await.unwrap_err();
        assert!(matches!(err, FetchError::Upstream(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_http_slow_answer_is_timeout() {
        let addr = spawn_network().await;
        let source =
            HttpReportSource::new(format!("http://{addr}/slow"), Duration::from_millis(200))
                .unwrap();

        let err = source.fetch_reports(&keys()).await.unwrap_err();
        assert!(matches!(err, FetchError::Timeout), "{err:?}");
    }
}
