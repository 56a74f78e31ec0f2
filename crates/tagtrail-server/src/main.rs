//! # tagtrail-server
//!
//! Report collection server for tagtrail trackers.
//!
//! This binary provides:
//! - **Scheduled fetching** of location reports from the offline-finding
//!   report network, in bounded batches, for every tracker whose reports are
//!   stale
//! - **Deduplicated storage** of the raw (still encrypted) reports under
//!   content-addressed ids, so re-delivered reports are stored once
//! - **Status API** (axum) for health checks and fetcher progress
//!
//! The server never holds a tracker private key and never decrypts.

mod api;
mod config;
mod error;
mod fetcher;
mod upstream;

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tagtrail_store::Database;

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::fetcher::{FetchSettings, ReportFetcher, Scheduler};
use crate::upstream::HttpReportSource;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tagtrail_server=debug")),
        )
        .init();

    info!("Starting tagtrail server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Open the database (runs migrations)
    // -----------------------------------------------------------------------
    let db = Arc::new(Mutex::new(Database::open_at(&config.database_path)?));

    // -----------------------------------------------------------------------
    // 4. Spawn the fetch scheduler
    // -----------------------------------------------------------------------
    let fetcher_state = match &config.upstream_url {
        Some(url) => {
            let source = HttpReportSource::new(url.clone(), config.upstream_timeout)?;
            let settings = FetchSettings {
                stale_after: config.fetch_stale_after,
                max_trackers_per_query: config.max_trackers_per_query,
            };
            let scheduler = Arc::new(Scheduler::new(ReportFetcher::new(
                db.clone(),
                source,
                settings,
            )));
            let state = scheduler.state();
            scheduler.spawn(config.fetch_interval);
            info!(
                upstream = %url,
                interval_secs = config.fetch_interval.as_secs(),
                "Report fetcher running in background"
            );
            Some(state)
        }
        None => {
            warn!("UPSTREAM_URL is not set, report fetching disabled");
            None
        }
    };

    let app_state = AppState {
        db,
        fetcher: fetcher_state,
    };

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, config.http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
