//! Periodic report fetch.
//!
//! [`ReportFetcher::run_once`] selects trackers whose reports are stale, asks
//! the report network for them in bounded batches and stores every report
//! under a content-addressed id. [`Scheduler`] drives it on an interval and
//! never lets two runs overlap.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use tagtrail_shared::report_id::report_id_from_base64;
use tagtrail_store::{Database, Report};

use crate::error::FetchError;
use crate::upstream::{ReportSource, UpstreamReport};

/// Selection and batching parameters for one run.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub stale_after: Duration,
    pub max_trackers_per_query: usize,
}

/// Outcome of one run.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FetchSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Trackers whose batch was answered by the network.
    pub trackers_checked: u64,
    /// Trackers for which at least one previously unseen report was stored.
    pub trackers_with_new_reports: u64,
    pub reports_seen: u64,
    pub reports_inserted: u64,
    pub failed_batches: u64,
    /// Reports that could not be stored (undecodable payload or store error).
    pub failed_upserts: u64,
    /// Answered batches whose `last_fetch_time` could not be recorded.
    pub failed_stamps: u64,
}

impl FetchSummary {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            finished_at: started_at,
            trackers_checked: 0,
            trackers_with_new_reports: 0,
            reports_seen: 0,
            reports_inserted: 0,
            failed_batches: 0,
            failed_upserts: 0,
            failed_stamps: 0,
        }
    }
}

pub struct ReportFetcher<S> {
    db: Arc<Mutex<Database>>,
    source: S,
    settings: FetchSettings,
}

impl<S: ReportSource> ReportFetcher<S> {
    pub fn new(db: Arc<Mutex<Database>>, source: S, settings: FetchSettings) -> Self {
        Self {
            db,
            source,
            settings,
        }
    }

    #[cfg(test)]
    pub fn source(&self) -> &S {
        &self.source
    }

    pub async fn run_once(&self) -> Result<FetchSummary, FetchError> {
        self.run_once_at(Utc::now()).await
    }

    /// One full pass with `now` as both the staleness reference and the new
    /// `last_fetch_time`.
    ///
    /// Only the initial tracker selection can fail the run. Upstream errors
    /// fail their batch; store errors fail a single report.
    pub async fn run_once_at(&self, now: DateTime<Utc>) -> Result<FetchSummary, FetchError> {
        let mut summary = FetchSummary::new(now);

        let stale_after = chrono::Duration::from_std(self.settings.stale_after)
            .unwrap_or_else(|_| chrono::Duration::days(365));
        let cutoff = now - stale_after;
        let keys: Vec<String> = {
            let db = self.db.lock().await;
            db.find_trackers_fetched_before(cutoff)?
                .into_iter()
                .map(|t| t.advertisement_key)
                .collect()
        };

        if keys.is_empty() {
            debug!("no trackers due for a fetch");
            summary.finished_at = Utc::now();
            return Ok(summary);
        }

        let batch_size = self.settings.max_trackers_per_query.max(1);
        info!(trackers = keys.len(), batch_size, "fetching reports");

        for (index, batch) in keys.chunks(batch_size).enumerate() {
            let mut grouped = match self.source.fetch_reports(batch).await {
                Ok(grouped) => grouped,
                Err(e) => {
                    warn!(batch = index, trackers = batch.len(), error = %e, "report batch failed");
                    summary.failed_batches += 1;
                    continue;
                }
            };

            let db = self.db.lock().await;
            for key in batch {
                let reports = grouped.remove(key).unwrap_or_default();
                summary.trackers_checked += 1;
                summary.reports_seen += reports.len() as u64;

                let inserted = store_reports(&db, key, &reports, &mut summary);
                if inserted > 0 {
                    summary.trackers_with_new_reports += 1;
                }
                debug!(tracker = %key, seen = reports.len(), inserted, "tracker processed");
            }

            if let Err(e) = db.update_last_fetch_time(batch, now) {
                error!(batch = index, error = %e, "failed to record fetch time");
                summary.failed_stamps += 1;
            }
        }

        summary.finished_at = Utc::now();
        info!(
            checked = summary.trackers_checked,
            with_new = summary.trackers_with_new_reports,
            seen = summary.reports_seen,
            inserted = summary.reports_inserted,
            failed_batches = summary.failed_batches,
            failed_upserts = summary.failed_upserts,
            failed_stamps = summary.failed_stamps,
            "fetch complete"
        );
        Ok(summary)
    }
}

/// Upsert every report of one tracker. Returns how many were new.
fn store_reports(
    db: &Database,
    key: &str,
    reports: &[UpstreamReport],
    summary: &mut FetchSummary,
) -> u64 {
    let mut inserted = 0;
    for upstream in reports {
        let id = match report_id_from_base64(&upstream.payload) {
            Ok(id) => id,
            Err(e) => {
                warn!(tracker = %key, error = %e, "undecodable report payload skipped");
                summary.failed_upserts += 1;
                continue;
            }
        };

        let report = Report {
            id,
            advertisement_key: key.to_string(),
            time: upstream.published,
            payload: upstream.payload.clone(),
        };
        match db.upsert_report(&report) {
            Ok(true) => {
                debug!(
                    tracker = %key,
                    report = %id,
                    description = upstream.description.as_deref().unwrap_or_default(),
                    "new report stored"
                );
                inserted += 1;
            }
            Ok(false) => {}
            Err(e) => {
                error!(tracker = %key, report = %id, error = %e, "failed to store report");
                summary.failed_upserts += 1;
            }
        }
    }
    summary.reports_inserted += inserted;
    inserted
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Run state shared with the status API.
#[derive(Default)]
pub struct FetcherState {
    running: AtomicBool,
    skipped_ticks: AtomicU64,
    last_summary: RwLock<Option<FetchSummary>>,
    last_error: RwLock<Option<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetcherStatus {
    pub running: bool,
    pub skipped_ticks: u64,
    pub last_summary: Option<FetchSummary>,
    pub last_error: Option<String>,
}

impl FetcherState {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub async fn status(&self) -> FetcherStatus {
        FetcherStatus {
            running: self.is_running(),
            skipped_ticks: self.skipped_ticks.load(Ordering::Relaxed),
            last_summary: self.last_summary.read().await.clone(),
            last_error: self.last_error.read().await.clone(),
        }
    }
}

/// Clears the running flag when a run ends, including by panic.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Scheduler<S> {
    fetcher: ReportFetcher<S>,
    state: Arc<FetcherState>,
}

impl<S: ReportSource> Scheduler<S> {
    pub fn new(fetcher: ReportFetcher<S>) -> Self {
        Self {
            fetcher,
            state: Arc::new(FetcherState::default()),
        }
    }

    pub fn state(&self) -> Arc<FetcherState> {
        self.state.clone()
    }

    #[cfg(test)]
    pub fn fetcher(&self) -> &ReportFetcher<S> {
        &self.fetcher
    }

    /// Run the fetcher unless a run is already in progress, in which case the
    /// tick is skipped and `None` is returned.
    pub async fn tick(&self) -> Option<Result<FetchSummary, String>> {
        if self
            .state
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.state.skipped_ticks.fetch_add(1, Ordering::Relaxed);
            info!("previous fetch still running, skipping tick");
            return None;
        }
        let _guard = RunGuard(&self.state.running);

        match self.fetcher.run_once().await {
            Ok(summary) => {
                *self.state.last_summary.write().await = Some(summary.clone());
                *self.state.last_error.write().await = None;
                Some(Ok(summary))
            }
            Err(e) => {
                error!(error = %e, "fetch run failed");
                let message = e.to_string();
                *self.state.last_error.write().await = Some(message.clone());
                Some(Err(message))
            }
        }
    }

    /// Tick every `period`, starting immediately. Each tick runs in its own
    /// task so a slow run shows up as skipped ticks instead of a late timer.
    pub fn spawn(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let scheduler = self.clone();
                tokio::spawn(async move {
                    scheduler.tick().await;
                });
            }
        })
    }
}
