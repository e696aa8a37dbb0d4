//! Collection scheduler: periodic, isolated per-source fetching.
//!
//! A supervisor loop wakes once a minute, loads enabled sources, and spawns
//! a fetch task for each source that is due. Fetch tasks are capped by a
//! global semaphore and a per-source in-progress guard; one source failing
//! never affects another.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rand::Rng;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use freightwire_common::error::Result;
use freightwire_common::{FetchLog, FetchStatus, HealthStatus, Source};

use crate::adapters::AdapterPlane;
use crate::ingest::{IngestOutcome, Ingestor};
use crate::store::Store;

/// Supervisor wake cadence.
const TICK_INTERVAL: Duration = Duration::from_secs(60);

/// Hard deadline for a single adapter fetch.
const ADAPTER_DEADLINE: Duration = Duration::from_secs(60);

/// Cadence of the enrichment backstop scan.
const BACKSTOP_INTERVAL: Duration = Duration::from_secs(600);

/// Batch size for the backstop scan.
const BACKSTOP_BATCH: i64 = 50;

/// Health evaluation window.
const HEALTH_WINDOW_HOURS: i64 = 24;

pub struct Scheduler {
    store: Store,
    plane: Arc<AdapterPlane>,
    ingestor: Arc<Ingestor>,
    enrich_tx: mpsc::Sender<Uuid>,
    fetch_permits: Arc<Semaphore>,
    in_progress: Arc<Mutex<HashSet<String>>>,
}

impl Scheduler {
    pub fn new(
        store: Store,
        plane: Arc<AdapterPlane>,
        ingestor: Arc<Ingestor>,
        enrich_tx: mpsc::Sender<Uuid>,
        fetch_concurrency: usize,
    ) -> Self {
        Self {
            store,
            plane,
            ingestor,
            enrich_tx,
            fetch_permits: Arc::new(Semaphore::new(fetch_concurrency)),
            in_progress: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Run the supervisor loop until shutdown flips. Spawned fetch tasks
    /// drain naturally; callers wait on the returned handle during the
    /// shutdown grace period.
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("collection scheduler started");
            let mut tick = tokio::time::interval(TICK_INTERVAL);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = tick.tick() => {}
                    _ = shutdown.changed() => {
                        info!("collection scheduler stopping");
                        return;
                    }
                }

                let sources = match self.store.list_enabled_sources().await {
                    Ok(sources) => sources,
                    Err(e) => {
                        error!(error = %e, "failed to load sources, skipping tick");
                        continue;
                    }
                };

                let now = Utc::now();
                for source in sources {
                    if !is_due(&source, now) {
                        continue;
                    }
                    let scheduler = Arc::clone(&self);
                    tokio::spawn(async move {
                        scheduler.fetch_source(source).await;
                    });
                }
            }
        })
    }

    /// Backstop: periodically re-enqueue pending articles in case an
    /// enrichment signal was lost.
    pub fn spawn_backstop(
        store: Store,
        enrich_tx: mpsc::Sender<Uuid>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(BACKSTOP_INTERVAL);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = tick.tick() => {}
                    _ = shutdown.changed() => return,
                }

                match store.pending_article_ids(BACKSTOP_BATCH).await {
                    Ok(ids) if !ids.is_empty() => {
                        info!(count = ids.len(), "backstop re-enqueueing pending articles");
                        for id in ids {
                            if enrich_tx.send(id).await.is_err() {
                                return;
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "backstop scan failed"),
                }
            }
        })
    }

    /// One scheduled fetch of one source: lock, log, fetch with deadline,
    /// ingest in feed order, log completion, update health, hand new ids to
    /// enrichment.
    async fn fetch_source(&self, source: Source) {
        // Per-source non-reentrant lock: skip and log when a previous tick is
        // still running.
        {
            let mut guard = self.in_progress.lock().expect("in-progress lock poisoned");
            if !guard.insert(source.source_id.clone()) {
                info!(source_id = %source.source_id, "fetch still in progress, skipping tick");
                return;
            }
        }

        let _permit = match self.fetch_permits.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                self.release(&source.source_id);
                return;
            }
        };

        if let Err(e) = self.fetch_source_inner(&source).await {
            error!(source_id = %source.source_id, error = %e, "fetch tick failed");
        }

        self.release(&source.source_id);
    }

    fn release(&self, source_id: &str) {
        self.in_progress
            .lock()
            .expect("in-progress lock poisoned")
            .remove(source_id);
    }

    /// Wait for in-flight fetches to finish. Callers bound this with the
    /// shutdown drain budget.
    pub async fn drain(&self) {
        loop {
            let remaining = self
                .in_progress
                .lock()
                .expect("in-progress lock poisoned")
                .len();
            if remaining == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    async fn fetch_source_inner(&self, source: &Source) -> Result<()> {
        let started_at = Utc::now();
        let start = Instant::now();
        let log_id = self
            .store
            .insert_fetch_started(&source.source_id, started_at)
            .await?;

        let mut articles_found = 0i32;
        let mut articles_new = 0i32;
        let mut articles_dedup = 0i32;
        let mut new_article_ids: Vec<Uuid> = Vec::new();
        let mut status = FetchStatus::Success;
        let mut error_message: Option<String> = None;

        let fetched = tokio::time::timeout(ADAPTER_DEADLINE, self.plane.fetch(source)).await;

        match fetched {
            Ok(Ok(outcome)) => {
                articles_found = outcome.articles.len() as i32;
                if !outcome.errors.is_empty() {
                    status = FetchStatus::Partial;
                    error_message = Some(truncate(&outcome.errors.join("; "), 1000));
                }

                // Per-article dedup/insert happens in feed order.
                for raw in outcome.articles {
                    match self.ingestor.ingest(source, raw).await {
                        Ok(IngestOutcome::Inserted(id)) => {
                            articles_new += 1;
                            new_article_ids.push(id);
                        }
                        Ok(IngestOutcome::Duplicate(_)) => articles_dedup += 1,
                        Ok(IngestOutcome::Skipped(reason)) => {
                            warn!(source_id = %source.source_id, reason, "article skipped");
                        }
                        Err(e) => {
                            // Store failure is fatal for this tick only.
                            status = FetchStatus::Failed;
                            error_message = Some(truncate(&e.to_string(), 1000));
                            break;
                        }
                    }
                }
            }
            Ok(Err(e)) => {
                status = FetchStatus::Failed;
                error_message = Some(truncate(&e.to_string(), 1000));
            }
            Err(_) => {
                status = FetchStatus::Failed;
                error_message = Some(format!(
                    "adapter deadline exceeded ({}s)",
                    ADAPTER_DEADLINE.as_secs()
                ));
            }
        }

        let duration_ms = start.elapsed().as_millis() as i32;
        self.store
            .complete_fetch_log(
                log_id,
                status,
                articles_found,
                articles_new,
                articles_dedup,
                error_message.as_deref(),
                duration_ms,
            )
            .await?;

        // Re-evaluate health over the 24 h window and stamp the fetch time.
        let window_start = Utc::now() - chrono::Duration::hours(HEALTH_WINDOW_HOURS);
        let logs = self
            .store
            .fetch_logs_since(&source.source_id, window_start)
            .await?;
        let health = evaluate_health(&logs, source.fetch_interval_minutes, Utc::now());
        self.store
            .update_source_after_fetch(&source.source_id, started_at, health)
            .await?;

        info!(
            source_id = %source.source_id,
            found = articles_found,
            new = articles_new,
            dedup = articles_dedup,
            status = ?status,
            duration_ms,
            "fetch complete"
        );

        // Trigger enrichment immediately; the backstop catches any misses.
        for id in new_article_ids {
            if self.enrich_tx.send(id).await.is_err() {
                warn!("enrichment queue closed, relying on backstop");
                break;
            }
        }

        Ok(())
    }
}

/// Whether a source is due this tick: never fetched, or past its interval
/// with ±10% jitter so aligned sources spread out.
fn is_due(source: &Source, now: DateTime<Utc>) -> bool {
    let last = match source.last_fetched_at {
        Some(t) => t,
        None => return true,
    };

    let jitter = rand::rng().random_range(0.9..1.1);
    let interval_secs = (source.fetch_interval_minutes as f64 * 60.0 * jitter) as i64;
    (now - last).num_seconds() >= interval_secs
}

/// Health over the 24 h fetch-log window:
/// success rate ≥ 80% → healthy; 50–80% → degraded; below 50%, or no
/// successful fetch within 3× the interval, → failing. A visibility signal
/// only; failing sources keep their schedule.
pub fn evaluate_health(
    logs: &[FetchLog],
    fetch_interval_minutes: i32,
    now: DateTime<Utc>,
) -> HealthStatus {
    if logs.is_empty() {
        return HealthStatus::Healthy;
    }

    let last_success = logs
        .iter()
        .filter(|l| l.status == FetchStatus::Success)
        .map(|l| l.started_at)
        .max();

    let stale_cutoff = chrono::Duration::minutes(3 * fetch_interval_minutes as i64);
    let stale = match last_success {
        Some(t) => now - t > stale_cutoff,
        None => true,
    };
    if stale {
        return HealthStatus::Failing;
    }

    let successes = logs
        .iter()
        .filter(|l| l.status == FetchStatus::Success)
        .count();
    let rate = successes as f64 / logs.len() as f64;

    if rate >= 0.8 {
        HealthStatus::Healthy
    } else if rate >= 0.5 {
        HealthStatus::Degraded
    } else {
        HealthStatus::Failing
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::types::Json;

    fn log(minutes_ago: i64, status: FetchStatus) -> FetchLog {
        let started = Utc::now() - chrono::Duration::minutes(minutes_ago);
        FetchLog {
            id: 0,
            source_id: "s".to_string(),
            started_at: started,
            completed_at: Some(started),
            status,
            articles_found: 0,
            articles_new: 0,
            articles_dedup: 0,
            error_message: None,
            duration_ms: Some(100),
        }
    }

    fn source(last_fetched_minutes_ago: Option<i64>, interval: i32) -> Source {
        Source {
            source_id: "s".to_string(),
            name: "S".to_string(),
            kind: freightwire_common::SourceKind::Feed,
            url: "https://example.com/feed".to_string(),
            language: None,
            fetch_interval_minutes: interval,
            priority: 5,
            enabled: true,
            parser_config: Json(Default::default()),
            last_fetched_at: last_fetched_minutes_ago
                .map(|m| Utc::now() - chrono::Duration::minutes(m)),
            health_status: HealthStatus::Healthy,
            notes: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn never_fetched_is_due() {
        assert!(is_due(&source(None, 30), Utc::now()));
    }

    #[test]
    fn recently_fetched_not_due() {
        assert!(!is_due(&source(Some(5), 30), Utc::now()));
    }

    #[test]
    fn long_overdue_is_due() {
        // 2× the interval clears the +10% jitter band deterministically.
        assert!(is_due(&source(Some(60), 30), Utc::now()));
    }

    #[test]
    fn all_success_is_healthy() {
        let logs = vec![log(10, FetchStatus::Success), log(40, FetchStatus::Success)];
        assert_eq!(evaluate_health(&logs, 30, Utc::now()), HealthStatus::Healthy);
    }

    #[test]
    fn seventy_percent_is_degraded() {
        let logs = vec![
            log(10, FetchStatus::Success),
            log(40, FetchStatus::Success),
            log(70, FetchStatus::Success),
            log(100, FetchStatus::Failed),
        ];
        // 75% success
        assert_eq!(evaluate_health(&logs, 60, Utc::now()), HealthStatus::Degraded);
    }

    #[test]
    fn low_success_rate_is_failing() {
        let logs = vec![
            log(10, FetchStatus::Success),
            log(40, FetchStatus::Failed),
            log(70, FetchStatus::Failed),
        ];
        assert_eq!(evaluate_health(&logs, 60, Utc::now()), HealthStatus::Failing);
    }

    #[test]
    fn no_recent_success_is_failing_despite_rate() {
        // Only failures inside 3× interval; the lone success is stale.
        let logs = vec![
            log(200, FetchStatus::Success),
            log(20, FetchStatus::Failed),
        ];
        assert_eq!(evaluate_health(&logs, 30, Utc::now()), HealthStatus::Failing);
    }

    #[test]
    fn empty_window_is_healthy() {
        assert_eq!(evaluate_health(&[], 30, Utc::now()), HealthStatus::Healthy);
    }

    #[test]
    fn partial_counts_against_success_rate() {
        let logs = vec![
            log(10, FetchStatus::Success),
            log(20, FetchStatus::Partial),
        ];
        assert_eq!(evaluate_health(&logs, 30, Utc::now()), HealthStatus::Degraded);
    }

    #[test]
    fn truncate_respects_limit() {
        assert_eq!(truncate("abcdef", 3), "abc");
        assert_eq!(truncate("ab", 3), "ab");
    }
}
