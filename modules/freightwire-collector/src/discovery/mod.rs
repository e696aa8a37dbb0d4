//! Automatic source discovery: a scan task and a validate task on their own
//! cadences, with start/stop control and a status snapshot for operators.
//!
//! Re-entrance guards are process-local; a crash mid-scan can allow a
//! duplicate scan on restart, which is harmless.

mod engine;
mod seeds;
mod validator;

pub use engine::{ScanEngine, ScanSummary};
pub use seeds::{DiscoverySeeds, KeywordTiers};
pub use validator::{promote_candidate, ProbeReport, ValidateSummary, Validator};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info};

use freightwire_common::error::Result;
use freightwire_common::FreightwireError;

use crate::store::Store;

/// Probe endpoint deadline.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Default, Serialize)]
pub struct DiscoveryStatus {
    pub running: bool,
    pub scan_in_progress: bool,
    pub validate_in_progress: bool,
    pub total_scans: u64,
    pub total_validations: u64,
    pub last_scan_at: Option<DateTime<Utc>>,
    pub last_validate_at: Option<DateTime<Utc>>,
    pub last_scan_result: Option<String>,
    pub last_validate_result: Option<String>,
}

pub struct DiscoveryLoop {
    store: Store,
    engine: ScanEngine,
    validator: Arc<Validator>,
    enabled: AtomicBool,
    scan_guard: AtomicBool,
    validate_guard: AtomicBool,
    status: Mutex<DiscoveryStatus>,
    scan_interval: Duration,
    validate_interval: Duration,
    validate_batch: i64,
}

impl DiscoveryLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Store,
        engine: ScanEngine,
        validator: Arc<Validator>,
        enabled: bool,
        scan_interval_hours: u64,
        validate_interval_hours: u64,
        validate_batch: usize,
    ) -> Self {
        Self {
            store,
            engine,
            validator,
            enabled: AtomicBool::new(enabled),
            scan_guard: AtomicBool::new(false),
            validate_guard: AtomicBool::new(false),
            status: Mutex::new(DiscoveryStatus {
                running: enabled,
                ..Default::default()
            }),
            scan_interval: Duration::from_secs(scan_interval_hours * 3600),
            validate_interval: Duration::from_secs(validate_interval_hours * 3600),
            validate_batch: validate_batch as i64,
        }
    }

    pub fn validator(&self) -> &Arc<Validator> {
        &self.validator
    }

    /// Spawn the two singleton loops.
    pub fn spawn(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let scan = {
            let this = Arc::clone(self);
            let mut shutdown = shutdown.clone();
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(this.scan_interval);
                tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                // Consume the immediate first tick; the first scan runs one
                // interval after startup.
                tick.tick().await;
                loop {
                    tokio::select! {
                        _ = tick.tick() => {}
                        _ = shutdown.changed() => return,
                    }
                    if this.enabled.load(Ordering::Relaxed) {
                        if let Err(e) = this.run_scan().await {
                            error!(error = %e, "discovery scan failed");
                        }
                    }
                }
            })
        };

        let validate = {
            let this = Arc::clone(self);
            let mut shutdown = shutdown.clone();
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(this.validate_interval);
                tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                tick.tick().await;
                loop {
                    tokio::select! {
                        _ = tick.tick() => {}
                        _ = shutdown.changed() => return,
                    }
                    if this.enabled.load(Ordering::Relaxed) {
                        if let Err(e) = this.run_validate().await {
                            error!(error = %e, "discovery validation failed");
                        }
                    }
                }
            })
        };

        vec![scan, validate]
    }

    /// Run one scan now, guarded against overlap with itself.
    pub async fn run_scan(&self) -> Result<ScanSummary> {
        if self.scan_guard.swap(true, Ordering::SeqCst) {
            return Err(FreightwireError::Capacity(
                "discovery scan already in progress".to_string(),
            ));
        }

        let result = self.engine.run(&self.store).await;
        self.scan_guard.store(false, Ordering::SeqCst);

        let mut status = self.status.lock().await;
        status.last_scan_at = Some(Utc::now());
        status.total_scans += 1;
        match &result {
            Ok(summary) => {
                status.last_scan_result =
                    Some(format!("{} new candidates", summary.saved));
            }
            Err(e) => status.last_scan_result = Some(format!("error: {e}")),
        }
        result
    }

    /// Run one validation batch now, guarded against overlap with itself.
    pub async fn run_validate(&self) -> Result<ValidateSummary> {
        if self.validate_guard.swap(true, Ordering::SeqCst) {
            return Err(FreightwireError::Capacity(
                "discovery validation already in progress".to_string(),
            ));
        }

        let result = self
            .validator
            .validate_batch(&self.store, self.validate_batch)
            .await;
        self.validate_guard.store(false, Ordering::SeqCst);

        let mut status = self.status.lock().await;
        status.last_validate_at = Some(Utc::now());
        status.total_validations += 1;
        match &result {
            Ok(summary) => {
                status.last_validate_result = Some(format!(
                    "{} validated, {} auto-approved",
                    summary.validated, summary.auto_approved
                ));
            }
            Err(e) => status.last_validate_result = Some(format!("error: {e}")),
        }
        result
    }

    pub fn start(&self) {
        self.enabled.store(true, Ordering::Relaxed);
        info!("discovery started");
    }

    pub fn stop(&self) {
        self.enabled.store(false, Ordering::Relaxed);
        info!("discovery stopped");
    }

    pub async fn status(&self) -> DiscoveryStatus {
        let mut status = self.status.lock().await.clone();
        status.running = self.enabled.load(Ordering::Relaxed);
        status.scan_in_progress = self.scan_guard.load(Ordering::Relaxed);
        status.validate_in_progress = self.validate_guard.load(Ordering::Relaxed);
        status
    }
}
