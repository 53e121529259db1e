//! Progress accounting for a running import.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sea_orm::DatabaseConnection;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::broadcast::JobProgressTracker;
use crate::db::job_repo;

/// Rows processed so far out of a fixed total.
#[derive(Debug)]
pub struct ProgressCounter {
    processed: AtomicUsize,
    total: usize,
}

impl ProgressCounter {
    pub fn new(total: usize) -> Self {
        Self {
            processed: AtomicUsize::new(0),
            total,
        }
    }

    pub fn add(&self, rows: usize) -> usize {
        self.processed.fetch_add(rows, Ordering::SeqCst) + rows
    }

    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Percentage while the job runs. Capped at 99; only a terminal
    /// status reports 100.
    pub fn percent(&self) -> i32 {
        if self.total == 0 {
            return 0;
        }
        let processed = self.processed().min(self.total);
        ((processed * 100 / self.total) as i32).min(99)
    }
}

/// Writes progress to the job row and publishes it.
#[derive(Clone)]
pub struct ProgressReporter {
    job_id: i32,
    db: DatabaseConnection,
    counter: Arc<ProgressCounter>,
    tracker: JobProgressTracker,
}

impl ProgressReporter {
    pub fn new(
        job_id: i32,
        db: DatabaseConnection,
        counter: Arc<ProgressCounter>,
        tracker: JobProgressTracker,
    ) -> Self {
        Self {
            job_id,
            db,
            counter,
            tracker,
        }
    }

    pub fn counter(&self) -> &Arc<ProgressCounter> {
        &self.counter
    }

    pub async fn report(&self) {
        let percent = self.counter.percent();
        let processed = self.counter.processed();
        let processed_items = i32::try_from(processed).unwrap_or(i32::MAX);
        match job_repo::update_progress(&self.db, self.job_id, percent, processed_items).await {
            Ok(true) => {
                self.tracker.progress(percent, processed, self.counter.total());
            }
            Ok(false) => {
                tracing::debug!(job_id = self.job_id, "Progress not written, job left processing");
            }
            Err(e) => {
                tracing::warn!(job_id = self.job_id, error = %e, "Failed to write progress");
            }
        }
    }

    /// Reports every `interval` until `done` fires.
    pub async fn run_ticker(self, interval: Duration, done: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = done.cancelled() => return,
                _ = ticker.tick() => self.report().await,
            }
        }
    }
}
