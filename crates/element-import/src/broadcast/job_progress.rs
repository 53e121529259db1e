//! Job progress broadcaster for real-time import status streaming.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::db::entities::JobStatus;

/// Phase of an import job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ImportPhase {
    Queued,
    Persisting,
    Finished,
    RollingBack,
    RolledBack,
    RollbackDenied,
    RollbackFailed,
}

impl std::fmt::Display for ImportPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImportPhase::Queued => write!(f, "Queued"),
            ImportPhase::Persisting => write!(f, "Persisting"),
            ImportPhase::Finished => write!(f, "Finished"),
            ImportPhase::RollingBack => write!(f, "Rolling back"),
            ImportPhase::RolledBack => write!(f, "Rolled back"),
            ImportPhase::RollbackDenied => write!(f, "Rollback denied"),
            ImportPhase::RollbackFailed => write!(f, "Rollback failed"),
        }
    }
}

/// Progress event for an import job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportProgressEvent {
    pub job_id: i32,
    /// File name of the workbook, without directories.
    pub filename: String,
    pub phase: ImportPhase,
    /// Persisted status at the time of the event.
    pub status: JobStatus,
    /// 0–100.
    pub progress: i32,
    pub processed_items: usize,
    pub total_items: usize,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ImportProgressEvent {
    pub fn new(job_id: i32, filename: &str, phase: ImportPhase, status: JobStatus, message: &str) -> Self {
        Self {
            job_id,
            filename: filename.to_string(),
            phase,
            status,
            progress: 0,
            processed_items: 0,
            total_items: 0,
            message: message.to_string(),
            timestamp: Utc::now(),
            error: None,
        }
    }
}

/// Broadcasts import progress events for streaming.
#[derive(Clone)]
pub struct JobProgressBroadcaster {
    sender: Arc<broadcast::Sender<ImportProgressEvent>>,
}

impl JobProgressBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn send(&self, event: ImportProgressEvent) {
        // No receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ImportProgressEvent> {
        self.sender.subscribe()
    }

    /// Creates a tracker for one job and announces it as queued.
    pub fn start_job(&self, job_id: i32, filename: &str) -> JobProgressTracker {
        let tracker = JobProgressTracker::new(job_id, filename, Arc::clone(&self.sender));
        tracker.phase(ImportPhase::Queued, JobStatus::Pending, "Import queued");
        tracker
    }

    /// Creates a tracker without announcing anything.
    pub fn tracker(&self, job_id: i32, filename: &str) -> JobProgressTracker {
        JobProgressTracker::new(job_id, filename, Arc::clone(&self.sender))
    }
}

impl Default for JobProgressBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Publishes events of a single job.
#[derive(Clone)]
pub struct JobProgressTracker {
    job_id: i32,
    filename: String,
    sender: Arc<broadcast::Sender<ImportProgressEvent>>,
}

impl JobProgressTracker {
    pub fn new(job_id: i32, filename: &str, sender: Arc<broadcast::Sender<ImportProgressEvent>>) -> Self {
        Self {
            job_id,
            filename: filename.to_string(),
            sender,
        }
    }

    pub fn job_id(&self) -> i32 {
        self.job_id
    }

    fn event(&self, phase: ImportPhase, status: JobStatus, message: &str) -> ImportProgressEvent {
        ImportProgressEvent::new(self.job_id, &self.filename, phase, status, message)
    }

    pub fn phase(&self, phase: ImportPhase, status: JobStatus, message: &str) {
        let _ = self.sender.send(self.event(phase, status, message));
    }

    pub fn progress(&self, progress: i32, processed_items: usize, total_items: usize) {
        let mut event = self.event(
            ImportPhase::Persisting,
            JobStatus::Processing,
            &format!("{}/{} rows processed", processed_items, total_items),
        );
        event.progress = progress;
        event.processed_items = processed_items;
        event.total_items = total_items;
        let _ = self.sender.send(event);
    }

    /// Announces the job's terminal status.
    pub fn finished(
        &self,
        status: JobStatus,
        progress: i32,
        processed_items: usize,
        total_items: usize,
        error: Option<&str>,
    ) {
        let mut event = self.event(ImportPhase::Finished, status, &format!("Import {}", status));
        event.progress = progress;
        event.processed_items = processed_items;
        event.total_items = total_items;
        event.error = error.map(str::to_string);
        let _ = self.sender.send(event);
    }

    pub fn failed(&self, phase: ImportPhase, status: JobStatus, error: &str) {
        let mut event = self.event(phase, status, &phase.to_string());
        event.error = Some(error.to_string());
        let _ = self.sender.send(event);
    }
}
