//! Result types of the control surface and the per-job summary written to
//! the job row.

use serde::Serialize;

use crate::db::entities::{import_job, JobStatus};
use crate::lifecycle::{CancelOutcome, RuntimeSnapshot};
use crate::persist::{CancelReason, ItemError};
use crate::workbook::RowError;

/// Row accounting of one import run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub persisted_rows: usize,
    pub failed_rows: usize,
    /// First recorded problems, oldest first.
    pub errors: Vec<String>,
    pub omitted_errors: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled: Option<CancelReason>,
    #[serde(skip)]
    max_errors: usize,
}

impl ImportSummary {
    pub fn new(max_errors: usize) -> Self {
        Self {
            max_errors,
            ..Default::default()
        }
    }

    pub fn processed_rows(&self) -> usize {
        self.persisted_rows + self.failed_rows
    }

    pub fn record(&mut self, message: String) {
        if self.errors.len() < self.max_errors {
            self.errors.push(message);
        } else {
            self.omitted_errors += 1;
        }
    }

    pub fn record_row_error(&mut self, error: &RowError) {
        self.failed_rows += 1;
        self.record(error.to_string());
    }

    pub fn record_item_error(&mut self, error: &ItemError) {
        self.record(format!(
            "Row {} ({}): {}",
            error.row, error.element_type, error.message
        ));
    }

    /// Terminal status implied by the counts.
    pub fn final_status(&self) -> JobStatus {
        if self.cancelled.is_some() {
            JobStatus::Terminated
        } else if self.failed_rows == 0 && self.errors.is_empty() {
            JobStatus::Completed
        } else if self.persisted_rows == 0 {
            JobStatus::Failed
        } else {
            JobStatus::CompletedWithErrors
        }
    }

    /// Text for the job row's error column. `None` for a clean run.
    pub fn error_text(&self) -> Option<String> {
        if let Some(reason) = self.cancelled {
            return Some(format!("Import terminated: {}", reason));
        }
        if self.failed_rows == 0 && self.errors.is_empty() {
            return None;
        }

        let mut text = format!(
            "{} of {} row(s) failed",
            self.failed_rows,
            self.processed_rows()
        );
        for error in &self.errors {
            text.push_str("\n- ");
            text.push_str(error);
        }
        if self.omitted_errors > 0 {
            text.push_str(&format!("\n- ... {} more", self.omitted_errors));
        }
        Some(text)
    }
}

/// Response of `get_job_status`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusView {
    pub job: import_job::Model,
    pub is_running_in_memory: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime: Option<RuntimeSnapshot>,
    /// Milliseconds between start and completion (or now, while running).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
}

/// Response of `list_running`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunningJobs {
    pub job_ids: Vec<i32>,
    pub count: usize,
    pub shutting_down: bool,
    pub states: Vec<RuntimeSnapshot>,
}

/// Response of `cancel_and_rollback`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelAccepted {
    pub job_id: i32,
    pub outcome: CancelOutcome,
    pub rollback_scheduled: bool,
    pub message: String,
}

/// Response of `list_jobs`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobList {
    pub jobs: Vec<import_job::Model>,
    pub total: u64,
}
