//! Runs one import job to completion.
//!
//! Decoding happens on a blocking thread and feeds batches through a bounded
//! channel to the persister, which writes them one at a time. The termination
//! monitor and the progress ticker run next to it until the driver is done.

use std::sync::Arc;
use std::time::Duration;

use sea_orm::DatabaseConnection;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::report::ImportSummary;
use crate::broadcast::{ImportPhase, JobProgressTracker};
use crate::catalog::ProjectCatalog;
use crate::config::ImportSettings;
use crate::db::entities::JobStatus;
use crate::db::job_repo;
use crate::hierarchy::{AliasTable, HierarchyResolver};
use crate::lifecycle::{JobRegistry, ProgressCounter, ProgressReporter, TerminationMonitor};
use crate::persist::{BatchFailure, BatchPersister, CancelProbe, CancelReason};
use crate::workbook::{ElementTypeDraft, RowDecoder, RowError, SectionRanges, Workbook};

/// Rows decoded for one transaction.
#[derive(Debug, Default)]
struct DecodedBatch {
    drafts: Vec<ElementTypeDraft>,
    row_errors: Vec<RowError>,
}

impl DecodedBatch {
    fn len(&self) -> usize {
        self.drafts.len() + self.row_errors.len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Everything the decoder thread owns.
pub(crate) struct DecodeInput {
    pub workbook: Workbook,
    pub element_sheet: String,
    pub catalog: ProjectCatalog,
    pub aliases: Arc<AliasTable>,
    pub ranges: SectionRanges,
    pub data_start_row: usize,
    pub max_cell_quantity: i32,
    pub created_by: String,
}

pub(crate) struct ImportDriver {
    pub db: DatabaseConnection,
    pub registry: Arc<JobRegistry>,
    pub job_id: i32,
    pub project_id: i32,
    pub token: CancellationToken,
    /// Taken by the decoder thread when the run starts.
    pub input: Option<DecodeInput>,
    pub total_rows: usize,
    pub batch_size: usize,
    pub concurrent_batches: usize,
    pub settings: ImportSettings,
    pub tracker: JobProgressTracker,
    pub filename: String,
}

impl ImportDriver {
    /// Runs the job and returns the status the driver wrote (or found).
    pub async fn run(self) -> JobStatus {
        let span = tracing::info_span!(
            "import_job",
            job_id = self.job_id,
            project_id = self.project_id,
            file = %self.filename
        );
        let registry = Arc::clone(&self.registry);
        let job_id = self.job_id;

        let status = self.drive().instrument(span).await;

        registry.mark_finished(job_id);
        registry.unregister(job_id);
        status
    }

    async fn drive(mut self) -> JobStatus {
        let job_id = self.job_id;
        self.registry.mark_started(job_id);
        let Some(input) = self.input.take() else {
            return self.fail("Import input already consumed").await;
        };

        let total_items = i32::try_from(self.total_rows).unwrap_or(i32::MAX);
        match job_repo::mark_processing(&self.db, job_id, total_items).await {
            Ok(true) => {
                tracing::info!(rows = self.total_rows, "Import started");
            }
            Ok(false) => {
                let status = self.current_status().await.unwrap_or(JobStatus::Cancelled);
                tracing::info!(%status, "Job left pending before it started");
                self.tracker.phase(ImportPhase::Finished, status, "Import did not start");
                return status;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to mark job as processing");
                return self.fail(&e.to_string()).await;
            }
        }
        self.tracker.phase(
            ImportPhase::Persisting,
            JobStatus::Processing,
            "Persisting element types",
        );

        let probe = CancelProbe::new(job_id, self.token.clone(), Arc::clone(&self.registry));
        let done = CancellationToken::new();

        let monitor = TerminationMonitor::new(
            probe.clone(),
            self.db.clone(),
            Duration::from_millis(self.settings.monitor_interval_ms),
        );
        let monitor_handle = tokio::spawn(monitor.run(done.clone()).in_current_span());

        let counter = Arc::new(ProgressCounter::new(self.total_rows));
        let reporter = ProgressReporter::new(
            job_id,
            self.db.clone(),
            Arc::clone(&counter),
            self.tracker.clone(),
        );
        let ticker_handle = tokio::spawn(
            reporter
                .clone()
                .run_ticker(
                    Duration::from_secs(self.settings.progress_interval_secs),
                    done.clone(),
                )
                .in_current_span(),
        );

        let persister = BatchPersister::new(self.project_id, probe.clone());
        let (tx, mut rx) = mpsc::channel::<DecodedBatch>(self.concurrent_batches.max(1));
        let batch_size = self.batch_size.max(1);
        let decode_token = self.token.clone();
        let decoder_handle = tokio::task::spawn_blocking(move || {
            decode_batches(input, batch_size, tx, decode_token)
        });

        let mut summary = ImportSummary::new(self.settings.max_recorded_errors);
        let mut batches = 0usize;
        while let Some(batch) = rx.recv().await {
            batches += 1;
            for error in &batch.row_errors {
                summary.record_row_error(error);
            }

            if !batch.drafts.is_empty() {
                match persister.persist(&self.db, &batch.drafts).await {
                    Ok(report) => {
                        summary.persisted_rows += batch.drafts.len();
                        tracing::debug!(
                            batch = batches,
                            element_types = report.element_types,
                            elements = report.elements,
                            "Batch persisted"
                        );
                    }
                    Err(BatchFailure::Cancelled(reason)) => {
                        summary.cancelled = Some(reason);
                        break;
                    }
                    Err(BatchFailure::Rows(errors)) => {
                        summary.failed_rows += batch.drafts.len();
                        for error in &errors {
                            summary.record_item_error(error);
                        }
                    }
                    Err(failure) => {
                        tracing::error!(batch = batches, error = %failure, "Batch failed");
                        summary.failed_rows += batch.drafts.len();
                        summary.record(format!("Batch {}: {}", batches, failure));
                    }
                }
            }

            counter.add(batch.len());
            reporter.report().await;
        }

        // Stops the decoder if the loop ended early.
        drop(rx);
        if let Err(e) = decoder_handle.await {
            tracing::error!(error = %e, "Decoder thread failed");
            summary.record(format!("Decoder failed: {}", e));
            if summary.cancelled.is_none() && summary.processed_rows() < self.total_rows {
                summary.failed_rows += self.total_rows - summary.processed_rows();
            }
        }

        if summary.cancelled.is_none() {
            summary.cancelled = probe.check();
        }
        // A status write after cancellation must not happen.
        if summary.cancelled.is_none() && self.registry.is_terminated(job_id) {
            summary.cancelled = Some(CancelReason::Terminated);
        }

        let status = self.finish(&summary).await;

        done.cancel();
        let _ = ticker_handle.await;
        match monitor_handle.await {
            Ok(Some(reason)) => tracing::debug!(%reason, "Monitor observed cancellation"),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "Monitor task failed"),
        }

        status
    }

    /// Writes the terminal status and announces it.
    async fn finish(&self, summary: &ImportSummary) -> JobStatus {
        let status = summary.final_status();
        let error = summary.error_text();
        let processed = i32::try_from(summary.processed_rows()).unwrap_or(i32::MAX);

        let written = match job_repo::finish(&self.db, self.job_id, status, processed, error.clone())
            .await
        {
            Ok(written) => written,
            Err(e) => {
                tracing::error!(error = %e, "Failed to write final status");
                false
            }
        };

        let status = if written {
            status
        } else {
            // Someone else already wrote a terminal status, usually a cancel.
            self.current_status().await.unwrap_or(status)
        };

        let progress = if status.is_cancellation() { 0 } else { 100 };
        tracing::info!(
            %status,
            persisted = summary.persisted_rows,
            failed = summary.failed_rows,
            "Import finished"
        );
        self.tracker.finished(
            status,
            progress,
            summary.processed_rows(),
            self.total_rows,
            error.as_deref(),
        );
        status
    }

    async fn fail(&self, message: &str) -> JobStatus {
        if let Err(e) =
            job_repo::finish(&self.db, self.job_id, JobStatus::Failed, 0, Some(message.to_string()))
                .await
        {
            tracing::error!(error = %e, "Failed to write failed status");
        }
        self.tracker
            .failed(ImportPhase::Finished, JobStatus::Failed, message);
        JobStatus::Failed
    }

    async fn current_status(&self) -> Option<JobStatus> {
        job_repo::find_status(&self.db, self.job_id)
            .await
            .ok()
            .flatten()
    }
}

/// Decodes rows into batches of `batch_size` and sends them until the sheet
/// is exhausted, the receiver goes away or the job is cancelled.
fn decode_batches(
    input: DecodeInput,
    batch_size: usize,
    tx: mpsc::Sender<DecodedBatch>,
    token: CancellationToken,
) {
    let _span = tracing::debug_span!("decode_rows").entered();
    let Some(sheet) = input.workbook.sheet(&input.element_sheet) else {
        tracing::error!(sheet = %input.element_sheet, "Element sheet disappeared");
        return;
    };

    let resolver = HierarchyResolver::new(&input.aliases, input.catalog.precast());
    let decoder = RowDecoder::new(
        sheet,
        input.ranges,
        &input.catalog,
        resolver,
        input.data_start_row,
        input.created_by.clone(),
    )
    .with_max_cell_quantity(input.max_cell_quantity);

    let mut batch = DecodedBatch::default();
    for item in decoder {
        if token.is_cancelled() {
            tracing::debug!("Decoding stopped by cancellation");
            return;
        }
        match item {
            Ok(draft) => batch.drafts.push(draft),
            Err(error) => batch.row_errors.push(error),
        }
        if batch.len() >= batch_size && tx.blocking_send(std::mem::take(&mut batch)).is_err() {
            return;
        }
    }

    if !batch.is_empty() {
        let _ = tx.blocking_send(batch);
    }
}
