//! Control surface of the import engine.
//!
//! [`ImportService`] validates and starts imports, answers status queries and
//! runs the cancel-and-rollback flow. All state shared between jobs lives in
//! the [`JobRegistry`]; everything durable lives in the database.

mod driver;
pub mod report;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sea_orm::DatabaseConnection;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::broadcast::{ImportPhase, ImportProgressEvent, JobProgressBroadcaster};
use crate::catalog::ProjectCatalog;
use crate::config::{Config, MAX_BATCH_SIZE, MAX_CONCURRENT_BATCHES};
use crate::db::entities::{import_job, JobStatus};
use crate::db::job_repo::{self, JobFilter, NewJob};
use crate::error::{ImportError, LifecycleError, Result};
use crate::hierarchy::AliasTable;
use crate::lifecycle::{CancelOutcome, JobRegistry};
use crate::rollback::{RollbackEngine, RollbackError, RollbackReport};
use crate::sanitize::redact_path;
use crate::workbook::{
    count_data_rows, resolve_ranges, CalamineLoader, WorkbookError, WorkbookLoader,
};

use driver::{DecodeInput, ImportDriver};
pub use report::{CancelAccepted, ImportSummary, JobList, JobStatusView, RunningJobs};

/// Parameters of `start_import`. Unset limits fall back to the configured
/// defaults.
#[derive(Debug, Clone)]
pub struct StartImport {
    pub project_id: i32,
    pub file_path: PathBuf,
    pub batch_size: Option<usize>,
    pub concurrent_batches: Option<usize>,
    pub user: String,
}

impl StartImport {
    pub fn new(project_id: i32, file_path: impl Into<PathBuf>, user: impl Into<String>) -> Self {
        Self {
            project_id,
            file_path: file_path.into(),
            batch_size: None,
            concurrent_batches: None,
            user: user.into(),
        }
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    pub fn concurrent_batches(mut self, concurrent_batches: usize) -> Self {
        self.concurrent_batches = Some(concurrent_batches);
        self
    }
}

/// Outcome of the asynchronous rollback phase.
pub type RollbackTask = JoinHandle<std::result::Result<RollbackReport, RollbackError>>;

#[derive(Clone)]
pub struct ImportService {
    db: DatabaseConnection,
    config: Arc<Config>,
    registry: Arc<JobRegistry>,
    loader: Arc<dyn WorkbookLoader>,
    aliases: Arc<AliasTable>,
    broadcaster: JobProgressBroadcaster,
    rollback: RollbackEngine,
}

impl ImportService {
    pub fn new(db: DatabaseConnection, config: Config) -> Self {
        let aliases = Arc::new(AliasTable::from_settings(&config.hierarchy));
        Self {
            rollback: RollbackEngine::new(db.clone()),
            db,
            config: Arc::new(config),
            registry: Arc::new(JobRegistry::new()),
            loader: Arc::new(CalamineLoader::new()),
            aliases,
            broadcaster: JobProgressBroadcaster::default(),
        }
    }

    /// Replaces the workbook loader.
    pub fn with_loader(mut self, loader: Arc<dyn WorkbookLoader>) -> Self {
        self.loader = loader;
        self
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ImportProgressEvent> {
        self.broadcaster.subscribe()
    }

    // ─── Imports ────────────────────────────────────────────────────────────

    /// Validates the request and workbook, creates the job row and starts
    /// processing in the background. Returns the job id.
    ///
    /// Nothing is written when validation fails.
    pub async fn start_import(&self, request: StartImport) -> Result<i32> {
        let settings = &self.config.import;
        let batch_size = request.batch_size.unwrap_or(settings.batch_size);
        let concurrent_batches = request
            .concurrent_batches
            .unwrap_or(settings.concurrent_batches);
        validate_limits(batch_size, concurrent_batches)?;
        if request.project_id <= 0 {
            return Err(validation(format!(
                "project_id must be positive, got {}",
                request.project_id
            )));
        }

        if self.registry.is_shutting_down() {
            return Err(LifecycleError::ShuttingDown.into());
        }
        if self.registry.is_creation_blocked() {
            return Err(LifecycleError::CreationBlocked.into());
        }

        let filename = redact_path(&request.file_path);
        let workbook = self.load_workbook(request.file_path.clone()).await?;
        let workbook_settings = &self.config.workbook;
        let sheet = workbook.require_sheet(&workbook_settings.element_sheet)?;
        let required = workbook_settings.data_start_row.saturating_sub(1);
        if sheet.height() < required {
            return Err(WorkbookError::InsufficientRows {
                sheet: sheet.name.clone(),
                required,
                found: sheet.height(),
            }
            .into());
        }
        let total_rows = count_data_rows(sheet, workbook_settings.data_start_row);

        let catalog = ProjectCatalog::load(&self.db, request.project_id).await?;
        let ranges = resolve_ranges(&workbook, &workbook_settings.summary_sheet, catalog.counts())?;

        let job = job_repo::create(
            &self.db,
            NewJob {
                project_id: request.project_id,
                file_path: request.file_path.display().to_string(),
                created_by: Some(request.user.clone()),
                rollback_enabled: settings.rollback_enabled_by_default,
            },
        )
        .await?;

        let token = match self.registry.register(job.id) {
            Ok(token) => token,
            Err(e) => {
                job_repo::finish(&self.db, job.id, JobStatus::Failed, 0, Some(e.to_string()))
                    .await?;
                return Err(e.into());
            }
        };

        tracing::info!(
            job_id = job.id,
            project_id = request.project_id,
            file = %filename,
            rows = total_rows,
            batch_size,
            concurrent_batches,
            ranges = ?ranges.source,
            "Import accepted"
        );

        let driver = ImportDriver {
            db: self.db.clone(),
            registry: Arc::clone(&self.registry),
            job_id: job.id,
            project_id: request.project_id,
            token,
            input: Some(DecodeInput {
                workbook,
                element_sheet: workbook_settings.element_sheet.clone(),
                catalog,
                aliases: Arc::clone(&self.aliases),
                ranges,
                data_start_row: workbook_settings.data_start_row,
                max_cell_quantity: settings.max_cell_quantity,
                created_by: request.user,
            }),
            total_rows,
            batch_size,
            concurrent_batches,
            settings: settings.clone(),
            tracker: self.broadcaster.start_job(job.id, &filename),
            filename,
        };
        self.registry.spawn(driver.run());

        Ok(job.id)
    }

    async fn load_workbook(&self, path: PathBuf) -> Result<crate::workbook::Workbook> {
        let loader = Arc::clone(&self.loader);
        let task_path = path.clone();
        let loaded = tokio::task::spawn_blocking(move || loader.load(&task_path))
            .await
            .map_err(|e| WorkbookError::Open {
                path,
                message: format!("loader task failed: {}", e),
            })?;
        Ok(loaded?)
    }

    /// Waits until the job is no longer registered, then returns its row.
    pub async fn wait_for_job(&self, job_id: i32, timeout: Duration) -> Result<import_job::Model> {
        if !self.registry.wait_unregistered(job_id, timeout).await {
            log::warn!("Job {} still running after {:?}", job_id, timeout);
        }
        job_repo::find_by_id(&self.db, job_id)
            .await?
            .ok_or(ImportError::JobNotFound(job_id))
    }

    // ─── Queries ────────────────────────────────────────────────────────────

    pub async fn get_job_status(&self, job_id: i32) -> Result<JobStatusView> {
        let job = job_repo::find_by_id(&self.db, job_id)
            .await?
            .ok_or(ImportError::JobNotFound(job_id))?;
        let runtime = self.registry.snapshot(job_id);
        let duration_ms = job.started_at.map(|started| {
            let end = job.completed_at.unwrap_or_else(Utc::now);
            (end - started).num_milliseconds().max(0)
        });

        Ok(JobStatusView {
            is_running_in_memory: self.registry.is_running(job_id),
            runtime,
            duration_ms,
            job,
        })
    }

    pub fn list_running(&self) -> RunningJobs {
        let job_ids = self.registry.running_ids();
        RunningJobs {
            count: job_ids.len(),
            job_ids,
            shutting_down: self.registry.is_shutting_down(),
            states: self.registry.snapshots(),
        }
    }

    /// Most recent pending or processing job of the project created within
    /// the configured window (30 minutes by default).
    pub async fn get_pending_within_30min(
        &self,
        project_id: i32,
    ) -> Result<Option<import_job::Model>> {
        let since = job_repo::window_start(Utc::now(), self.config.import.pending_window_minutes);
        Ok(job_repo::find_recent_active(&self.db, project_id, since).await?)
    }

    pub async fn list_jobs(&self, filter: &JobFilter) -> Result<JobList> {
        let (jobs, total) = job_repo::query(&self.db, filter).await?;
        Ok(JobList { jobs, total })
    }

    pub async fn count_by_status(&self, status: JobStatus) -> Result<u64> {
        Ok(job_repo::count_by_status(&self.db, status).await?)
    }

    // ─── Control ────────────────────────────────────────────────────────────

    pub async fn enable_rollback(&self, job_id: i32) -> Result<()> {
        if !job_repo::set_rollback_enabled(&self.db, job_id, true).await? {
            return Err(ImportError::JobNotFound(job_id));
        }
        log::info!("Rollback enabled for job {}", job_id);
        Ok(())
    }

    /// Cancels the job in memory and in the store. If its driver is still
    /// registered after the grace window, the token and the store write are
    /// applied once more. Both writes are idempotent.
    pub async fn force_cancel(&self, job_id: i32) -> Result<CancelOutcome> {
        let outcome = self.cancel_now(job_id).await?;

        tokio::time::sleep(Duration::from_millis(self.config.import.cancel_grace_ms)).await;
        if let Some(token) = self.registry.token(job_id) {
            log::warn!("Job {} still registered after cancel, re-applying", job_id);
            token.cancel();
            self.registry.mark_terminated(job_id);
            job_repo::force_cancelled(&self.db, job_id).await?;
        }
        Ok(outcome)
    }

    /// Cancels the job and, when rollback is enabled, schedules the rollback
    /// of everything it created. Returns once the cancellation is written.
    pub async fn cancel_and_rollback(&self, job_id: i32) -> Result<CancelAccepted> {
        let (accepted, _task) = self.cancel_and_schedule_rollback(job_id).await?;
        Ok(accepted)
    }

    /// Like [`cancel_and_rollback`](Self::cancel_and_rollback) but also
    /// returns the handle of the scheduled rollback, if any.
    pub async fn cancel_and_schedule_rollback(
        &self,
        job_id: i32,
    ) -> Result<(CancelAccepted, Option<RollbackTask>)> {
        let job = job_repo::find_by_id(&self.db, job_id)
            .await?
            .ok_or(ImportError::JobNotFound(job_id))?;
        let outcome = self.cancel_now(job_id).await?;

        if !job.rollback_enabled {
            return Ok((
                CancelAccepted {
                    job_id,
                    outcome,
                    rollback_scheduled: false,
                    message: "Import cancelled; rollback is not enabled for this job".to_string(),
                },
                None,
            ));
        }
        if !self.registry.begin_rollback(job_id) {
            return Ok((
                CancelAccepted {
                    job_id,
                    outcome,
                    rollback_scheduled: false,
                    message: "Import cancelled; a rollback is already in progress".to_string(),
                },
                None,
            ));
        }

        let task = self.registry.spawn(rollback_after_drain(
            Arc::clone(&self.registry),
            self.rollback.clone(),
            self.broadcaster.clone(),
            job_id,
            redact_path(std::path::Path::new(&job.file_path)),
            Duration::from_secs(self.config.import.drain_timeout_secs),
        ));

        Ok((
            CancelAccepted {
                job_id,
                outcome,
                rollback_scheduled: true,
                message: "Import cancelled; rollback scheduled".to_string(),
            },
            Some(task),
        ))
    }

    /// Registry cancel plus the unconditional store write.
    async fn cancel_now(&self, job_id: i32) -> Result<CancelOutcome> {
        let outcome = self.registry.cancel(job_id);
        if outcome != CancelOutcome::Cancelled {
            self.registry.terminate_unregistered(job_id);
        }
        if job_repo::force_cancelled(&self.db, job_id).await? == 0 {
            return Err(ImportError::JobNotFound(job_id));
        }
        log::info!("Job {} cancelled ({:?})", job_id, outcome);
        Ok(outcome)
    }

    /// Stops accepting imports and waits for running ones to stop.
    pub async fn graceful_shutdown(&self) -> Result<()> {
        let timeout = Duration::from_secs(self.config.import.shutdown_timeout_secs);
        self.registry.graceful_shutdown(timeout).await?;
        Ok(())
    }
}

async fn rollback_after_drain(
    registry: Arc<JobRegistry>,
    engine: RollbackEngine,
    broadcaster: JobProgressBroadcaster,
    job_id: i32,
    filename: String,
    drain_timeout: Duration,
) -> std::result::Result<RollbackReport, RollbackError> {
    let tracker = broadcaster.tracker(job_id, &filename);
    tracker.phase(ImportPhase::RollingBack, JobStatus::Cancelled, "Rolling back import");

    let result = if registry.wait_unregistered(job_id, drain_timeout).await {
        engine.rollback(job_id).await
    } else {
        log::error!(
            "Job {} did not stop within {:?}, rollback skipped",
            job_id,
            drain_timeout
        );
        Err(RollbackError::InProgress { job_id })
    };
    registry.end_rollback(job_id);

    match &result {
        Ok(report) => tracker.phase(
            ImportPhase::RolledBack,
            JobStatus::Cancelled,
            &format!("Rolled back {} row(s)", report.total()),
        ),
        Err(RollbackError::Denied(denial)) => {
            tracker.failed(ImportPhase::RollbackDenied, JobStatus::Cancelled, &denial.message)
        }
        Err(e) => tracker.failed(ImportPhase::RollbackFailed, JobStatus::Cancelled, &e.to_string()),
    }
    result
}

fn validate_limits(batch_size: usize, concurrent_batches: usize) -> Result<()> {
    if !(1..=MAX_BATCH_SIZE).contains(&batch_size) {
        return Err(validation(format!(
            "batch_size must be between 1 and {}, got {}",
            MAX_BATCH_SIZE, batch_size
        )));
    }
    if !(1..=MAX_CONCURRENT_BATCHES).contains(&concurrent_batches) {
        return Err(validation(format!(
            "concurrent_batches must be between 1 and {}, got {}",
            MAX_CONCURRENT_BATCHES, concurrent_batches
        )));
    }
    Ok(())
}

fn validation(message: String) -> ImportError {
    ImportError::Validation { message }
}
