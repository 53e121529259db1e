//! Cooperative cancellation checks.

use std::fmt;
use std::sync::Arc;

use sea_orm::ConnectionTrait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::db::entities::JobStatus;
use crate::db::{job_repo, DatabaseError};
use crate::lifecycle::JobRegistry;

/// Why a job stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "status")]
pub enum CancelReason {
    /// The job's own token fired.
    Token,
    /// The id carries a terminated mark.
    Terminated,
    /// The fleet token fired.
    GlobalTermination,
    /// The registry no longer lists the job as running.
    NotRunning,
    /// The persisted row says the job is over.
    StoreStatus(JobStatus),
    /// The persisted row is gone.
    JobMissing,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Token => f.write_str("cancellation requested"),
            CancelReason::Terminated => f.write_str("job marked as terminated"),
            CancelReason::GlobalTermination => f.write_str("all imports halted"),
            CancelReason::NotRunning => f.write_str("job is no longer running"),
            CancelReason::StoreStatus(status) => write!(f, "job status is {}", status),
            CancelReason::JobMissing => f.write_str("job row no longer exists"),
        }
    }
}

/// Polls every cancellation source of one job.
#[derive(Clone)]
pub struct CancelProbe {
    job_id: i32,
    token: CancellationToken,
    registry: Arc<JobRegistry>,
}

impl CancelProbe {
    pub fn new(job_id: i32, token: CancellationToken, registry: Arc<JobRegistry>) -> Self {
        Self {
            job_id,
            token,
            registry,
        }
    }

    pub fn job_id(&self) -> i32 {
        self.job_id
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// In-memory checks only. Cheap enough to run between statements.
    pub fn check(&self) -> Option<CancelReason> {
        if self.token.is_cancelled() {
            Some(CancelReason::Token)
        } else if self.registry.is_terminated(self.job_id) {
            Some(CancelReason::Terminated)
        } else if self.registry.is_global_termination_set() {
            Some(CancelReason::GlobalTermination)
        } else if !self.registry.is_running(self.job_id) {
            Some(CancelReason::NotRunning)
        } else {
            None
        }
    }

    /// Reads the persisted status through `conn`, which may be the batch
    /// transaction.
    pub async fn check_store<C: ConnectionTrait>(
        &self,
        conn: &C,
    ) -> Result<Option<CancelReason>, DatabaseError> {
        Ok(match job_repo::find_status(conn, self.job_id).await? {
            None => Some(CancelReason::JobMissing),
            Some(status) if status.is_terminal() => Some(CancelReason::StoreStatus(status)),
            Some(_) => None,
        })
    }

    /// In-memory checks first, then the store.
    pub async fn check_all<C: ConnectionTrait>(
        &self,
        conn: &C,
    ) -> Result<Option<CancelReason>, DatabaseError> {
        match self.check() {
            Some(reason) => Ok(Some(reason)),
            None => self.check_store(conn).await,
        }
    }
}
