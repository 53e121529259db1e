use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::db::DatabaseError;
use crate::rollback::RollbackError;
use crate::workbook::WorkbookError;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Workbook error: {0}")]
    Workbook(#[from] WorkbookError),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Rollback error: {0}")]
    Rollback(#[from] RollbackError),

    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("Import job {0} not found")]
    JobNotFound(i32),
}

impl From<sea_orm::DbErr> for ImportError {
    fn from(err: sea_orm::DbErr) -> Self {
        ImportError::Database(DatabaseError::from(err))
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

/// Errors raised by the in-memory job registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("Import engine is shutting down")]
    ShuttingDown,

    #[error("Import job {job_id} is already running")]
    AlreadyRunning { job_id: i32 },

    #[error("Job creation is blocked while a cancelled import drains")]
    CreationBlocked,

    #[error("Shutdown timed out after {timeout:?} with {remaining} job(s) still running")]
    ShutdownTimeout { timeout: Duration, remaining: usize },
}

pub type Result<T> = std::result::Result<T, ImportError>;
