pub mod broadcast;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod hierarchy;
pub mod lifecycle;
pub mod persist;
pub mod rollback;
pub mod sanitize;
pub mod service;
pub mod workbook;

pub use broadcast::{ImportPhase, ImportProgressEvent, JobProgressBroadcaster};
pub use catalog::ProjectCatalog;
pub use config::{load_config, Config};
pub use db::entities::JobStatus;
pub use error::{ConfigError, ImportError, LifecycleError, Result};
pub use hierarchy::{AliasTable, HierarchyResolver};
pub use lifecycle::{CancelOutcome, JobRegistry, RuntimeSnapshot};
pub use persist::{BatchFailure, BatchPersister, CancelReason};
pub use rollback::{GateKind, RollbackDenial, RollbackEngine, RollbackError, RollbackReport};
pub use service::{CancelAccepted, ImportService, JobStatusView, RunningJobs, StartImport};
pub use workbook::{CalamineLoader, Workbook, WorkbookError, WorkbookLoader};
