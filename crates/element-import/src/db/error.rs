//! Database error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from database operations.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Error reported by SeaORM or the underlying driver.
    #[error("Database query failed: {0}")]
    Orm(#[from] sea_orm::DbErr),

    /// IO error when creating the directory of a SQLite file.
    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A migration failed to apply.
    #[error("Migration failed: {0}")]
    Migration(String),
}
