//! Database module for persistent storage.
//!
//! Uses SeaORM over PostgreSQL in production and SQLite for local runs and
//! tests. Migrations are applied on connect.

use std::path::{Path, PathBuf};
use std::time::Duration;

use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;

pub mod catalog_repo;
pub mod entities;
pub mod error;
pub mod job_repo;
pub mod migrations;

pub use crate::config::schema::default_database_url;
pub use error::DatabaseError;
pub use migrations::Migrator;

/// Connects to `database_url` and runs all pending migrations.
///
/// For file-backed SQLite URLs the parent directory is created first.
pub async fn init_database(database_url: &str) -> Result<DatabaseConnection, DatabaseError> {
    if let Some(path) = sqlite_file_path(database_url) {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| DatabaseError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
    }

    let mut options = ConnectOptions::new(database_url.to_string());
    options
        .connect_timeout(Duration::from_secs(10))
        .sqlx_logging(false);

    let db = Database::connect(options).await?;
    run_migrations(&db).await?;

    log::info!("Database ready at {}", display_url(database_url));
    Ok(db)
}

/// Opens a migrated in-memory SQLite database.
///
/// The pool is pinned to one connection so every query sees the same
/// in-memory database.
pub async fn connect_in_memory() -> Result<DatabaseConnection, DatabaseError> {
    let mut options = ConnectOptions::new("sqlite::memory:".to_string());
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);

    let db = Database::connect(options).await?;
    run_migrations(&db).await?;
    Ok(db)
}

pub async fn run_migrations(db: &DatabaseConnection) -> Result<(), DatabaseError> {
    Migrator::up(db, None)
        .await
        .map_err(|e| DatabaseError::Migration(e.to_string()))
}

/// Extracts the file path of a `sqlite://path?params` URL.
fn sqlite_file_path(database_url: &str) -> Option<PathBuf> {
    let rest = database_url.strip_prefix("sqlite://")?;
    let path = rest.split('?').next().unwrap_or_default();
    if path.is_empty() || path.starts_with(":memory:") {
        return None;
    }
    Some(Path::new(path).to_path_buf())
}

/// Hides credentials of server URLs in log output.
fn display_url(database_url: &str) -> String {
    match (database_url.find("://"), database_url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &database_url[..scheme_end], &database_url[at..])
        }
        _ => database_url.to_string(),
    }
}
