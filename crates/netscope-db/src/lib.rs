//! Netscope Database Layer
//!
//! Provides `SQLite` persistence for scan jobs and reports. Uses `SQLx` with
//! embedded migrations.
//!
//! # Architecture
//!
//! - **Migrations**: SQL migrations are embedded and versioned using `SQLx`
//! - **Connection Pooling**: a small pool for files, a single pinned connection for `:memory:`
//! - **State machine**: scan job status changes are guarded in SQL
//!
//! # Example
//!
//! ```ignore
//! use netscope_db::Database;
//!
//! let db = Database::new("netscope.db").await?;
//! db.run_migrations().await?;
//! let jobs = netscope_db::scan_jobs::list_scan_jobs(db.pool(), "user-1").await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod connection;
pub mod error;
pub mod migrations;
pub mod reports;
pub mod scan_jobs;

// Re-export commonly used types
pub use connection::DatabasePool;
pub use error::{DatabaseError, Result};
pub use reports::Report;
pub use scan_jobs::{NewScanJob, ScanJob, StatusUpdate};

use std::path::Path;

/// High-level database interface.
#[derive(Debug, Clone)]
pub struct Database {
    pool: DatabasePool,
}

impl Database {
    /// Open the database at `path` (or `:memory:`).
    ///
    /// # Errors
    /// Returns `DatabaseError` if the database cannot be opened.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self> {
        let pool = DatabasePool::new(path).await?;
        Ok(Self { pool })
    }

    /// Create the parent directory, open the database and migrate it.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let db = Self::new(path).await?;
        db.run_migrations().await?;
        Ok(db)
    }

    /// Run all pending database migrations.
    ///
    /// # Errors
    /// Returns `DatabaseError::Migration` if any migration fails.
    pub async fn run_migrations(&self) -> Result<()> {
        migrations::run_migrations(self.pool.pool()).await
    }

    /// Get the current schema version.
    pub async fn get_schema_version(&self) -> Result<i64> {
        migrations::get_schema_version(self.pool.pool()).await
    }

    /// Get a reference to the underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Sqlite> {
        self.pool.pool()
    }

    /// Close the database connection gracefully.
    pub async fn close(self) {
        self.pool.close().await;
    }
}
