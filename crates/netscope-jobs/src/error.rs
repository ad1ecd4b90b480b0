use netscope_db::DatabaseError;
use netscope_scanner::ScanError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("invalid scan type: {0}")]
    InvalidScanType(String),

    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("scan job '{0}' already has an active driver")]
    AlreadyRunning(String),

    #[error("scan job '{0}' not found")]
    JobNotFound(String),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

pub type Result<T> = std::result::Result<T, JobError>;
