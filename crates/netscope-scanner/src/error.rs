use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("unknown scanner kind: {0}")]
    UnknownScannerKind(String),

    #[error("tool not found: {program}")]
    ToolNotFound { program: String },

    #[error("{program} failed: {reason}")]
    ToolFailed { program: String, reason: String },

    #[error("expected output artifact was not produced: {}", path.display())]
    MissingArtifact { path: PathBuf },

    #[error("malformed tool output: {0}")]
    Parse(String),

    #[error("scan cancelled before completion")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ScanError>;
