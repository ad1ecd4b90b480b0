//! Netscope Scanner - Concurrent scan orchestration over external tools.
//!
//! This crate runs a batch of independent scanners against one target and
//! folds their heterogeneous outputs into a single aggregate document. Each
//! scanner wraps one external tool (nmap or tshark) behind the
//! [`ToolRunner`] seam, so failures of the tool become data on the scanner's
//! result rather than errors that abort the batch.
//!
//! # Features
//!
//! - Closed set of scanners: network discovery, vulnerability detection, traffic analysis
//! - Fan-out/fan-in execution with per-scanner crash isolation
//! - Supervisory per-scanner timeout and cooperative cancellation
//! - Subprocesses killed and capture files removed when a run is aborted
//!
//! # Example
//!
//! ```rust,ignore
//! use netscope_scanner::{ProcessRunner, ScannerManager};
//! use netscope_core::{ScanOptions, Target};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! let mut manager = ScannerManager::new(
//!     Target::new("10.0.0.5")?,
//!     ScanOptions::new(),
//!     Arc::new(ProcessRunner::new()),
//! );
//! manager.add_scanner("network", ScanOptions::new().with("ports", "1-100"))?;
//! manager.add_scanner("vulnerability", ScanOptions::new())?;
//!
//! let aggregate = manager.run_all(CancellationToken::new()).await;
//! println!("{}", serde_json::to_string_pretty(&aggregate)?);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod command;
#[allow(missing_docs)]
pub mod error;
pub mod manager;
#[allow(missing_docs)]
pub mod nmap;
pub mod result;
pub mod runner;
pub mod scanners;
pub mod testing;
#[allow(missing_docs)]
pub mod tshark;

// Re-export commonly used types
pub use command::{ProcessRunner, ToolInvocation, ToolOutput, ToolRunner};
pub use error::{Result, ScanError};
pub use manager::ScannerManager;
pub use result::{AggregateResult, ErrorEntry, ScanResult, ScannerFault, ScannerOutcome, ScannerResults};
pub use runner::run_scanner;
pub use scanners::{build_scanner, Scanner, ScannerContext};
