//! Netscope Jobs - Scan job lifecycle on top of the scanner batch.
//!
//! Turns a client [`ScanRequest`] into a persisted scan job, drives it
//! through `pending → running → completed | failed` on a supervised
//! background task, and answers status and results queries.
//!
//! # Example
//!
//! ```rust,ignore
//! use netscope_jobs::{JobDriver, ScanRequest};
//! use std::sync::Arc;
//!
//! let driver = JobDriver::new(Arc::new(database), Arc::new(ProcessRunner::new()), config);
//! let handle = driver.submit(&ScanRequest::new("network", "10.0.0.5"), "user-1").await?;
//! let job = handle.completion.await??;
//! let view = driver.results(&job.id).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod cache;
pub mod driver;
#[allow(missing_docs)]
pub mod error;
pub mod request;
pub mod store;

// Re-export commonly used types
pub use cache::ResultCache;
pub use driver::{JobDriver, JobHandle, ResultsView};
pub use error::{JobError, Result};
pub use request::{ScanPlan, ScanRequest};
pub use store::JobStore;
