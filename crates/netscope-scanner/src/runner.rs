//! Scanner Runner: executes one scanner on its own task.
//!
//! The task boundary turns a panicking scanner into a [`ScannerFault`] so a
//! crash never takes siblings down, and the supervisory timeout bounds how
//! long a single scanner may hold up the batch.

use crate::result::{ScanResult, ScannerFault, ScannerOutcome};
use crate::scanners::Scanner;
use std::any::Any;
use std::time::Duration;
use tokio::task::JoinError;
use tokio_util::task::AbortOnDropHandle;

/// Run `scanner` to completion and return what it contributed.
///
/// Dropping the returned future aborts the scanner task, which kills any
/// child process it started.
pub async fn run_scanner(mut scanner: Box<dyn Scanner>, timeout: Option<Duration>) -> ScannerOutcome {
    let kind = scanner.kind();
    let target = scanner.target().clone();

    let task = AbortOnDropHandle::new(tokio::spawn(async move { scanner.scan().await }));

    let joined = match timeout {
        Some(limit) => match tokio::time::timeout(limit, task).await {
            Ok(joined) => joined,
            Err(_) => {
                // the elapsed future dropped the handle, aborting the task
                tracing::warn!(scanner = %kind, timeout_secs = limit.as_secs(), "Scanner timed out");
                let mut result = ScanResult::new(kind, &target);
                result.fail(format!("scanner timed out after {}s", limit.as_secs()));
                return ScannerOutcome::Report(result);
            }
        },
        None => task.await,
    };

    match joined {
        Ok(result) => {
            tracing::debug!(scanner = %kind, status = %result.status(), "Scanner finished");
            ScannerOutcome::Report(result)
        }
        Err(e) => {
            let message = describe_join_error(e);
            tracing::error!(scanner = %kind, error = %message, "Scanner crashed");
            ScannerOutcome::Fault(ScannerFault::new(kind, message))
        }
    }
}

fn describe_join_error(error: JoinError) -> String {
    match error.try_into_panic() {
        Ok(payload) => format!("scanner panicked: {}", panic_message(payload.as_ref())),
        Err(error) => format!("scanner task failed: {error}"),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else {
        "unknown panic payload"
    }
}
