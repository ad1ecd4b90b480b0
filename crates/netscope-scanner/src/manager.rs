//! Scanner Manager: fan-out/fan-in orchestration of one scan batch.

use crate::command::ToolRunner;
use crate::error::{Result, ScanError};
use crate::result::{AggregateResult, ScannerFault, ScannerOutcome};
use crate::runner::run_scanner;
use crate::scanners::{build_scanner, Scanner, ScannerContext};
use futures::stream::{FuturesUnordered, StreamExt};
use netscope_core::{AppConfig, ScanOptions, ScanStatus, ScannerKind, Target};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Owns the scanners selected for one job and runs them concurrently.
///
/// Builder methods configure how scanners are constructed, so apply them
/// before calling [`ScannerManager::add_scanner`].
pub struct ScannerManager {
    target: Target,
    defaults: ScanOptions,
    context: ScannerContext,
    scanner_timeout: Option<Duration>,
    scanners: Vec<Box<dyn Scanner>>,
}

impl ScannerManager {
    /// Manager for `target` whose scanners all start from `defaults`.
    #[must_use]
    pub fn new(target: Target, defaults: ScanOptions, runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            target,
            defaults,
            context: ScannerContext::new(runner),
            scanner_timeout: None,
            scanners: Vec::new(),
        }
    }

    /// Take tool paths, capture settings and the supervisory timeout from `config`.
    #[must_use]
    pub fn with_config(mut self, config: &AppConfig) -> Self {
        self.context = ScannerContext::from_config(self.context.runner.clone(), config);
        self.scanner_timeout = config.scanning.scanner_timeout();
        self
    }

    /// Bound each scanner's run time.
    #[must_use]
    pub fn with_scanner_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.scanner_timeout = timeout;
        self
    }

    /// Override the nmap and tshark executables.
    #[must_use]
    pub fn with_tool_paths(mut self, nmap: impl Into<String>, tshark: impl Into<String>) -> Self {
        self.context.nmap_path = nmap.into();
        self.context.tshark_path = tshark.into();
        self
    }

    /// Directory for packet capture artifacts.
    #[must_use]
    pub fn with_capture_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.context.capture_dir = dir.into();
        self
    }

    /// Scan target.
    #[must_use]
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Validate `kind`, merge options and add the scanner.
    ///
    /// An unknown kind is rejected before anything is added.
    pub fn add_scanner(&mut self, kind: &str, options: ScanOptions) -> Result<()> {
        let kind: ScannerKind = kind
            .parse()
            .map_err(|_| ScanError::UnknownScannerKind(kind.to_string()))?;
        self.add(kind, &options);
        Ok(())
    }

    /// Add a scanner of a kind already known to be valid.
    pub fn add(&mut self, kind: ScannerKind, options: &ScanOptions) {
        let merged = self.defaults.merged_with(options);
        tracing::debug!(scanner = %kind, options = merged.len(), "Adding scanner");
        self.scanners
            .push(build_scanner(kind, self.target.clone(), &merged, &self.context));
    }

    /// Number of scanners added so far.
    #[must_use]
    pub fn scanner_count(&self) -> usize {
        self.scanners.len()
    }

    /// Kinds in the order they were added.
    #[must_use]
    pub fn kinds(&self) -> Vec<ScannerKind> {
        self.scanners.iter().map(|s| s.kind()).collect()
    }

    /// Run every scanner concurrently and wait for all of them.
    ///
    /// Individual scanner failures are recorded per kind and never stop
    /// siblings. If `cancel` fires first, in-flight scanners are aborted,
    /// recorded as cancelled, and the aggregate is marked `failed`.
    pub async fn run_all(self, cancel: CancellationToken) -> AggregateResult {
        let mut aggregate = AggregateResult::new(&self.target);
        aggregate.status = ScanStatus::Running;

        let kinds = self.kinds();
        let timeout = self.scanner_timeout;
        tracing::info!(
            scan_target = %self.target,
            scanners = kinds.len(),
            "Starting scan batch"
        );

        let mut pending: FuturesUnordered<_> = self
            .scanners
            .into_iter()
            .enumerate()
            .map(|(index, scanner)| async move { (index, run_scanner(scanner, timeout).await) })
            .collect();

        let mut slots: Vec<Option<ScannerOutcome>> = vec![None; kinds.len()];
        let mut cancelled = false;

        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                next = pending.next() => match next {
                    Some((index, outcome)) => {
                        if let Some(slot) = slots.get_mut(index) {
                            *slot = Some(outcome);
                        }
                    }
                    None => break,
                },
            }
        }

        // dropping the remaining futures aborts their scanner tasks
        drop(pending);

        for (kind, slot) in kinds.iter().zip(slots) {
            let outcome = slot.unwrap_or_else(|| {
                ScannerOutcome::Fault(ScannerFault::new(*kind, ScanError::Cancelled.to_string()))
            });
            aggregate.results.insert(*kind, outcome);
        }

        if cancelled {
            tracing::warn!(scan_target = %aggregate.target, "Scan batch cancelled");
            aggregate.status = ScanStatus::Failed;
            aggregate.error = Some(ScanError::Cancelled.to_string());
        } else {
            aggregate.status = ScanStatus::Completed;
            tracing::info!(
                scan_target = %aggregate.target,
                failed = aggregate.failed_scanners().len(),
                "Scan batch finished"
            );
        }

        aggregate
    }
}

impl std::fmt::Debug for ScannerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScannerManager")
            .field("target", &self.target)
            .field("defaults", &self.defaults)
            .field("context", &self.context)
            .field("scanner_timeout", &self.scanner_timeout)
            .field("kinds", &self.kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRunner;

    fn manager() -> ScannerManager {
        ScannerManager::new(
            Target::new("10.0.0.5").unwrap(),
            ScanOptions::new().with("ports", "1-100"),
            Arc::new(ScriptedRunner::new()),
        )
    }

    #[test]
    fn test_unknown_kind_leaves_manager_unchanged() {
        let mut m = manager();
        let err = m.add_scanner("bogus", ScanOptions::new()).unwrap_err();

        assert!(matches!(err, ScanError::UnknownScannerKind(ref k) if k == "bogus"));
        assert_eq!(m.scanner_count(), 0);
    }

    #[test]
    fn test_kinds_keep_addition_order() {
        let mut m = manager();
        m.add_scanner("network_analysis", ScanOptions::new()).unwrap();
        m.add_scanner("network", ScanOptions::new()).unwrap();

        assert_eq!(m.scanner_count(), 2);
        assert_eq!(
            m.kinds(),
            vec![ScannerKind::NetworkAnalysis, ScannerKind::Network]
        );
    }

    #[tokio::test]
    async fn test_empty_batch_completes() {
        let aggregate = manager().run_all(CancellationToken::new()).await;
        assert_eq!(aggregate.status, ScanStatus::Completed);
        assert!(aggregate.results.is_empty());
        assert!(aggregate.error.is_none());
    }

    #[tokio::test]
    async fn test_call_options_override_defaults() {
        let runner = Arc::new(ScriptedRunner::new());
        let mut m = ScannerManager::new(
            Target::new("10.0.0.5").unwrap(),
            ScanOptions::new().with("ports", "1-100").with("scan_type", "full"),
            runner.clone(),
        );
        m.add_scanner("network", ScanOptions::new().with("ports", "22"))
            .unwrap();

        m.run_all(CancellationToken::new()).await;

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].arg_after("-p"), Some("22"));
        assert!(calls[0].has_arg("-sC"));
    }
}
