//! Bounded packet capture and per-target traffic analysis through tshark.

use super::{Scanner, ScannerContext};
use crate::command::{ToolInvocation, ToolRunner};
use crate::error::ScanError;
use crate::result::ScanResult;
use crate::tshark;
use async_trait::async_trait;
use chrono::Utc;
use netscope_core::{ScanOptions, ScanStatus, ScannerKind, Target};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_DURATION_SECS: u64 = 60;

/// Extra time tshark gets past `-a duration:N` before the runner kills it.
const CAPTURE_GRACE: Duration = Duration::from_secs(30);

/// Capture file that is removed when the guard goes out of scope.
///
/// Dropping the scan future (abort, cancellation) therefore cleans up too.
struct CaptureArtifact {
    path: PathBuf,
}

impl CaptureArtifact {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn exists(&self) -> bool {
        self.path.is_file()
    }
}

impl Drop for CaptureArtifact {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Removed capture file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::debug!(
                path = %self.path.display(),
                error = %e,
                "Could not remove capture file"
            ),
        }
    }
}

/// Passive traffic capture with tshark, then a filtered read-back.
///
/// Options: `interface` (configured default), `duration` seconds (default
/// 60), `pcap_file` (default a unique file in the capture directory).
pub struct NetworkAnalyzer {
    target: Target,
    interface: String,
    duration: u64,
    capture_path: PathBuf,
    tshark_path: String,
    runner: Arc<dyn ToolRunner>,
    result: ScanResult,
}

impl NetworkAnalyzer {
    /// Build from merged options.
    #[must_use]
    pub fn new(target: Target, options: &ScanOptions, context: &ScannerContext) -> Self {
        let result = ScanResult::new(ScannerKind::NetworkAnalysis, &target);
        let capture_path = options.get_str("pcap_file").map_or_else(
            || default_capture_path(&context.capture_dir),
            PathBuf::from,
        );

        Self {
            interface: options
                .get_str("interface")
                .unwrap_or_else(|| context.default_interface.clone()),
            duration: options.get_u64("duration").unwrap_or(DEFAULT_DURATION_SECS),
            capture_path,
            tshark_path: context.tshark_path.clone(),
            runner: context.runner.clone(),
            target,
            result,
        }
    }

    /// Capture length in seconds.
    #[must_use]
    pub fn duration(&self) -> u64 {
        self.duration
    }

    /// Where the capture is written.
    #[must_use]
    pub fn capture_path(&self) -> &Path {
        &self.capture_path
    }

    /// The bounded capture command.
    #[must_use]
    pub fn capture_invocation(&self) -> ToolInvocation {
        ToolInvocation::new(&self.tshark_path)
            .args(["-i", self.interface.as_str(), "-w"])
            .arg(self.capture_path.to_string_lossy())
            .args(["-a".to_string(), format!("duration:{}", self.duration)])
            .timeout(Duration::from_secs(self.duration) + CAPTURE_GRACE)
    }

    /// The read-back command, filtered to packets involving the target.
    #[must_use]
    pub fn analysis_invocation(&self) -> ToolInvocation {
        ToolInvocation::new(&self.tshark_path)
            .arg("-r")
            .arg(self.capture_path.to_string_lossy())
            .args(["-T", "json", "-Y"])
            .arg(self.display_filter())
    }

    fn display_filter(&self) -> String {
        let field = if self.target.as_str().contains(':') {
            "ipv6.addr"
        } else {
            "ip.addr"
        };
        format!("{field} == {}", self.target)
    }

    async fn capture(&mut self, artifact: &CaptureArtifact) -> bool {
        let output = match self.runner.run(&self.capture_invocation()).await {
            Ok(output) => output,
            Err(e) => {
                self.result.fail(format!("Analysis error: {e}"));
                return false;
            }
        };

        if !output.succeeded() {
            self.result
                .fail(format!("Analysis error: {}", output.failure_reason()));
            return false;
        }

        if !artifact.exists() {
            tracing::warn!(path = %artifact.path().display(), "tshark produced no capture file");
            let stderr = output.stderr_str();
            let reason = if stderr.trim().is_empty() {
                ScanError::MissingArtifact {
                    path: artifact.path().to_path_buf(),
                }
                .to_string()
            } else {
                stderr.trim().to_string()
            };
            self.result
                .fail(format!("Failed to create capture file: {reason}"));
            return false;
        }

        true
    }

    async fn analyze(&mut self) {
        let output = match self.runner.run(&self.analysis_invocation()).await {
            Ok(output) => output,
            Err(e) => {
                self.result.fail(format!("Analysis error: {e}"));
                return;
            }
        };

        if !output.succeeded() {
            self.result
                .fail(format!("Analysis error: {}", output.failure_reason()));
            return;
        }

        let parsed = match tshark::parse_tshark_json(&output.stdout_str()) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.result
                    .fail(format!("Error parsing capture results: {e}"));
                return;
            }
        };

        for message in parsed.record_errors {
            self.result.add_error(message);
        }

        match serde_json::to_value(&parsed.report) {
            Ok(payload) => {
                tracing::info!(
                    scan_target = %self.target,
                    packets = parsed.report.summary.total_packets,
                    "Traffic analysis completed"
                );
                self.result.complete(payload);
            }
            Err(e) => self
                .result
                .fail(format!("Error encoding capture results: {e}")),
        }
    }
}

fn default_capture_path(dir: &Path) -> PathBuf {
    let stamp = Utc::now().format("%Y%m%d_%H%M%S");
    let id = uuid::Uuid::new_v4().simple().to_string();
    dir.join(format!("capture_{stamp}_{}.pcap", &id[..8]))
}

#[async_trait]
impl Scanner for NetworkAnalyzer {
    fn kind(&self) -> ScannerKind {
        ScannerKind::NetworkAnalysis
    }

    fn target(&self) -> &Target {
        &self.target
    }

    fn result(&self) -> &ScanResult {
        &self.result
    }

    fn result_mut(&mut self) -> &mut ScanResult {
        &mut self.result
    }

    async fn scan(&mut self) -> ScanResult {
        self.update_status(ScanStatus::Running);
        tracing::info!(
            scan_target = %self.target,
            interface = %self.interface,
            duration = self.duration,
            "Starting packet capture"
        );

        let artifact = CaptureArtifact::new(self.capture_path.clone());
        if self.capture(&artifact).await {
            self.analyze().await;
        }
        drop(artifact);

        self.result.clone()
    }
}
