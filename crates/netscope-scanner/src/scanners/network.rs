//! Port and service discovery through nmap.

use super::{Scanner, ScannerContext};
use crate::command::{ToolInvocation, ToolRunner};
use crate::nmap::{self, NmapReport};
use crate::result::ScanResult;
use async_trait::async_trait;
use netscope_core::{ScanOptions, ScanStatus, ScannerKind, Target};
use std::sync::Arc;

const DEFAULT_PORTS: &str = "1-1000";

/// nmap flag profile selected by the `scan_type` option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanProfile {
    /// Service detection, aggressive timing
    Quick,
    /// Service detection plus default scripts
    Full,
    /// Full plus the `vuln` script category
    Vulnerability,
    /// Same flags as full; callers add scripts
    Custom,
    /// Unrecognized profile name, falls back to quick flags
    Default,
}

impl ScanProfile {
    /// Profile for a `scan_type` option value; `None` means quick.
    #[must_use]
    pub fn from_option(value: Option<&str>) -> Self {
        match value {
            None | Some("quick") => Self::Quick,
            Some("full") => Self::Full,
            Some("vulnerability") => Self::Vulnerability,
            Some("custom") => Self::Custom,
            Some(_) => Self::Default,
        }
    }

    /// Flags, one argv entry each, excluding scripts.
    #[must_use]
    pub fn flags(self) -> &'static [&'static str] {
        match self {
            Self::Quick | Self::Default => &["-sV", "-T4"],
            Self::Full | Self::Custom | Self::Vulnerability => &["-sV", "-sC", "-T4"],
        }
    }

    /// NSE scripts the profile always runs.
    #[must_use]
    pub fn scripts(self) -> &'static [&'static str] {
        match self {
            Self::Vulnerability => &["vuln"],
            _ => &[],
        }
    }
}

/// Port and service discovery through nmap.
///
/// Options: `scan_type` (quick, full, vulnerability, custom; default quick),
/// `ports` (default `1-1000`), `scripts` (extra NSE scripts).
pub struct NetworkScanner {
    target: Target,
    profile: ScanProfile,
    ports: String,
    scripts: Vec<String>,
    nmap_path: String,
    runner: Arc<dyn ToolRunner>,
    result: ScanResult,
}

impl NetworkScanner {
    /// Build from merged options.
    #[must_use]
    pub fn new(target: Target, options: &ScanOptions, context: &ScannerContext) -> Self {
        let result = ScanResult::new(ScannerKind::Network, &target);
        Self {
            profile: ScanProfile::from_option(options.get_str("scan_type").as_deref()),
            ports: options
                .get_str("ports")
                .unwrap_or_else(|| DEFAULT_PORTS.to_string()),
            scripts: options.get_str_list("scripts"),
            nmap_path: context.nmap_path.clone(),
            runner: context.runner.clone(),
            target,
            result,
        }
    }

    /// Selected flag profile.
    #[must_use]
    pub fn profile(&self) -> ScanProfile {
        self.profile
    }

    /// Port range passed to `-p`.
    #[must_use]
    pub fn ports(&self) -> &str {
        &self.ports
    }

    /// The nmap command line this scanner runs.
    #[must_use]
    pub fn invocation(&self) -> ToolInvocation {
        let scripts: Vec<&str> = self
            .profile
            .scripts()
            .iter()
            .copied()
            .chain(self.scripts.iter().map(String::as_str))
            .collect();

        let mut invocation =
            ToolInvocation::new(&self.nmap_path).args(self.profile.flags().iter().copied());
        if !scripts.is_empty() {
            invocation = invocation.arg("--script").arg(scripts.join(","));
        }
        invocation
            .args(["-p", self.ports.as_str(), "-oX", "-"])
            .arg(self.target.as_str())
    }
}

/// Run nmap and parse its XML, recording every failure into `result`.
///
/// Returns `None` when the result has been marked failed.
pub(crate) async fn run_nmap(
    runner: &dyn ToolRunner,
    invocation: &ToolInvocation,
    result: &mut ScanResult,
) -> Option<NmapReport> {
    let output = match runner.run(invocation).await {
        Ok(output) => output,
        Err(e) => {
            tracing::warn!(scan_target = %result.target(), error = %e, "nmap invocation failed");
            result.fail(format!("Nmap error: {e}"));
            return None;
        }
    };

    if !output.succeeded() {
        let reason = output.failure_reason();
        tracing::warn!(
            scan_target = %result.target(),
            exit_code = ?output.exit_code,
            "nmap exited with an error"
        );
        result.fail(format!("Nmap error: {reason}"));
        return None;
    }

    match nmap::parse_nmap_xml(&output.stdout_str()) {
        Ok(parsed) => {
            for message in parsed.record_errors {
                result.add_error(message);
            }
            Some(parsed.report)
        }
        Err(e) => {
            result.fail(format!("Error parsing nmap results: {e}"));
            None
        }
    }
}

#[async_trait]
impl Scanner for NetworkScanner {
    fn kind(&self) -> ScannerKind {
        ScannerKind::Network
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
        let invocation = self.invocation();
        tracing::info!(
            scan_target = %self.target,
            ports = %self.ports,
            profile = ?self.profile,
            "Starting network scan"
        );

        if let Some(report) = run_nmap(self.runner.as_ref(), &invocation, &mut self.result).await {
            match serde_json::to_value(&report) {
                Ok(payload) => {
                    tracing::info!(
                        scan_target = %self.target,
                        hosts = report.summary.total_hosts,
                        open_ports = report.summary.open_ports,
                        "Network scan completed"
                    );
                    self.result.complete(payload);
                }
                Err(e) => self.result.fail(format!("Error encoding nmap results: {e}")),
            }
        }

        self.result.clone()
    }
}
