//! Known-vulnerability detection through nmap NSE scripts.

use super::network::run_nmap;
use super::{Scanner, ScannerContext};
use crate::command::{ToolInvocation, ToolRunner};
use crate::nmap::{self, Host, NmapSummary, Vulnerability};
use crate::result::ScanResult;
use async_trait::async_trait;
use netscope_core::{ScanOptions, ScanStatus, ScannerKind, Target};
use serde::Serialize;
use std::sync::Arc;

const DEFAULT_PORTS: &str = "1-1000";

#[derive(Debug, Serialize)]
struct VulnerabilityReport {
    hosts: Vec<Host>,
    summary: VulnerabilitySummary,
    vulnerabilities: Vec<Vulnerability>,
}

#[derive(Debug, Serialize)]
struct VulnerabilitySummary {
    #[serde(flatten)]
    hosts: NmapSummary,
    vulnerabilities: usize,
}

/// Known-vulnerability detection through nmap's `vuln` script category.
///
/// Options: `ports` (default `1-1000`), `scan_type` (`full` adds default
/// scripts), `scripts` (extra NSE scripts run alongside `vuln`).
pub struct VulnerabilityScanner {
    target: Target,
    ports: String,
    full: bool,
    scripts: Vec<String>,
    nmap_path: String,
    runner: Arc<dyn ToolRunner>,
    result: ScanResult,
}

impl VulnerabilityScanner {
    /// Build from merged options.
    #[must_use]
    pub fn new(target: Target, options: &ScanOptions, context: &ScannerContext) -> Self {
        let result = ScanResult::new(ScannerKind::Vulnerability, &target);
        Self {
            ports: options
                .get_str("ports")
                .unwrap_or_else(|| DEFAULT_PORTS.to_string()),
            full: options.get_str("scan_type").as_deref() == Some("full"),
            scripts: options.get_str_list("scripts"),
            nmap_path: context.nmap_path.clone(),
            runner: context.runner.clone(),
            target,
            result,
        }
    }

    /// The nmap command line this scanner runs.
    #[must_use]
    pub fn invocation(&self) -> ToolInvocation {
        let scripts = std::iter::once("vuln")
            .chain(self.scripts.iter().map(String::as_str).filter(|s| *s != "vuln"))
            .collect::<Vec<_>>()
            .join(",");

        let mut invocation = ToolInvocation::new(&self.nmap_path).arg("-sV");
        if self.full {
            invocation = invocation.arg("-sC");
        }
        invocation
            .args(["--script", scripts.as_str(), "-T4", "-p", self.ports.as_str()])
            .args(["-oX", "-", self.target.as_str()])
    }
}

#[async_trait]
impl Scanner for VulnerabilityScanner {
    fn kind(&self) -> ScannerKind {
        ScannerKind::Vulnerability
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
        tracing::info!(scan_target = %self.target, ports = %self.ports, "Starting vulnerability scan");

        if let Some(report) = run_nmap(self.runner.as_ref(), &invocation, &mut self.result).await {
            let vulnerabilities = nmap::extract_vulnerabilities(&report);
            tracing::info!(
                scan_target = %self.target,
                vulnerabilities = vulnerabilities.len(),
                "Vulnerability scan completed"
            );

            let payload = VulnerabilityReport {
                summary: VulnerabilitySummary {
                    hosts: report.summary,
                    vulnerabilities: vulnerabilities.len(),
                },
                hosts: report.hosts,
                vulnerabilities,
            };
            match serde_json::to_value(&payload) {
                Ok(payload) => self.result.complete(payload),
                Err(e) => self.result.fail(format!("Error encoding vulnerability results: {e}")),
            }
        }

        self.result.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ToolOutput;
    use crate::testing::ScriptedRunner;

    fn scanner(options: &ScanOptions, runner: Arc<ScriptedRunner>) -> VulnerabilityScanner {
        let context = ScannerContext::new(runner);
        VulnerabilityScanner::new(Target::new("10.0.0.5").unwrap(), options, &context)
    }

    #[test]
    fn test_invocation() {
        let s = scanner(&ScanOptions::new(), Arc::new(ScriptedRunner::new()));
        assert_eq!(
            s.invocation().args,
            vec!["-sV", "--script", "vuln", "-T4", "-p", "1-1000", "-oX", "-", "10.0.0.5"]
        );

        let options = ScanOptions::new()
            .with("scan_type", "full")
            .with("scripts", "vuln,vulners");
        let s = scanner(&options, Arc::new(ScriptedRunner::new()));
        let invocation = s.invocation();
        assert!(invocation.has_arg("-sC"));
        assert_eq!(invocation.arg_after("--script"), Some("vuln,vulners"));
    }

    #[tokio::test]
    async fn test_scan_reports_vulnerabilities() {
        let xml = r#"<nmaprun><host><status state="up"/><address addr="10.0.0.5" addrtype="ipv4"/>
            <ports><port protocol="tcp" portid="445"><state state="open"/><service name="microsoft-ds"/></port></ports>
            <hostscript><script id="smb-vuln-ms17-010" output="VULNERABLE: SMBv1 RCE">
              <elem key="state">VULNERABLE</elem>
              <table key="ids"><elem>CVE:CVE-2017-0143</elem></table>
            </script></hostscript>
            </host></nmaprun>"#;
        let runner = Arc::new(ScriptedRunner::new().on("nmap", ToolOutput::success(xml)));
        let mut s = scanner(&ScanOptions::new(), runner);

        let result = s.scan().await;
        assert_eq!(result.status(), ScanStatus::Completed);
        let payload = result.results().expect("payload");
        assert_eq!(payload["summary"]["vulnerabilities"], 1);
        assert_eq!(payload["summary"]["open_ports"], 1);
        assert_eq!(payload["vulnerabilities"][0]["ids"][0], "CVE-2017-0143");
    }

    #[tokio::test]
    async fn test_non_zero_exit() {
        let runner = Arc::new(
            ScriptedRunner::new().on("nmap", ToolOutput::failure(1, "NSE: failed to initialize the script engine")),
        );
        let mut s = scanner(&ScanOptions::new(), runner);

        let result = s.scan().await;
        assert_eq!(result.status(), ScanStatus::Failed);
        assert!(result.errors()[0]
            .message
            .contains("failed to initialize the script engine"));
    }
}
