//! Scan requests and the scanner sets they expand to.

use crate::error::{JobError, Result};
use netscope_core::{ScanOptions, ScanType, ScannerKind, Target};
use serde::{Deserialize, Serialize};

/// A scan request as received from a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRequest {
    /// One of `full`, `network`, `vulnerability`, `network_analysis`
    pub scan_type: String,
    /// Host, address or CIDR block to scan
    pub target: String,
    /// Options applied to every scanner of the job
    #[serde(default)]
    pub parameters: ScanOptions,
}

impl ScanRequest {
    /// Request with no extra parameters.
    #[must_use]
    pub fn new(scan_type: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            scan_type: scan_type.into(),
            target: target.into(),
            parameters: ScanOptions::new(),
        }
    }

    /// Builder-style parameter.
    #[must_use]
    pub fn with_parameters(mut self, parameters: ScanOptions) -> Self {
        self.parameters = parameters;
        self
    }

    /// Validate the request and expand it into scanners.
    ///
    /// # Errors
    /// `InvalidScanType` for an unknown scan type, `InvalidTarget` for a
    /// target that is empty or could be read as a tool flag.
    pub fn plan(&self) -> Result<ScanPlan> {
        let scan_type: ScanType = self
            .scan_type
            .parse()
            .map_err(|_| JobError::InvalidScanType(self.scan_type.clone()))?;
        let target =
            Target::new(self.target.as_str()).map_err(|e| JobError::InvalidTarget(e.to_string()))?;

        Ok(ScanPlan {
            scan_type,
            target,
            parameters: self.parameters.clone(),
            scanners: scanners_for(scan_type, &self.parameters),
        })
    }
}

/// A validated request: the scanners to run and their per-scanner options.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanPlan {
    /// Requested category
    pub scan_type: ScanType,
    /// Validated target
    pub target: Target,
    /// Request-wide options, the manager defaults
    pub parameters: ScanOptions,
    /// Scanner kinds with the options that override the defaults
    pub scanners: Vec<(ScannerKind, ScanOptions)>,
}

/// Per-kind options for `scan_type`.
///
/// The full scan's wider port range is only a default: a request that names
/// its own `ports` keeps them for every scanner.
fn scanners_for(scan_type: ScanType, parameters: &ScanOptions) -> Vec<(ScannerKind, ScanOptions)> {
    let network = || ScanOptions::new().with("scan_type", "full");
    let vulnerability = || ScanOptions::new().with("scan_type", "full");
    let analysis = || ScanOptions::new().with("duration", 300);

    match scan_type {
        ScanType::Network => vec![(ScannerKind::Network, network())],
        ScanType::Vulnerability => vec![(ScannerKind::Vulnerability, vulnerability())],
        ScanType::NetworkAnalysis => vec![(ScannerKind::NetworkAnalysis, analysis())],
        ScanType::Full => {
            let mut full_network = network();
            if parameters.get("ports").is_none() {
                full_network.insert("ports", "1-10000");
            }
            vec![
                (ScannerKind::Network, full_network),
                (ScannerKind::Vulnerability, vulnerability()),
                (ScannerKind::NetworkAnalysis, analysis()),
            ]
        }
    }
}
