//! Scanner capability and its variants.
//!
//! The set of scanners is closed: one variant per [`ScannerKind`], built by
//! [`build_scanner`]. Adding a scanner means adding a kind and a match arm.

mod analyzer;
mod network;
mod vulnerability;

pub use analyzer::NetworkAnalyzer;
pub use network::{NetworkScanner, ScanProfile};
pub use vulnerability::VulnerabilityScanner;

use crate::command::ToolRunner;
use crate::result::ScanResult;
use async_trait::async_trait;
use netscope_core::{AppConfig, ScanOptions, ScannerKind, Target};
use std::path::PathBuf;
use std::sync::Arc;

/// A unit of scan work backed by one external tool.
///
/// `scan` records expected failures (missing tool, non-zero exit, malformed
/// output) into the returned result instead of returning an error.
#[async_trait]
pub trait Scanner: Send {
    /// Scanner identity.
    fn kind(&self) -> ScannerKind;

    /// Scan target.
    fn target(&self) -> &Target;

    /// The in-progress result.
    fn result(&self) -> &ScanResult;

    /// Mutable access to the in-progress result.
    fn result_mut(&mut self) -> &mut ScanResult;

    /// Run the scan to completion and return its result.
    async fn scan(&mut self) -> ScanResult;

    /// Set the in-progress status.
    fn update_status(&mut self, status: netscope_core::ScanStatus) {
        self.result_mut().update_status(status);
    }

    /// Append an error to the in-progress result.
    fn add_error(&mut self, message: &str) {
        self.result_mut().add_error(message);
    }
}

/// Everything a scanner needs besides its target and options.
#[derive(Clone)]
pub struct ScannerContext {
    /// External tool invocation
    pub runner: Arc<dyn ToolRunner>,
    /// nmap executable
    pub nmap_path: String,
    /// tshark executable
    pub tshark_path: String,
    /// Where capture artifacts are written
    pub capture_dir: PathBuf,
    /// Capture interface when options name none
    pub default_interface: String,
}

impl ScannerContext {
    /// Context with default tool names and the OS temp dir for captures.
    #[must_use]
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self::from_config(runner, &AppConfig::default())
    }

    /// Context taking tool paths and capture settings from `config`.
    #[must_use]
    pub fn from_config(runner: Arc<dyn ToolRunner>, config: &AppConfig) -> Self {
        Self {
            runner,
            nmap_path: config.tools.nmap_path.clone(),
            tshark_path: config.tools.tshark_path.clone(),
            capture_dir: config.scanning.capture_dir(),
            default_interface: config.scanning.default_interface.clone(),
        }
    }
}

impl std::fmt::Debug for ScannerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScannerContext")
            .field("nmap_path", &self.nmap_path)
            .field("tshark_path", &self.tshark_path)
            .field("capture_dir", &self.capture_dir)
            .field("default_interface", &self.default_interface)
            .finish_non_exhaustive()
    }
}

/// Construct the scanner variant for `kind`.
#[must_use]
pub fn build_scanner(
    kind: ScannerKind,
    target: Target,
    options: &ScanOptions,
    context: &ScannerContext,
) -> Box<dyn Scanner> {
    match kind {
        ScannerKind::Network => Box::new(NetworkScanner::new(target, options, context)),
        ScannerKind::Vulnerability => Box::new(VulnerabilityScanner::new(target, options, context)),
        ScannerKind::NetworkAnalysis => Box::new(NetworkAnalyzer::new(target, options, context)),
    }
}
