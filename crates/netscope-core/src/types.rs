//! Shared types used across netscope.
//!
//! This module defines the closed scanner vocabulary, the status state
//! machine shared by scan results and scan jobs, option maps and validated
//! scan targets.

use crate::error::NetscopeError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::OnceLock;

/// Closed set of scanner kinds.
///
/// The string form is the scanner identity used as the aggregation key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScannerKind {
    /// Port and service discovery
    Network,
    /// Known-vulnerability detection scripts
    Vulnerability,
    /// Packet capture and traffic summary
    NetworkAnalysis,
}

impl ScannerKind {
    /// Every scanner kind in canonical order.
    pub const ALL: [ScannerKind; 3] = [Self::Network, Self::Vulnerability, Self::NetworkAnalysis];

    /// Stable identity string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Vulnerability => "vulnerability",
            Self::NetworkAnalysis => "network_analysis",
        }
    }
}

impl fmt::Display for ScannerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScannerKind {
    type Err = NetscopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "network" => Ok(Self::Network),
            "vulnerability" => Ok(Self::Vulnerability),
            "network_analysis" => Ok(Self::NetworkAnalysis),
            other => Err(NetscopeError::UnknownScannerKind(other.to_string())),
        }
    }
}

/// Lifecycle status shared by scan results, aggregates and scan jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    /// Created, not yet started
    #[default]
    Pending,
    /// Work in progress
    Running,
    /// Finished and produced its output
    Completed,
    /// Finished without producing its output
    Failed,
}

impl ScanStatus {
    /// Stable lowercase name, as stored and serialized.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Whether no further transition is allowed.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Job state machine: `pending → running → completed | failed`.
    ///
    /// `pending → failed` is allowed for jobs whose driver never started.
    #[must_use]
    pub fn can_transition_to(self, next: ScanStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running | Self::Failed)
                | (Self::Running, Self::Completed | Self::Failed)
        )
    }

    /// States a job must currently be in to move to `next`.
    #[must_use]
    pub fn predecessors(next: ScanStatus) -> &'static [ScanStatus] {
        match next {
            Self::Pending => &[],
            Self::Running => &[Self::Pending],
            Self::Completed => &[Self::Running],
            Self::Failed => &[Self::Pending, Self::Running],
        }
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanStatus {
    type Err = NetscopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(NetscopeError::Validation(format!(
                "unknown scan status '{other}'"
            ))),
        }
    }
}

/// Scan category requested on the request surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanType {
    /// Every scanner kind
    Full,
    /// Network scanner only
    Network,
    /// Vulnerability scanner only
    Vulnerability,
    /// Network analyzer only
    NetworkAnalysis,
}

impl ScanType {
    /// Stable name, as stored on jobs and reports.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Network => "network",
            Self::Vulnerability => "vulnerability",
            Self::NetworkAnalysis => "network_analysis",
        }
    }
}

impl fmt::Display for ScanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanType {
    type Err = NetscopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(Self::Full),
            "network" => Ok(Self::Network),
            "vulnerability" => Ok(Self::Vulnerability),
            "network_analysis" => Ok(Self::NetworkAnalysis),
            other => Err(NetscopeError::InvalidScanType(other.to_string())),
        }
    }
}

/// Option map handed to scanners.
///
/// Values are JSON so the request surface can pass numbers, strings and lists
/// through unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScanOptions(BTreeMap<String, Value>);

impl ScanOptions {
    /// Empty option map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or replace one option.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Layer `overrides` on top of `self`; the override wins on key collision.
    #[must_use]
    pub fn merged_with(&self, overrides: &ScanOptions) -> ScanOptions {
        let mut merged = self.0.clone();
        merged.extend(overrides.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self(merged)
    }

    /// Raw value lookup.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// String option; numbers are rendered to their decimal form.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Unsigned integer option; numeric strings are accepted.
    #[must_use]
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// List option: a JSON array of strings or a comma-separated string.
    #[must_use]
    pub fn get_str_list(&self, key: &str) -> Vec<String> {
        match self.0.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .filter(|s| !s.is_empty())
                .collect(),
            Some(Value::String(s)) => s
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Number of options.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no options are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for ScanOptions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Validated scan target: hostname, IP address or CIDR block.
///
/// A target never starts with `-`, so it cannot be read as a tool flag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Target(String);

impl Target {
    /// Validate and wrap a target.
    ///
    /// # Errors
    /// Returns `NetscopeError::Validation` for empty, oversized or malformed targets.
    pub fn new(target: impl Into<String>) -> Result<Self, NetscopeError> {
        let target = target.into();
        Self::validate(&target)?;
        Ok(Self(target))
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(target: &str) -> Result<(), NetscopeError> {
        static TARGET_REGEX: OnceLock<Regex> = OnceLock::new();
        let regex = TARGET_REGEX.get_or_init(|| {
            Regex::new(r"^[A-Za-z0-9:\[][A-Za-z0-9._:\-\[\]]*(/[0-9]{1,3})?$")
                .expect("valid regex")
        });

        if target.is_empty() || target.len() > 253 {
            return Err(NetscopeError::Validation(format!(
                "invalid target: must be 1-253 characters, got {} characters",
                target.len()
            )));
        }

        if target.parse::<IpAddr>().is_ok() || regex.is_match(target) {
            Ok(())
        } else {
            Err(NetscopeError::Validation(format!(
                "invalid target: expected a hostname, IP address or CIDR block, got '{target}'"
            )))
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Target {
    type Error = NetscopeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Target> for String {
    fn from(target: Target) -> Self {
        target.0
    }
}
