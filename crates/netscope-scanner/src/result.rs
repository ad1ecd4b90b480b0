//! Scan result documents.
//!
//! A [`ScanResult`] is the in-progress record a scanner mutates while it runs.
//! The manager folds every scanner's outcome into one [`AggregateResult`] keyed
//! by [`ScannerKind`].

use chrono::{DateTime, Utc};
use netscope_core::{ScanStatus, ScannerKind, Target};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;
use std::fmt;

/// One recorded failure, timestamped when it was added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEntry {
    /// Human-readable failure description
    pub message: String,
    /// When the error was recorded
    pub timestamp: DateTime<Utc>,
}

/// Structured output of a single scanner run.
///
/// The status is `completed` only after [`ScanResult::complete`] stored a
/// payload. Errors are append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    scanner: ScannerKind,
    target: String,
    timestamp: DateTime<Utc>,
    status: ScanStatus,
    #[serde(default)]
    results: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    errors: Vec<ErrorEntry>,
}

impl ScanResult {
    /// Fresh `pending` result for `scanner` against `target`.
    #[must_use]
    pub fn new(scanner: ScannerKind, target: &Target) -> Self {
        Self {
            scanner,
            target: target.to_string(),
            timestamp: Utc::now(),
            status: ScanStatus::Pending,
            results: None,
            errors: Vec::new(),
        }
    }

    /// Scanner identity.
    #[must_use]
    pub fn scanner(&self) -> ScannerKind {
        self.scanner
    }

    /// Scan target.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Creation time of this result.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> ScanStatus {
        self.status
    }

    /// Domain payload, present once the scan produced one.
    #[must_use]
    pub fn results(&self) -> Option<&JsonValue> {
        self.results.as_ref()
    }

    /// Recorded errors in insertion order.
    #[must_use]
    pub fn errors(&self) -> &[ErrorEntry] {
        &self.errors
    }

    /// Set the status.
    ///
    /// Marking a result `completed` without a payload records an error and
    /// marks it `failed` instead.
    pub fn update_status(&mut self, status: ScanStatus) {
        if status == ScanStatus::Completed && self.results.is_none() {
            self.add_error("scan reported completion without producing results");
            self.status = ScanStatus::Failed;
            return;
        }
        self.status = status;
    }

    /// Append an error entry. Earlier entries are never touched.
    pub fn add_error(&mut self, message: impl Into<String>) {
        self.errors.push(ErrorEntry {
            message: message.into(),
            timestamp: Utc::now(),
        });
    }

    /// Store the payload and mark the result `completed`.
    pub fn complete(&mut self, payload: JsonValue) {
        self.results = Some(payload);
        self.status = ScanStatus::Completed;
    }

    /// Record `message` and mark the result `failed`.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.add_error(message);
        self.status = ScanStatus::Failed;
    }
}

/// Failure record synthesized when a scanner crashed before producing a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannerFault {
    /// Scanner identity
    pub scanner: ScannerKind,
    /// Always `failed`
    pub status: ScanStatus,
    /// What went wrong
    pub error: String,
}

impl ScannerFault {
    /// Build a `failed` fault record.
    #[must_use]
    pub fn new(scanner: ScannerKind, error: impl Into<String>) -> Self {
        Self {
            scanner,
            status: ScanStatus::Failed,
            error: error.into(),
        }
    }
}

/// What one scanner contributed to the aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScannerOutcome {
    /// The scanner ran and returned its result (completed or failed)
    Report(ScanResult),
    /// The scanner crashed or was cancelled before returning
    Fault(ScannerFault),
}

impl ScannerOutcome {
    /// Scanner identity.
    #[must_use]
    pub fn scanner(&self) -> ScannerKind {
        match self {
            Self::Report(result) => result.scanner(),
            Self::Fault(fault) => fault.scanner,
        }
    }

    /// Terminal status of this scanner.
    #[must_use]
    pub fn status(&self) -> ScanStatus {
        match self {
            Self::Report(result) => result.status(),
            Self::Fault(fault) => fault.status,
        }
    }

    /// Error messages recorded for this scanner.
    #[must_use]
    pub fn error_messages(&self) -> Vec<&str> {
        match self {
            Self::Report(result) => result.errors().iter().map(|e| e.message.as_str()).collect(),
            Self::Fault(fault) => vec![fault.error.as_str()],
        }
    }

    /// The full result, if the scanner returned one.
    #[must_use]
    pub fn as_report(&self) -> Option<&ScanResult> {
        match self {
            Self::Report(result) => Some(result),
            Self::Fault(_) => None,
        }
    }
}

/// Scanner outcomes keyed by identity, kept in the order keys were first added.
///
/// Inserting an existing key replaces its value in place (last write wins).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScannerResults {
    entries: Vec<(ScannerKind, ScannerOutcome)>,
}

impl ScannerResults {
    /// Empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the outcome for `kind`, returning the previous one.
    pub fn insert(&mut self, kind: ScannerKind, outcome: ScannerOutcome) -> Option<ScannerOutcome> {
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == kind) {
            return Some(std::mem::replace(&mut slot.1, outcome));
        }
        self.entries.push((kind, outcome));
        None
    }

    /// Outcome for `kind`.
    #[must_use]
    pub fn get(&self, kind: ScannerKind) -> Option<&ScannerOutcome> {
        self.entries
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, outcome)| outcome)
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = ScannerKind> + '_ {
        self.entries.iter().map(|(k, _)| *k)
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (ScannerKind, &ScannerOutcome)> {
        self.entries.iter().map(|(k, outcome)| (*k, outcome))
    }

    /// Number of scanners recorded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for ScannerResults {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (kind, outcome) in &self.entries {
            map.serialize_entry(kind, outcome)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ScannerResults {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ResultsVisitor;

        impl<'de> Visitor<'de> for ResultsVisitor {
            type Value = ScannerResults;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map from scanner identity to scan result")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut results = ScannerResults::new();
                while let Some((kind, outcome)) =
                    access.next_entry::<ScannerKind, ScannerOutcome>()?
                {
                    results.insert(kind, outcome);
                }
                Ok(results)
            }
        }

        deserializer.deserialize_map(ResultsVisitor)
    }
}

/// Combined output of one orchestration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    /// Scan target
    pub target: String,
    /// When the run was created
    pub timestamp: DateTime<Utc>,
    /// `completed` when every scanner reached a terminal state, `failed` on
    /// orchestration faults
    pub status: ScanStatus,
    /// Per-scanner outcomes
    pub results: ScannerResults,
    /// Orchestration-level error, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AggregateResult {
    /// Empty `pending` aggregate for `target`.
    #[must_use]
    pub fn new(target: &Target) -> Self {
        Self {
            target: target.to_string(),
            timestamp: Utc::now(),
            status: ScanStatus::Pending,
            results: ScannerResults::new(),
            error: None,
        }
    }

    /// Whether any scanner ended `failed`.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.results
            .iter()
            .any(|(_, outcome)| outcome.status() == ScanStatus::Failed)
    }

    /// Scanners that ended `failed`, in insertion order.
    #[must_use]
    pub fn failed_scanners(&self) -> Vec<ScannerKind> {
        self.results
            .iter()
            .filter(|(_, outcome)| outcome.status() == ScanStatus::Failed)
            .map(|(kind, _)| kind)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn target() -> Target {
        Target::new("10.0.0.5").unwrap()
    }

    #[test]
    fn test_errors_only_grow() {
        let mut result = ScanResult::new(ScannerKind::Network, &target());
        result.add_error("first");
        result.update_status(ScanStatus::Running);
        result.add_error("second");
        result.update_status(ScanStatus::Running);
        result.fail("third");

        let messages: Vec<_> = result.errors().iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["first", "second", "third"]);
        assert_eq!(result.status(), ScanStatus::Failed);
    }

    #[test]
    fn test_completed_requires_payload() {
        let mut result = ScanResult::new(ScannerKind::Vulnerability, &target());
        result.update_status(ScanStatus::Completed);
        assert_eq!(result.status(), ScanStatus::Failed);
        assert_eq!(result.errors().len(), 1);

        let mut result = ScanResult::new(ScannerKind::Vulnerability, &target());
        result.add_error("skipped one record");
        result.complete(json!({"hosts": []}));
        assert_eq!(result.status(), ScanStatus::Completed);
        assert_eq!(result.errors().len(), 1);
    }

    #[test]
    fn test_scanner_results_keep_order_and_last_write_wins() {
        let t = target();
        let mut results = ScannerResults::new();
        results.insert(
            ScannerKind::Vulnerability,
            ScannerOutcome::Fault(ScannerFault::new(ScannerKind::Vulnerability, "boom")),
        );
        results.insert(
            ScannerKind::Network,
            ScannerOutcome::Report(ScanResult::new(ScannerKind::Network, &t)),
        );

        let mut replacement = ScanResult::new(ScannerKind::Vulnerability, &t);
        replacement.complete(json!({"vulnerabilities": []}));
        let previous = results.insert(
            ScannerKind::Vulnerability,
            ScannerOutcome::Report(replacement),
        );

        assert!(matches!(previous, Some(ScannerOutcome::Fault(_))));
        assert_eq!(
            results.keys().collect::<Vec<_>>(),
            vec![ScannerKind::Vulnerability, ScannerKind::Network]
        );
        assert_eq!(
            results.get(ScannerKind::Vulnerability).unwrap().status(),
            ScanStatus::Completed
        );
    }

    #[test]
    fn test_aggregate_serde_preserves_outcomes() {
        let t = target();
        let mut network = ScanResult::new(ScannerKind::Network, &t);
        network.add_error("Skipped port record: missing state");
        network.complete(json!({"hosts": [], "summary": {"total_hosts": 0}}));

        let mut aggregate = AggregateResult::new(&t);
        aggregate.status = ScanStatus::Completed;
        aggregate
            .results
            .insert(ScannerKind::Network, ScannerOutcome::Report(network));
        aggregate.results.insert(
            ScannerKind::NetworkAnalysis,
            ScannerOutcome::Fault(ScannerFault::new(
                ScannerKind::NetworkAnalysis,
                "scanner panicked: index out of bounds",
            )),
        );

        let value = serde_json::to_value(&aggregate).unwrap();
        assert_eq!(value["results"]["network_analysis"]["status"], "failed");
        assert_eq!(
            value["results"]["network_analysis"]["error"],
            "scanner panicked: index out of bounds"
        );
        assert_eq!(value["results"]["network"]["scanner"], "network");
        assert!(value.get("error").is_none());

        let decoded: AggregateResult = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, aggregate);
        assert_eq!(decoded.failed_scanners(), vec![ScannerKind::NetworkAnalysis]);
    }
}
