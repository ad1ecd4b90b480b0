//! Batch orchestration tests driven by a scripted tool runner.

use netscope_core::{ScanOptions, ScanStatus, ScannerKind, Target};
use netscope_scanner::testing::{Response, ScriptedRunner};
use netscope_scanner::{ScanError, ScannerManager, ScannerOutcome, ToolOutput};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const NMAP_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<nmaprun scanner="nmap" args="nmap -sV -T4 -p 1-100 -oX - 10.0.0.5">
  <host>
    <status state="up" reason="echo-reply"/>
    <address addr="10.0.0.5" addrtype="ipv4"/>
    <hostnames><hostname name="gateway.lan" type="PTR"/></hostnames>
    <ports>
      <port protocol="tcp" portid="22">
        <state state="open" reason="syn-ack"/>
        <service name="ssh" product="OpenSSH" version="9.6"/>
      </port>
      <port protocol="tcp" portid="80">
        <state state="open" reason="syn-ack"/>
        <service name="http" product="nginx"/>
      </port>
    </ports>
  </host>
  <runstats><hosts up="1" down="0" total="1"/></runstats>
</nmaprun>"#;

fn manager(runner: ScriptedRunner) -> ScannerManager {
    ScannerManager::new(
        Target::new("10.0.0.5").expect("valid target"),
        ScanOptions::new(),
        Arc::new(runner),
    )
}

#[tokio::test]
async fn test_sibling_failure_does_not_fail_batch() {
    let runner = ScriptedRunner::new()
        .on_args(
            "nmap",
            "vuln",
            ToolOutput::failure(1, "NSE: failed to initialize the script engine"),
        )
        .on("nmap", ToolOutput::success(NMAP_XML));

    let mut m = manager(runner);
    m.add_scanner("network", ScanOptions::new().with("ports", "1-100"))
        .expect("network is a known kind");
    m.add_scanner("vulnerability", ScanOptions::new())
        .expect("vulnerability is a known kind");

    let aggregate = m.run_all(CancellationToken::new()).await;

    assert_eq!(aggregate.status, ScanStatus::Completed);
    assert!(aggregate.error.is_none());
    assert_eq!(aggregate.results.len(), 2);

    let network = aggregate
        .results
        .get(ScannerKind::Network)
        .and_then(ScannerOutcome::as_report)
        .expect("network result");
    assert_eq!(network.status(), ScanStatus::Completed);
    let payload = network.results().expect("network payload");
    assert_eq!(payload["summary"]["total_hosts"], 1);
    assert_eq!(payload["summary"]["open_ports"], 2);
    assert_eq!(payload["hosts"][0]["ip"], "10.0.0.5");

    let vulnerability = aggregate
        .results
        .get(ScannerKind::Vulnerability)
        .expect("vulnerability entry");
    assert_eq!(vulnerability.status(), ScanStatus::Failed);
    assert!(vulnerability
        .error_messages()
        .iter()
        .any(|m| m.contains("failed to initialize the script engine")));

    assert_eq!(aggregate.failed_scanners(), vec![ScannerKind::Vulnerability]);
}

#[tokio::test]
async fn test_unknown_kind_is_configuration_error() {
    let mut m = manager(ScriptedRunner::new());

    let err = m
        .add_scanner("bogus", ScanOptions::new())
        .expect_err("bogus is not a scanner kind");

    assert!(matches!(err, ScanError::UnknownScannerKind(_)));
    assert_eq!(m.scanner_count(), 0);
}

#[tokio::test]
async fn test_key_set_matches_added_kinds() {
    let dir = tempfile::tempdir().expect("tempdir");
    let runner = ScriptedRunner::new()
        .on("nmap", ToolOutput::success(NMAP_XML))
        .capture_on_args("tshark", "-w", ToolOutput::success(""))
        .on_args("tshark", "-r", ToolOutput::success("[]"));

    let mut m = manager(runner).with_capture_dir(dir.path());
    for kind in ["network_analysis", "network", "vulnerability"] {
        m.add_scanner(kind, ScanOptions::new()).expect("known kind");
    }

    let aggregate = m.run_all(CancellationToken::new()).await;

    let keys: BTreeSet<_> = aggregate.results.keys().collect();
    assert_eq!(keys, ScannerKind::ALL.into_iter().collect::<BTreeSet<_>>());
    assert_eq!(
        aggregate.results.keys().collect::<Vec<_>>(),
        vec![
            ScannerKind::NetworkAnalysis,
            ScannerKind::Network,
            ScannerKind::Vulnerability
        ]
    );
    assert!(!aggregate.has_failures());
}

#[tokio::test]
async fn test_panicking_scanner_is_isolated() {
    let runner = ScriptedRunner::new()
        .respond("nmap", Some("vuln"), Response::Panic("index out of bounds".into()))
        .on("nmap", ToolOutput::success(NMAP_XML));

    let mut m = manager(runner);
    m.add_scanner("vulnerability", ScanOptions::new()).expect("known kind");
    m.add_scanner("network", ScanOptions::new()).expect("known kind");

    let aggregate = m.run_all(CancellationToken::new()).await;

    assert_eq!(aggregate.status, ScanStatus::Completed);
    match aggregate.results.get(ScannerKind::Vulnerability) {
        Some(ScannerOutcome::Fault(fault)) => {
            assert_eq!(fault.status, ScanStatus::Failed);
            assert!(fault.error.contains("index out of bounds"));
        }
        other => panic!("expected a fault record, got {other:?}"),
    }
    assert_eq!(
        aggregate.results.get(ScannerKind::Network).map(ScannerOutcome::status),
        Some(ScanStatus::Completed)
    );
}

#[tokio::test]
async fn test_duplicate_kind_last_write_wins() {
    let runner = ScriptedRunner::new()
        .on_args("nmap", "1-100", ToolOutput::failure(1, "first run"))
        .on("nmap", ToolOutput::success(NMAP_XML));

    let mut m = manager(runner);
    m.add_scanner("network", ScanOptions::new().with("ports", "1-100"))
        .expect("known kind");
    m.add_scanner("network", ScanOptions::new().with("ports", "22"))
        .expect("known kind");
    assert_eq!(m.scanner_count(), 2);

    let aggregate = m.run_all(CancellationToken::new()).await;

    assert_eq!(aggregate.results.len(), 1);
    assert_eq!(
        aggregate.results.get(ScannerKind::Network).map(ScannerOutcome::status),
        Some(ScanStatus::Completed)
    );
}

#[tokio::test]
async fn test_cancellation_fails_batch() {
    let runner = ScriptedRunner::new()
        .on_args("nmap", "vuln", ToolOutput::failure(1, "quick failure"))
        .hang_on("nmap");

    let mut m = manager(runner);
    m.add_scanner("network", ScanOptions::new()).expect("known kind");
    m.add_scanner("vulnerability", ScanOptions::new()).expect("known kind");

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let aggregate = m.run_all(cancel).await;

    assert_eq!(aggregate.status, ScanStatus::Failed);
    assert_eq!(
        aggregate.error.as_deref(),
        Some("scan cancelled before completion")
    );
    assert_eq!(aggregate.results.len(), 2);
    match aggregate.results.get(ScannerKind::Network) {
        Some(ScannerOutcome::Fault(fault)) => {
            assert_eq!(fault.error, "scan cancelled before completion");
        }
        other => panic!("expected a cancellation record, got {other:?}"),
    }
    assert_eq!(
        aggregate
            .results
            .get(ScannerKind::Vulnerability)
            .map(ScannerOutcome::status),
        Some(ScanStatus::Failed)
    );
}

#[tokio::test]
async fn test_supervisory_timeout() {
    let mut m = manager(ScriptedRunner::new().hang_on("nmap"))
        .with_scanner_timeout(Some(Duration::from_millis(50)));
    m.add_scanner("network", ScanOptions::new()).expect("known kind");

    let aggregate = m.run_all(CancellationToken::new()).await;

    assert_eq!(aggregate.status, ScanStatus::Completed);
    let network = aggregate
        .results
        .get(ScannerKind::Network)
        .and_then(ScannerOutcome::as_report)
        .expect("timed out scanner still reports");
    assert_eq!(network.status(), ScanStatus::Failed);
    assert!(network.errors()[0].message.contains("timed out"));
}
