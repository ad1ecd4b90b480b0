//! nmap XML (`-oX`) parsing.
//!
//! Records that cannot be interpreted (a port without a state, a host without
//! an address) are skipped and reported through [`ParsedNmap::record_errors`].
//! Only a document that is not nmap XML at all is a parse failure.

use crate::error::{Result, ScanError};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Parsed nmap run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NmapReport {
    pub hosts: Vec<Host>,
    pub summary: NmapSummary,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NmapSummary {
    pub total_hosts: usize,
    pub up_hosts: usize,
    pub open_ports: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Host {
    pub ip: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hostnames: Vec<String>,
    pub ports: Vec<Port>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scripts: Vec<ScriptOutput>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Port {
    pub number: u16,
    pub protocol: String,
    pub state: String,
    pub service: Service,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scripts: Vec<ScriptOutput>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub name: Option<String>,
    pub product: Option<String>,
    pub version: Option<String>,
}

/// Output of one NSE script.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptOutput {
    pub id: String,
    pub output: String,
    /// Value of a nested `<elem key="state">`, when the script reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Identifiers (CVE and similar) found in the script's structured output
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<String>,
}

/// A vulnerability reported by an NSE script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vulnerability {
    pub host: String,
    pub port: Option<u16>,
    pub script: String,
    pub state: String,
    pub output: String,
    pub ids: Vec<String>,
}

/// Parser output: the report plus one message per skipped record.
#[derive(Debug, Clone, Default)]
pub struct ParsedNmap {
    pub report: NmapReport,
    pub record_errors: Vec<String>,
}

#[derive(Default)]
struct PortBuilder {
    portid: Option<String>,
    protocol: Option<String>,
    state: Option<String>,
    service: Service,
    scripts: Vec<ScriptOutput>,
}

#[derive(Default)]
struct HostBuilder {
    ip: Option<String>,
    mac: Option<String>,
    status: Option<String>,
    hostnames: Vec<String>,
    ports: Vec<Port>,
    scripts: Vec<ScriptOutput>,
}

#[derive(Default)]
struct NmapParser {
    saw_root: bool,
    host: Option<HostBuilder>,
    port: Option<PortBuilder>,
    script: Option<ScriptOutput>,
    elem_key: Option<String>,
    parsed: ParsedNmap,
}

fn attr(e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == name)
        .and_then(|a| a.unescape_value().ok())
        .map(|v| v.into_owned())
}

fn identifier_regex() -> &'static Regex {
    static IDS: OnceLock<Regex> = OnceLock::new();
    IDS.get_or_init(|| {
        Regex::new(r"\b(CVE-\d{4}-\d{4,}|MS\d{2}-\d{3}|BID:\d+|OSVDB:\d+)\b").expect("valid regex")
    })
}

fn push_ids(ids: &mut Vec<String>, text: &str) {
    for m in identifier_regex().find_iter(text) {
        let id = m.as_str().to_string();
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
}

impl NmapParser {
    fn open(&mut self, e: &BytesStart<'_>) {
        match e.name().as_ref() {
            b"nmaprun" => self.saw_root = true,
            b"host" => self.host = Some(HostBuilder::default()),
            b"status" => {
                if let Some(host) = self.host.as_mut() {
                    host.status = attr(e, b"state");
                }
            }
            b"address" => {
                if let Some(host) = self.host.as_mut() {
                    let addr = attr(e, b"addr");
                    match attr(e, b"addrtype").as_deref() {
                        Some("mac") => host.mac = addr,
                        _ if host.ip.is_none() => host.ip = addr,
                        _ => {}
                    }
                }
            }
            b"hostname" => {
                if let (Some(host), Some(name)) = (self.host.as_mut(), attr(e, b"name")) {
                    if !host.hostnames.contains(&name) {
                        host.hostnames.push(name);
                    }
                }
            }
            b"port" => {
                if self.host.is_some() {
                    self.port = Some(PortBuilder {
                        portid: attr(e, b"portid"),
                        protocol: attr(e, b"protocol"),
                        ..PortBuilder::default()
                    });
                }
            }
            b"state" => {
                if let Some(port) = self.port.as_mut() {
                    port.state = attr(e, b"state");
                }
            }
            b"service" => {
                if let Some(port) = self.port.as_mut() {
                    port.service = Service {
                        name: attr(e, b"name"),
                        product: attr(e, b"product"),
                        version: attr(e, b"version"),
                    };
                }
            }
            b"script" => {
                if self.host.is_some() {
                    let output = attr(e, b"output").unwrap_or_default();
                    let mut ids = Vec::new();
                    push_ids(&mut ids, &output);
                    self.script = Some(ScriptOutput {
                        id: attr(e, b"id").unwrap_or_default(),
                        output,
                        state: None,
                        ids,
                    });
                }
            }
            b"elem" => self.elem_key = attr(e, b"key"),
            b"table" => {
                // <table key="CVE-2017-0143"> names the vulnerability it describes
                if let (Some(script), Some(key)) = (self.script.as_mut(), attr(e, b"key")) {
                    push_ids(&mut script.ids, &key);
                }
            }
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        if let Some(script) = self.script.as_mut() {
            if self.elem_key.as_deref() == Some("state") {
                script.state = Some(text.to_string());
            }
            push_ids(&mut script.ids, text);
        }
    }

    fn close(&mut self, name: &[u8]) {
        match name {
            b"elem" => self.elem_key = None,
            b"script" => {
                if let Some(script) = self.script.take() {
                    if let Some(port) = self.port.as_mut() {
                        port.scripts.push(script);
                    } else if let Some(host) = self.host.as_mut() {
                        host.scripts.push(script);
                    }
                }
            }
            b"port" => {
                if let Some(port) = self.port.take() {
                    self.finish_port(port);
                }
            }
            b"host" => {
                if let Some(host) = self.host.take() {
                    self.finish_host(host);
                }
            }
            _ => {}
        }
    }

    fn finish_port(&mut self, port: PortBuilder) {
        let Some(host) = self.host.as_mut() else {
            return;
        };
        let portid = port.portid.unwrap_or_default();
        let Ok(number) = portid.parse::<u16>() else {
            self.parsed
                .record_errors
                .push(format!("Skipped port record with invalid port id '{portid}'"));
            return;
        };
        let Some(state) = port.state else {
            self.parsed
                .record_errors
                .push(format!("Skipped port {number}: missing state"));
            return;
        };
        host.ports.push(Port {
            number,
            protocol: port.protocol.unwrap_or_else(|| "tcp".to_string()),
            state,
            service: port.service,
            scripts: port.scripts,
        });
    }

    fn finish_host(&mut self, host: HostBuilder) {
        let Some(ip) = host.ip.or(host.mac) else {
            self.parsed
                .record_errors
                .push("Skipped host record without an address".to_string());
            return;
        };
        let status = host.status.unwrap_or_else(|| "unknown".to_string());

        let summary = &mut self.parsed.report.summary;
        summary.total_hosts += 1;
        if status == "up" {
            summary.up_hosts += 1;
        }
        summary.open_ports += host.ports.iter().filter(|p| p.state == "open").count();

        self.parsed.report.hosts.push(Host {
            ip,
            status,
            hostnames: host.hostnames,
            ports: host.ports,
            scripts: host.scripts,
        });
    }
}

/// Parse `nmap -oX` output.
///
/// # Errors
/// Returns `ScanError::Parse` when the document is malformed XML or has no
/// `<nmaprun>` root.
pub fn parse_nmap_xml(xml: &str) -> Result<ParsedNmap> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut parser = NmapParser::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => parser.open(&e),
            Ok(Event::Empty(e)) => {
                parser.open(&e);
                parser.close(e.name().as_ref());
            }
            Ok(Event::End(e)) => parser.close(e.name().as_ref()),
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|err| ScanError::Parse(format!("invalid text in nmap XML: {err}")))?;
                parser.text(&text);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(ScanError::Parse(format!(
                    "invalid nmap XML at byte {}: {e}",
                    reader.buffer_position()
                )))
            }
        }
        buf.clear();
    }

    if !parser.saw_root {
        return Err(ScanError::Parse(
            "output is not nmap XML (no <nmaprun> element)".to_string(),
        ));
    }

    Ok(parser.parsed)
}

/// Vulnerabilities reported by NSE scripts across `report`.
///
/// Scripts whose output says `NOT VULNERABLE` are left out; a script is
/// reported when it says `VULNERABLE`, carries a vulnerable state element, or
/// names at least one identifier.
#[must_use]
pub fn extract_vulnerabilities(report: &NmapReport) -> Vec<Vulnerability> {
    let mut found = Vec::new();
    for host in &report.hosts {
        let host_scripts = host.scripts.iter().map(|s| (None, s));
        let port_scripts = host
            .ports
            .iter()
            .flat_map(|p| p.scripts.iter().map(move |s| (Some(p.number), s)));

        for (port, script) in host_scripts.chain(port_scripts) {
            if let Some(state) = vulnerability_state(script) {
                found.push(Vulnerability {
                    host: host.ip.clone(),
                    port,
                    script: script.id.clone(),
                    state,
                    output: script.output.trim().to_string(),
                    ids: script.ids.clone(),
                });
            }
        }
    }
    found
}

fn vulnerability_state(script: &ScriptOutput) -> Option<String> {
    let output = script.output.to_uppercase();
    if output.contains("NOT VULNERABLE") {
        return None;
    }
    if let Some(state) = &script.state {
        let upper = state.to_uppercase();
        if upper.starts_with("NOT VULNERABLE") {
            return None;
        }
        if upper.contains("VULNERABLE") {
            return Some(state.clone());
        }
    }
    if output.contains("VULNERABLE") {
        return Some("VULNERABLE".to_string());
    }
    if !script.ids.is_empty() {
        return Some("LIKELY VULNERABLE".to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE nmaprun>
<nmaprun scanner="nmap" args="nmap -sV -T4 -p 1-100 -oX - 10.0.0.5" version="7.94">
  <host starttime="1700000000" endtime="1700000010">
    <status state="up" reason="echo-reply"/>
    <address addr="10.0.0.5" addrtype="ipv4"/>
    <address addr="AA:BB:CC:DD:EE:FF" addrtype="mac"/>
    <hostnames><hostname name="db.internal" type="PTR"/></hostnames>
    <ports>
      <extraports state="closed" count="97"/>
      <port protocol="tcp" portid="22">
        <state state="open" reason="syn-ack"/>
        <service name="ssh" product="OpenSSH" version="8.9p1"/>
      </port>
      <port protocol="tcp" portid="80">
        <state state="open" reason="syn-ack"/>
        <service name="http" product="nginx" version="1.18.0"/>
      </port>
      <port protocol="tcp" portid="81">
        <state state="filtered" reason="no-response"/>
        <service name="hosts2-ns"/>
      </port>
    </ports>
  </host>
  <host>
    <status state="down" reason="no-response"/>
    <address addr="10.0.0.6" addrtype="ipv4"/>
  </host>
</nmaprun>"#;

    #[test]
    fn test_parse_hosts_and_summary() {
        let parsed = parse_nmap_xml(SAMPLE).expect("parse sample");
        let report = parsed.report;

        assert!(parsed.record_errors.is_empty());
        assert_eq!(report.hosts.len(), 2);
        assert_eq!(
            report.summary,
            NmapSummary {
                total_hosts: 2,
                up_hosts: 1,
                open_ports: 2
            }
        );

        let host = &report.hosts[0];
        assert_eq!(host.ip, "10.0.0.5");
        assert_eq!(host.status, "up");
        assert_eq!(host.hostnames, vec!["db.internal"]);
        assert_eq!(host.ports.len(), 3);
        assert_eq!(host.ports[0].number, 22);
        assert_eq!(host.ports[0].service.product.as_deref(), Some("OpenSSH"));
        assert_eq!(host.ports[2].state, "filtered");
        assert_eq!(host.ports[2].service.version, None);
    }

    #[test]
    fn test_bad_records_are_skipped() {
        let xml = r#"<nmaprun>
          <host>
            <status state="up"/>
            <address addr="10.0.0.5" addrtype="ipv4"/>
            <ports>
              <port protocol="tcp" portid="http"><state state="open"/></port>
              <port protocol="tcp" portid="443"><service name="https"/></port>
              <port protocol="tcp" portid="8080"><state state="open"/></port>
            </ports>
          </host>
          <host><status state="up"/></host>
        </nmaprun>"#;

        let parsed = parse_nmap_xml(xml).expect("parse");
        assert_eq!(parsed.report.hosts.len(), 1);
        assert_eq!(parsed.report.hosts[0].ports.len(), 1);
        assert_eq!(parsed.report.hosts[0].ports[0].number, 8080);
        assert_eq!(parsed.report.summary.open_ports, 1);
        assert_eq!(parsed.record_errors.len(), 3);
        assert!(parsed.record_errors[0].contains("'http'"));
        assert!(parsed.record_errors[1].contains("443"));
        assert!(parsed.record_errors[2].contains("without an address"));
    }

    #[test]
    fn test_malformed_xml_is_parse_error() {
        let result = parse_nmap_xml("<nmaprun><host></nmaprun>");
        assert!(matches!(result, Err(ScanError::Parse(_))));
    }

    #[test]
    fn test_non_nmap_output_is_parse_error() {
        let result = parse_nmap_xml("Starting Nmap 7.94 ( https://nmap.org )");
        assert!(matches!(result, Err(ScanError::Parse(_))));
    }

    #[test]
    fn test_extract_vulnerabilities() {
        let xml = r#"<nmaprun>
          <host>
            <status state="up"/>
            <address addr="10.0.0.5" addrtype="ipv4"/>
            <ports>
              <port protocol="tcp" portid="443">
                <state state="open"/>
                <service name="https"/>
                <script id="ssl-heartbleed" output="&#xa;  VULNERABLE:&#xa;  The Heartbleed Bug&#xa;    State: VULNERABLE&#xa;    IDs:  CVE:CVE-2014-0160&#xa;">
                  <table key="CVE-2014-0160">
                    <elem key="title">The Heartbleed Bug</elem>
                    <elem key="state">VULNERABLE</elem>
                  </table>
                </script>
                <script id="ssl-ccs-injection" output="No reply from server (TIMEOUT)"/>
              </port>
              <port protocol="tcp" portid="80">
                <state state="open"/>
                <service name="http"/>
                <script id="http-vuln-cve2017-5638" output="NOT VULNERABLE"/>
              </port>
            </ports>
            <hostscript>
              <script id="smb-vuln-ms17-010" output="VULNERABLE: Remote Code Execution vulnerability in Microsoft SMBv1 servers (ms17-010)">
                <elem key="state">VULNERABLE</elem>
                <table key="ids"><elem>CVE:CVE-2017-0143</elem></table>
              </script>
            </hostscript>
          </host>
        </nmaprun>"#;

        let parsed = parse_nmap_xml(xml).expect("parse");
        let vulns = extract_vulnerabilities(&parsed.report);

        assert_eq!(vulns.len(), 2);
        let smb = vulns.iter().find(|v| v.script == "smb-vuln-ms17-010").unwrap();
        assert_eq!(smb.port, None);
        assert_eq!(smb.state, "VULNERABLE");
        assert_eq!(smb.ids, vec!["CVE-2017-0143"]);

        let heartbleed = vulns.iter().find(|v| v.script == "ssl-heartbleed").unwrap();
        assert_eq!(heartbleed.port, Some(443));
        assert_eq!(heartbleed.host, "10.0.0.5");
        assert_eq!(heartbleed.ids, vec!["CVE-2014-0160"]);
    }
}
