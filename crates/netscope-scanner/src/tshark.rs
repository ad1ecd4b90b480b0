//! tshark JSON (`-T json`) parsing.

use crate::error::{Result, ScanError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrafficReport {
    pub summary: TrafficSummary,
    pub packets: Vec<PacketSummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrafficSummary {
    pub total_packets: usize,
    pub protocols: BTreeMap<String, u64>,
    pub ports: PortCounts,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortCounts {
    pub source: BTreeMap<String, u64>,
    pub destination: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketSummary {
    pub timestamp: String,
    pub protocol: String,
    pub source: Endpoint,
    pub destination: Endpoint,
    pub length: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub ip: String,
    pub port: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedCapture {
    pub report: TrafficReport,
    pub record_errors: Vec<String>,
}

/// First string value of a tshark field; repeated fields come as arrays.
fn field(layer: Option<&Map<String, Value>>, key: &str) -> Option<String> {
    match layer?.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => items.iter().find_map(|v| v.as_str().map(str::to_string)),
        _ => None,
    }
}

fn packet_summary(packet: &Value) -> std::result::Result<PacketSummary, String> {
    let layers = packet
        .get("_source")
        .and_then(|s| s.get("layers"))
        .and_then(Value::as_object)
        .ok_or("missing _source.layers")?;

    let layer = |name: &str| layers.get(name).and_then(Value::as_object);
    let frame = layer("frame");
    let (ip, src_key, dst_key, proto_key) = if let Some(ip) = layer("ip") {
        (Some(ip), "ip.src", "ip.dst", "ip.proto")
    } else if let Some(ip6) = layer("ipv6") {
        (Some(ip6), "ipv6.src", "ipv6.dst", "ipv6.nxt")
    } else {
        return Err("no IP layer".to_string());
    };

    let src_ip = field(ip, src_key).ok_or("missing source address")?;
    let dst_ip = field(ip, dst_key).ok_or("missing destination address")?;

    let port = |suffix: &str| {
        field(layer("tcp"), &format!("tcp.{suffix}"))
            .or_else(|| field(layer("udp"), &format!("udp.{suffix}")))
    };

    Ok(PacketSummary {
        timestamp: field(frame, "frame.time").unwrap_or_default(),
        protocol: field(ip, proto_key).unwrap_or_default(),
        source: Endpoint {
            ip: src_ip,
            port: port("srcport"),
        },
        destination: Endpoint {
            ip: dst_ip,
            port: port("dstport"),
        },
        length: field(frame, "frame.len").and_then(|l| l.parse().ok()),
    })
}

/// Parse `tshark -T json` output into per-protocol and per-port counts.
///
/// # Errors
/// Returns `ScanError::Parse` if the output is not a JSON array.
pub fn parse_tshark_json(output: &str) -> Result<ParsedCapture> {
    // tshark prints nothing at all when the display filter matches no packets
    if output.trim().is_empty() {
        return Ok(ParsedCapture::default());
    }

    let packets: Vec<Value> = serde_json::from_str(output)
        .map_err(|e| ScanError::Parse(format!("tshark output is not a JSON packet list: {e}")))?;

    let mut parsed = ParsedCapture::default();
    let summary = &mut parsed.report.summary;
    summary.total_packets = packets.len();

    for (index, packet) in packets.iter().enumerate() {
        match packet_summary(packet) {
            Ok(info) => {
                if !info.protocol.is_empty() {
                    *summary.protocols.entry(info.protocol.clone()).or_default() += 1;
                }
                if let Some(port) = &info.source.port {
                    *summary.ports.source.entry(port.clone()).or_default() += 1;
                }
                if let Some(port) = &info.destination.port {
                    *summary.ports.destination.entry(port.clone()).or_default() += 1;
                }
                parsed.report.packets.push(info);
            }
            Err(reason) => parsed
                .record_errors
                .push(format!("Error processing packet {index}: {reason}")),
        }
    }

    Ok(parsed)
}
