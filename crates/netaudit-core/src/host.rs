//! Host prober (C6): for one target IP, establishes reachability via ping,
//! resolves identity (hostname, MAC, vendor, OS family), fans C5 out across
//! the configured port list, and turns banners into CVE matches through C2
//! and C3. Every step past ping is non-fatal — a failure just leaves the
//! field at N/D and the host is still reported ONLINE.

use crate::budget::SocketBudget;
use crate::cve_index::CveIndex;
use crate::fingerprint;
use crate::oui::{canonicalize_mac, OuiTable};
use crate::probes;
use futures::stream::{self, StreamExt};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::time::timeout as tokio_timeout;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HostStatus {
    Online,
    Offline,
}

impl std::fmt::Display for HostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HostStatus::Online => write!(f, "ONLINE"),
            HostStatus::Offline => write!(f, "OFFLINE"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OsFamily {
    LinuxUnix,
    Windows,
    CiscoAppliance,
    Unknown,
}

impl std::fmt::Display for OsFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OsFamily::LinuxUnix => "Linux/Unix",
            OsFamily::Windows => "Windows",
            OsFamily::CiscoAppliance => "Cisco/Appliance",
            OsFamily::Unknown => "Unknown",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HostResult {
    pub ip: String,
    pub status: HostStatus,
    pub hostname: Option<String>,
    pub mac: Option<String>,
    pub vendor: Option<String>,
    pub os_family: Option<OsFamily>,
    pub open_ports: Vec<u16>,
    pub banners: Vec<String>,
    pub vulns: BTreeSet<String>,
    pub latency_ms: f64,
    pub error: Option<String>,
}

impl HostResult {
    fn offline(ip: &str) -> Self {
        Self {
            ip: ip.to_string(),
            status: HostStatus::Offline,
            hostname: None,
            mac: None,
            vendor: None,
            os_family: None,
            open_ports: Vec::new(),
            banners: Vec::new(),
            vulns: BTreeSet::new(),
            latency_ms: -1.0,
            error: None,
        }
    }

    /// Synthetic record for a host whose probe exceeded the driver's
    /// per-host wall-clock budget (counted as a timeout for the governor).
    pub fn timed_out(ip: &str) -> Self {
        let mut result = Self::offline(ip);
        result.error = Some("probe exceeded wall-clock budget".to_string());
        result
    }
}

struct PingResult {
    ttl: u32,
    latency_ms: f64,
}

fn ttl_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)ttl[=:]\s*(\d+)").expect("valid regex"))
}

fn time_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(?:time|tempo)[=<]\s*([\d.,]+)").expect("valid regex"))
}

fn mac_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"([0-9a-fA-F]{2}(?:[:-][0-9a-fA-F]{2}){5})").expect("valid regex")
    })
}

/// Parses a ping command's combined stdout for a TTL and round-trip time.
/// Tolerant of both English (`ttl=`, `time=`) and Portuguese (`tempo=`)
/// output, since the hosts this tool targets are not assumed to run any
/// particular locale.
fn parse_ping_output(output: &str) -> Option<PingResult> {
    let ttl: u32 = ttl_re().captures(output)?.get(1)?.as_str().parse().ok()?;
    let latency_ms = time_re()
        .captures(output)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().replace(',', ".").parse().ok())
        .unwrap_or(0.0);
    Some(PingResult { ttl, latency_ms })
}

async fn ping_host(ip: &str) -> Option<PingResult> {
    let (program, args): (&str, Vec<&str>) = if cfg!(windows) {
        ("ping", vec!["-n", "1", "-w", "1000", ip])
    } else {
        ("ping", vec!["-c", "1", "-W", "1", ip])
    };

    let output = tokio_timeout(Duration::from_secs(3), Command::new(program).args(&args).output())
        .await
        .ok()?
        .ok()?;

    let combined = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    parse_ping_output(&combined)
}

/// Consults the ARP table: `ip neigh show <ip>` then `arp -n <ip>` on
/// Unix-likes, `arp -a <ip>` on Windows. Neither subprocess counts against
/// the socket budget.
async fn arp_lookup(ip: &str) -> Option<String> {
    let candidates: Vec<(&str, Vec<&str>)> = if cfg!(windows) {
        vec![("arp", vec!["-a", ip])]
    } else {
        vec![
            ("ip", vec!["neigh", "show", ip]),
            ("arp", vec!["-n", ip]),
        ]
    };

    for (program, args) in candidates {
        let Ok(Ok(output)) =
            tokio_timeout(Duration::from_secs(2), Command::new(program).args(&args).output()).await
        else {
            continue;
        };
        let text = String::from_utf8_lossy(&output.stdout);
        if let Some(caps) = mac_re().captures(&text) {
            if let Some(mac) = canonicalize_mac(caps.get(1).unwrap().as_str()) {
                return Some(mac);
            }
        }
    }
    None
}

/// Reverse DNS lookup via `getent hosts` (Unix) or `nslookup` (Windows and
/// as a Unix fallback when `getent` is unavailable). Non-fatal: any failure
/// just leaves the hostname at N/D.
async fn reverse_dns(ip: &str) -> Option<String> {
    if !cfg!(windows) {
        if let Ok(Ok(output)) = tokio_timeout(
            Duration::from_secs(2),
            Command::new("getent").args(["hosts", ip]).output(),
        )
        .await
        {
            if output.status.success() {
                let text = String::from_utf8_lossy(&output.stdout);
                if let Some(name) = text.split_whitespace().nth(1) {
                    return Some(name.trim_end_matches('.').to_string());
                }
            }
        }
    }

    let Ok(Ok(output)) =
        tokio_timeout(Duration::from_secs(2), Command::new("nslookup").arg(ip).output()).await
    else {
        return None;
    };
    let text = String::from_utf8_lossy(&output.stdout);
    for line in text.lines() {
        let lower = line.to_ascii_lowercase();
        if !lower.trim_start().starts_with("name") {
            continue;
        }
        if let Some((_, name)) = line.split_once([':', '=']) {
            let name = name.trim();
            if !name.is_empty() {
                return Some(name.trim_end_matches('.').to_string());
            }
        }
    }
    None
}

fn classify_os(ttl: u32) -> OsFamily {
    if ttl <= 70 {
        OsFamily::LinuxUnix
    } else if ttl <= 140 {
        OsFamily::Windows
    } else if ttl <= 255 {
        OsFamily::CiscoAppliance
    } else {
        OsFamily::Unknown
    }
}

async fn probe_port(
    ip: &str,
    port: u16,
    socket_timeout: Duration,
    budget: &SocketBudget,
    tcp_only: bool,
) -> Option<(u16, String)> {
    let permit = budget.acquire().await;
    let addr = format!("{ip}:{port}");
    let connected = tokio_timeout(socket_timeout, TcpStream::connect(&addr)).await;
    drop(permit);
    connected.ok()?.ok()?;

    // tcp_only skips the direct-TLS handshake entirely: a connect-only check
    // still records the port as open, just without a banner.
    if tcp_only && probes::DIRECT_TLS_PORTS.contains(&port) {
        return Some((port, "-".to_string()));
    }

    let banner = probes::grab_banner(ip, port, socket_timeout, budget)
        .await
        .unwrap_or_else(|| "-".to_string());
    Some((port, banner))
}

/// Probes one host end to end: ping, identity, port fan-out, and (unless
/// `skip_cve`) the banner-to-CVE pipeline. `port_concurrency` bounds how
/// many ports of this one host are probed at once; the process-wide
/// `budget` bounds total live sockets across every host in the batch.
#[allow(clippy::too_many_arguments)]
pub async fn probe_host(
    ip: &str,
    ports: &[u16],
    port_concurrency: u32,
    socket_timeout: Duration,
    resolve_hostname: bool,
    budget: &SocketBudget,
    cve_index: &CveIndex,
    oui: &OuiTable,
    skip_cve: bool,
    tcp_only: bool,
) -> HostResult {
    let started = Instant::now();
    let Some(ping) = ping_host(ip).await else {
        return HostResult::offline(ip);
    };

    let hostname = if resolve_hostname {
        reverse_dns(ip).await
    } else {
        None
    };
    let mac = arp_lookup(ip).await;
    let vendor = mac.as_deref().and_then(|m| oui.lookup(m)).map(str::to_string);
    let os_family = Some(classify_os(ping.ttl));

    let mut open: Vec<(u16, String)> = stream::iter(ports.iter().copied())
        .map(|port| {
            let budget = budget.clone();
            async move { probe_port(ip, port, socket_timeout, &budget, tcp_only).await }
        })
        .buffer_unordered(port_concurrency.max(1) as usize)
        .filter_map(|r| async move { r })
        .collect()
        .await;
    open.sort_by_key(|(port, _)| *port);

    let mut vulns = BTreeSet::new();
    if !skip_cve {
        for (_, banner) in &open {
            let Some(fp) = fingerprint::extract_fingerprint(banner) else {
                continue;
            };
            let matches = cve_index.query(&fp.vendor, &fp.product, fp.version.as_deref());
            for cve in matches.confirmed {
                vulns.insert(cve);
            }
            for cve in matches.suspected {
                vulns.insert(format!("{cve} (suspeita)"));
            }
        }
    }

    let open_ports = open.iter().map(|(p, _)| *p).collect();
    let banners = open
        .into_iter()
        .map(|(port, banner)| format!("{port}:{banner}"))
        .collect();

    let latency_ms = if ping.latency_ms > 0.0 {
        ping.latency_ms
    } else {
        started.elapsed().as_secs_f64() * 1000.0
    };

    HostResult {
        ip: ip.to_string(),
        status: HostStatus::Online,
        hostname,
        mac,
        vendor,
        os_family,
        open_ports,
        banners,
        vulns,
        latency_ms,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_english_ping_output() {
        let out = "64 bytes from 10.0.0.1: icmp_seq=1 ttl=64 time=0.456 ms";
        let p = parse_ping_output(out).unwrap();
        assert_eq!(p.ttl, 64);
        assert!((p.latency_ms - 0.456).abs() < 0.001);
    }

    #[test]
    fn parses_portuguese_ping_output() {
        let out = "64 bytes de 10.0.0.1: tempo=1,23 ms TTL=128";
        let p = parse_ping_output(out).unwrap();
        assert_eq!(p.ttl, 128);
        assert!((p.latency_ms - 1.23).abs() < 0.001);
    }

    #[test]
    fn missing_ttl_returns_none() {
        assert!(parse_ping_output("Request timed out.").is_none());
    }

    #[test]
    fn classifies_os_family_by_ttl() {
        assert_eq!(classify_os(64), OsFamily::LinuxUnix);
        assert_eq!(classify_os(128), OsFamily::Windows);
        assert_eq!(classify_os(255), OsFamily::CiscoAppliance);
    }

    #[test]
    fn extracts_mac_from_arp_style_line() {
        let text = "10.0.0.5 dev eth0 lladdr aa:bb:cc:dd:ee:ff REACHABLE";
        let caps = mac_re().captures(text).unwrap();
        assert_eq!(canonicalize_mac(caps.get(1).unwrap().as_str()).unwrap(), "aa:bb:cc:dd:ee:ff");
    }

    #[tokio::test]
    async fn offline_record_has_sentinel_latency_and_empty_lists() {
        let record = HostResult::offline("10.0.0.254");
        assert_eq!(record.status, HostStatus::Offline);
        assert_eq!(record.latency_ms, -1.0);
        assert!(record.open_ports.is_empty());
        assert!(record.banners.is_empty());
    }
}
