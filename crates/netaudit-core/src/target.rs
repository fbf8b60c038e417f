use crate::error::{NetAuditError, Result};
use ipnet::Ipv4Net;
use std::net::Ipv4Addr;
use std::str::FromStr;

const MAX_EXPANDED_TARGETS: usize = 65536;

/// Expands a single IPv4 literal, a IPv4 CIDR block, or a `start-end` IPv4
/// range into the ordered list of targets the driver will walk.
pub fn parse_targets(input: &str) -> Result<Vec<String>> {
    let input = input.trim();

    if let Ok(ip) = Ipv4Addr::from_str(input) {
        return Ok(vec![ip.to_string()]);
    }

    if let Ok(net) = Ipv4Net::from_str(input) {
        let mut out: Vec<String> = net.hosts().map(|ip| ip.to_string()).collect();
        if out.is_empty() {
            // a /32 has no "hosts" under ipnet's definition; treat it as one target.
            out.push(net.addr().to_string());
        }
        if out.len() > MAX_EXPANDED_TARGETS {
            return Err(NetAuditError::InvalidTarget(format!(
                "CIDR expands beyond {MAX_EXPANDED_TARGETS} hosts"
            )));
        }
        return Ok(out);
    }

    if let Some((start, end)) = input.split_once('-') {
        let start = Ipv4Addr::from_str(start.trim())
            .map_err(|_| NetAuditError::InvalidTarget(input.to_string()))?;
        let end = Ipv4Addr::from_str(end.trim())
            .map_err(|_| NetAuditError::InvalidTarget(input.to_string()))?;
        return expand_ip_range(start, end);
    }

    Err(NetAuditError::InvalidTarget(input.to_string()))
}

fn expand_ip_range(start: Ipv4Addr, end: Ipv4Addr) -> Result<Vec<String>> {
    let s = u32::from(start);
    let e = u32::from(end);
    if s > e {
        return Err(NetAuditError::InvalidTarget(
            "range start must be <= range end".to_string(),
        ));
    }
    let mut out = Vec::new();
    for value in s..=e {
        out.push(Ipv4Addr::from(value).to_string());
        if out.len() > MAX_EXPANDED_TARGETS {
            return Err(NetAuditError::InvalidTarget(format!(
                "range expands beyond {MAX_EXPANDED_TARGETS} hosts"
            )));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::parse_targets;

    #[test]
    fn parses_single_ip() {
        let t = parse_targets("10.0.0.10").unwrap();
        assert_eq!(t, vec!["10.0.0.10"]);
    }

    #[test]
    fn parses_cidr() {
        let t = parse_targets("192.168.1.0/30").unwrap();
        assert_eq!(t, vec!["192.168.1.1", "192.168.1.2"]);
    }

    #[test]
    fn parses_range() {
        let t = parse_targets("10.0.0.1-10.0.0.3").unwrap();
        assert_eq!(t.len(), 3);
    }

    #[test]
    fn rejects_inverted_range() {
        assert!(parse_targets("10.0.0.5-10.0.0.1").is_err());
    }

    #[test]
    fn rejects_ipv6() {
        assert!(parse_targets("::1").is_err());
    }
}
