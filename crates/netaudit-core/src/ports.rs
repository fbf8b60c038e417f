//! Target port list: the fixed `PORTAS_COMUNS` set the host prober fans out
//! across by default, plus the CLI-facing `--ports`/`--ports-file` override
//! loader.

use crate::error::{NetAuditError, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// The fixed default port list: union, de-duplicated, ascending.
pub const PORTAS_COMUNS: &[u16] = &[
    20, 21, 22, 23, 25, 69, 80, 88, 110, 111, 135, 137, 138, 139, 143, 161, 162, 199, 389, 443,
    445, 465, 515, 587, 631, 636, 873, 993, 995, 1433, 1521, 1900, 2181, 3000, 3001, 3268, 3269,
    3306, 3389, 3702, 4000, 4001, 4200, 5000, 5173, 5353, 5355, 5432, 5601, 5900, 5985, 5986,
    6000, 6379, 7000, 8000, 8008, 8080, 8086, 8443, 8888, 9000, 9090, 9092, 9100, 9200, 9300,
    9443, 10000, 11211, 16101, 27017,
];

/// Ports flagged for downstream reporting emphasis only — not used for any
/// scanning decision.
pub const CRITICAL_PORTS: &[u16] = &[
    21, 23, 69, 135, 137, 138, 139, 389, 445, 1433, 1521, 3306, 3389, 5432, 5900, 5985, 5986,
    6379, 9200, 11211, 27017,
];

pub fn is_critical(port: u16) -> bool {
    CRITICAL_PORTS.contains(&port)
}

/// Merges an optional `--ports` CSV list and `--ports-file` file into an
/// ascending, de-duplicated port list, defaulting to `PORTAS_COMUNS` when
/// neither source supplies anything.
pub fn load_ports(ports: Option<&str>, ports_file: Option<&Path>) -> Result<Vec<u16>> {
    let mut values = BTreeSet::new();

    if let Some(raw) = ports {
        for part in raw.split(',') {
            if part.trim().is_empty() {
                continue;
            }
            values.insert(parse_port(part.trim())?);
        }
    }

    if let Some(path) = ports_file {
        let content = fs::read_to_string(path)?;
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            values.insert(parse_port(line)?);
        }
    }

    if values.is_empty() {
        values.extend(PORTAS_COMUNS);
    }

    Ok(values.into_iter().collect())
}

fn parse_port(value: &str) -> Result<u16> {
    let port = value
        .parse::<u16>()
        .map_err(|_| NetAuditError::InvalidPort(value.to_string()))?;
    if port == 0 {
        return Err(NetAuditError::InvalidPort(value.to_string()));
    }
    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::{load_ports, PORTAS_COMUNS};
    use std::fs;

    #[test]
    fn defaults_to_portas_comuns() {
        let ports = load_ports(None, None).unwrap();
        assert_eq!(ports, PORTAS_COMUNS);
    }

    #[test]
    fn portas_comuns_is_sorted_and_deduplicated() {
        let mut sorted = PORTAS_COMUNS.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted, PORTAS_COMUNS);
    }

    #[test]
    fn merges_sources() {
        let path = std::env::temp_dir().join("netaudit_ports_test.txt");
        fs::write(&path, "443\n8080\n").unwrap();
        let ports = load_ports(Some("22,80"), Some(path.as_path())).unwrap();
        assert_eq!(ports, vec![22, 80, 443, 8080]);
        let _ = fs::remove_file(path);
    }
}
