//! CSV writer (external collaborator, thin glue per the purpose-and-scope
//! boundary): renders `HostResult`s to the semicolon-delimited layout the
//! rest of the toolchain expects.

use crate::error::Result;
use crate::host::HostResult;
use csv::WriterBuilder;
use std::io::Write;
use std::path::Path;

const HEADER: &[&str] = &[
    "IP",
    "Status",
    "Hostname",
    "MAC",
    "Fabricante",
    "SO",
    "Portas",
    "Banners",
    "Vulnerabilidades",
    "Latência (ms)",
];

fn field_or_nd(value: &Option<impl ToString>) -> String {
    value.as_ref().map(|v| v.to_string()).unwrap_or_else(|| "N/D".to_string())
}

fn row_for(result: &HostResult) -> Vec<String> {
    let ports = result
        .open_ports
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(",");
    let banners = result.banners.join(",");
    let vulns = result.vulns.iter().cloned().collect::<Vec<_>>().join(",");
    let latency = if result.latency_ms < 0.0 {
        "-1".to_string()
    } else {
        format!("{:.1}", result.latency_ms)
    };

    vec![
        result.ip.clone(),
        result.status.to_string(),
        field_or_nd(&result.hostname),
        field_or_nd(&result.mac),
        field_or_nd(&result.vendor),
        field_or_nd(&result.os_family),
        ports,
        banners,
        vulns,
        latency,
    ]
}

/// Writes `results` to `path` as semicolon-delimited CSV with the exact
/// header the rest of the toolchain expects.
pub fn write_csv(results: &[HostResult], path: &Path) -> Result<()> {
    let mut writer = WriterBuilder::new().delimiter(b';').from_path(path)?;
    writer.write_record(HEADER)?;
    for result in results {
        writer.write_record(row_for(result))?;
    }
    writer.flush()?;
    Ok(())
}

/// Same as [`write_csv`] but to an arbitrary writer, used by tests and by
/// callers that want the CSV bytes in memory (e.g. piping to stdout).
pub fn write_csv_to<W: Write>(results: &[HostResult], writer: W) -> Result<()> {
    let mut writer = WriterBuilder::new().delimiter(b';').from_writer(writer);
    writer.write_record(HEADER)?;
    for result in results {
        writer.write_record(row_for(result))?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{HostStatus, OsFamily};
    use std::collections::BTreeSet;

    fn sample() -> HostResult {
        HostResult {
            ip: "10.0.0.10".to_string(),
            status: HostStatus::Online,
            hostname: Some("web01".to_string()),
            mac: Some("aa:bb:cc:dd:ee:ff".to_string()),
            vendor: Some("Example Corp".to_string()),
            os_family: Some(OsFamily::LinuxUnix),
            open_ports: vec![22, 80],
            banners: vec!["22:SSH-2.0-OpenSSH_8.2p1".to_string(), "80:Apache/2.4.49".to_string()],
            vulns: BTreeSet::from(["CVE-2021-41773".to_string()]),
            latency_ms: 1.25,
            error: None,
        }
    }

    #[test]
    fn header_matches_spec_exactly() {
        let mut buf = Vec::new();
        write_csv_to(&[], &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let first_line = text.lines().next().unwrap();
        assert_eq!(
            first_line,
            "IP;Status;Hostname;MAC;Fabricante;SO;Portas;Banners;Vulnerabilidades;Latência (ms)"
        );
    }

    #[test]
    fn online_row_joins_list_columns_with_commas() {
        let mut buf = Vec::new();
        write_csv_to(&[sample()], &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let row = text.lines().nth(1).unwrap();
        assert!(row.contains("22,80"));
        assert!(row.contains("CVE-2021-41773"));
        assert!(row.starts_with("10.0.0.10;ONLINE;web01;aa:bb:cc:dd:ee:ff;Example Corp;Linux/Unix;"));
    }

    #[test]
    fn offline_row_uses_nd_and_negative_latency() {
        let offline = HostResult {
            ip: "10.0.0.254".to_string(),
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
        };
        let mut buf = Vec::new();
        write_csv_to(&[offline], &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let row = text.lines().nth(1).unwrap();
        assert_eq!(row, "10.0.0.254;OFFLINE;N/D;N/D;N/D;N/D;;;;-1");
    }
}
