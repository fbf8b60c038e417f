//! Probe library (C5): per-port request payloads, direct-TLS handling, and
//! banner cleanup.

use crate::budget::SocketBudget;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout as tokio_timeout;

/// Ports that speak TLS from the first byte, as opposed to a STARTTLS
/// upgrade over an initially-plaintext connection.
pub const DIRECT_TLS_PORTS: &[u16] = &[443, 465, 990, 993, 995];

const MAX_BANNER_BYTES: usize = 2048;

/// Returns the request payload to send after connecting to `port`, or
/// `None` for ports where the core should just listen for the server to
/// speak first.
pub fn request_payload(port: u16) -> Option<&'static [u8]> {
    match port {
        22 => Some(b"\r\n"),
        21 => Some(b"FEAT\r\n"),
        25 | 587 => Some(b"EHLO example.com\r\n"),
        80 | 8000 | 8080 | 8443 | 8888 => {
            Some(b"HEAD / HTTP/1.0\r\nHost: localhost\r\n\r\n")
        }
        110 => Some(b"USER test\r\n"),
        143 => Some(b". CAPABILITY\r\n"),
        _ => None,
    }
}

/// Cleans a raw banner: control characters collapse to spaces, `;`
/// becomes `,`, the result is trimmed, and an empty banner becomes `"-"`.
pub fn clean_banner(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(&raw[..raw.len().min(MAX_BANNER_BYTES)]);
    let cleaned: String = text
        .chars()
        .map(|c| match c {
            ';' => ',',
            c if c.is_control() => ' ',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        "-".to_string()
    } else {
        trimmed.chars().take(MAX_BANNER_BYTES).collect()
    }
}

/// Connects to `ip:port` under the socket budget, sends the protocol
/// payload (if any) or, for direct-TLS ports, performs a TLS handshake
/// first, and reads up to one recv's worth of banner. Certificate
/// verification failures never abort the probe — they are treated the same
/// as "no banner available".
pub async fn grab_banner(
    ip: &str,
    port: u16,
    socket_timeout: Duration,
    budget: &SocketBudget,
) -> Option<String> {
    let _permit = budget.acquire().await;
    let addr = format!("{ip}:{port}");

    let fut = async {
        if DIRECT_TLS_PORTS.contains(&port) {
            grab_tls_banner(ip, &addr, port).await
        } else {
            grab_plain_banner(&addr, port).await
        }
    };

    tokio_timeout(socket_timeout, fut).await.ok().flatten()
}

async fn grab_plain_banner(addr: &str, port: u16) -> Option<String> {
    let mut stream = TcpStream::connect(addr).await.ok()?;
    if let Some(payload) = request_payload(port) {
        stream.write_all(payload).await.ok()?;
    }
    let mut buf = vec![0u8; MAX_BANNER_BYTES];
    let n = stream.read(&mut buf).await.ok()?;
    Some(clean_banner(&buf[..n]))
}

async fn grab_tls_banner(ip: &str, addr: &str, port: u16) -> Option<String> {
    let stream = TcpStream::connect(addr).await.ok()?;
    let connector = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .build()
        .ok()?;
    let connector = tokio_native_tls::TlsConnector::from(connector);
    let mut tls_stream = connector.connect(ip, stream).await.ok()?;

    if port == 443 {
        tls_stream
            .write_all(b"HEAD / HTTP/1.0\r\nHost: localhost\r\n\r\n")
            .await
            .ok()?;
    }

    let mut buf = vec![0u8; MAX_BANNER_BYTES];
    let n = tls_stream.read(&mut buf).await.ok()?;
    Some(clean_banner(&buf[..n]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleans_control_characters_and_semicolons() {
        assert_eq!(clean_banner(b"Apache/2.4.49\r\nServer;Test\n"), "Apache/2.4.49 Server,Test");
    }

    #[test]
    fn empty_banner_becomes_dash() {
        assert_eq!(clean_banner(b"\r\n\r\n"), "-");
    }

    #[test]
    fn known_ports_have_payloads() {
        assert_eq!(request_payload(22), Some(&b"\r\n"[..]));
        assert_eq!(request_payload(21), Some(&b"FEAT\r\n"[..]));
        assert!(request_payload(9999).is_none());
    }

    #[test]
    fn direct_tls_ports_match_spec_set() {
        for p in [443u16, 465, 990, 993, 995] {
            assert!(DIRECT_TLS_PORTS.contains(&p));
        }
        assert!(!DIRECT_TLS_PORTS.contains(&80));
    }
}
