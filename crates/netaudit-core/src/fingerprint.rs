//! Banner parser (C2): extracts `(product, version)` from a raw banner and
//! normalizes the product name to the `(vendor, product)` pair NVD's CPE
//! taxonomy uses.

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

/// `(vendor, product, version?)` derived from a single banner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fingerprint {
    pub vendor: String,
    pub product: String,
    pub version: Option<String>,
}

fn slash_form_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)([A-Za-z0-9_-]+)[/ ]v?(\d+(?:\.\d+){0,3}(?:[-_][0-9A-Za-z.]+)?)")
            .expect("valid regex")
    })
}

fn underscore_form_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"([A-Za-z0-9_-]+)_([0-9][0-9a-zA-Z.-]*)").expect("valid regex")
    })
}

/// Canonical `(vendor, product)` for well-known services. Anything not
/// listed here normalizes to `(name, name)` with spaces replaced by
/// underscores, so the CVE index can still be queried (just less
/// precisely).
const NORMALIZATION_TABLE: &[(&str, &str, &str)] = &[
    ("openssh", "openbsd", "openssh"),
    ("apache", "apache", "http_server"),
    ("nginx", "nginx", "nginx"),
    ("mysql", "oracle", "mysql"),
    ("mariadb", "mariadb", "mariadb"),
    ("postgresql", "postgresql", "postgresql"),
    ("postgres", "postgresql", "postgresql"),
    ("proftpd", "proftpd", "proftpd"),
    ("pure-ftpd", "pureftpd", "pure-ftpd"),
    ("vsftpd", "vsftpd_project", "vsftpd"),
    ("exim", "exim", "exim"),
    ("postfix", "postfix", "postfix"),
    ("dovecot", "dovecot", "dovecot"),
    ("samba", "samba", "samba"),
    ("redis", "redis", "redis"),
    ("memcached", "memcached", "memcached"),
    ("mongodb", "mongodb", "mongodb"),
    ("iis", "microsoft", "internet_information_services"),
    ("lighttpd", "lighttpd", "lighttpd"),
    ("bind", "isc", "bind"),
];

/// Protocol tokens that can appear before a real product/version pair in a
/// banner (e.g. the status line `HTTP/1.1 200 OK` preceding a `Server:`
/// header) and which should never themselves be treated as the product.
const PROTOCOL_TOKENS: &[&str] = &["http", "https", "ftp", "ssh", "smtp", "pop3", "imap", "ldap"];

fn normalize_product(raw: &str) -> (String, String) {
    let lower = raw.trim().to_ascii_lowercase();
    for (needle, vendor, product) in NORMALIZATION_TABLE {
        if lower == *needle || lower.starts_with(needle) {
            return (vendor.to_string(), product.to_string());
        }
    }
    let sanitized = lower.replace(' ', "_");
    (sanitized.clone(), sanitized)
}

/// Extracts a fingerprint from a cleaned banner string. Tries the
/// `product/version` form first (matches `Apache/2.4.49`, `Server: Apache
/// 2.4.49`), then the underscore form used by OpenSSH-style banners.
pub fn extract_fingerprint(banner: &str) -> Option<Fingerprint> {
    let trimmed = banner.trim();
    if trimmed.starts_with("SSH-") {
        // "SSH-2.0-OpenSSH_8.2p1 Ubuntu-4ubuntu0.1": isolate the
        // "OpenSSH_8.2p1"-shaped token before applying the generic
        // underscore-form regex, since the leading "SSH-2.0-" segment
        // contains hyphens and digits that would otherwise confuse it.
        if let Some(token) = trimmed
            .split('-')
            .nth(2)
            .and_then(|v| v.split_whitespace().next())
        {
            if let Some(caps) = underscore_form_re().captures(token) {
                let raw_product = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
                let version = caps.get(2).map(|m| m.as_str().to_string());
                let (vendor, product) = normalize_product(raw_product);
                return Some(Fingerprint {
                    vendor,
                    product,
                    version,
                });
            }
        }
    }

    for caps in slash_form_re().captures_iter(banner) {
        let raw_product = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        if PROTOCOL_TOKENS.contains(&raw_product.to_ascii_lowercase().as_str()) {
            continue;
        }
        let version = caps.get(2).map(|m| m.as_str().to_string());
        let (vendor, product) = normalize_product(raw_product);
        return Some(Fingerprint {
            vendor,
            product,
            version,
        });
    }

    if let Some(caps) = underscore_form_re().captures(banner) {
        let raw_product = caps.get(1)?.as_str();
        let version = caps.get(2).map(|m| m.as_str().to_string());
        let (vendor, product) = normalize_product(raw_product);
        return Some(Fingerprint {
            vendor,
            product,
            version,
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_apache_slash_form() {
        let fp = extract_fingerprint("HTTP/1.1 200 OK\r\nServer: Apache/2.4.49\r\n").unwrap();
        assert_eq!(fp.vendor, "apache");
        assert_eq!(fp.product, "http_server");
        assert_eq!(fp.version.as_deref(), Some("2.4.49"));
    }

    #[test]
    fn extracts_nginx_slash_form() {
        let fp = extract_fingerprint("Server: nginx/1.24.0").unwrap();
        assert_eq!(fp.product, "nginx");
        assert_eq!(fp.version.as_deref(), Some("1.24.0"));
    }

    #[test]
    fn extracts_openssh_underscore_form() {
        let fp = extract_fingerprint("SSH-2.0-OpenSSH_8.2p1 Ubuntu-4ubuntu0.1").unwrap();
        assert_eq!(fp.vendor, "openbsd");
        assert_eq!(fp.product, "openssh");
        assert_eq!(fp.version.as_deref(), Some("8.2p1"));
    }

    #[test]
    fn unknown_product_normalizes_to_itself() {
        let fp = extract_fingerprint("WeirdThing/3.0").unwrap();
        assert_eq!(fp.vendor, "weirdthing");
        assert_eq!(fp.product, "weirdthing");
    }

    #[test]
    fn unrecognized_banner_returns_none() {
        assert!(extract_fingerprint("-").is_none());
    }
}
