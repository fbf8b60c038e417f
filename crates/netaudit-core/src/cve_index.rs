//! CVE index (C3): builds a `(vendor, product) -> Vec<CpeEntry>` map from
//! NVD JSON feeds, persists it as an opaque binary cache, and answers
//! confirmed/suspected queries against it.

use crate::error::{NetAuditError, Result};
use crate::version::{self, RangeBounds};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Bumped whenever the on-disk layout of [`CveIndex`] changes. A mismatch
/// forces a full rebuild instead of silently trusting a stale cache.
const CACHE_SCHEMA_VERSION: u32 = 1;
const CACHE_FILE_NAME: &str = "nvd_index.bin";
pub const DEFAULT_MAX_YEARS: u32 = 5;
pub const DEFAULT_CPE_PART: &str = "a";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpeApplicability {
    AnyVersion,
    ExactVersion(String),
    Range(RangeBounds),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpeEntry {
    pub cve_id: String,
    pub applicability: CpeApplicability,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CveIndex {
    buckets: HashMap<(String, String), Vec<CpeEntry>>,
}

#[derive(Debug, Clone, Default)]
pub struct CveMatches {
    pub confirmed: BTreeSet<String>,
    pub suspected: BTreeSet<String>,
}

/// A single parsed CPE 2.3 URI: `cpe:2.3:<part>:<vendor>:<product>:<version>:...`
struct ParsedCpe {
    part: String,
    vendor: String,
    product: String,
    version: String,
}

fn parse_cpe23(uri: &str) -> Option<ParsedCpe> {
    let fields: Vec<&str> = uri.split(':').collect();
    // cpe : 2.3 : part : vendor : product : version : ...
    if fields.len() < 6 || fields[0] != "cpe" {
        return None;
    }
    Some(ParsedCpe {
        part: fields[2].to_string(),
        vendor: unescape_cpe_field(fields[3]),
        product: unescape_cpe_field(fields[4]),
        version: unescape_cpe_field(fields[5]),
    })
}

fn unescape_cpe_field(field: &str) -> String {
    field.replace("\\-", "-").replace("\\.", ".").to_lowercase()
}

impl CveIndex {
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    fn insert(&mut self, vendor: String, product: String, entry: CpeEntry) {
        self.buckets.entry((vendor, product)).or_default().push(entry);
    }

    /// Builds the index from the NVD feed directory, or loads an existing
    /// on-disk cache when one is present, valid, and `force_rebuild` is
    /// false.
    pub fn build_or_load(
        feed_dir: &Path,
        max_years: u32,
        cpe_part_allowed: Option<&str>,
        force_rebuild: bool,
    ) -> Result<Self> {
        let cache_path = feed_dir.join(CACHE_FILE_NAME);

        if force_rebuild {
            let _ = fs::remove_file(&cache_path);
        } else if cache_path.exists() {
            match Self::load(&cache_path) {
                Ok(index) => return Ok(index),
                Err(e) => {
                    log::debug!("CVE index cache invalid, rebuilding: {e}");
                    let _ = fs::remove_file(&cache_path);
                }
            }
        }

        let index = Self::build(feed_dir, max_years, cpe_part_allowed)?;
        if let Err(e) = index.persist(&cache_path) {
            log::debug!("failed to persist CVE index cache: {e}");
        }
        Ok(index)
    }

    /// Walks the feed directory and builds the index from scratch. Files
    /// that fail to parse are logged and skipped; they never abort the
    /// build.
    pub fn build(feed_dir: &Path, max_years: u32, cpe_part_allowed: Option<&str>) -> Result<Self> {
        let mut index = CveIndex::default();
        let part_filter = cpe_part_allowed.unwrap_or(DEFAULT_CPE_PART);
        let current_year = current_year();
        let min_year = current_year.saturating_sub(max_years);

        let entries = match fs::read_dir(feed_dir) {
            Ok(entries) => entries,
            Err(e) => {
                log::debug!("NVD feed directory {} unreadable: {e}", feed_dir.display());
                return Ok(index);
            }
        };

        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| is_nvd_feed_file(p))
            .collect();
        files.sort();

        for path in files {
            let Some(year) = feed_file_year(&path) else {
                continue;
            };
            if year < min_year {
                continue;
            }
            match load_feed_file(&path) {
                Ok(raw) => index_feed_json(&mut index, &raw, part_filter),
                Err(e) => log::debug!("skipping unreadable NVD feed {}: {e}", path.display()),
            }
        }

        Ok(index)
    }

    pub fn persist(&self, cache_path: &Path) -> Result<()> {
        let mut buf = CACHE_SCHEMA_VERSION.to_le_bytes().to_vec();
        let body = bincode::serialize(self)
            .map_err(|e| NetAuditError::CacheDecode(e.to_string()))?;
        buf.extend_from_slice(&body);
        fs::write(cache_path, buf)?;
        Ok(())
    }

    pub fn load(cache_path: &Path) -> Result<Self> {
        let raw = fs::read(cache_path)?;
        if raw.len() < 4 {
            return Err(NetAuditError::CacheDecode("cache file truncated".to_string()));
        }
        let schema = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
        if schema != CACHE_SCHEMA_VERSION {
            return Err(NetAuditError::CacheSchema {
                expected: CACHE_SCHEMA_VERSION,
                found: schema,
            });
        }
        bincode::deserialize(&raw[4..]).map_err(|e| NetAuditError::CacheDecode(e.to_string()))
    }

    /// Queries the index for `(vendor, product, version?)`, returning
    /// sorted, de-duplicated confirmed and suspected CVE id sets.
    pub fn query(&self, vendor: &str, product: &str, version: Option<&str>) -> CveMatches {
        let mut matches = CveMatches::default();
        let Some(records) = self
            .buckets
            .get(&(vendor.to_ascii_lowercase(), product.to_ascii_lowercase()))
        else {
            return matches;
        };

        for entry in records {
            match &entry.applicability {
                CpeApplicability::AnyVersion => {
                    if version.is_some() {
                        matches.confirmed.insert(entry.cve_id.clone());
                    } else {
                        matches.suspected.insert(entry.cve_id.clone());
                    }
                }
                CpeApplicability::ExactVersion(exact) => match version {
                    Some(v) if version::equal(v, exact) => {
                        matches.confirmed.insert(entry.cve_id.clone());
                    }
                    None => {
                        matches.suspected.insert(entry.cve_id.clone());
                    }
                    _ => {}
                },
                CpeApplicability::Range(bounds) => match version {
                    Some(v) if version::in_range(v, bounds) => {
                        matches.confirmed.insert(entry.cve_id.clone());
                    }
                    None => {
                        matches.suspected.insert(entry.cve_id.clone());
                    }
                    _ => {}
                },
            }
        }

        matches
    }
}

fn current_year() -> u32 {
    chrono::Utc::now().format("%Y").to_string().parse().unwrap_or(2002)
}

fn is_nvd_feed_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    name.starts_with("nvdcve-1.1-") && (name.ends_with(".json") || name.ends_with(".json.gz"))
}

fn feed_file_year(path: &Path) -> Option<u32> {
    let name = path.file_name()?.to_str()?;
    let stem = name
        .strip_prefix("nvdcve-1.1-")?
        .strip_suffix(".json.gz")
        .or_else(|| name.strip_prefix("nvdcve-1.1-")?.strip_suffix(".json"))?;
    stem.parse().ok()
}

fn load_feed_file(path: &Path) -> Result<String> {
    if path.extension().and_then(|e| e.to_str()) == Some("gz") {
        let file = fs::File::open(path)?;
        let mut decoder = flate2::read::GzDecoder::new(file);
        let mut raw = String::new();
        decoder.read_to_string(&mut raw)?;
        Ok(raw)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

/// Accepts both the legacy NVD JSON feed layout (`CVE_Items` with
/// `CVE_data_meta.ID`) and the newer one (`vulnerabilities` with `cve.id`).
fn index_feed_json(index: &mut CveIndex, raw: &str, part_filter: &str) {
    let doc: serde_json::Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            log::debug!("NVD feed JSON parse error: {e}");
            return;
        }
    };

    if let Some(items) = doc.get("CVE_Items").and_then(|v| v.as_array()) {
        for item in items {
            index_legacy_item(index, item, part_filter);
        }
        return;
    }

    if let Some(vulns) = doc.get("vulnerabilities").and_then(|v| v.as_array()) {
        for vuln in vulns {
            index_modern_item(index, vuln, part_filter);
        }
    }
}

fn index_legacy_item(index: &mut CveIndex, item: &serde_json::Value, part_filter: &str) {
    let Some(cve_id) = item
        .pointer("/cve/CVE_data_meta/ID")
        .and_then(|v| v.as_str())
    else {
        return;
    };
    let Some(nodes) = item.pointer("/configurations/nodes").and_then(|v| v.as_array()) else {
        return;
    };
    index_nodes(index, cve_id, nodes, part_filter);
}

fn index_modern_item(index: &mut CveIndex, vuln: &serde_json::Value, part_filter: &str) {
    let Some(cve_id) = vuln.pointer("/cve/id").and_then(|v| v.as_str()) else {
        return;
    };
    let Some(nodes) = vuln
        .pointer("/cve/configurations")
        .and_then(|v| v.as_array())
        .map(|configs| {
            configs
                .iter()
                .filter_map(|c| c.get("nodes").and_then(|n| n.as_array()))
                .flatten()
                .cloned()
                .collect::<Vec<_>>()
        })
    else {
        return;
    };
    index_nodes(index, cve_id, &nodes, part_filter);
}

fn index_nodes(
    index: &mut CveIndex,
    cve_id: &str,
    nodes: &[serde_json::Value],
    part_filter: &str,
) {
    for node in nodes {
        if let Some(matches) = node.get("cpe_match").and_then(|v| v.as_array()) {
            for cpe_match in matches {
                index_cpe_match(index, cve_id, cpe_match, part_filter);
            }
        }
        if let Some(children) = node.get("children").and_then(|v| v.as_array()) {
            index_nodes(index, cve_id, children, part_filter);
        }
    }
}

fn index_cpe_match(
    index: &mut CveIndex,
    cve_id: &str,
    cpe_match: &serde_json::Value,
    part_filter: &str,
) {
    let vulnerable = cpe_match
        .get("vulnerable")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    if !vulnerable {
        return;
    }
    let Some(uri) = cpe_match
        .get("cpe23Uri")
        .or_else(|| cpe_match.get("criteria"))
        .and_then(|v| v.as_str())
    else {
        return;
    };
    let Some(parsed) = parse_cpe23(uri) else {
        return;
    };
    if !part_filter.is_empty() && parsed.part != part_filter {
        return;
    }

    let applicability = if parsed.version.is_empty() || parsed.version == "*" || parsed.version == "-" {
        CpeApplicability::AnyVersion
    } else {
        let bounds = RangeBounds {
            start_incl: cpe_match
                .get("versionStartIncluding")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            start_excl: cpe_match
                .get("versionStartExcluding")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            end_incl: cpe_match
                .get("versionEndIncluding")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            end_excl: cpe_match
                .get("versionEndExcluding")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
        };
        if bounds.is_empty() {
            CpeApplicability::ExactVersion(parsed.version)
        } else {
            CpeApplicability::Range(bounds)
        }
    };

    index.insert(
        parsed.vendor,
        parsed.product,
        CpeEntry {
            cve_id: cve_id.to_string(),
            applicability,
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_legacy_feed() -> &'static str {
        r#"{
            "CVE_Items": [
                {
                    "cve": { "CVE_data_meta": { "ID": "CVE-2021-41773" } },
                    "configurations": {
                        "nodes": [
                            {
                                "cpe_match": [
                                    {
                                        "vulnerable": true,
                                        "cpe23Uri": "cpe:2.3:a:apache:http_server:2.4.49:*:*:*:*:*:*:*"
                                    }
                                ]
                            }
                        ]
                    }
                }
            ]
        }"#
    }

    fn sample_modern_feed() -> &'static str {
        r#"{
            "vulnerabilities": [
                {
                    "cve": {
                        "id": "CVE-2023-99999",
                        "configurations": [
                            {
                                "nodes": [
                                    {
                                        "cpe_match": [
                                            {
                                                "vulnerable": true,
                                                "cpe23Uri": "cpe:2.3:a:openbsd:openssh:*:*:*:*:*:*:*:*",
                                                "versionStartIncluding": "8.0",
                                                "versionEndExcluding": "9.0"
                                            }
                                        ]
                                    }
                                ]
                            }
                        ]
                    }
                }
            ]
        }"#
    }

    #[test]
    fn indexes_legacy_layout_with_exact_version() {
        let mut index = CveIndex::default();
        index_feed_json(&mut index, sample_legacy_feed(), "a");
        let m = index.query("apache", "http_server", Some("2.4.49"));
        assert!(m.confirmed.contains("CVE-2021-41773"));
    }

    #[test]
    fn indexes_modern_layout_with_range() {
        let mut index = CveIndex::default();
        index_feed_json(&mut index, sample_modern_feed(), "a");
        let m = index.query("openbsd", "openssh", Some("8.2p1"));
        assert!(m.confirmed.contains("CVE-2023-99999"));
        let m2 = index.query("openbsd", "openssh", None);
        assert!(m2.suspected.contains("CVE-2023-99999"));
    }

    #[test]
    fn part_filter_drops_non_matching_entries() {
        let mut index = CveIndex::default();
        index_feed_json(&mut index, sample_legacy_feed(), "o");
        let m = index.query("apache", "http_server", Some("2.4.49"));
        assert!(m.confirmed.is_empty());
    }

    #[test]
    fn round_trips_through_persist_and_load() {
        let mut index = CveIndex::default();
        index_feed_json(&mut index, sample_legacy_feed(), "a");

        let dir = std::env::temp_dir().join("netaudit_cve_index_test");
        let _ = fs::create_dir_all(&dir);
        let cache_path = dir.join(CACHE_FILE_NAME);
        index.persist(&cache_path).unwrap();

        let loaded = CveIndex::load(&cache_path).unwrap();
        let m = loaded.query("apache", "http_server", Some("2.4.49"));
        assert!(m.confirmed.contains("CVE-2021-41773"));

        let _ = fs::remove_file(&cache_path);
    }

    #[test]
    fn load_rejects_schema_mismatch() {
        let dir = std::env::temp_dir().join("netaudit_cve_index_schema_test");
        let _ = fs::create_dir_all(&dir);
        let cache_path = dir.join("bad_schema.bin");
        let mut buf = 999u32.to_le_bytes().to_vec();
        buf.extend_from_slice(&[0, 0, 0]);
        fs::write(&cache_path, buf).unwrap();

        let err = CveIndex::load(&cache_path).unwrap_err();
        assert!(matches!(err, NetAuditError::CacheSchema { .. }));
        let _ = fs::remove_file(&cache_path);
    }
}
