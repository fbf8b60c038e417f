//! Version comparator (C1).
//!
//! Software version strings collected from banners are messy: distro patch
//! suffixes, vendor-specific tags, missing components. This module is the
//! only place in the crate allowed to know that; everything else asks it
//! "does version X satisfy this bound" and gets a plain bool back.

use regex::Regex;
use semver::Version;
use std::cmp::Ordering;
use std::sync::OnceLock;

fn leading_numeric_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+(\.\d+){0,3}").expect("valid regex"))
}

/// Pads a dotted numeric string out to exactly three components so it can be
/// handed to `semver::Version::parse`, which requires major.minor.patch.
fn pad_to_semver(dotted: &str) -> String {
    let mut parts: Vec<&str> = dotted.split('.').collect();
    while parts.len() < 3 {
        parts.push("0");
    }
    parts.truncate(3);
    parts.join(".")
}

/// Attempts strict semantic parsing, then falls back to stripping the
/// string down to its leading `N(.N){0,3}` prefix and retrying.
///
/// Strict parsing is only attempted when the whole trimmed string is that
/// leading numeric prefix — a distro or patch suffix like `-1ubuntu1` or
/// `p1` is otherwise syntactically legal as a semver prerelease identifier,
/// which would make e.g. "1.24.0-1ubuntu1" parse "successfully" as strictly
/// less than "1.24.0" instead of falling through to the tolerant path.
pub fn parse(raw: &str) -> Option<Version> {
    let trimmed = raw.trim().trim_start_matches('v');
    let prefix = leading_numeric_prefix_re().find(trimmed)?.as_str();
    if prefix.len() == trimmed.len() {
        if let Ok(v) = Version::parse(trimmed) {
            return Some(v);
        }
    }
    Version::parse(&pad_to_semver(prefix)).ok()
}

/// Tolerant equality: semantic equality when both sides parse, else a
/// literal (case-insensitive, trimmed) string compare.
pub fn equal(a: &str, b: &str) -> bool {
    match (parse(a), parse(b)) {
        (Some(va), Some(vb)) => va == vb,
        _ => a.trim().eq_ignore_ascii_case(b.trim()),
    }
}

/// Tolerant ordering. `None` means "does not satisfy" for ordered
/// comparisons — only equality has a literal-string fallback.
pub fn compare(a: &str, b: &str) -> Option<Ordering> {
    Some(parse(a)?.cmp(&parse(b)?))
}

/// The bounds of a version range. Any subset of the four fields may be
/// absent; absence means "unbounded on that side".
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RangeBounds {
    pub start_incl: Option<String>,
    pub start_excl: Option<String>,
    pub end_incl: Option<String>,
    pub end_excl: Option<String>,
}

impl RangeBounds {
    pub fn is_empty(&self) -> bool {
        self.start_incl.is_none()
            && self.start_excl.is_none()
            && self.end_incl.is_none()
            && self.end_excl.is_none()
    }
}

/// Tests whether `version` lies within `bounds` under semantic ordering. A
/// parse failure of `version` makes the test false, regardless of bounds.
pub fn in_range(version: &str, bounds: &RangeBounds) -> bool {
    let Some(v) = parse(version) else {
        return false;
    };

    let lower_ok = match (&bounds.start_incl, &bounds.start_excl) {
        (Some(b), _) => parse(b).is_some_and(|b| v >= b),
        (None, Some(b)) => parse(b).is_some_and(|b| v > b),
        (None, None) => true,
    };
    let upper_ok = match (&bounds.end_incl, &bounds.end_excl) {
        (Some(b), _) => parse(b).is_some_and(|b| v <= b),
        (None, Some(b)) => parse(b).is_some_and(|b| v < b),
        (None, None) => true,
    };

    lower_ok && upper_ok
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_semver_parses_directly() {
        assert_eq!(parse("2.4.49").unwrap().to_string(), "2.4.49");
    }

    #[test]
    fn short_dotted_pads_to_semver() {
        assert_eq!(parse("9.7").unwrap().to_string(), "9.7.0");
    }

    #[test]
    fn messy_suffix_falls_back_to_prefix() {
        // "8.2p1" is not valid semver; the comparator strips to "8.2".
        assert_eq!(parse("8.2p1").unwrap().to_string(), "8.2.0");
    }

    #[test]
    fn distro_suffix_falls_back_to_prefix() {
        assert_eq!(parse("1.24.0-1ubuntu1").unwrap().to_string(), "1.24.0");
    }

    #[test]
    fn unparseable_equality_falls_back_to_literal_compare() {
        assert!(equal("unknown-build", "unknown-build"));
        assert!(!equal("unknown-build", "other-build"));
    }

    #[test]
    fn unparseable_ordering_does_not_satisfy() {
        assert!(compare("not-a-version", "1.0.0").is_none());
    }

    #[test]
    fn range_test_respects_inclusive_and_exclusive_bounds() {
        let bounds = RangeBounds {
            start_incl: Some("8.0.0".to_string()),
            end_excl: Some("9.0.0".to_string()),
            ..Default::default()
        };
        assert!(in_range("8.2p1", &bounds));
        assert!(in_range("8.0.0", &bounds));
        assert!(!in_range("9.0.0", &bounds));
    }

    #[test]
    fn range_test_fails_closed_on_unparseable_version() {
        let bounds = RangeBounds {
            start_incl: Some("1.0.0".to_string()),
            ..Default::default()
        };
        assert!(!in_range("not-a-version-at-all-!!", &bounds));
    }
}
