//! Version-string algebra.
//!
//! A [`Version`] is a lossless split of a raw version string into segments
//! and the `.`/`-` separators between them. It answers three questions the
//! release workflow keeps asking: is this a pre-release, what is the next
//! version, and which of two versions is newer.

pub mod calculator;

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::VersionError;

pub use calculator::{
    calculate_next_snapshot_version, calculate_release_version, is_snapshot,
};

/// The pre-release qualifier appended to development versions.
pub const SNAPSHOT_QUALIFIER: &str = "SNAPSHOT";

/// Sentinel version that is always considered the newest.
pub const LATEST: &str = "LATEST";

const SEPARATORS: [char; 2] = ['.', '-'];

// ---------------------------------------------------------------------------
// Upgrade strategy
// ---------------------------------------------------------------------------

/// Which segment [`Version::increase`] bumps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionUpgradeStrategy {
    /// The lowest segment that ends in a number.
    #[default]
    Default,
    /// Segment 0.
    Major,
    /// Segment 1.
    Minor,
    /// Segment 2.
    Incremental,
}

impl VersionUpgradeStrategy {
    /// Structural segment index, `None` for [`Self::Default`].
    pub fn index(self) -> Option<usize> {
        match self {
            Self::Default => None,
            Self::Major => Some(0),
            Self::Minor => Some(1),
            Self::Incremental => Some(2),
        }
    }
}

impl fmt::Display for VersionUpgradeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Major => write!(f, "major"),
            Self::Minor => write!(f, "minor"),
            Self::Incremental => write!(f, "incremental"),
        }
    }
}

impl FromStr for VersionUpgradeStrategy {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "major" => Ok(Self::Major),
            "minor" => Ok(Self::Minor),
            "incremental" | "patch" => Ok(Self::Incremental),
            other => Err(VersionError::UnknownStrategy(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Version
// ---------------------------------------------------------------------------

/// A parsed version string.
///
/// Invariant: `segments.len() == separators.len() + 1`, so concatenating
/// them back reproduces the input exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    segments: Vec<String>,
    separators: Vec<char>,
}

impl Version {
    /// Split `raw` on `.` and `-` boundaries.
    pub fn parse(raw: &str) -> Result<Self, VersionError> {
        if raw.is_empty() {
            return Err(VersionError::Empty);
        }

        let mut segments = Vec::new();
        let mut separators = Vec::new();
        let mut current = String::new();
        for ch in raw.chars() {
            if SEPARATORS.contains(&ch) {
                segments.push(std::mem::take(&mut current));
                separators.push(ch);
            } else {
                current.push(ch);
            }
        }
        segments.push(current);

        Ok(Self {
            segments,
            separators,
        })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn separators(&self) -> &[char] {
        &self.separators
    }

    /// Whether this version is a pre-release (snapshot) version.
    pub fn is_snapshot(&self) -> bool {
        is_snapshot(&self.to_string())
    }

    /// Bump one segment according to `strategy` and make sure the result
    /// carries the pre-release qualifier.
    ///
    /// Structural strategies fall back to [`VersionUpgradeStrategy::Default`]
    /// when the version has too few segments or the addressed segment has no
    /// trailing number. A version without any number gets a `.1` segment.
    pub fn increase(&mut self, strategy: VersionUpgradeStrategy) {
        let index = strategy
            .index()
            .filter(|&i| i < self.segments.len() && trailing_digits(&self.segments[i]).is_some())
            .or_else(|| self.lowest_incrementable_index());

        match index {
            Some(i) => {
                let segment = &self.segments[i];
                if let Some(start) = trailing_digits(segment) {
                    let (head, digits) = segment.split_at(start);
                    self.segments[i] = format!("{}{}", head, increment_digits(digits));
                }
            }
            None => {
                // Insert before a trailing qualifier so it stays last.
                let at = if self.has_qualifier_segment() {
                    self.segments.len() - 1
                } else {
                    self.segments.len()
                };
                self.segments.insert(at, "1".to_string());
                self.separators.insert(at.saturating_sub(1).min(self.separators.len()), '.');
            }
        }

        if !self.is_snapshot() {
            self.separators.push('-');
            self.segments.push(SNAPSHOT_QUALIFIER.to_string());
        }
    }

    fn lowest_incrementable_index(&self) -> Option<usize> {
        self.segments
            .iter()
            .rposition(|segment| trailing_digits(segment).is_some())
    }

    fn has_qualifier_segment(&self) -> bool {
        self.segments
            .last()
            .is_some_and(|s| s.eq_ignore_ascii_case(SNAPSHOT_QUALIFIER))
            && self.segments.len() > 1
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            f.write_str(segment)?;
            if let Some(sep) = self.separators.get(i) {
                write!(f, "{}", sep)?;
            }
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Byte offset where the trailing run of ASCII digits starts, if any.
fn trailing_digits(segment: &str) -> Option<usize> {
    let start = segment
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)?;
    Some(start)
}

/// Decimal increment on a digit string, keeping its width where possible.
fn increment_digits(digits: &str) -> String {
    let mut bytes: Vec<u8> = digits.bytes().collect();
    let mut i = bytes.len();
    loop {
        if i == 0 {
            bytes.insert(0, b'1');
            break;
        }
        i -= 1;
        if bytes[i] == b'9' {
            bytes[i] = b'0';
        } else {
            bytes[i] += 1;
            break;
        }
    }
    String::from_utf8(bytes).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

/// Whether `a` is strictly newer than `b`.
///
/// The common prefix and suffix are stripped (widened so numbers are never
/// split), then the remaining middles decide: an empty middle is oldest, a
/// middle that is just the pre-release qualifier is older than anything else,
/// and otherwise numbers compare numerically and text lexicographically.
/// [`LATEST`] is newer than every other version.
pub fn is_newer_version(a: &str, b: &str) -> bool {
    if a == b {
        return false;
    }
    let a_latest = a.eq_ignore_ascii_case(LATEST);
    let b_latest = b.eq_ignore_ascii_case(LATEST);
    if a_latest || b_latest {
        return a_latest && !b_latest;
    }

    let (mid_a, mid_b) = differing_middles(a, b);
    if mid_a == mid_b {
        return false;
    }

    let a_qualifier = is_bare_qualifier(mid_a);
    let b_qualifier = is_bare_qualifier(mid_b);
    if a_qualifier || b_qualifier {
        return b_qualifier && !a_qualifier;
    }

    if mid_a.is_empty() {
        return false;
    }
    if mid_b.is_empty() {
        return true;
    }

    compare_middles(mid_a, mid_b) == Ordering::Greater
}

fn is_bare_qualifier(middle: &str) -> bool {
    middle
        .trim_matches(|c| SEPARATORS.contains(&c))
        .eq_ignore_ascii_case(SNAPSHOT_QUALIFIER)
}

/// Strip the longest common prefix and suffix of `a` and `b`.
fn differing_middles<'a, 'b>(a: &'a str, b: &'b str) -> (&'a str, &'b str) {
    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();

    let mut prefix = a_bytes
        .iter()
        .zip(b_bytes)
        .take_while(|(x, y)| x == y)
        .count();
    while prefix > 0 && !(a.is_char_boundary(prefix) && b.is_char_boundary(prefix)) {
        prefix -= 1;
    }
    // Never end the prefix inside a run of digits.
    while prefix > 0
        && a_bytes[prefix - 1].is_ascii_digit()
        && (a_bytes.get(prefix).is_some_and(u8::is_ascii_digit)
            || b_bytes.get(prefix).is_some_and(u8::is_ascii_digit))
    {
        prefix -= 1;
    }

    let max_suffix = (a_bytes.len() - prefix).min(b_bytes.len() - prefix);
    let mut suffix = a_bytes
        .iter()
        .rev()
        .zip(b_bytes.iter().rev())
        .take(max_suffix)
        .take_while(|(x, y)| x == y)
        .count();
    while suffix > 0
        && !(a.is_char_boundary(a.len() - suffix) && b.is_char_boundary(b.len() - suffix))
    {
        suffix -= 1;
    }
    while suffix > 0 {
        let a_cut = a_bytes.len() - suffix;
        let b_cut = b_bytes.len() - suffix;
        let splits_digits = a_bytes[a_cut].is_ascii_digit()
            && ((a_cut > prefix && a_bytes[a_cut - 1].is_ascii_digit())
                || (b_cut > prefix && b_bytes[b_cut - 1].is_ascii_digit()));
        if !splits_digits {
            break;
        }
        suffix -= 1;
    }

    (
        &a[prefix..a.len() - suffix],
        &b[prefix..b.len() - suffix],
    )
}

#[derive(Debug, PartialEq, Eq)]
enum Token<'a> {
    Number(&'a str),
    Text(&'a str),
}

fn tokenize(s: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut numeric = None;
    for (i, ch) in s.char_indices() {
        let is_digit = ch.is_ascii_digit();
        match numeric {
            Some(prev) if prev != is_digit => {
                tokens.push(make_token(&s[start..i], prev));
                start = i;
            }
            _ => {}
        }
        numeric = Some(is_digit);
    }
    if let Some(prev) = numeric {
        tokens.push(make_token(&s[start..], prev));
    }
    tokens
}

fn make_token(s: &str, numeric: bool) -> Token<'_> {
    if numeric {
        Token::Number(s)
    } else {
        Token::Text(s)
    }
}

fn compare_numbers(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn compare_middles(a: &str, b: &str) -> Ordering {
    let ta = tokenize(a);
    let tb = tokenize(b);
    for (x, y) in ta.iter().zip(tb.iter()) {
        let ord = match (x, y) {
            (Token::Number(x), Token::Number(y)) => compare_numbers(x, y),
            (Token::Number(_), Token::Text(_)) => Ordering::Greater,
            (Token::Text(_), Token::Number(_)) => Ordering::Less,
            (Token::Text(x), Token::Text(y)) => x.cmp(y),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    ta.len().cmp(&tb.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trips() {
        for raw in [
            "1.0.0",
            "1.0.0-SNAPSHOT",
            "3-Alpha1-SNAPSHOT",
            "1..2",
            "-1",
            "2.0.",
            "LATEST",
            "1.0.0-rc-1",
        ] {
            let version = Version::parse(raw).unwrap();
            assert_eq!(version.to_string(), raw);
            assert_eq!(version.segments().len(), version.separators().len() + 1);
        }
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert_eq!(Version::parse(""), Err(VersionError::Empty));
    }

    #[test]
    fn test_parse_segments() {
        let version = Version::parse("1.2-SNAPSHOT").unwrap();
        assert_eq!(version.segments(), ["1", "2", "SNAPSHOT"]);
        assert_eq!(version.separators(), ['.', '-']);
    }

    #[test]
    fn test_increase_default() {
        let mut version = Version::parse("1.0.0").unwrap();
        version.increase(VersionUpgradeStrategy::Default);
        assert_eq!(version.to_string(), "1.0.1-SNAPSHOT");

        let mut version = Version::parse("3-Alpha1").unwrap();
        version.increase(VersionUpgradeStrategy::Default);
        assert_eq!(version.to_string(), "3-Alpha2-SNAPSHOT");

        let mut version = Version::parse("1.0.0-SNAPSHOT").unwrap();
        version.increase(VersionUpgradeStrategy::Default);
        assert_eq!(version.to_string(), "1.0.1-SNAPSHOT");
    }

    #[test]
    fn test_increase_carries_digits() {
        let mut version = Version::parse("1.9").unwrap();
        version.increase(VersionUpgradeStrategy::Default);
        assert_eq!(version.to_string(), "1.10-SNAPSHOT");

        let mut version = Version::parse("1.099").unwrap();
        version.increase(VersionUpgradeStrategy::Default);
        assert_eq!(version.to_string(), "1.100-SNAPSHOT");

        let mut version = Version::parse("1.007").unwrap();
        version.increase(VersionUpgradeStrategy::Default);
        assert_eq!(version.to_string(), "1.008-SNAPSHOT");
    }

    #[test]
    fn test_increase_structural_strategies() {
        let mut version = Version::parse("1.2.3").unwrap();
        version.increase(VersionUpgradeStrategy::Major);
        assert_eq!(version.to_string(), "2.2.3-SNAPSHOT");

        let mut version = Version::parse("1.2.3").unwrap();
        version.increase(VersionUpgradeStrategy::Minor);
        assert_eq!(version.to_string(), "1.3.3-SNAPSHOT");

        let mut version = Version::parse("1.2.3").unwrap();
        version.increase(VersionUpgradeStrategy::Incremental);
        assert_eq!(version.to_string(), "1.2.4-SNAPSHOT");
    }

    #[test]
    fn test_increase_falls_back_to_default() {
        // Too few segments for the incremental index.
        let mut version = Version::parse("1.2").unwrap();
        version.increase(VersionUpgradeStrategy::Incremental);
        assert_eq!(version.to_string(), "1.3-SNAPSHOT");
    }

    #[test]
    fn test_increase_without_numbers() {
        let mut version = Version::parse("alpha").unwrap();
        version.increase(VersionUpgradeStrategy::Default);
        assert_eq!(version.to_string(), "alpha.1-SNAPSHOT");
    }

    #[test]
    fn test_is_newer_basic() {
        assert!(is_newer_version("1.0.1", "1.0.0"));
        assert!(!is_newer_version("1.0.0", "1.0.1"));
        assert!(is_newer_version("1.0.10", "1.0.9"));
        assert!(is_newer_version("1.10.0", "1.2.0"));
        assert!(is_newer_version("2.0", "1.99"));
        assert!(is_newer_version("1.0.1", "1.0"));
    }

    #[test]
    fn test_is_newer_irreflexive() {
        for v in ["1.0", "1.0-SNAPSHOT", "LATEST", "x"] {
            assert!(!is_newer_version(v, v));
        }
    }

    #[test]
    fn test_snapshot_is_older_than_release() {
        assert!(is_newer_version("1.0.0", "1.0.0-SNAPSHOT"));
        assert!(!is_newer_version("1.0.0-SNAPSHOT", "1.0.0"));
        assert!(is_newer_version("1.0.1-SNAPSHOT", "1.0.0"));
        assert!(is_newer_version("3-Alpha2-SNAPSHOT", "3-Alpha1"));
    }

    #[test]
    fn test_latest_is_newest() {
        assert!(is_newer_version("LATEST", "99.0"));
        assert!(is_newer_version("latest", "1.0-SNAPSHOT"));
        assert!(!is_newer_version("99.0", "LATEST"));
        assert!(!is_newer_version("LATEST", "latest"));
    }

    #[test]
    fn test_is_newer_transitive_on_increment_chains() {
        let mut chain = vec!["0.9.8".to_string()];
        let mut version = Version::parse("0.9.8").unwrap();
        for _ in 0..25 {
            version.increase(VersionUpgradeStrategy::Default);
            let release = calculate_release_version(&version.to_string()).unwrap();
            chain.push(release.clone());
            version = Version::parse(&release).unwrap();
        }
        for (i, newer) in chain.iter().enumerate() {
            for older in &chain[..i] {
                assert!(is_newer_version(newer, older), "{newer} > {older}");
                assert!(!is_newer_version(older, newer), "{older} < {newer}");
            }
        }
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!(
            "Major".parse::<VersionUpgradeStrategy>().unwrap(),
            VersionUpgradeStrategy::Major
        );
        assert!("sideways".parse::<VersionUpgradeStrategy>().is_err());
    }
}
