//! Parsers for `svn ... --xml` output.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::errors::{ScmError, ScmOperation};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SvnInfo {
    pub url: String,
    pub root_url: String,
    /// `^/trunk` style path of the target inside the repository.
    pub relative_url: Option<String>,
    pub revision: u64,
    /// Revision in which the target last changed.
    pub last_changed_revision: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct SvnLogEntry {
    pub revision: u64,
    pub author: String,
    pub date: DateTime<Utc>,
    pub message: String,
    pub changed_paths: Vec<SvnChangedPath>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SvnChangedPath {
    pub action: String,
    pub path: String,
    pub copy_from_path: Option<String>,
    pub copy_from_rev: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SvnDiffEntry {
    /// `added`, `deleted`, `modified`, or `none` for property-only changes.
    pub item: String,
    pub props_changed: bool,
    pub path: String,
}

/// One line of `svn status --xml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SvnStatusEntry {
    pub path: String,
    /// `modified`, `unversioned`, `missing`, `conflicted`, ...
    pub item: String,
    pub tree_conflicted: bool,
}

impl SvnStatusEntry {
    pub fn is_conflicted(&self) -> bool {
        self.item == "conflicted" || self.tree_conflicted
    }
}

fn malformed(op: ScmOperation, what: &str) -> ScmError {
    ScmError::failed(op, format!("malformed svn xml: {what}"))
}

pub fn parse_svn_info(xml: &str) -> Result<SvnInfo, ScmError> {
    let op = ScmOperation::Info;
    debug!("parsing svn info XML ({} bytes)", xml.len());
    let url = extract_tag_content(xml, "url").ok_or_else(|| malformed(op, "missing <url>"))?;
    let root_url = extract_tag_content(xml, "root").ok_or_else(|| malformed(op, "missing <root>"))?;
    let revision = extract_attribute(xml, "entry", "revision")
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| malformed(op, "missing entry revision"))?;
    let last_changed_revision =
        extract_attribute(xml, "commit", "revision").and_then(|s| s.parse::<u64>().ok());
    Ok(SvnInfo {
        url,
        root_url,
        relative_url: extract_tag_content(xml, "relative-url"),
        revision,
        last_changed_revision,
    })
}

pub fn parse_svn_log(xml: &str) -> Vec<SvnLogEntry> {
    debug!("parsing svn log XML ({} bytes)", xml.len());
    let mut entries = Vec::new();
    for part in xml.split("<logentry").skip(1) {
        let entry_xml = match part.find("</logentry>") {
            Some(pos) => &part[..pos],
            None => part,
        };
        let Some(revision) = extract_attr_from_str(header(entry_xml), "revision")
            .and_then(|s| s.parse::<u64>().ok())
        else {
            warn!("skipping svn log entry without a usable revision attribute");
            continue;
        };
        let date = extract_tag_content(entry_xml, "date")
            .and_then(|d| DateTime::parse_from_rfc3339(&d).ok())
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_default();
        entries.push(SvnLogEntry {
            revision,
            author: extract_tag_content(entry_xml, "author").unwrap_or_default(),
            date,
            message: extract_tag_content(entry_xml, "msg").unwrap_or_default(),
            changed_paths: parse_changed_paths(entry_xml),
        });
    }
    debug!(count = entries.len(), "parsed svn log entries");
    entries
}

pub fn parse_svn_diff_summarize(xml: &str) -> Vec<SvnDiffEntry> {
    let mut entries = Vec::new();
    for part in xml.split("<path ").skip(1) {
        let Some(end) = part.find("</path>") else {
            continue;
        };
        let fragment = &part[..end];
        let attrs = header(fragment);
        entries.push(SvnDiffEntry {
            item: extract_attr_from_str(attrs, "item").unwrap_or_default(),
            props_changed: extract_attr_from_str(attrs, "props").is_some_and(|p| p != "none"),
            path: element_text(fragment),
        });
    }
    debug!(count = entries.len(), "parsed svn diff entries");
    entries
}

pub fn parse_svn_status(xml: &str) -> Vec<SvnStatusEntry> {
    let mut entries = Vec::new();
    for part in xml.split("<entry").skip(1) {
        let Some(path) = extract_attr_from_str(header(part), "path") else {
            continue;
        };
        let Some(status) = part.find("<wc-status").map(|pos| header(&part[pos..])) else {
            continue;
        };
        entries.push(SvnStatusEntry {
            path: xml_unescape(&path).replace('\\', "/"),
            item: extract_attr_from_str(status, "item").unwrap_or_default(),
            tree_conflicted: extract_attr_from_str(status, "tree-conflicted").as_deref() == Some("true"),
        });
    }
    entries
}

/// Revision from `svn commit`/`svn copy` output, if anything was committed.
pub fn parse_committed_revision(output: &str) -> Option<u64> {
    output
        .lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("Committed revision"))
        .and_then(|rest| rest.trim().trim_end_matches('.').parse::<u64>().ok())
}

/// Names listed by `svn list`, without the trailing `/` of directories.
pub fn parse_svn_list(output: &str) -> Vec<String> {
    output
        .lines()
        .map(|l| l.trim().trim_end_matches('/'))
        .filter(|l| !l.is_empty())
        .map(str::to_owned)
        .collect()
}

/// The opening tag of `fragment`, up to its first `>`.
fn header(fragment: &str) -> &str {
    fragment.find('>').map_or(fragment, |end| &fragment[..end])
}

fn element_text(fragment: &str) -> String {
    match fragment.find('>') {
        Some(pos) => xml_unescape(fragment[pos + 1..].trim()),
        None => String::new(),
    }
}

fn extract_tag_content(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}");
    let close = format!("</{tag}>");
    let mut search_from = 0;
    while let Some(rel_pos) = xml[search_from..].find(&open) {
        let start_pos = search_from + rel_pos;
        let after_open = &xml[start_pos + open.len()..];
        // <url> must not match <urlencoded>
        if let Some(ch) = after_open.chars().next() {
            if ch != '>' && !ch.is_ascii_whitespace() {
                search_from = start_pos + open.len();
                continue;
            }
        }
        let content_start = after_open.find('>')? + 1;
        let content = &after_open[content_start..];
        let end_pos = content.find(&close)?;
        return Some(xml_unescape(content[..end_pos].trim()));
    }
    None
}

fn xml_unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn extract_attribute(xml: &str, tag: &str, attr: &str) -> Option<String> {
    let open = format!("<{tag}");
    let start_pos = xml.find(&open)?;
    extract_attr_from_str(header(&xml[start_pos + open.len()..]), attr)
}

fn extract_attr_from_str(s: &str, attr: &str) -> Option<String> {
    for quote in ['"', '\''] {
        let pattern = format!("{attr}={quote}");
        let mut from = 0;
        while let Some(rel) = s[from..].find(&pattern) {
            let pos = from + rel;
            // tree-conflicted must not match conflicted
            let bounded = pos == 0 || s[..pos].ends_with(|c: char| c.is_ascii_whitespace());
            let after = &s[pos + pattern.len()..];
            if bounded {
                let end = after.find(quote)?;
                return Some(after[..end].to_string());
            }
            from = pos + pattern.len();
        }
    }
    None
}

fn parse_changed_paths(entry_xml: &str) -> Vec<SvnChangedPath> {
    let Some(start) = entry_xml.find("<paths>") else {
        return Vec::new();
    };
    let rest = &entry_xml[start + "<paths>".len()..];
    let Some(end) = rest.find("</paths>") else {
        return Vec::new();
    };
    let mut paths = Vec::new();
    for part in rest[..end].split("<path").skip(1) {
        let Some(close) = part.find("</path>") else {
            continue;
        };
        let fragment = &part[..close];
        let attrs = header(fragment);
        paths.push(SvnChangedPath {
            action: extract_attr_from_str(attrs, "action").unwrap_or_default(),
            path: element_text(fragment),
            copy_from_path: extract_attr_from_str(attrs, "copyfrom-path"),
            copy_from_rev: extract_attr_from_str(attrs, "copyfrom-rev").and_then(|s| s.parse().ok()),
        });
    }
    paths
}
