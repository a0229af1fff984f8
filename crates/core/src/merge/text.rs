//! Line-based three-way merge.
//!
//! Uses the `diffy` crate to perform line-based merges between a base, the
//! local and the remote content of one file.

use tracing::debug;

use super::MergeClient;
use crate::errors::MergeError;

/// The result of a three-way text merge.
#[derive(Debug, Clone)]
pub struct TextMergeResult {
    /// The merged content (contains conflict markers if `has_conflicts` is true).
    pub merged_content: String,
    /// Whether the merge completed without conflicts.
    pub has_conflicts: bool,
    /// Locations of conflict regions within the merged content.
    pub conflict_regions: Vec<ConflictRegion>,
}

impl TextMergeResult {
    fn clean(content: &str) -> Self {
        Self {
            merged_content: content.to_string(),
            has_conflicts: false,
            conflict_regions: Vec::new(),
        }
    }
}

/// A single conflict region within merged output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictRegion {
    /// Starting line number (1-indexed) of the marker block.
    pub start_line: usize,
    /// Ending line number (1-indexed) of the marker block.
    pub end_line: usize,
}

/// Stateless three-way text merger.
pub struct TextMerger;

impl TextMerger {
    /// Merge `local` and `remote` against `base`.
    ///
    /// The result always carries content. When the merge is not clean, the
    /// content contains `<<<<<<<` / `=======` / `>>>>>>>` markers.
    pub fn three_way_merge(base: &str, local: &str, remote: &str) -> TextMergeResult {
        if local == base || local == remote {
            debug!("local unchanged or identical to remote, remote wins cleanly");
            return TextMergeResult::clean(remote);
        }
        if remote == base {
            debug!("remote unchanged, local wins cleanly");
            return TextMergeResult::clean(local);
        }

        let remote_patch = diffy::create_patch(base, remote);
        if let Ok(merged) = diffy::apply(local, &remote_patch) {
            debug!("clean merge via applying remote patch to local");
            return TextMergeResult::clean(&merged);
        }

        let local_patch = diffy::create_patch(base, local);
        if let Ok(merged) = diffy::apply(remote, &local_patch) {
            debug!("clean merge via applying local patch to remote");
            return TextMergeResult::clean(&merged);
        }

        match diffy::merge(base, local, remote) {
            Ok(merged) => TextMergeResult::clean(&merged),
            Err(conflicted) => {
                let regions = find_conflict_regions(&conflicted);
                debug!(regions = regions.len(), "text merge left conflicts");
                TextMergeResult {
                    merged_content: conflicted,
                    has_conflicts: true,
                    conflict_regions: regions,
                }
            }
        }
    }

    /// Whether the three versions merge without conflicts.
    pub fn can_auto_merge(base: &str, local: &str, remote: &str) -> bool {
        !Self::three_way_merge(base, local, remote).has_conflicts
    }
}

fn find_conflict_regions(content: &str) -> Vec<ConflictRegion> {
    let mut regions = Vec::new();
    let mut start = None;
    for (i, line) in content.lines().enumerate() {
        if line.starts_with("<<<<<<<") {
            start = Some(i + 1);
        } else if line.starts_with(">>>>>>>") {
            if let Some(start_line) = start.take() {
                regions.push(ConflictRegion {
                    start_line,
                    end_line: i + 1,
                });
            }
        }
    }
    regions
}

/// [`MergeClient`] for UTF-8 text files. Any conflict is a failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextMergeClient;

impl MergeClient for TextMergeClient {
    fn merge(&self, local: &[u8], remote: &[u8], base: &[u8]) -> Result<Vec<u8>, MergeError> {
        let text = |bytes: &[u8], side: &str| {
            std::str::from_utf8(bytes)
                .map(str::to_owned)
                .map_err(|e| MergeError::Unreadable(format!("{side} is not UTF-8: {e}")))
        };
        let (local, remote, base) = (text(local, "local")?, text(remote, "remote")?, text(base, "base")?);

        let result = TextMerger::three_way_merge(&base, &local, &remote);
        if result.has_conflicts {
            return Err(MergeError::TextConflict {
                regions: result.conflict_regions.len().max(1),
            });
        }
        Ok(result.merged_content.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_files() {
        let base = "line1\nline2\nline3\n";
        let result = TextMerger::three_way_merge(base, base, base);
        assert!(!result.has_conflicts);
        assert_eq!(result.merged_content, base);
    }

    #[test]
    fn test_one_sided_changes() {
        let base = "line1\nline2\nline3\n";
        let changed = "line1\nmodified\nline3\n";
        assert_eq!(TextMerger::three_way_merge(base, changed, base).merged_content, changed);
        assert_eq!(TextMerger::three_way_merge(base, base, changed).merged_content, changed);
    }

    #[test]
    fn test_non_overlapping_changes() {
        let base = "line1\nline2\nline3\nline4\nline5\nline6\nline7\nline8\n";
        let local = "LINE1\nline2\nline3\nline4\nline5\nline6\nline7\nline8\n";
        let remote = "line1\nline2\nline3\nline4\nline5\nline6\nline7\nLINE8\n";
        let result = TextMerger::three_way_merge(base, local, remote);
        assert!(!result.has_conflicts);
        assert!(result.merged_content.contains("LINE1"));
        assert!(result.merged_content.contains("LINE8"));
        assert!(TextMerger::can_auto_merge(base, local, remote));
    }

    #[test]
    fn test_conflicting_changes_produce_markers() {
        let base = "line1\noriginal\nline3\n";
        let local = "line1\nlocal_version\nline3\n";
        let remote = "line1\nremote_version\nline3\n";
        let result = TextMerger::three_way_merge(base, local, remote);
        assert!(result.has_conflicts);
        assert!(result.merged_content.contains("<<<<<<<"));
        assert!(result.merged_content.contains(">>>>>>>"));
        assert_eq!(result.conflict_regions.len(), 1);
        assert!(!TextMerger::can_auto_merge(base, local, remote));
    }

    #[test]
    fn test_client_rejects_conflicts() {
        let err = TextMergeClient
            .merge(b"a\nlocal\nc\n", b"a\nremote\nc\n", b"a\nbase\nc\n")
            .unwrap_err();
        assert_eq!(err, MergeError::TextConflict { regions: 1 });
    }

    #[test]
    fn test_client_rejects_binary() {
        let err = TextMergeClient.merge(&[0xff, 0xfe], b"x", b"y").unwrap_err();
        assert!(matches!(err, MergeError::Unreadable(_)));
    }

    #[test]
    fn test_client_merges_clean_changes() {
        let merged = TextMergeClient.merge(b"new\n", b"old\n", b"old\n").unwrap();
        assert_eq!(merged, b"new\n");
    }
}
