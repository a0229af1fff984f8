//! Version adjudication for three-way merges of module descriptors.
//!
//! Only two facts of a descriptor take part: its own version and the
//! optional parent reference. Remote changes are accepted only when local
//! either left the value alone or moved it to something strictly newer.

use tracing::debug;

use crate::errors::MergeError;
use crate::version::is_newer_version;

/// Reference from a module to its parent module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentReference {
    pub group: String,
    pub artifact: String,
    pub version: String,
}

impl ParentReference {
    fn same_identity(&self, other: &Self) -> bool {
        self.group == other.group && self.artifact == other.artifact
    }

    fn identity(&self) -> String {
        format!("{}:{}", self.group, self.artifact)
    }
}

/// The version facts of one descriptor snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentVersions {
    pub version: String,
    pub parent: Option<ParentReference>,
}

/// Merge local and remote version facts against their common base.
pub fn merge_versions(
    local: &DocumentVersions,
    remote: &DocumentVersions,
    base: &DocumentVersions,
) -> Result<DocumentVersions, MergeError> {
    let version = merge_primary_version(&local.version, &remote.version, &base.version)?;
    let parent = merge_parent(
        local.parent.as_ref(),
        remote.parent.as_ref(),
        base.parent.as_ref(),
    )?;
    Ok(DocumentVersions { version, parent })
}

/// Adjudicate the module's own version.
pub fn merge_primary_version(local: &str, remote: &str, base: &str) -> Result<String, MergeError> {
    if remote == base || local == remote {
        return Ok(local.to_string());
    }
    if is_newer_version(local, remote) {
        debug!(local, remote, base, "local version is newer than remote");
        return Ok(local.to_string());
    }
    Err(MergeError::VersionConflict {
        local: local.to_string(),
        remote: remote.to_string(),
        base: base.to_string(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParentChange {
    Added,
    Removed,
    Changed,
    Unchanged,
}

fn classify(base: Option<&ParentReference>, side: Option<&ParentReference>) -> ParentChange {
    match (base, side) {
        (None, None) => ParentChange::Unchanged,
        (None, Some(_)) => ParentChange::Added,
        (Some(_), None) => ParentChange::Removed,
        (Some(b), Some(s)) if b == s => ParentChange::Unchanged,
        (Some(_), Some(_)) => ParentChange::Changed,
    }
}

/// Adjudicate the parent reference.
pub fn merge_parent(
    local: Option<&ParentReference>,
    remote: Option<&ParentReference>,
    base: Option<&ParentReference>,
) -> Result<Option<ParentReference>, MergeError> {
    use ParentChange::*;

    let local_change = classify(base, local);
    let remote_change = classify(base, remote);
    debug!(?local_change, ?remote_change, "merging parent reference");

    match (local_change, remote_change, local, remote) {
        (Unchanged, _, _, _) => Ok(remote.cloned()),
        (Added, Unchanged, _, _) | (Changed, Unchanged, _, _) => Ok(local.cloned()),
        (Added, Added, Some(l), Some(r)) | (Changed, Changed, Some(l), Some(r)) => {
            resolve_both_set(l, r).map(Some)
        }
        (Removed, Unchanged, _, _) | (Removed, Removed, _, _) => Ok(None),
        (Removed, Changed, _, _) => Err(MergeError::ParentConflict(
            "parent removed locally but changed remotely".into(),
        )),
        (Changed, Removed, _, _) => Err(MergeError::ParentConflict(
            "parent changed locally but removed remotely".into(),
        )),
        _ => Err(MergeError::ParentConflict(format!(
            "inconsistent parent history (local {:?}, remote {:?})",
            local_change, remote_change
        ))),
    }
}

fn resolve_both_set(
    local: &ParentReference,
    remote: &ParentReference,
) -> Result<ParentReference, MergeError> {
    if !local.same_identity(remote) {
        return Err(MergeError::ParentConflict(format!(
            "local parent {} differs from remote parent {}",
            local.identity(),
            remote.identity()
        )));
    }
    if local.version == remote.version || is_newer_version(&local.version, &remote.version) {
        return Ok(local.clone());
    }
    Err(MergeError::ParentConflict(format!(
        "local parent version '{}' is not newer than remote '{}'",
        local.version, remote.version
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parent(version: &str) -> ParentReference {
        ParentReference {
            group: "org.example".into(),
            artifact: "parent".into(),
            version: version.into(),
        }
    }

    fn doc(version: &str, parent_version: Option<&str>) -> DocumentVersions {
        DocumentVersions {
            version: version.into(),
            parent: parent_version.map(parent),
        }
    }

    #[test]
    fn test_unchanged_remote_takes_local() {
        for local in ["1.0", "0.1-SNAPSHOT", "9.9.9", "weird"] {
            let merged = merge_primary_version(local, "1.0-SNAPSHOT", "1.0-SNAPSHOT").unwrap();
            assert_eq!(merged, local);
        }
    }

    #[test]
    fn test_newer_local_wins_over_changed_remote() {
        let merged = merge_primary_version("1.2-SNAPSHOT", "1.1", "1.0-SNAPSHOT").unwrap();
        assert_eq!(merged, "1.2-SNAPSHOT");
    }

    #[test]
    fn test_conflict_when_local_not_newer() {
        let err = merge_primary_version("1.0", "1.1", "1.0-SNAPSHOT").unwrap_err();
        assert!(matches!(err, MergeError::VersionConflict { .. }));

        // Local untouched while remote moved on: still not newer.
        let err = merge_primary_version("1.0-SNAPSHOT", "1.1-SNAPSHOT", "1.0-SNAPSHOT");
        assert!(err.is_err());
    }

    #[test]
    fn test_identical_changes_agree() {
        let merged = merge_primary_version("1.0", "1.0", "1.0-SNAPSHOT").unwrap();
        assert_eq!(merged, "1.0");
    }

    #[test]
    fn test_parent_added_on_both_sides() {
        let base = doc("1", None);
        let merged = merge_versions(&doc("1", Some("2.0")), &doc("1", Some("1.0")), &base).unwrap();
        assert_eq!(merged.parent, Some(parent("2.0")));

        let err = merge_versions(&doc("1", Some("1.0")), &doc("1", Some("2.0")), &base);
        assert!(matches!(err, Err(MergeError::ParentConflict(_))));
    }

    #[test]
    fn test_parent_added_with_different_identity_conflicts() {
        let base = doc("1", None);
        let mut other = doc("1", Some("3.0"));
        if let Some(p) = other.parent.as_mut() {
            p.artifact = "other-parent".into();
        }
        let err = merge_versions(&doc("1", Some("3.0")), &other, &base);
        assert!(matches!(err, Err(MergeError::ParentConflict(_))));
    }

    #[test]
    fn test_parent_added_locally_only() {
        let merged = merge_versions(&doc("1", Some("1.0")), &doc("1", None), &doc("1", None)).unwrap();
        assert_eq!(merged.parent, Some(parent("1.0")));
    }

    #[test]
    fn test_parent_removed_locally() {
        let base = doc("1", Some("1.0"));
        let merged = merge_versions(&doc("1", None), &doc("1", Some("1.0")), &base).unwrap();
        assert_eq!(merged.parent, None);

        let merged = merge_versions(&doc("1", None), &doc("1", None), &base).unwrap();
        assert_eq!(merged.parent, None);

        let err = merge_versions(&doc("1", None), &doc("1", Some("1.1")), &base);
        assert!(matches!(err, Err(MergeError::ParentConflict(_))));
    }

    #[test]
    fn test_parent_changed_on_both_sides() {
        let base = doc("1", Some("1.0-SNAPSHOT"));
        let merged =
            merge_versions(&doc("1", Some("1.1-SNAPSHOT")), &doc("1", Some("1.0")), &base).unwrap();
        assert_eq!(merged.parent, Some(parent("1.1-SNAPSHOT")));

        let err = merge_versions(&doc("1", Some("1.0")), &doc("1", Some("1.1")), &base);
        assert!(matches!(err, Err(MergeError::ParentConflict(_))));

        let err = merge_versions(&doc("1", Some("1.1")), &doc("1", None), &base);
        assert!(matches!(err, Err(MergeError::ParentConflict(_))));
    }

    #[test]
    fn test_unchanged_local_parent_takes_remote() {
        let base = doc("1", Some("1.0"));
        let merged = merge_versions(&doc("1", Some("1.0")), &doc("1", Some("1.5")), &base).unwrap();
        assert_eq!(merged.parent, Some(parent("1.5")));
    }
}
