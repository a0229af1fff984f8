//! Immutable results of read-only SCM queries.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ScmRevision;

/// Kind of change recorded for one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Deleted,
    Modified,
    Moved,
    Copied,
    Unknown,
}

impl ChangeType {
    /// Map an svn summarize item / log action.
    pub fn from_svn(action: &str) -> Self {
        match action {
            "A" | "added" => Self::Added,
            "D" | "deleted" => Self::Deleted,
            "M" | "R" | "modified" | "replaced" => Self::Modified,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Added => "added",
            Self::Deleted => "deleted",
            Self::Modified => "modified",
            Self::Moved => "moved",
            Self::Copied => "copied",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// One changed path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DiffObject {
    pub change_type: ChangeType,
    pub old_path: Option<String>,
    pub new_path: Option<String>,
    /// Unified diff text, absent for status-only queries.
    pub diff: Option<String>,
}

impl DiffObject {
    /// The path the change is best known by: new path, else old path.
    pub fn path(&self) -> Option<&str> {
        self.new_path.as_deref().or(self.old_path.as_deref())
    }
}

/// The changes between two points of history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResult {
    objects: BTreeSet<DiffObject>,
}

impl DiffResult {
    pub fn new(objects: impl IntoIterator<Item = DiffObject>) -> Self {
        Self {
            objects: objects.into_iter().collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &DiffObject> {
        self.objects.iter()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn paths(&self) -> BTreeSet<&str> {
        self.objects.iter().filter_map(DiffObject::path).collect()
    }
}

/// One commit of history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryCommit {
    pub revision: ScmRevision,
    pub author: String,
    pub date: DateTime<Utc>,
    pub message: String,
    pub changed_paths: Vec<String>,
}

/// Commits in newest-first order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryResult {
    commits: Vec<HistoryCommit>,
    newest_first: bool,
}

impl HistoryResult {
    /// Build from commits already ordered newest first.
    pub fn newest_first(commits: Vec<HistoryCommit>) -> Self {
        Self {
            commits,
            newest_first: true,
        }
    }

    /// The same commits in the opposite order.
    pub fn reversed(&self) -> Self {
        let mut commits = self.commits.clone();
        commits.reverse();
        Self {
            commits,
            newest_first: !self.newest_first,
        }
    }

    pub fn is_newest_first(&self) -> bool {
        self.newest_first
    }

    pub fn commits(&self) -> &[HistoryCommit] {
        &self.commits
    }

    pub fn len(&self) -> usize {
        self.commits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }

    /// The newest commit regardless of order.
    pub fn latest(&self) -> Option<&HistoryCommit> {
        if self.newest_first {
            self.commits.first()
        } else {
            self.commits.last()
        }
    }
}
