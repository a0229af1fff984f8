//! Provider-agnostic version control.
//!
//! [`ScmProvider`] is the only contract the release workflow consumes. It
//! covers both centralized backends (one global revision counter, e.g. svn)
//! and distributed ones (local plus tracked-remote revisions, e.g. git).
//! Operations that must reconcile diverged state take a
//! [`MergeStrategy`](crate::merge::MergeStrategy) on their request.

pub mod connection;
pub mod git;
pub mod memory;
pub mod registry;
pub mod requests;
pub mod results;
pub mod revert;
pub mod snapshot;
pub mod svn;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::ScmError;

pub use connection::{provider_name, provider_url};
pub use git::GitScmProvider;
pub use memory::{MemoryRepository, MemoryScm};
pub use registry::{ProviderSettings, ScmProviderRegistry};
pub use requests::{
    BranchRequest, CheckoutRequest, CommitRequest, DeleteBranchRequest, DeleteTagRequest,
    DiffRequest, HistoryRequest, PushRequest, ReferenceSource, RevertCommitsRequest,
    RevisionBound, TagRequest, UpdateRequest,
};
pub use results::{ChangeType, DiffObject, DiffResult, HistoryCommit, HistoryResult};
pub use snapshot::Snapshot;
pub use svn::{SvnLayout, SvnScmProvider};

/// Opaque, provider-defined revision identifier.
///
/// Numeric for centralized backends, a commit hash for distributed ones. The
/// core never looks inside it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScmRevision(String);

impl ScmRevision {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScmRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ScmRevision {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ScmRevision {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u64> for ScmRevision {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

/// The operations a release needs from a version control backend.
///
/// Mutating operations fail with [`ScmError`], which always names the
/// attempted operation. Existence checks (`has_tag`, `has_branch`) answer
/// `Ok(false)` for "not found" and only fail on access problems.
pub trait ScmProvider: Send {
    /// Registry name of the backend (`git`, `svn`, ...).
    fn name(&self) -> &'static str;

    /// Root of the working copy the provider operates on.
    fn working_directory(&self) -> &Path;

    /// Populate an empty working directory from the remote.
    fn checkout(&self, request: &CheckoutRequest) -> Result<ScmRevision, ScmError>;

    /// Commit working copy changes, optionally publishing them.
    ///
    /// Returns the remote revision when pushed, else the new local one.
    fn commit(&self, request: &CommitRequest) -> Result<ScmRevision, ScmError>;

    /// Publish local commits, reconciling with an advanced remote.
    fn push(&self, request: &PushRequest) -> Result<ScmRevision, ScmError>;

    /// Bring the working copy up to date with the remote.
    fn update(&self, request: &UpdateRequest) -> Result<ScmRevision, ScmError>;

    /// Create a tag. Returns the tagged revision.
    fn tag(&self, request: &TagRequest) -> Result<ScmRevision, ScmError>;

    fn has_tag(&self, name: &str) -> Result<bool, ScmError>;

    fn delete_tag(&self, request: &DeleteTagRequest) -> Result<(), ScmError>;

    /// Create a branch. Returns the revision the branch points at.
    fn branch(&self, request: &BranchRequest) -> Result<ScmRevision, ScmError>;

    fn has_branch(&self, name: &str) -> Result<bool, ScmError>;

    fn delete_branch(&self, request: &DeleteBranchRequest) -> Result<(), ScmError>;

    /// Restore the content of `to` on top of the current remote.
    ///
    /// Returns the new latest remote revision.
    fn revert_commits(&self, request: &RevertCommitsRequest) -> Result<ScmRevision, ScmError>;

    fn get_history(&self, request: &HistoryRequest) -> Result<HistoryResult, ScmError>;

    fn get_diff(&self, request: &DiffRequest) -> Result<DiffResult, ScmError>;

    /// Revision the working copy is based on.
    fn local_revision(&self) -> Result<ScmRevision, ScmError>;

    /// Newest revision on the tracked remote.
    fn latest_remote_revision(&self) -> Result<ScmRevision, ScmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revision_is_opaque_string() {
        let rev = ScmRevision::from(86_u64);
        assert_eq!(rev.as_str(), "86");
        assert_eq!(rev.to_string(), "86");
        assert_eq!(ScmRevision::from("abc123"), ScmRevision::new("abc123"));
    }
}
