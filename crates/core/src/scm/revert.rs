//! Reverting a range of commits on top of the current remote.
//!
//! This is not a reset. The change from `from` back to `to` is treated as a
//! local edit and reconciled with whatever landed on the remote since `from`
//! (base = `from`, local = `to`, remote = remote head), then committed as a
//! new revision.

use tracing::{info, instrument, warn};

use super::requests::RevertCommitsRequest;
use super::snapshot::{apply_tree, read_tree, Snapshot};
use super::ScmRevision;
use crate::errors::{ScmError, ScmOperation};
use crate::merge::reconcile_trees;

const OP: ScmOperation = ScmOperation::RevertCommits;

/// Backend primitives the revert algorithm is built from.
pub trait RevertSupport {
    /// Whether `ancestor` is `descendant` or one of its ancestors.
    fn is_ancestor(&self, ancestor: &ScmRevision, descendant: &ScmRevision) -> Result<bool, ScmError>;

    /// The full tree at `revision`.
    fn snapshot(&self, revision: &ScmRevision) -> Result<Snapshot, ScmError>;

    /// Bring the working copy to the remote head, returning that revision.
    fn sync_to_remote(&self) -> Result<ScmRevision, ScmError>;

    /// Root of the working copy.
    fn working_root(&self) -> &std::path::Path;

    /// Commit `paths` of the working copy and publish them, returning the
    /// remote revision.
    fn commit_and_publish(&self, message: &str, paths: &[String]) -> Result<ScmRevision, ScmError>;
}

/// Run the revert for `request` against `backend`.
#[instrument(skip(backend, request), fields(from = %request.from, to = %request.to))]
pub fn revert_commits<B: RevertSupport + ?Sized>(
    backend: &B,
    request: &RevertCommitsRequest,
) -> Result<ScmRevision, ScmError> {
    if !backend.is_ancestor(&request.to, &request.from)? {
        return Err(ScmError::invalid(
            OP,
            format!("{} is not an ancestor of {}", request.to, request.from),
        ));
    }

    let head = backend.sync_to_remote()?;
    let base = backend.snapshot(&request.from)?;
    let target = backend.snapshot(&request.to)?;
    let remote = backend.snapshot(&head)?;

    let merged = reconcile_trees(&base, &target, &remote, &request.merge_strategy)
        .map_err(|(path, source)| ScmError::conflict(OP, path, source))?;

    // Files no revision knows about (build output, local settings) are left
    // alone.
    let root = backend.working_root();
    let current: Snapshot = read_tree(root)
        .map_err(ScmError::io(OP))?
        .into_iter()
        .filter(|(path, _)| {
            base.contains_key(path) || target.contains_key(path) || remote.contains_key(path)
        })
        .collect();
    let changed = apply_tree(root, &current, &merged).map_err(ScmError::io(OP))?;
    if changed.is_empty() {
        warn!(head = %head, "revert produced no changes");
        return Ok(head);
    }

    let revision = backend.commit_and_publish(&request.message, &changed)?;
    info!(%revision, changed = changed.len(), "reverted commits");
    Ok(revision)
}
