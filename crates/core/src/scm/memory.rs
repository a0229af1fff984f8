//! In-memory centralized backend.
//!
//! [`MemoryRepository`] plays the remote: a linear history with numeric
//! revisions (`0` is the empty tree), plus tag and branch tables.
//! [`MemoryScm`] is a working copy of it on disk. Commits go straight to the
//! remote, like a centralized system, and are reconciled with any revisions
//! that landed since the working copy's base.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use super::requests::{
    BranchRequest, CheckoutRequest, CommitRequest, DeleteBranchRequest, DeleteTagRequest,
    DiffRequest, HistoryRequest, PushRequest, ReferenceSource, RevertCommitsRequest,
    RevisionBound, TagRequest, UpdateRequest,
};
use super::results::{DiffResult, HistoryCommit, HistoryResult};
use super::revert::{self, RevertSupport};
use super::snapshot::{apply_tree, diff_trees, read_tree, restrict, Snapshot};
use super::{ScmProvider, ScmRevision};
use crate::errors::{ScmError, ScmOperation};
use crate::merge::{reconcile_trees, MergeStrategy};

const AUTHOR: &str = "scmrelease";

// ---------------------------------------------------------------------------
// Remote
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct MemoryCommit {
    revision: u64,
    author: String,
    date: DateTime<Utc>,
    message: String,
    tree: Snapshot,
    changed: Vec<String>,
}

#[derive(Debug, Default)]
struct RemoteState {
    commits: Vec<MemoryCommit>,
    tags: BTreeMap<String, u64>,
    branches: BTreeMap<String, u64>,
}

impl RemoteState {
    fn latest(&self) -> u64 {
        self.commits.last().map_or(0, |c| c.revision)
    }

    fn tree(&self, revision: u64) -> Option<Snapshot> {
        if revision == 0 {
            return Some(Snapshot::new());
        }
        self.commits
            .get(usize::try_from(revision - 1).ok()?)
            .map(|c| c.tree.clone())
    }

    fn push_commit(&mut self, tree: Snapshot, message: &str) -> u64 {
        let previous = self.tree(self.latest()).unwrap_or_default();
        let mut changed: Vec<String> = tree
            .iter()
            .filter(|(p, c)| previous.get(*p) != Some(*c))
            .map(|(p, _)| p.clone())
            .collect();
        changed.extend(previous.keys().filter(|p| !tree.contains_key(*p)).cloned());
        changed.sort();

        let revision = self.latest() + 1;
        self.commits.push(MemoryCommit {
            revision,
            author: AUTHOR.to_string(),
            date: Utc::now(),
            message: message.to_string(),
            tree,
            changed,
        });
        revision
    }
}

/// A shared in-memory remote repository.
///
/// Clones share the same history, so several working copies (or a test and
/// the provider under test) can observe each other's commits.
#[derive(Debug, Clone, Default)]
pub struct MemoryRepository {
    state: Arc<Mutex<RemoteState>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RemoteState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Commit `tree` as the next revision, bypassing any working copy.
    pub fn commit_tree(&self, tree: Snapshot, message: &str) -> ScmRevision {
        ScmRevision::from(self.lock().push_commit(tree, message))
    }

    /// Commit the head tree with `path` set to `content`.
    pub fn commit_file(&self, path: &str, content: &[u8], message: &str) -> ScmRevision {
        let mut state = self.lock();
        let mut tree = state.tree(state.latest()).unwrap_or_default();
        tree.insert(path.to_string(), content.to_vec());
        ScmRevision::from(state.push_commit(tree, message))
    }

    pub fn latest(&self) -> ScmRevision {
        ScmRevision::from(self.lock().latest())
    }

    /// The tree at `revision`, if it exists.
    pub fn tree(&self, revision: &ScmRevision) -> Option<Snapshot> {
        let revision = revision.as_str().parse().ok()?;
        self.lock().tree(revision)
    }

    pub fn tag_revision(&self, name: &str) -> Option<ScmRevision> {
        self.lock().tags.get(name).map(|r| ScmRevision::from(*r))
    }

    pub fn branch_revision(&self, name: &str) -> Option<ScmRevision> {
        self.lock().branches.get(name).map(|r| ScmRevision::from(*r))
    }

    /// Message of the commit at `revision`.
    pub fn message(&self, revision: &ScmRevision) -> Option<String> {
        let revision: u64 = revision.as_str().parse().ok()?;
        let state = self.lock();
        state
            .commits
            .get(usize::try_from(revision.checked_sub(1)?).ok()?)
            .map(|c| c.message.clone())
    }
}

// ---------------------------------------------------------------------------
// Working copy
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct WorkingState {
    base: Option<u64>,
    paths: Vec<String>,
}

/// A working copy of a [`MemoryRepository`].
#[derive(Debug)]
pub struct MemoryScm {
    repository: MemoryRepository,
    root: PathBuf,
    working: Mutex<WorkingState>,
}

fn parse_revision(operation: ScmOperation, revision: &ScmRevision) -> Result<u64, ScmError> {
    revision.as_str().parse().map_err(|_| {
        ScmError::invalid(operation, format!("'{revision}' is not a numeric revision"))
    })
}

/// Apply the change `from -> to` onto `local`.
fn overlay(local: &Snapshot, from: &Snapshot, to: &Snapshot) -> Snapshot {
    let mut out = local.clone();
    for path in from.keys().chain(to.keys()) {
        if from.get(path) != to.get(path) {
            match to.get(path) {
                Some(content) => out.insert(path.clone(), content.clone()),
                None => out.remove(path),
            };
        }
    }
    out
}

impl MemoryScm {
    /// A working copy rooted at `root`; call [`ScmProvider::checkout`] first.
    pub fn new(repository: MemoryRepository, root: impl Into<PathBuf>) -> Self {
        Self {
            repository,
            root: root.into(),
            working: Mutex::new(WorkingState::default()),
        }
    }

    /// A working copy checked out at the remote head.
    pub fn checked_out(
        repository: MemoryRepository,
        root: impl Into<PathBuf>,
    ) -> Result<Self, ScmError> {
        let scm = Self::new(repository, root);
        let request = CheckoutRequest::builder().remote_url("memory").build()?;
        scm.checkout(&request)?;
        Ok(scm)
    }

    pub fn repository(&self) -> &MemoryRepository {
        &self.repository
    }

    fn working(&self) -> MutexGuard<'_, WorkingState> {
        self.working.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn base(&self, operation: ScmOperation) -> Result<(u64, Vec<String>), ScmError> {
        let working = self.working();
        match working.base {
            Some(base) => Ok((base, working.paths.clone())),
            None => Err(ScmError::failed(operation, "working copy is not checked out")),
        }
    }

    fn tree_at(&self, operation: ScmOperation, revision: u64) -> Result<Snapshot, ScmError> {
        self.repository
            .lock()
            .tree(revision)
            .ok_or_else(|| ScmError::failed(operation, format!("no such revision {revision}")))
    }

    fn resolve(&self, operation: ScmOperation, bound: &RevisionBound) -> Result<u64, ScmError> {
        match bound {
            RevisionBound::Revision(revision) => parse_revision(operation, revision),
            RevisionBound::Tag(name) => self
                .repository
                .lock()
                .tags
                .get(name)
                .copied()
                .ok_or_else(|| ScmError::failed(operation, format!("no such tag '{name}'"))),
        }
    }

    fn read_working(&self, operation: ScmOperation) -> Result<Snapshot, ScmError> {
        read_tree(&self.root).map_err(ScmError::io(operation))
    }

    fn create_reference(
        &self,
        operation: ScmOperation,
        name: &str,
        message: &str,
        source: &ReferenceSource,
        commit_before: bool,
        strategy: &MergeStrategy,
        tags: bool,
    ) -> Result<ScmRevision, ScmError> {
        let revision = match source {
            ReferenceSource::WorkingCopy => {
                if commit_before {
                    let request = CommitRequest::builder()
                        .message(message)
                        .merge_strategy(strategy.clone())
                        .build()?;
                    self.commit(&request)?;
                }
                self.base(operation)?.0
            }
            ReferenceSource::Remote { revision } => match revision {
                Some(r) => parse_revision(operation, r)?,
                None => self.repository.lock().latest(),
            },
        };

        let mut state = self.repository.lock();
        if revision > state.latest() {
            return Err(ScmError::failed(operation, format!("no such revision {revision}")));
        }
        let table = if tags { &mut state.tags } else { &mut state.branches };
        if table.contains_key(name) {
            return Err(ScmError::failed(operation, format!("'{name}' already exists")));
        }
        table.insert(name.to_string(), revision);
        info!(name, revision, "created reference");
        Ok(ScmRevision::from(revision))
    }
}

impl ScmProvider for MemoryScm {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn working_directory(&self) -> &Path {
        &self.root
    }

    #[instrument(skip(self, request), fields(root = %self.root.display()))]
    fn checkout(&self, request: &CheckoutRequest) -> Result<ScmRevision, ScmError> {
        let op = ScmOperation::Checkout;
        if self.root.exists() {
            let mut entries = std::fs::read_dir(&self.root).map_err(ScmError::io(op))?;
            if entries.next().is_some() {
                return Err(ScmError::failed(op, "working directory is not empty"));
            }
        }
        std::fs::create_dir_all(&self.root).map_err(ScmError::io(op))?;

        let revision = {
            let state = self.repository.lock();
            let named = |table: &BTreeMap<String, u64>, name: &str, kind: &str| {
                table
                    .get(name)
                    .copied()
                    .ok_or_else(|| ScmError::failed(op, format!("no such {kind} '{name}'")))
            };
            match (&request.revision, &request.tag, &request.branch) {
                (Some(revision), _, _) => parse_revision(op, revision)?,
                (None, Some(tag), _) => named(&state.tags, tag, "tag")?,
                (None, None, Some(branch)) => named(&state.branches, branch, "branch")?,
                (None, None, None) => state.latest(),
            }
        };

        let tree = restrict(&self.tree_at(op, revision)?, &request.paths);
        apply_tree(&self.root, &Snapshot::new(), &tree).map_err(ScmError::io(op))?;
        *self.working() = WorkingState {
            base: Some(revision),
            paths: request.paths.clone(),
        };
        info!(revision, files = tree.len(), "checked out");
        Ok(ScmRevision::from(revision))
    }

    #[instrument(skip(self, request), fields(root = %self.root.display()))]
    fn commit(&self, request: &CommitRequest) -> Result<ScmRevision, ScmError> {
        let op = ScmOperation::Commit;
        let (base, scope) = self.base(op)?;
        let base_tree = restrict(&self.tree_at(op, base)?, &scope);
        let local = self.read_working(op)?;

        // Unselected paths keep their base content in the commit.
        let selected = if request.paths.is_empty() {
            local.clone()
        } else {
            overlay(
                &base_tree,
                &restrict(&base_tree, &request.paths),
                &restrict(&local, &request.paths),
            )
        };

        let mut state = self.repository.lock();
        let head = state.latest();
        let head_tree = state.tree(head).unwrap_or_default();
        let head_scoped = restrict(&head_tree, &scope);
        let merged = if head == base {
            selected.clone()
        } else {
            debug!(base, head, "remote advanced, reconciling");
            reconcile_trees(&base_tree, &selected, &head_scoped, &request.merge_strategy)
                .map_err(|(path, source)| ScmError::conflict(op, path, source))?
        };

        let full = overlay(&head_tree, &head_scoped, &merged);
        let revision = if full == head_tree {
            debug!(head, "nothing to commit");
            head
        } else {
            state.push_commit(full, &request.message)
        };
        drop(state);

        // Bring remote changes into the working copy, keeping local edits.
        let refreshed = overlay(&local, &selected, &merged);
        apply_tree(&self.root, &local, &refreshed).map_err(ScmError::io(op))?;
        self.working().base = Some(revision);
        info!(revision, "committed");
        Ok(ScmRevision::from(revision))
    }

    fn push(&self, _request: &PushRequest) -> Result<ScmRevision, ScmError> {
        // Commits are already on the remote.
        self.local_revision()
    }

    #[instrument(skip(self, request), fields(root = %self.root.display()))]
    fn update(&self, request: &UpdateRequest) -> Result<ScmRevision, ScmError> {
        let op = ScmOperation::Update;
        let (base, scope) = self.base(op)?;
        let target = match &request.revision {
            Some(revision) => parse_revision(op, revision)?,
            None => self.repository.lock().latest(),
        };
        let base_tree = restrict(&self.tree_at(op, base)?, &scope);
        let target_tree = restrict(&self.tree_at(op, target)?, &scope);
        let local = self.read_working(op)?;

        let merged = reconcile_trees(&base_tree, &local, &target_tree, &request.merge_strategy)
            .map_err(|(path, source)| ScmError::conflict(op, path, source))?;
        apply_tree(&self.root, &local, &merged).map_err(ScmError::io(op))?;
        self.working().base = Some(target);
        debug!(from = base, to = target, "updated working copy");
        Ok(ScmRevision::from(target))
    }

    fn tag(&self, request: &TagRequest) -> Result<ScmRevision, ScmError> {
        self.create_reference(
            ScmOperation::Tag,
            &request.name,
            &request.message,
            &request.source,
            request.commit_before,
            &request.merge_strategy,
            true,
        )
    }

    fn has_tag(&self, name: &str) -> Result<bool, ScmError> {
        Ok(self.repository.lock().tags.contains_key(name))
    }

    fn delete_tag(&self, request: &DeleteTagRequest) -> Result<(), ScmError> {
        match self.repository.lock().tags.remove(&request.name) {
            Some(_) => {
                info!(tag = %request.name, "deleted tag");
                Ok(())
            }
            None => Err(ScmError::failed(
                ScmOperation::DeleteTag,
                format!("no such tag '{}'", request.name),
            )),
        }
    }

    fn branch(&self, request: &BranchRequest) -> Result<ScmRevision, ScmError> {
        self.create_reference(
            ScmOperation::Branch,
            &request.name,
            &request.message,
            &request.source,
            request.commit_before,
            &request.merge_strategy,
            false,
        )
    }

    fn has_branch(&self, name: &str) -> Result<bool, ScmError> {
        Ok(self.repository.lock().branches.contains_key(name))
    }

    fn delete_branch(&self, request: &DeleteBranchRequest) -> Result<(), ScmError> {
        match self.repository.lock().branches.remove(&request.name) {
            Some(_) => Ok(()),
            None => Err(ScmError::failed(
                ScmOperation::DeleteBranch,
                format!("no such branch '{}'", request.name),
            )),
        }
    }

    fn revert_commits(&self, request: &RevertCommitsRequest) -> Result<ScmRevision, ScmError> {
        revert::revert_commits(self, request)
    }

    fn get_history(&self, request: &HistoryRequest) -> Result<HistoryResult, ScmError> {
        let op = ScmOperation::History;
        let to = match &request.to {
            Some(bound) => self.resolve(op, bound)?,
            None => self.repository.lock().latest(),
        };
        let from = match &request.from {
            Some(bound) => self.resolve(op, bound)?,
            None => 0,
        };

        let state = self.repository.lock();
        let commits: Vec<HistoryCommit> = state
            .commits
            .iter()
            .rev()
            .filter(|c| c.revision > from && c.revision <= to)
            .filter(|c| request.selects_any(c.changed.iter().map(String::as_str)))
            .filter(|c| request.matches_message(&c.message))
            .take(request.limit.unwrap_or(usize::MAX))
            .map(|c| HistoryCommit {
                revision: ScmRevision::from(c.revision),
                author: c.author.clone(),
                date: c.date,
                message: c.message.clone(),
                changed_paths: c.changed.clone(),
            })
            .collect();
        Ok(HistoryResult::newest_first(commits))
    }

    fn get_diff(&self, request: &DiffRequest) -> Result<DiffResult, ScmError> {
        let op = ScmOperation::Diff;
        let old = match &request.from {
            Some(bound) => self.tree_at(op, self.resolve(op, bound)?)?,
            None => {
                let (base, scope) = self.base(op)?;
                restrict(&self.tree_at(op, base)?, &scope)
            }
        };
        let new = match &request.to {
            Some(bound) => self.tree_at(op, self.resolve(op, bound)?)?,
            None => self.read_working(op)?,
        };
        let old = restrict(&old, &request.paths);
        let new = restrict(&new, &request.paths);
        Ok(DiffResult::new(diff_trees(&old, &new, !request.status_only)))
    }

    fn local_revision(&self) -> Result<ScmRevision, ScmError> {
        Ok(ScmRevision::from(self.base(ScmOperation::Info)?.0))
    }

    fn latest_remote_revision(&self) -> Result<ScmRevision, ScmError> {
        Ok(self.repository.latest())
    }
}

impl RevertSupport for MemoryScm {
    fn is_ancestor(&self, ancestor: &ScmRevision, descendant: &ScmRevision) -> Result<bool, ScmError> {
        let op = ScmOperation::RevertCommits;
        let ancestor = parse_revision(op, ancestor)?;
        let descendant = parse_revision(op, descendant)?;
        Ok(ancestor <= descendant && descendant <= self.repository.lock().latest())
    }

    fn snapshot(&self, revision: &ScmRevision) -> Result<Snapshot, ScmError> {
        let op = ScmOperation::RevertCommits;
        let (_, scope) = self.base(op)?;
        Ok(restrict(&self.tree_at(op, parse_revision(op, revision)?)?, &scope))
    }

    fn sync_to_remote(&self) -> Result<ScmRevision, ScmError> {
        self.update(&UpdateRequest::default())
    }

    fn working_root(&self) -> &Path {
        &self.root
    }

    fn commit_and_publish(&self, message: &str, paths: &[String]) -> Result<ScmRevision, ScmError> {
        let request = CommitRequest::builder()
            .message(message)
            .paths(paths.iter().cloned())
            .push(true)
            .build()?;
        self.commit(&request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(files: &[(&str, &str)]) -> Snapshot {
        files
            .iter()
            .map(|(p, c)| (p.to_string(), c.as_bytes().to_vec()))
            .collect()
    }

    fn setup() -> (tempfile::TempDir, MemoryRepository, MemoryScm) {
        let dir = tempfile::tempdir().unwrap();
        let repository = MemoryRepository::new();
        repository.commit_tree(tree(&[("a.txt", "a1"), ("b.txt", "b1")]), "initial");
        let scm = MemoryScm::checked_out(repository.clone(), dir.path().join("wc")).unwrap();
        (dir, repository, scm)
    }

    #[test]
    fn test_checkout_requires_empty_directory() {
        let (dir, repository, _scm) = setup();
        let other = MemoryScm::new(repository, dir.path().join("wc"));
        let request = CheckoutRequest::builder().remote_url("memory").build().unwrap();
        let err = other.checkout(&request).unwrap_err();
        assert_eq!(err.operation(), ScmOperation::Checkout);
    }

    #[test]
    fn test_commit_creates_next_revision() {
        let (_dir, repository, scm) = setup();
        std::fs::write(scm.working_directory().join("a.txt"), "a2").unwrap();
        let request = CommitRequest::builder().message("change a").build().unwrap();
        let revision = scm.commit(&request).unwrap();
        assert_eq!(revision.as_str(), "2");
        assert_eq!(scm.local_revision().unwrap(), revision);
        assert_eq!(repository.tree(&revision).unwrap()["a.txt"], b"a2");
    }

    #[test]
    fn test_commit_with_nothing_changed_keeps_revision() {
        let (_dir, _repository, scm) = setup();
        let request = CommitRequest::builder().message("noop").build().unwrap();
        assert_eq!(scm.commit(&request).unwrap().as_str(), "1");
    }

    #[test]
    fn test_commit_reconciles_with_advanced_remote() {
        let (_dir, repository, scm) = setup();
        repository.commit_file("b.txt", b"b2", "remote change");
        std::fs::write(scm.working_directory().join("a.txt"), "a2").unwrap();

        let request = CommitRequest::builder().message("local change").build().unwrap();
        let revision = scm.commit(&request).unwrap();
        assert_eq!(revision.as_str(), "3");
        let head = repository.tree(&revision).unwrap();
        assert_eq!(head["a.txt"], b"a2");
        assert_eq!(head["b.txt"], b"b2");
        // Remote change is now in the working copy too.
        let b = std::fs::read(scm.working_directory().join("b.txt")).unwrap();
        assert_eq!(b, b"b2");
    }

    #[test]
    fn test_commit_fails_on_divergence_with_do_not_merge() {
        let (_dir, repository, scm) = setup();
        repository.commit_file("a.txt", b"remote", "remote change");
        std::fs::write(scm.working_directory().join("a.txt"), "local").unwrap();
        let request = CommitRequest::builder().message("m").build().unwrap();
        let err = scm.commit(&request).unwrap_err();
        assert!(matches!(err, ScmError::Conflict { ref path, .. } if path == "a.txt"));
        assert_eq!(repository.latest().as_str(), "2");
    }

    #[test]
    fn test_commit_path_subset_leaves_other_edits() {
        let (_dir, repository, scm) = setup();
        std::fs::write(scm.working_directory().join("a.txt"), "a2").unwrap();
        std::fs::write(scm.working_directory().join("b.txt"), "b2").unwrap();
        let request = CommitRequest::builder().message("only a").path("a.txt").build().unwrap();
        let revision = scm.commit(&request).unwrap();
        let head = repository.tree(&revision).unwrap();
        assert_eq!(head["a.txt"], b"a2");
        assert_eq!(head["b.txt"], b"b1");
        let b = std::fs::read(scm.working_directory().join("b.txt")).unwrap();
        assert_eq!(b, b"b2");
    }

    #[test]
    fn test_tags_and_branches() {
        let (_dir, _repository, scm) = setup();
        let request = TagRequest::builder().name("v1").message("tag").build().unwrap();
        assert_eq!(scm.tag(&request).unwrap().as_str(), "1");
        assert!(scm.has_tag("v1").unwrap());
        assert!(scm.tag(&request).is_err());

        let delete = DeleteTagRequest::builder().name("v1").build().unwrap();
        scm.delete_tag(&delete).unwrap();
        assert!(!scm.has_tag("v1").unwrap());
        assert!(scm.delete_tag(&delete).is_err());

        let branch = BranchRequest::builder()
            .name("maint")
            .source(ReferenceSource::Remote { revision: None })
            .build()
            .unwrap();
        scm.branch(&branch).unwrap();
        assert!(scm.has_branch("maint").unwrap());
        scm.delete_branch(&DeleteBranchRequest::builder().name("maint").build().unwrap())
            .unwrap();
        assert!(!scm.has_branch("maint").unwrap());
    }

    #[test]
    fn test_tag_commits_pending_changes_first() {
        let (_dir, repository, scm) = setup();
        std::fs::write(scm.working_directory().join("a.txt"), "tagged").unwrap();
        let request = TagRequest::builder()
            .name("v2")
            .message("release")
            .commit_before(true)
            .build()
            .unwrap();
        let revision = scm.tag(&request).unwrap();
        assert_eq!(revision.as_str(), "2");
        assert_eq!(repository.tag_revision("v2"), Some(revision));
    }

    #[test]
    fn test_history_is_newest_first_and_filtered() {
        let (_dir, repository, scm) = setup();
        repository.commit_file("a.txt", b"2", "[release] prepare 1.0");
        repository.commit_file("b.txt", b"3", "unrelated");
        let all = scm.get_history(&HistoryRequest::default()).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all.latest().unwrap().revision.as_str(), "3");

        let request = HistoryRequest::builder()
            .message_filter(r"^\[release\]")
            .build()
            .unwrap();
        let filtered = scm.get_history(&request).unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered.commits()[0].changed_paths, ["a.txt"]);

        let request = HistoryRequest::builder()
            .from(RevisionBound::Revision("1".into()))
            .path("b.txt")
            .build()
            .unwrap();
        assert_eq!(scm.get_history(&request).unwrap().len(), 1);
    }

    #[test]
    fn test_diff_against_working_copy() {
        let (_dir, _repository, scm) = setup();
        std::fs::write(scm.working_directory().join("a.txt"), "changed").unwrap();
        std::fs::remove_file(scm.working_directory().join("b.txt")).unwrap();
        let diff = scm.get_diff(&DiffRequest::builder().status_only(true).build().unwrap()).unwrap();
        assert_eq!(diff.len(), 2);
        assert!(diff.iter().all(|o| o.diff.is_none()));
    }

    #[test]
    fn test_update_keeps_local_edits() {
        let (_dir, repository, scm) = setup();
        repository.commit_file("b.txt", b"b2", "remote");
        std::fs::write(scm.working_directory().join("a.txt"), "local").unwrap();
        let revision = scm.update(&UpdateRequest::default()).unwrap();
        assert_eq!(revision.as_str(), "2");
        let a = std::fs::read(scm.working_directory().join("a.txt")).unwrap();
        let b = std::fs::read(scm.working_directory().join("b.txt")).unwrap();
        assert_eq!((a.as_slice(), b.as_slice()), (&b"local"[..], &b"b2"[..]));
    }

    #[test]
    fn test_revert_rejects_reversed_range() {
        let (_dir, repository, scm) = setup();
        repository.commit_file("a.txt", b"2", "second");
        let request = RevertCommitsRequest::builder().from("1").to("2").build().unwrap();
        let err = scm.revert_commits(&request).unwrap_err();
        assert!(matches!(err, ScmError::InvalidRequest { .. }));
    }
}
