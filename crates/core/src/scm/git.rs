//! Distributed backend on top of `git2`.
//!
//! The repository is opened per operation; no `git2` handle outlives a call.
//! Commits are local until pushed. Pushing and updating fetch the tracked
//! remote first and reconcile diverged history with a merge commit whose
//! conflicts are settled by the request's [`MergeStrategy`].

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{
    AutotagOption, Commit, Cred, CredentialType, Delta, Diff, DiffFindOptions, DiffOptions,
    Direction, ErrorCode, FetchOptions, Index, IndexAddOption, IndexEntry, ObjectType, Oid, Patch,
    PushOptions, RemoteCallbacks, Repository, ResetType, Signature, Sort, Tree, TreeWalkMode, TreeWalkResult,
};
use tracing::{debug, info, instrument, warn};

use super::requests::{
    BranchRequest, CheckoutRequest, CommitRequest, DeleteBranchRequest, DeleteTagRequest,
    DiffRequest, HistoryRequest, PushRequest, ReferenceSource, RevertCommitsRequest,
    RevisionBound, TagRequest, UpdateRequest,
};
use super::results::{ChangeType, DiffObject, DiffResult, HistoryCommit, HistoryResult};
use super::revert::{self, RevertSupport};
use super::snapshot::Snapshot;
use super::{ScmProvider, ScmRevision};
use crate::errors::{ScmError, ScmOperation};
use crate::merge::{reconcile, MergeStrategy};

/// Stage bits of an index entry's flags.
const STAGE_MASK: u16 = 0x3000;

const DEFAULT_AUTHOR: (&str, &str) = ("scmrelease", "scmrelease@localhost");

/// Git working copy plus its tracked remote.
#[derive(Debug, Clone)]
pub struct GitScmProvider {
    root: PathBuf,
    remote: String,
    credentials: Option<(String, String)>,
}

impl GitScmProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            remote: "origin".to_string(),
            credentials: None,
        }
    }

    /// Track a remote other than `origin`.
    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    /// Authenticate with username and password (or token) over https.
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    fn open(&self, op: ScmOperation) -> Result<Repository, ScmError> {
        Repository::open(&self.root).map_err(ScmError::git(op))
    }

    fn callbacks(&self) -> RemoteCallbacks<'static> {
        let mut callbacks = RemoteCallbacks::new();
        let credentials = self.credentials.clone();
        callbacks.credentials(move |_url, username_from_url, allowed| {
            if let Some((user, pass)) = &credentials {
                if allowed.contains(CredentialType::USER_PASS_PLAINTEXT) {
                    return Cred::userpass_plaintext(user, pass);
                }
            }
            if allowed.contains(CredentialType::SSH_KEY) {
                return Cred::ssh_key_from_agent(username_from_url.unwrap_or("git"));
            }
            Cred::default()
        });
        callbacks
    }

    fn fetch_options(&self) -> FetchOptions<'static> {
        let mut options = FetchOptions::new();
        options.remote_callbacks(self.callbacks());
        options.download_tags(AutotagOption::All);
        options
    }

    fn has_remote(&self, repo: &Repository) -> bool {
        repo.find_remote(&self.remote).is_ok()
    }

    #[instrument(skip(self, repo))]
    fn fetch(&self, repo: &Repository, op: ScmOperation) -> Result<(), ScmError> {
        let mut remote = repo.find_remote(&self.remote).map_err(ScmError::git(op))?;
        remote
            .fetch(&[] as &[&str], Some(&mut self.fetch_options()), None)
            .map_err(ScmError::git(op))?;
        debug!(remote = %self.remote, "fetch completed");
        Ok(())
    }

    /// Push `refspecs`, turning per-ref rejections into errors.
    #[instrument(skip(self, repo))]
    fn push_refspecs(&self, repo: &Repository, refspecs: &[String], op: ScmOperation) -> Result<(), ScmError> {
        let mut remote = repo.find_remote(&self.remote).map_err(ScmError::git(op))?;
        let mut callbacks = self.callbacks();
        let rejected = Arc::new(Mutex::new(None::<String>));
        let rejected_slot = Arc::clone(&rejected);
        callbacks.push_update_reference(move |refname, status| {
            if let Some(msg) = status {
                warn!(refname, msg, "push rejected");
                if let Ok(mut slot) = rejected_slot.lock() {
                    *slot = Some(format!("{refname}: {msg}"));
                }
            }
            Ok(())
        });
        let mut options = PushOptions::new();
        options.remote_callbacks(callbacks);
        remote
            .push(refspecs, Some(&mut options))
            .map_err(ScmError::git(op))?;

        let rejection = rejected.lock().ok().and_then(|mut slot| slot.take());
        if let Some(detail) = rejection {
            return Err(ScmError::failed(op, format!("push rejected: {detail}")));
        }
        info!(?refspecs, "push completed");
        Ok(())
    }

    fn signature(repo: &Repository) -> Result<Signature<'static>, git2::Error> {
        repo.signature()
            .or_else(|_| Signature::now(DEFAULT_AUTHOR.0, DEFAULT_AUTHOR.1))
    }

    fn current_branch(repo: &Repository, op: ScmOperation) -> Result<String, ScmError> {
        let head = repo.head().map_err(ScmError::git(op))?;
        if !head.is_branch() {
            return Err(ScmError::failed(op, "HEAD is detached"));
        }
        head.shorthand()
            .map(str::to_owned)
            .ok_or_else(|| ScmError::failed(op, "branch name is not UTF-8"))
    }

    fn head_oid(repo: &Repository, op: ScmOperation) -> Result<Oid, ScmError> {
        repo.head()
            .and_then(|h| h.peel_to_commit())
            .map(|c| c.id())
            .map_err(ScmError::git(op))
    }

    fn remote_head(&self, repo: &Repository, branch: &str, op: ScmOperation) -> Result<Option<Oid>, ScmError> {
        let name = format!("refs/remotes/{}/{}", self.remote, branch);
        match repo.find_reference(&name) {
            Ok(reference) => Ok(reference.target()),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(ScmError::git(op)(e)),
        }
    }

    fn parse_oid(revision: &ScmRevision, op: ScmOperation) -> Result<Oid, ScmError> {
        Oid::from_str(revision.as_str())
            .map_err(|_| ScmError::invalid(op, format!("'{revision}' is not a commit id")))
    }

    fn resolve_bound(repo: &Repository, bound: &RevisionBound, op: ScmOperation) -> Result<Oid, ScmError> {
        match bound {
            RevisionBound::Revision(revision) => Self::parse_oid(revision, op),
            RevisionBound::Tag(name) => repo
                .revparse_single(&format!("refs/tags/{name}"))
                .and_then(|o| o.peel_to_commit())
                .map(|c| c.id())
                .map_err(ScmError::git(op)),
        }
    }

    /// Move the current branch (and working tree) to `target`.
    fn move_branch(repo: &Repository, target: &Commit<'_>, op: ScmOperation, reason: &str) -> Result<(), ScmError> {
        repo.checkout_tree(target.as_object(), Some(CheckoutBuilder::new().safe()))
            .map_err(ScmError::git(op))?;
        let mut head = repo.head().map_err(ScmError::git(op))?;
        head.set_target(target.id(), reason).map_err(ScmError::git(op))?;
        Ok(())
    }

    /// Point the branch back at `previous`, keeping the index and working tree.
    fn unwind_commit(repo: &Repository, previous: Oid) -> Result<(), ScmError> {
        let op = ScmOperation::Commit;
        let target = repo.find_object(previous, None).map_err(ScmError::git(op))?;
        repo.reset(&target, ResetType::Soft, None)
            .map_err(ScmError::git(op))?;
        warn!(head = %previous, "publish failed, local commit undone");
        Ok(())
    }

    /// Bring HEAD together with `target`: nothing, fast-forward, or a merge
    /// commit. Returns the resulting HEAD.
    fn integrate(
        &self,
        repo: &Repository,
        target: Oid,
        strategy: &MergeStrategy,
        op: ScmOperation,
    ) -> Result<Oid, ScmError> {
        let local = Self::head_oid(repo, op)?;
        let git = ScmError::git(op);
        if local == target || repo.graph_descendant_of(local, target).map_err(git)? {
            debug!(%local, %target, "local already contains target");
            return Ok(local);
        }

        let target_commit = repo.find_commit(target).map_err(ScmError::git(op))?;
        if repo
            .graph_descendant_of(target, local)
            .map_err(ScmError::git(op))?
        {
            info!(%local, %target, "fast-forwarding");
            Self::move_branch(repo, &target_commit, op, "scmrelease: fast-forward")?;
            return Ok(target);
        }

        info!(%local, %target, strategy = strategy.name(), "merging diverged history");
        let local_commit = repo.find_commit(local).map_err(ScmError::git(op))?;
        let mut index = repo
            .merge_commits(&local_commit, &target_commit, None)
            .map_err(ScmError::git(op))?;
        Self::resolve_conflicts(repo, &mut index, strategy, op)?;
        let tree_oid = index.write_tree_to(repo).map_err(ScmError::git(op))?;
        let tree = repo.find_tree(tree_oid).map_err(ScmError::git(op))?;
        let signature = Self::signature(repo).map_err(ScmError::git(op))?;
        let message = format!("Merge {target} into {local}");
        let merge_oid = repo
            .commit(
                None,
                &signature,
                &signature,
                &message,
                &tree,
                &[&local_commit, &target_commit],
            )
            .map_err(ScmError::git(op))?;
        let merge_commit = repo.find_commit(merge_oid).map_err(ScmError::git(op))?;
        Self::move_branch(repo, &merge_commit, op, "scmrelease: merge")?;
        Ok(merge_oid)
    }

    fn resolve_conflicts(
        repo: &Repository,
        index: &mut Index,
        strategy: &MergeStrategy,
        op: ScmOperation,
    ) -> Result<(), ScmError> {
        if !index.has_conflicts() {
            return Ok(());
        }
        let conflicts = index
            .conflicts()
            .and_then(|c| c.collect::<Result<Vec<_>, _>>())
            .map_err(ScmError::git(op))?;

        let read = |entry: &Option<IndexEntry>| -> Result<Option<Vec<u8>>, ScmError> {
            entry
                .as_ref()
                .map(|e| repo.find_blob(e.id).map(|b| b.content().to_vec()))
                .transpose()
                .map_err(ScmError::git(op))
        };

        for conflict in conflicts {
            let Some(path_bytes) = [&conflict.our, &conflict.their, &conflict.ancestor]
                .into_iter()
                .flatten()
                .map(|e| e.path.clone())
                .next()
            else {
                continue;
            };
            let path = String::from_utf8_lossy(&path_bytes).into_owned();
            let base = read(&conflict.ancestor)?;
            let local = read(&conflict.our)?;
            let remote = read(&conflict.their)?;

            let resolved = reconcile(&path, base.as_deref(), local.as_deref(), remote.as_deref(), strategy)
                .map_err(|e| ScmError::conflict(op, path.clone(), e))?;
            index
                .remove_path(Path::new(&path))
                .map_err(ScmError::git(op))?;

            if let Some(content) = resolved {
                let Some(template) = conflict.our.or(conflict.their) else {
                    continue;
                };
                let id = repo.blob(&content).map_err(ScmError::git(op))?;
                let entry = IndexEntry {
                    id,
                    file_size: u32::try_from(content.len()).unwrap_or(u32::MAX),
                    flags: template.flags & !STAGE_MASK,
                    ..template
                };
                index.add(&entry).map_err(ScmError::git(op))?;
            }
            debug!(path, "resolved merge conflict");
        }
        Ok(())
    }

    /// Fetch, integrate the remote branch, and push. Returns the pushed head.
    fn publish(&self, repo: &Repository, strategy: &MergeStrategy, op: ScmOperation) -> Result<Oid, ScmError> {
        let branch = Self::current_branch(repo, op)?;
        self.fetch(repo, op)?;
        let mut head = Self::head_oid(repo, op)?;
        if let Some(remote) = self.remote_head(repo, &branch, op)? {
            head = self.integrate(repo, remote, strategy, op)?;
        }
        let refspec = format!("refs/heads/{branch}:refs/heads/{branch}");
        self.push_refspecs(repo, &[refspec], op)?;
        Ok(head)
    }

    fn commit_index(&self, repo: &Repository, request: &CommitRequest) -> Result<Oid, ScmError> {
        let op = ScmOperation::Commit;
        let git = |e| ScmError::git(op)(e);
        let mut index = repo.index().map_err(git)?;
        if request.paths.is_empty() {
            index
                .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
                .map_err(git)?;
            index.update_all(["*"].iter(), None).map_err(git)?;
        } else {
            index
                .add_all(request.paths.iter(), IndexAddOption::DEFAULT, None)
                .map_err(git)?;
            index.update_all(request.paths.iter(), None).map_err(git)?;
        }
        index.write().map_err(git)?;
        let tree_oid = index.write_tree().map_err(git)?;

        let parent = match repo.head() {
            Ok(head) => Some(head.peel_to_commit().map_err(git)?),
            Err(_) => None,
        };
        if let Some(parent) = &parent {
            if parent.tree_id() == tree_oid {
                debug!(head = %parent.id(), "nothing to commit");
                return Ok(parent.id());
            }
        }

        let tree = repo.find_tree(tree_oid).map_err(git)?;
        let signature = Self::signature(repo).map_err(git)?;
        let parents: Vec<&Commit<'_>> = parent.iter().collect();
        let oid = repo
            .commit(Some("HEAD"), &signature, &signature, &request.message, &tree, &parents)
            .map_err(git)?;
        info!(sha = %oid, "created commit");
        Ok(oid)
    }

    fn tree_snapshot(repo: &Repository, tree: &Tree<'_>, op: ScmOperation) -> Result<Snapshot, ScmError> {
        let mut snapshot = Snapshot::new();
        let mut failure = None;
        tree.walk(TreeWalkMode::PreOrder, |dir, entry| {
            if entry.kind() != Some(ObjectType::Blob) {
                return TreeWalkResult::Ok;
            }
            let Some(name) = entry.name() else {
                return TreeWalkResult::Ok;
            };
            match repo.find_blob(entry.id()) {
                Ok(blob) => {
                    snapshot.insert(format!("{dir}{name}"), blob.content().to_vec());
                    TreeWalkResult::Ok
                }
                Err(e) => {
                    failure = Some(e);
                    TreeWalkResult::Abort
                }
            }
        })
        .map_err(ScmError::git(op))?;
        match failure {
            Some(e) => Err(ScmError::git(op)(e)),
            None => Ok(snapshot),
        }
    }

    fn create_reference(
        &self,
        op: ScmOperation,
        refname: &str,
        source: &ReferenceSource,
        commit_before: Option<CommitRequest>,
        push: bool,
        create: impl FnOnce(&Repository, &Commit<'_>) -> Result<(), git2::Error>,
    ) -> Result<ScmRevision, ScmError> {
        let repo = self.open(op)?;
        if repo.find_reference(refname).is_ok() {
            return Err(ScmError::failed(op, format!("{refname} already exists")));
        }
        let target = match source {
            ReferenceSource::WorkingCopy => {
                if let Some(commit) = commit_before {
                    self.commit(&commit)?;
                }
                Self::head_oid(&repo, op)?
            }
            ReferenceSource::Remote { revision } => {
                self.fetch(&repo, op)?;
                match revision {
                    Some(revision) => Self::parse_oid(revision, op)?,
                    None => {
                        let branch = Self::current_branch(&repo, op)?;
                        self.remote_head(&repo, &branch, op)?.ok_or_else(|| {
                            ScmError::failed(op, format!("remote has no branch '{branch}'"))
                        })?
                    }
                }
            }
        };
        let commit = repo.find_commit(target).map_err(ScmError::git(op))?;
        create(&repo, &commit).map_err(ScmError::git(op))?;
        info!(refname, %target, "created reference");
        if push {
            self.push_refspecs(&repo, &[format!("{refname}:{refname}")], op)?;
        }
        Ok(ScmRevision::from(target.to_string()))
    }

    fn has_reference(&self, refname: &str, op: ScmOperation) -> Result<bool, ScmError> {
        let repo = self.open(op)?;
        if repo.find_reference(refname).is_ok() {
            return Ok(true);
        }
        if !self.has_remote(&repo) {
            return Ok(false);
        }
        let mut remote = repo.find_remote(&self.remote).map_err(ScmError::git(op))?;
        let connection = remote
            .connect_auth(Direction::Fetch, Some(self.callbacks()), None)
            .map_err(ScmError::git(op))?;
        let found = connection
            .list()
            .map_err(ScmError::git(op))?
            .iter()
            .any(|head| head.name() == refname);
        Ok(found)
    }

    fn delete_reference(&self, refname: &str, push: bool, op: ScmOperation) -> Result<(), ScmError> {
        let repo = self.open(op)?;
        let existed = match repo.find_reference(refname) {
            Ok(mut reference) => {
                reference.delete().map_err(ScmError::git(op))?;
                true
            }
            Err(e) if e.code() == ErrorCode::NotFound => false,
            Err(e) => return Err(ScmError::git(op)(e)),
        };
        if push {
            self.push_refspecs(&repo, &[format!(":{refname}")], op)?;
        } else if !existed {
            return Err(ScmError::failed(op, format!("{refname} does not exist")));
        }
        info!(refname, push, "deleted reference");
        Ok(())
    }

    fn collect_diff(diff: &mut Diff<'_>, status_only: bool, op: ScmOperation) -> Result<DiffResult, ScmError> {
        let mut find = DiffFindOptions::new();
        find.renames(true).copies(true);
        diff.find_similar(Some(&mut find)).map_err(ScmError::git(op))?;

        let mut objects = Vec::new();
        for (idx, delta) in diff.deltas().enumerate() {
            let change_type = match delta.status() {
                Delta::Added | Delta::Untracked => ChangeType::Added,
                Delta::Deleted => ChangeType::Deleted,
                Delta::Modified | Delta::Typechange => ChangeType::Modified,
                Delta::Renamed => ChangeType::Moved,
                Delta::Copied => ChangeType::Copied,
                _ => ChangeType::Unknown,
            };
            let old_path = (change_type != ChangeType::Added)
                .then(|| diff_path(&delta.old_file()))
                .flatten();
            let new_path = (change_type != ChangeType::Deleted)
                .then(|| diff_path(&delta.new_file()))
                .flatten();

            let text = if status_only {
                None
            } else {
                match Patch::from_diff(diff, idx).map_err(ScmError::git(op))? {
                    Some(mut patch) => {
                        let buf = patch.to_buf().map_err(ScmError::git(op))?;
                        Some(buf.as_str().unwrap_or_default().to_string())
                    }
                    None => None,
                }
            };
            objects.push(DiffObject {
                change_type,
                old_path,
                new_path,
                diff: text,
            });
        }
        Ok(DiffResult::new(objects))
    }
}

fn diff_path(file: &git2::DiffFile<'_>) -> Option<String> {
    file.path().map(|p| p.to_string_lossy().replace('\\', "/"))
}

impl ScmProvider for GitScmProvider {
    fn name(&self) -> &'static str {
        "git"
    }

    fn working_directory(&self) -> &Path {
        &self.root
    }

    #[instrument(skip(self, request), fields(url = %request.remote_url, path = %self.root.display()))]
    fn checkout(&self, request: &CheckoutRequest) -> Result<ScmRevision, ScmError> {
        let op = ScmOperation::Checkout;
        if self.root.exists() {
            let mut entries = std::fs::read_dir(&self.root).map_err(ScmError::io(op))?;
            if entries.next().is_some() {
                return Err(ScmError::failed(op, "working directory is not empty"));
            }
        }
        if !request.paths.is_empty() {
            warn!(paths = ?request.paths, "git checkouts always include the whole tree");
        }

        let mut builder = RepoBuilder::new();
        builder.fetch_options(self.fetch_options());
        if let Some(branch) = &request.branch {
            builder.branch(branch);
        }
        let repo = builder
            .clone(&request.remote_url, &self.root)
            .map_err(ScmError::git(op))?;

        let detach_to = match (&request.revision, &request.tag) {
            (Some(revision), _) => Some(Self::parse_oid(revision, op)?),
            (None, Some(tag)) => Some(Self::resolve_bound(&repo, &RevisionBound::Tag(tag.clone()), op)?),
            (None, None) => None,
        };
        if let Some(oid) = detach_to {
            let commit = repo.find_commit(oid).map_err(ScmError::git(op))?;
            repo.checkout_tree(commit.as_object(), Some(CheckoutBuilder::new().force()))
                .map_err(ScmError::git(op))?;
            repo.set_head_detached(oid).map_err(ScmError::git(op))?;
        }

        let head = Self::head_oid(&repo, op)?;
        info!(%head, "clone completed");
        Ok(ScmRevision::from(head.to_string()))
    }

    #[instrument(skip(self, request), fields(path = %self.root.display(), push = request.push))]
    fn commit(&self, request: &CommitRequest) -> Result<ScmRevision, ScmError> {
        let repo = self.open(ScmOperation::Commit)?;
        let previous = Self::head_oid(&repo, ScmOperation::Commit).ok();
        let local = self.commit_index(&repo, request)?;
        if !request.push {
            return Ok(ScmRevision::from(local.to_string()));
        }
        match self.publish(&repo, &request.merge_strategy, ScmOperation::Push) {
            Ok(pushed) => Ok(ScmRevision::from(pushed.to_string())),
            Err(err) => {
                // A commit that never reached the remote must not stay on the branch.
                if let Some(previous) = previous.filter(|p| *p != local) {
                    Self::unwind_commit(&repo, previous)?;
                }
                Err(err)
            }
        }
    }

    #[instrument(skip(self, request), fields(path = %self.root.display()))]
    fn push(&self, request: &PushRequest) -> Result<ScmRevision, ScmError> {
        let repo = self.open(ScmOperation::Push)?;
        let pushed = self.publish(&repo, &request.merge_strategy, ScmOperation::Push)?;
        Ok(ScmRevision::from(pushed.to_string()))
    }

    #[instrument(skip(self, request), fields(path = %self.root.display()))]
    fn update(&self, request: &UpdateRequest) -> Result<ScmRevision, ScmError> {
        let op = ScmOperation::Update;
        let repo = self.open(op)?;
        self.fetch(&repo, op)?;
        let target = match &request.revision {
            Some(revision) => Some(Self::parse_oid(revision, op)?),
            None => {
                let branch = Self::current_branch(&repo, op)?;
                self.remote_head(&repo, &branch, op)?
            }
        };
        let head = match target {
            Some(target) => self.integrate(&repo, target, &request.merge_strategy, op)?,
            None => Self::head_oid(&repo, op)?,
        };
        Ok(ScmRevision::from(head.to_string()))
    }

    fn tag(&self, request: &TagRequest) -> Result<ScmRevision, ScmError> {
        let commit_before = if request.commit_before {
            Some(
                CommitRequest::builder()
                    .message(request.message.as_str())
                    .push(request.push)
                    .merge_strategy(request.merge_strategy.clone())
                    .build()?,
            )
        } else {
            None
        };
        let name = request.name.clone();
        let message = request.message.clone();
        self.create_reference(
            ScmOperation::Tag,
            &format!("refs/tags/{}", request.name),
            &request.source,
            commit_before,
            request.push,
            move |repo, commit| {
                let signature = Self::signature(repo)?;
                repo.tag(&name, commit.as_object(), &signature, &message, false)
                    .map(|_| ())
            },
        )
    }

    fn has_tag(&self, name: &str) -> Result<bool, ScmError> {
        self.has_reference(&format!("refs/tags/{name}"), ScmOperation::Tag)
    }

    fn delete_tag(&self, request: &DeleteTagRequest) -> Result<(), ScmError> {
        self.delete_reference(
            &format!("refs/tags/{}", request.name),
            request.push,
            ScmOperation::DeleteTag,
        )
    }

    fn branch(&self, request: &BranchRequest) -> Result<ScmRevision, ScmError> {
        let commit_before = if request.commit_before {
            Some(
                CommitRequest::builder()
                    .message(request.message.as_str())
                    .push(request.push)
                    .merge_strategy(request.merge_strategy.clone())
                    .build()?,
            )
        } else {
            None
        };
        let name = request.name.clone();
        self.create_reference(
            ScmOperation::Branch,
            &format!("refs/heads/{}", request.name),
            &request.source,
            commit_before,
            request.push,
            move |repo, commit| repo.branch(&name, commit, false).map(|_| ()),
        )
    }

    fn has_branch(&self, name: &str) -> Result<bool, ScmError> {
        self.has_reference(&format!("refs/heads/{name}"), ScmOperation::Branch)
    }

    fn delete_branch(&self, request: &DeleteBranchRequest) -> Result<(), ScmError> {
        self.delete_reference(
            &format!("refs/heads/{}", request.name),
            request.push,
            ScmOperation::DeleteBranch,
        )
    }

    fn revert_commits(&self, request: &RevertCommitsRequest) -> Result<ScmRevision, ScmError> {
        revert::revert_commits(self, request)
    }

    #[instrument(skip(self, request))]
    fn get_history(&self, request: &HistoryRequest) -> Result<HistoryResult, ScmError> {
        let op = ScmOperation::History;
        let repo = self.open(op)?;
        let git = |e| ScmError::git(op)(e);

        let mut revwalk = repo.revwalk().map_err(git)?;
        match &request.to {
            Some(bound) => revwalk.push(Self::resolve_bound(&repo, bound, op)?).map_err(git)?,
            None => revwalk.push_head().map_err(git)?,
        }
        if let Some(bound) = &request.from {
            revwalk.hide(Self::resolve_bound(&repo, bound, op)?).map_err(git)?;
        }
        revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME).map_err(git)?;

        let limit = request.limit.unwrap_or(usize::MAX);
        let mut commits = Vec::new();
        for oid in revwalk {
            if commits.len() >= limit {
                break;
            }
            let commit = repo.find_commit(oid.map_err(git)?).map_err(git)?;
            let message = commit.message().unwrap_or_default().to_string();
            if !request.matches_message(&message) {
                continue;
            }

            let tree = commit.tree().map_err(git)?;
            let parent_tree = match commit.parent(0) {
                Ok(parent) => Some(parent.tree().map_err(git)?),
                Err(_) => None,
            };
            let diff = repo
                .diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)
                .map_err(git)?;
            let changed_paths: Vec<String> = diff
                .deltas()
                .filter_map(|d| d.new_file().path().or_else(|| d.old_file().path()))
                .map(|p| p.to_string_lossy().replace('\\', "/"))
                .collect();
            if !request.selects_any(changed_paths.iter().map(String::as_str)) {
                continue;
            }

            let author = commit.author();
            commits.push(HistoryCommit {
                revision: ScmRevision::from(commit.id().to_string()),
                author: author.name().unwrap_or_default().to_string(),
                date: DateTime::<Utc>::from_timestamp(author.when().seconds(), 0).unwrap_or_default(),
                message,
                changed_paths,
            });
        }
        debug!(count = commits.len(), "collected history");
        Ok(HistoryResult::newest_first(commits))
    }

    #[instrument(skip(self, request))]
    fn get_diff(&self, request: &DiffRequest) -> Result<DiffResult, ScmError> {
        let op = ScmOperation::Diff;
        let repo = self.open(op)?;
        let git = |e| ScmError::git(op)(e);

        let mut options = DiffOptions::new();
        options.include_untracked(true).recurse_untracked_dirs(true);
        for path in &request.paths {
            options.pathspec(path);
        }

        let old_tree = match &request.from {
            Some(bound) => {
                let oid = Self::resolve_bound(&repo, bound, op)?;
                repo.find_commit(oid).and_then(|c| c.tree()).map_err(git)?
            }
            None => repo.head().and_then(|h| h.peel_to_tree()).map_err(git)?,
        };
        let mut diff = match &request.to {
            Some(bound) => {
                let oid = Self::resolve_bound(&repo, bound, op)?;
                let new_tree = repo.find_commit(oid).and_then(|c| c.tree()).map_err(git)?;
                repo.diff_tree_to_tree(Some(&old_tree), Some(&new_tree), Some(&mut options))
                    .map_err(git)?
            }
            None => repo
                .diff_tree_to_workdir_with_index(Some(&old_tree), Some(&mut options))
                .map_err(git)?,
        };
        Self::collect_diff(&mut diff, request.status_only, op)
    }

    fn local_revision(&self) -> Result<ScmRevision, ScmError> {
        let repo = self.open(ScmOperation::Info)?;
        Ok(ScmRevision::from(Self::head_oid(&repo, ScmOperation::Info)?.to_string()))
    }

    fn latest_remote_revision(&self) -> Result<ScmRevision, ScmError> {
        let op = ScmOperation::Info;
        let repo = self.open(op)?;
        self.fetch(&repo, op)?;
        let branch = Self::current_branch(&repo, op)?;
        let oid = self
            .remote_head(&repo, &branch, op)?
            .ok_or_else(|| ScmError::failed(op, format!("remote has no branch '{branch}'")))?;
        Ok(ScmRevision::from(oid.to_string()))
    }
}

impl RevertSupport for GitScmProvider {
    fn is_ancestor(&self, ancestor: &ScmRevision, descendant: &ScmRevision) -> Result<bool, ScmError> {
        let op = ScmOperation::RevertCommits;
        let repo = self.open(op)?;
        let ancestor = Self::parse_oid(ancestor, op)?;
        let descendant = Self::parse_oid(descendant, op)?;
        if ancestor == descendant {
            return Ok(true);
        }
        repo.graph_descendant_of(descendant, ancestor)
            .map_err(ScmError::git(op))
    }

    fn snapshot(&self, revision: &ScmRevision) -> Result<Snapshot, ScmError> {
        let op = ScmOperation::RevertCommits;
        let repo = self.open(op)?;
        let oid = Self::parse_oid(revision, op)?;
        let tree = repo
            .find_commit(oid)
            .and_then(|c| c.tree())
            .map_err(ScmError::git(op))?;
        Self::tree_snapshot(&repo, &tree, op)
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

    /// A bare "remote" with one commit, plus a clone of it.
    fn setup() -> (tempfile::TempDir, GitScmProvider, String) {
        let dir = tempfile::tempdir().unwrap();
        let remote_path = dir.path().join("remote.git");
        Repository::init_bare(&remote_path).unwrap();
        let url = remote_path.to_string_lossy().into_owned();

        let seed = GitScmProvider::new(dir.path().join("seed"));
        seed_initial_commit(&seed, &url);

        let provider = GitScmProvider::new(dir.path().join("wc"));
        let checkout = CheckoutRequest::builder().remote_url(&url).build().unwrap();
        provider.checkout(&checkout).unwrap();
        (dir, provider, url)
    }

    fn seed_initial_commit(seed: &GitScmProvider, url: &str) {
        let repo = Repository::init(seed.working_directory()).unwrap();
        repo.remote("origin", url).unwrap();
        std::fs::write(seed.working_directory().join("module.toml"), "version = \"1\"\n").unwrap();
        let request = CommitRequest::builder().message("initial").build().unwrap();
        seed.commit(&request).unwrap();
        let branch = GitScmProvider::current_branch(&repo, ScmOperation::Push).unwrap();
        seed.push_refspecs(
            &repo,
            &[format!("refs/heads/{branch}:refs/heads/{branch}")],
            ScmOperation::Push,
        )
        .unwrap();
    }

    fn write(provider: &GitScmProvider, path: &str, content: &str) {
        std::fs::write(provider.working_directory().join(path), content).unwrap();
    }

    #[test]
    fn test_commit_and_push() {
        let (_dir, provider, _url) = setup();
        write(&provider, "a.txt", "a");
        let request = CommitRequest::builder().message("add a").push(true).build().unwrap();
        let pushed = provider.commit(&request).unwrap();
        assert_eq!(provider.latest_remote_revision().unwrap(), pushed);
        assert_eq!(provider.local_revision().unwrap(), pushed);
    }

    #[test]
    fn test_commit_without_changes_returns_head() {
        let (_dir, provider, _url) = setup();
        let head = provider.local_revision().unwrap();
        let request = CommitRequest::builder().message("noop").build().unwrap();
        assert_eq!(provider.commit(&request).unwrap(), head);
    }

    #[test]
    fn test_push_merges_diverged_remote() {
        let (dir, provider, url) = setup();
        let other = GitScmProvider::new(dir.path().join("other"));
        other
            .checkout(&CheckoutRequest::builder().remote_url(&url).build().unwrap())
            .unwrap();
        write(&other, "b.txt", "from other");
        other
            .commit(&CommitRequest::builder().message("other").push(true).build().unwrap())
            .unwrap();

        write(&provider, "a.txt", "from provider");
        let pushed = provider
            .commit(&CommitRequest::builder().message("mine").push(true).build().unwrap())
            .unwrap();
        assert_eq!(provider.latest_remote_revision().unwrap(), pushed);
        assert!(provider.working_directory().join("b.txt").exists());
    }

    #[test]
    fn test_push_conflict_follows_strategy() {
        let (dir, provider, url) = setup();
        let other = GitScmProvider::new(dir.path().join("other"));
        other
            .checkout(&CheckoutRequest::builder().remote_url(&url).build().unwrap())
            .unwrap();
        write(&other, "module.toml", "version = \"remote\"\n");
        other
            .commit(&CommitRequest::builder().message("other").push(true).build().unwrap())
            .unwrap();

        write(&provider, "module.toml", "version = \"local\"\n");
        let before = provider.local_revision().unwrap();
        let err = provider
            .commit(&CommitRequest::builder().message("mine").push(true).build().unwrap())
            .unwrap_err();
        assert!(matches!(err, ScmError::Conflict { .. }));
        assert_eq!(provider.local_revision().unwrap(), before);

        let pushed = provider
            .commit(
                &CommitRequest::builder()
                    .message("mine")
                    .push(true)
                    .merge_strategy(MergeStrategy::UseLocal)
                    .build()
                    .unwrap(),
            )
            .unwrap();
        assert_eq!(provider.latest_remote_revision().unwrap(), pushed);
        let content = std::fs::read_to_string(provider.working_directory().join("module.toml")).unwrap();
        assert_eq!(content, "version = \"local\"\n");
    }

    #[test]
    fn test_tag_push_and_delete() {
        let (_dir, provider, _url) = setup();
        let request = TagRequest::builder()
            .name("app-1.0")
            .message("release 1.0")
            .push(true)
            .build()
            .unwrap();
        let tagged = provider.tag(&request).unwrap();
        assert_eq!(tagged, provider.local_revision().unwrap());
        assert!(provider.has_tag("app-1.0").unwrap());
        assert!(provider.tag(&request).is_err());

        let delete = DeleteTagRequest::builder().name("app-1.0").push(true).build().unwrap();
        provider.delete_tag(&delete).unwrap();
        assert!(!provider.has_tag("app-1.0").unwrap());
    }

    #[test]
    fn test_branch_create_and_delete() {
        let (_dir, provider, _url) = setup();
        let request = BranchRequest::builder().name("maint").build().unwrap();
        provider.branch(&request).unwrap();
        assert!(provider.has_branch("maint").unwrap());
        provider
            .delete_branch(&DeleteBranchRequest::builder().name("maint").build().unwrap())
            .unwrap();
        assert!(!provider.has_branch("maint").unwrap());
    }

    #[test]
    fn test_history_and_diff() {
        let (_dir, provider, _url) = setup();
        let first = provider.local_revision().unwrap();
        write(&provider, "a.txt", "one\n");
        provider
            .commit(&CommitRequest::builder().message("[release] add a").build().unwrap())
            .unwrap();
        write(&provider, "a.txt", "two\n");

        let history = provider
            .get_history(&HistoryRequest::builder().message_filter("^\\[release\\]").build().unwrap())
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history.commits()[0].changed_paths, ["a.txt"]);

        let since_first = provider
            .get_history(&HistoryRequest::builder().from(RevisionBound::Revision(first)).build().unwrap())
            .unwrap();
        assert_eq!(since_first.len(), 1);

        let diff = provider.get_diff(&DiffRequest::default()).unwrap();
        assert_eq!(diff.len(), 1);
        let object = diff.iter().next().unwrap();
        assert_eq!(object.change_type, ChangeType::Modified);
        assert!(object.diff.as_deref().unwrap().contains("+two"));
    }

    #[test]
    fn test_revert_on_top_of_remote() {
        let (_dir, provider, _url) = setup();
        let before = provider.local_revision().unwrap();
        write(&provider, "module.toml", "version = \"2\"\n");
        let after = provider
            .commit(&CommitRequest::builder().message("bump").push(true).build().unwrap())
            .unwrap();
        write(&provider, "other.txt", "unrelated");
        let head = provider
            .commit(&CommitRequest::builder().message("unrelated").push(true).build().unwrap())
            .unwrap();

        let request = RevertCommitsRequest::builder().from(after).to(before).build().unwrap();
        let reverted = provider.revert_commits(&request).unwrap();
        assert_ne!(reverted, head);
        assert_eq!(provider.latest_remote_revision().unwrap(), reverted);
        let content = std::fs::read_to_string(provider.working_directory().join("module.toml")).unwrap();
        assert_eq!(content, "version = \"1\"\n");
        assert!(provider.working_directory().join("other.txt").exists());
    }

    #[test]
    fn test_revert_leaves_ignored_files() {
        let (_dir, provider, _url) = setup();
        write(&provider, ".gitignore", "target/\n");
        let before = provider
            .commit(&CommitRequest::builder().message("ignore").push(true).build().unwrap())
            .unwrap();
        write(&provider, "module.toml", "version = \"2\"\n");
        let after = provider
            .commit(&CommitRequest::builder().message("bump").push(true).build().unwrap())
            .unwrap();
        let output = provider.working_directory().join("target/app.jar");
        std::fs::create_dir_all(output.parent().unwrap()).unwrap();
        std::fs::write(&output, "built").unwrap();

        let request = RevertCommitsRequest::builder().from(after).to(before).build().unwrap();
        provider.revert_commits(&request).unwrap();
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "built");
        let content = std::fs::read_to_string(provider.working_directory().join("module.toml")).unwrap();
        assert_eq!(content, "version = \"1\"\n");
    }

    #[test]
    fn test_rejected_publish_keeps_head() {
        let (dir, provider, url) = setup();
        let other = GitScmProvider::new(dir.path().join("other"));
        other
            .checkout(&CheckoutRequest::builder().remote_url(&url).build().unwrap())
            .unwrap();
        write(&other, "module.toml", "version = \"remote\"\n");
        other
            .commit(&CommitRequest::builder().message("other").push(true).build().unwrap())
            .unwrap();

        let before = provider.local_revision().unwrap();
        write(&provider, "module.toml", "version = \"local\"\n");
        let request = CommitRequest::builder()
            .message("prepare release")
            .paths(["module.toml"])
            .push(true)
            .build()
            .unwrap();
        assert!(provider.commit(&request).is_err());

        assert_eq!(provider.local_revision().unwrap(), before);
        let content = std::fs::read_to_string(provider.working_directory().join("module.toml")).unwrap();
        assert_eq!(content, "version = \"local\"\n");
    }

    #[test]
    fn test_checkout_requires_empty_directory() {
        let (_dir, provider, url) = setup();
        let request = CheckoutRequest::builder().remote_url(url).build().unwrap();
        let err = provider.checkout(&request).unwrap_err();
        assert_eq!(err.operation(), ScmOperation::Checkout);
    }
}
