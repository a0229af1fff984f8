//! [`ScmProvider`] for Subversion working copies.
//!
//! Subversion has a single global revision counter and no local history, so
//! commits are always remote, `push` only reports the working copy revision,
//! and tags and branches are server-side copies under a
//! `trunk/branches/tags` layout.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::client::SvnClient;
use super::parser::SvnStatusEntry;
use crate::errors::{MergeError, ScmError, ScmOperation};
use crate::merge::{reconcile, MergeStrategy};
use crate::scm::requests::{
    BranchRequest, CheckoutRequest, CommitRequest, DeleteBranchRequest, DeleteTagRequest,
    DiffRequest, HistoryRequest, PushRequest, ReferenceSource, RevertCommitsRequest,
    RevisionBound, TagRequest, UpdateRequest,
};
use crate::scm::results::{ChangeType, DiffObject, DiffResult, HistoryCommit, HistoryResult};
use crate::scm::revert::{self, RevertSupport};
use crate::scm::snapshot::{read_tree, Snapshot};
use crate::scm::{ScmProvider, ScmRevision};

/// Directory names of the standard repository layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SvnLayout {
    pub trunk: String,
    pub branches: String,
    pub tags: String,
}

impl Default for SvnLayout {
    fn default() -> Self {
        Self {
            trunk: "trunk".into(),
            branches: "branches".into(),
            tags: "tags".into(),
        }
    }
}

impl SvnLayout {
    /// The repository base URL of a trunk or branch URL.
    pub fn base_url(&self, url: &str) -> String {
        let url = url.trim_end_matches('/');
        if let Some(base) = url.strip_suffix(&format!("/{}", self.trunk)) {
            return base.to_string();
        }
        for container in [&self.branches, &self.tags] {
            let marker = format!("/{container}/");
            if let Some(pos) = url.rfind(&marker) {
                return url[..pos].to_string();
            }
        }
        url.to_string()
    }
}

#[derive(Debug, Clone)]
pub struct SvnScmProvider {
    root: PathBuf,
    url: String,
    layout: SvnLayout,
    client: SvnClient,
}

impl SvnScmProvider {
    /// `url` is the trunk (or branch) the working copy tracks.
    pub fn new(root: impl Into<PathBuf>, url: impl Into<String>, layout: SvnLayout) -> Self {
        Self {
            root: root.into(),
            url: url.into().trim_end_matches('/').to_string(),
            layout,
            client: SvnClient::default(),
        }
    }

    pub fn with_credentials(mut self, username: Option<String>, password: Option<String>) -> Self {
        self.client = SvnClient::new(username, password);
        self
    }

    pub fn tag_url(&self, name: &str) -> String {
        format!("{}/{}/{}", self.layout.base_url(&self.url), self.layout.tags, name)
    }

    pub fn branch_url(&self, name: &str) -> String {
        format!("{}/{}/{}", self.layout.base_url(&self.url), self.layout.branches, name)
    }

    fn container_url(&self, container: &str) -> String {
        format!("{}/{}", self.layout.base_url(&self.url), container)
    }

    fn root_str(&self) -> String {
        self.root.to_string_lossy().into_owned()
    }

    fn parse_revision(revision: &ScmRevision, op: ScmOperation) -> Result<u64, ScmError> {
        revision
            .as_str()
            .trim_start_matches('r')
            .parse()
            .map_err(|_| ScmError::invalid(op, format!("'{revision}' is not an svn revision")))
    }

    fn resolve_bound(&self, bound: &RevisionBound, op: ScmOperation) -> Result<u64, ScmError> {
        match bound {
            RevisionBound::Revision(revision) => Self::parse_revision(revision, op),
            RevisionBound::Tag(name) => {
                let info = self.client.info(&self.tag_url(name))?;
                Ok(info.last_changed_revision.unwrap_or(info.revision))
            }
        }
    }

    fn local_number(&self) -> Result<u64, ScmError> {
        Ok(self.client.info(&self.root_str())?.revision)
    }

    /// Schedule unversioned files for addition and missing ones for deletion.
    fn schedule_changes(&self, request: &CommitRequest) -> Result<(), ScmError> {
        let op = ScmOperation::Commit;
        for entry in self.client.status(&self.root)? {
            if !request.paths.is_empty() && !selected(&request.paths, &entry.path) {
                continue;
            }
            match entry.item.as_str() {
                "unversioned" => {
                    self.client
                        .run(op, Some(&self.root), &["add", "--parents", &entry.path])?;
                }
                "missing" => {
                    self.client.run(op, Some(&self.root), &["delete", &entry.path])?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn accept_option(strategy: &MergeStrategy) -> &'static str {
        match strategy {
            MergeStrategy::UseLocal => "mine-full",
            MergeStrategy::UseRemote => "theirs-full",
            MergeStrategy::DoNotMerge | MergeStrategy::FullMerge(_) => "postpone",
        }
    }

    /// Settle files left conflicted by `svn update --accept postpone`.
    fn resolve_conflicts(&self, strategy: &MergeStrategy, op: ScmOperation) -> Result<(), ScmError> {
        let conflicted: Vec<SvnStatusEntry> = self
            .client
            .status(&self.root)?
            .into_iter()
            .filter(SvnStatusEntry::is_conflicted)
            .collect();
        for entry in conflicted {
            if entry.tree_conflicted || !matches!(strategy, MergeStrategy::FullMerge(_)) {
                warn!(path = %entry.path, tree = entry.tree_conflicted, "unresolved svn conflict");
                return Err(ScmError::conflict(
                    op,
                    entry.path.clone(),
                    MergeError::Diverged { path: entry.path },
                ));
            }
            let sides = ConflictSides::read(&self.root, &entry.path).map_err(ScmError::io(op))?;
            let merged = reconcile(
                &entry.path,
                sides.base.as_deref(),
                sides.local.as_deref(),
                sides.remote.as_deref(),
                strategy,
            )
            .map_err(|e| ScmError::conflict(op, entry.path.clone(), e))?;
            let file = self.root.join(&entry.path);
            match merged {
                Some(content) => std::fs::write(&file, content).map_err(ScmError::io(op))?,
                None => std::fs::remove_file(&file).map_err(ScmError::io(op))?,
            }
            self.client
                .run(op, Some(&self.root), &["resolve", "--accept", "working", &entry.path])?;
            debug!(path = %entry.path, "resolved svn conflict");
        }
        Ok(())
    }

    fn update_to(&self, revision: Option<u64>, strategy: &MergeStrategy, op: ScmOperation) -> Result<u64, ScmError> {
        let accept = Self::accept_option(strategy);
        let revision_arg = revision.map_or_else(|| "HEAD".to_string(), |r| r.to_string());
        self.client.run(
            op,
            Some(&self.root),
            &["update", "--accept", accept, "-r", &revision_arg, "."],
        )?;
        self.resolve_conflicts(strategy, op)?;
        self.local_number()
    }

    fn create_copy(
        &self,
        op: ScmOperation,
        destination: String,
        source: &ReferenceSource,
        commit_before: Option<CommitRequest>,
        message: &str,
    ) -> Result<ScmRevision, ScmError> {
        let name = destination.rsplit('/').next().unwrap_or_default().to_string();
        let container = destination[..destination.len() - name.len()].trim_end_matches('/');
        if self.client.list(container)?.contains(&name) {
            return Err(ScmError::failed(op, format!("{destination} already exists")));
        }
        let revision = match source {
            ReferenceSource::WorkingCopy => {
                if let Some(commit) = commit_before {
                    self.commit(&commit)?;
                }
                let root = self.root_str();
                self.client.copy(op, &root, None, &destination, message)?
            }
            ReferenceSource::Remote { revision } => {
                let revision = revision
                    .as_ref()
                    .map(|r| Self::parse_revision(r, op).map(|n| n.to_string()))
                    .transpose()?;
                self.client
                    .copy(op, &self.url, revision.as_deref(), &destination, message)?
            }
        };
        Ok(ScmRevision::from(revision))
    }

    fn has_entry(&self, container: &str, name: &str) -> Result<bool, ScmError> {
        Ok(self
            .client
            .list(&self.container_url(container))?
            .iter()
            .any(|entry| entry == name))
    }

    /// Strip the repository path of the tracked URL from a log path.
    fn relative_log_path(&self, repository_path: &str, prefix: &str) -> Option<String> {
        repository_path
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('/'))
            .map(str::to_owned)
    }

    fn revision_range(&self, request: &DiffRequest, op: ScmOperation) -> Result<Option<String>, ScmError> {
        let from = request
            .from
            .as_ref()
            .map(|b| self.resolve_bound(b, op))
            .transpose()?;
        let to = request
            .to
            .as_ref()
            .map(|b| self.resolve_bound(b, op))
            .transpose()?;
        Ok(match (from, to) {
            (None, None) => None,
            (Some(from), None) => Some(from.to_string()),
            (None, Some(to)) => Some(format!("BASE:{to}")),
            (Some(from), Some(to)) => Some(format!("{from}:{to}")),
        })
    }
}

fn selected(paths: &[String], path: &str) -> bool {
    paths.iter().any(|p| {
        let p = p.trim_end_matches('/');
        path == p || path.strip_prefix(p).is_some_and(|r| r.starts_with('/'))
    })
}

/// The three sides svn leaves next to a postponed text conflict:
/// `file.mine`, `file.r<old>` and `file.r<new>`.
struct ConflictSides {
    base: Option<Vec<u8>>,
    local: Option<Vec<u8>>,
    remote: Option<Vec<u8>>,
}

impl ConflictSides {
    fn read(root: &Path, path: &str) -> std::io::Result<Self> {
        let file = root.join(path);
        let dir = file.parent().unwrap_or(root);
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut revisions: Vec<(u64, PathBuf)> = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let candidate = entry.file_name().to_string_lossy().into_owned();
            let revision = candidate
                .strip_prefix(&name)
                .and_then(|rest| rest.strip_prefix(".r"))
                .and_then(|digits| digits.parse::<u64>().ok());
            if let Some(revision) = revision {
                revisions.push((revision, entry.path()));
            }
        }
        revisions.sort();

        let read = |p: &Path| -> std::io::Result<Option<Vec<u8>>> {
            match std::fs::read(p) {
                Ok(content) => Ok(Some(content)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e),
            }
        };
        let base = match revisions.first() {
            Some((_, p)) => read(p)?,
            None => None,
        };
        let remote = match revisions.last() {
            Some((_, p)) if revisions.len() > 1 => read(p)?,
            _ => None,
        };
        let local = read(&dir.join(format!("{name}.mine")))?;
        Ok(Self { base, local, remote })
    }
}

impl ScmProvider for SvnScmProvider {
    fn name(&self) -> &'static str {
        "svn"
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
        let url = match (&request.branch, &request.tag) {
            (Some(branch), _) => self.branch_url(branch),
            (None, Some(tag)) => self.tag_url(tag),
            (None, None) => request.remote_url.trim_end_matches('/').to_string(),
        };
        let revision = request
            .revision
            .as_ref()
            .map(|r| Self::parse_revision(r, op).map(|n| n.to_string()))
            .transpose()?
            .unwrap_or_else(|| "HEAD".to_string());
        let root = self.root_str();

        if request.paths.is_empty() {
            self.client
                .run(op, None, &["checkout", "-r", &revision, &url, &root])?;
        } else {
            self.client.run(
                op,
                None,
                &["checkout", "--depth", "empty", "-r", &revision, &url, &root],
            )?;
            for path in &request.paths {
                self.client.run(
                    op,
                    Some(&self.root),
                    &["update", "--parents", "--set-depth", "infinity", "-r", &revision, path],
                )?;
            }
        }
        let local = self.local_number()?;
        info!(revision = local, "svn checkout completed");
        Ok(ScmRevision::from(local))
    }

    #[instrument(skip(self, request), fields(path = %self.root.display()))]
    fn commit(&self, request: &CommitRequest) -> Result<ScmRevision, ScmError> {
        self.update_to(None, &request.merge_strategy, ScmOperation::Update)?;
        self.schedule_changes(request)?;
        let committed = self.client.commit(&self.root, &request.message, &request.paths)?;
        let revision = match committed {
            Some(revision) => {
                // Bring the working copy revision up to the commit.
                self.client
                    .run(ScmOperation::Commit, Some(&self.root), &["update", "--accept", "postpone", "."])?;
                revision
            }
            None => self.local_number()?,
        };
        Ok(ScmRevision::from(revision))
    }

    fn push(&self, _request: &PushRequest) -> Result<ScmRevision, ScmError> {
        debug!("svn commits are already remote");
        Ok(ScmRevision::from(self.local_number()?))
    }

    #[instrument(skip(self, request), fields(path = %self.root.display()))]
    fn update(&self, request: &UpdateRequest) -> Result<ScmRevision, ScmError> {
        let op = ScmOperation::Update;
        let revision = request
            .revision
            .as_ref()
            .map(|r| Self::parse_revision(r, op))
            .transpose()?;
        let local = self.update_to(revision, &request.merge_strategy, op)?;
        Ok(ScmRevision::from(local))
    }

    fn tag(&self, request: &TagRequest) -> Result<ScmRevision, ScmError> {
        let commit_before = request
            .commit_before
            .then(|| {
                CommitRequest::builder()
                    .message(request.message.as_str())
                    .merge_strategy(request.merge_strategy.clone())
                    .build()
            })
            .transpose()?;
        self.create_copy(
            ScmOperation::Tag,
            self.tag_url(&request.name),
            &request.source,
            commit_before,
            &request.message,
        )
    }

    fn has_tag(&self, name: &str) -> Result<bool, ScmError> {
        self.has_entry(&self.layout.tags, name)
    }

    fn delete_tag(&self, request: &DeleteTagRequest) -> Result<(), ScmError> {
        let message = format!("Delete tag {}", request.name);
        self.client
            .delete_url(ScmOperation::DeleteTag, &self.tag_url(&request.name), &message)?;
        info!(tag = %request.name, "deleted tag");
        Ok(())
    }

    fn branch(&self, request: &BranchRequest) -> Result<ScmRevision, ScmError> {
        let commit_before = request
            .commit_before
            .then(|| {
                CommitRequest::builder()
                    .message(request.message.as_str())
                    .merge_strategy(request.merge_strategy.clone())
                    .build()
            })
            .transpose()?;
        self.create_copy(
            ScmOperation::Branch,
            self.branch_url(&request.name),
            &request.source,
            commit_before,
            &request.message,
        )
    }

    fn has_branch(&self, name: &str) -> Result<bool, ScmError> {
        self.has_entry(&self.layout.branches, name)
    }

    fn delete_branch(&self, request: &DeleteBranchRequest) -> Result<(), ScmError> {
        let message = format!("Delete branch {}", request.name);
        self.client
            .delete_url(ScmOperation::DeleteBranch, &self.branch_url(&request.name), &message)?;
        info!(branch = %request.name, "deleted branch");
        Ok(())
    }

    fn revert_commits(&self, request: &RevertCommitsRequest) -> Result<ScmRevision, ScmError> {
        revert::revert_commits(self, request)
    }

    #[instrument(skip(self, request))]
    fn get_history(&self, request: &HistoryRequest) -> Result<HistoryResult, ScmError> {
        let op = ScmOperation::History;
        let info = self.client.info(&self.url)?;
        let to = match &request.to {
            Some(bound) => self.resolve_bound(bound, op)?,
            None => info.revision,
        };
        let from = match &request.from {
            Some(bound) => self.resolve_bound(bound, op)? + 1,
            None => 1,
        };
        if from > to {
            return Ok(HistoryResult::newest_first(Vec::new()));
        }

        let prefix = info
            .relative_url
            .as_deref()
            .map(|r| r.trim_start_matches('^').to_string())
            .unwrap_or_default();
        let limit = request.limit.unwrap_or(usize::MAX);

        let mut commits = Vec::new();
        for entry in self.client.log(&self.url, &format!("{to}:{from}"))? {
            if commits.len() >= limit {
                break;
            }
            if !request.matches_message(&entry.message) {
                continue;
            }
            let changed_paths: Vec<String> = entry
                .changed_paths
                .iter()
                .filter_map(|p| self.relative_log_path(&p.path, &prefix))
                .collect();
            if !request.selects_any(changed_paths.iter().map(String::as_str)) {
                continue;
            }
            commits.push(HistoryCommit {
                revision: ScmRevision::from(entry.revision),
                author: entry.author,
                date: entry.date,
                message: entry.message,
                changed_paths,
            });
        }
        debug!(count = commits.len(), "collected history");
        Ok(HistoryResult::newest_first(commits))
    }

    #[instrument(skip(self, request))]
    fn get_diff(&self, request: &DiffRequest) -> Result<DiffResult, ScmError> {
        let op = ScmOperation::Diff;
        let range = self.revision_range(request, op)?;
        let mut objects = Vec::new();
        for entry in self.client.diff_summary(&self.root, range.as_deref())? {
            let path = entry
                .path
                .trim_start_matches("./")
                .trim_start_matches(&format!("{}/", self.url))
                .replace('\\', "/");
            if !request.selects(&path) {
                continue;
            }
            let change_type = ChangeType::from_svn(&entry.item);
            let diff = if request.status_only {
                None
            } else {
                Some(self.client.diff_text(&self.root, range.as_deref(), &path)?)
            };
            objects.push(DiffObject {
                change_type,
                old_path: (change_type != ChangeType::Added).then(|| path.clone()),
                new_path: (change_type != ChangeType::Deleted).then_some(path),
                diff,
            });
        }
        Ok(DiffResult::new(objects))
    }

    fn local_revision(&self) -> Result<ScmRevision, ScmError> {
        Ok(ScmRevision::from(self.local_number()?))
    }

    fn latest_remote_revision(&self) -> Result<ScmRevision, ScmError> {
        Ok(ScmRevision::from(self.client.info(&self.url)?.revision))
    }
}

impl RevertSupport for SvnScmProvider {
    fn is_ancestor(&self, ancestor: &ScmRevision, descendant: &ScmRevision) -> Result<bool, ScmError> {
        let op = ScmOperation::RevertCommits;
        Ok(Self::parse_revision(ancestor, op)? <= Self::parse_revision(descendant, op)?)
    }

    fn snapshot(&self, revision: &ScmRevision) -> Result<Snapshot, ScmError> {
        let op = ScmOperation::RevertCommits;
        let revision = Self::parse_revision(revision, op)?;
        let scratch = tempfile::tempdir().map_err(ScmError::io(op))?;
        let destination = scratch.path().join("export");
        self.client.export(&self.url, revision, &destination)?;
        read_tree(&destination).map_err(ScmError::io(op))
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
            .build()?;
        self.commit(&request)
    }
}
