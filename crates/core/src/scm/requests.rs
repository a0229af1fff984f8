//! Request objects for [`ScmProvider`](super::ScmProvider) operations.
//!
//! Every request is built through a builder whose `build()` validates the
//! request's preconditions, so a provider never sees a malformed request.

use regex_lite::Regex;

use super::ScmRevision;
use crate::errors::{ScmError, ScmOperation};
use crate::merge::MergeStrategy;

fn require_text(
    operation: ScmOperation,
    field: &str,
    value: Option<String>,
) -> Result<String, ScmError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ScmError::invalid(operation, format!("{field} is required"))),
    }
}

fn require_ref_name(operation: ScmOperation, field: &str, value: Option<String>) -> Result<String, ScmError> {
    let name = require_text(operation, field, value)?;
    if name.chars().any(|c| c.is_whitespace() || c == ':' || c == '~' || c == '^')
        || name.starts_with('-')
    {
        return Err(ScmError::invalid(
            operation,
            format!("{field} '{name}' is not a valid reference name"),
        ));
    }
    Ok(name)
}

/// Where a new tag or branch points.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ReferenceSource {
    /// The revision the working copy is at.
    #[default]
    WorkingCopy,
    /// The tracked remote, at `revision` or its head.
    Remote { revision: Option<ScmRevision> },
}

/// One end of a history or diff range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevisionBound {
    Revision(ScmRevision),
    Tag(String),
}

// ---------------------------------------------------------------------------
// Checkout
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub remote_url: String,
    pub revision: Option<ScmRevision>,
    pub branch: Option<String>,
    pub tag: Option<String>,
    /// Restrict the checkout to these paths (empty = everything).
    pub paths: Vec<String>,
}

impl CheckoutRequest {
    pub fn builder() -> CheckoutRequestBuilder {
        CheckoutRequestBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct CheckoutRequestBuilder {
    remote_url: Option<String>,
    revision: Option<ScmRevision>,
    branch: Option<String>,
    tag: Option<String>,
    paths: Vec<String>,
}

impl CheckoutRequestBuilder {
    pub fn remote_url(mut self, url: impl Into<String>) -> Self {
        self.remote_url = Some(url.into());
        self
    }

    pub fn revision(mut self, revision: impl Into<ScmRevision>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    pub fn branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.paths.push(path.into());
        self
    }

    pub fn build(self) -> Result<CheckoutRequest, ScmError> {
        let op = ScmOperation::Checkout;
        let remote_url = require_text(op, "remote url", self.remote_url)?;
        if self.branch.is_some() && self.tag.is_some() {
            return Err(ScmError::invalid(op, "branch and tag are mutually exclusive"));
        }
        Ok(CheckoutRequest {
            remote_url,
            revision: self.revision,
            branch: self.branch,
            tag: self.tag,
            paths: self.paths,
        })
    }
}

// ---------------------------------------------------------------------------
// Commit / push / update
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CommitRequest {
    pub message: String,
    /// Commit only these paths (empty = the whole working copy).
    pub paths: Vec<String>,
    pub push: bool,
    pub merge_strategy: MergeStrategy,
}

impl CommitRequest {
    pub fn builder() -> CommitRequestBuilder {
        CommitRequestBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct CommitRequestBuilder {
    message: Option<String>,
    paths: Vec<String>,
    push: bool,
    merge_strategy: MergeStrategy,
}

impl CommitRequestBuilder {
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.paths.push(path.into());
        self
    }

    pub fn paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.paths.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn push(mut self, push: bool) -> Self {
        self.push = push;
        self
    }

    pub fn merge_strategy(mut self, strategy: MergeStrategy) -> Self {
        self.merge_strategy = strategy;
        self
    }

    pub fn build(self) -> Result<CommitRequest, ScmError> {
        Ok(CommitRequest {
            message: require_text(ScmOperation::Commit, "commit message", self.message)?,
            paths: self.paths,
            push: self.push,
            merge_strategy: self.merge_strategy,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct PushRequest {
    pub merge_strategy: MergeStrategy,
}

impl PushRequest {
    pub fn builder() -> PushRequestBuilder {
        PushRequestBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct PushRequestBuilder {
    merge_strategy: MergeStrategy,
}

impl PushRequestBuilder {
    pub fn merge_strategy(mut self, strategy: MergeStrategy) -> Self {
        self.merge_strategy = strategy;
        self
    }

    pub fn build(self) -> Result<PushRequest, ScmError> {
        Ok(PushRequest {
            merge_strategy: self.merge_strategy,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct UpdateRequest {
    /// Update to this revision instead of the remote head.
    pub revision: Option<ScmRevision>,
    pub merge_strategy: MergeStrategy,
}

impl UpdateRequest {
    pub fn builder() -> UpdateRequestBuilder {
        UpdateRequestBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct UpdateRequestBuilder {
    revision: Option<ScmRevision>,
    merge_strategy: MergeStrategy,
}

impl UpdateRequestBuilder {
    pub fn revision(mut self, revision: impl Into<ScmRevision>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    pub fn merge_strategy(mut self, strategy: MergeStrategy) -> Self {
        self.merge_strategy = strategy;
        self
    }

    pub fn build(self) -> Result<UpdateRequest, ScmError> {
        Ok(UpdateRequest {
            revision: self.revision,
            merge_strategy: self.merge_strategy,
        })
    }
}

// ---------------------------------------------------------------------------
// Tags and branches
// ---------------------------------------------------------------------------

/// Request to create a tag.
#[derive(Debug, Clone)]
pub struct TagRequest {
    pub name: String,
    pub message: String,
    pub source: ReferenceSource,
    /// Commit pending working copy changes before tagging.
    pub commit_before: bool,
    pub push: bool,
    pub merge_strategy: MergeStrategy,
}

impl TagRequest {
    pub fn builder() -> TagRequestBuilder {
        TagRequestBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct TagRequestBuilder {
    name: Option<String>,
    message: Option<String>,
    source: ReferenceSource,
    commit_before: bool,
    push: bool,
    merge_strategy: MergeStrategy,
}

impl TagRequestBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn source(mut self, source: ReferenceSource) -> Self {
        self.source = source;
        self
    }

    pub fn commit_before(mut self, commit_before: bool) -> Self {
        self.commit_before = commit_before;
        self
    }

    pub fn push(mut self, push: bool) -> Self {
        self.push = push;
        self
    }

    pub fn merge_strategy(mut self, strategy: MergeStrategy) -> Self {
        self.merge_strategy = strategy;
        self
    }

    pub fn build(self) -> Result<TagRequest, ScmError> {
        let op = ScmOperation::Tag;
        Ok(TagRequest {
            name: require_ref_name(op, "tag name", self.name)?,
            message: require_text(op, "tag message", self.message)?,
            source: self.source,
            commit_before: self.commit_before,
            push: self.push,
            merge_strategy: self.merge_strategy,
        })
    }
}

/// Request to create a branch.
#[derive(Debug, Clone)]
pub struct BranchRequest {
    pub name: String,
    pub message: String,
    pub source: ReferenceSource,
    pub commit_before: bool,
    pub push: bool,
    pub merge_strategy: MergeStrategy,
}

impl BranchRequest {
    pub fn builder() -> BranchRequestBuilder {
        BranchRequestBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct BranchRequestBuilder {
    name: Option<String>,
    message: Option<String>,
    source: ReferenceSource,
    commit_before: bool,
    push: bool,
    merge_strategy: MergeStrategy,
}

impl BranchRequestBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn source(mut self, source: ReferenceSource) -> Self {
        self.source = source;
        self
    }

    pub fn commit_before(mut self, commit_before: bool) -> Self {
        self.commit_before = commit_before;
        self
    }

    pub fn push(mut self, push: bool) -> Self {
        self.push = push;
        self
    }

    pub fn merge_strategy(mut self, strategy: MergeStrategy) -> Self {
        self.merge_strategy = strategy;
        self
    }

    pub fn build(self) -> Result<BranchRequest, ScmError> {
        let op = ScmOperation::Branch;
        let name = require_ref_name(op, "branch name", self.name)?;
        let message = self
            .message
            .unwrap_or_else(|| format!("Create branch {name}"));
        Ok(BranchRequest {
            name,
            message,
            source: self.source,
            commit_before: self.commit_before,
            push: self.push,
            merge_strategy: self.merge_strategy,
        })
    }
}

#[derive(Debug, Clone)]
pub struct DeleteTagRequest {
    pub name: String,
    /// Also delete the tag on the remote.
    pub push: bool,
}

impl DeleteTagRequest {
    pub fn builder() -> DeleteTagRequestBuilder {
        DeleteTagRequestBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct DeleteTagRequestBuilder {
    name: Option<String>,
    push: bool,
}

impl DeleteTagRequestBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn push(mut self, push: bool) -> Self {
        self.push = push;
        self
    }

    pub fn build(self) -> Result<DeleteTagRequest, ScmError> {
        Ok(DeleteTagRequest {
            name: require_ref_name(ScmOperation::DeleteTag, "tag name", self.name)?,
            push: self.push,
        })
    }
}

#[derive(Debug, Clone)]
pub struct DeleteBranchRequest {
    pub name: String,
    pub push: bool,
}

impl DeleteBranchRequest {
    pub fn builder() -> DeleteBranchRequestBuilder {
        DeleteBranchRequestBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct DeleteBranchRequestBuilder {
    name: Option<String>,
    push: bool,
}

impl DeleteBranchRequestBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn push(mut self, push: bool) -> Self {
        self.push = push;
        self
    }

    pub fn build(self) -> Result<DeleteBranchRequest, ScmError> {
        Ok(DeleteBranchRequest {
            name: require_ref_name(ScmOperation::DeleteBranch, "branch name", self.name)?,
            push: self.push,
        })
    }
}

// ---------------------------------------------------------------------------
// Revert
// ---------------------------------------------------------------------------

/// Restore the content of `to` (older) on top of the remote, undoing
/// everything between `to` and `from` (newer).
#[derive(Debug, Clone)]
pub struct RevertCommitsRequest {
    pub from: ScmRevision,
    pub to: ScmRevision,
    pub message: String,
    pub merge_strategy: MergeStrategy,
}

impl RevertCommitsRequest {
    pub fn builder() -> RevertCommitsRequestBuilder {
        RevertCommitsRequestBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct RevertCommitsRequestBuilder {
    from: Option<ScmRevision>,
    to: Option<ScmRevision>,
    message: Option<String>,
    merge_strategy: MergeStrategy,
}

impl RevertCommitsRequestBuilder {
    pub fn from(mut self, revision: impl Into<ScmRevision>) -> Self {
        self.from = Some(revision.into());
        self
    }

    pub fn to(mut self, revision: impl Into<ScmRevision>) -> Self {
        self.to = Some(revision.into());
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn merge_strategy(mut self, strategy: MergeStrategy) -> Self {
        self.merge_strategy = strategy;
        self
    }

    pub fn build(self) -> Result<RevertCommitsRequest, ScmError> {
        let op = ScmOperation::RevertCommits;
        let from = self
            .from
            .ok_or_else(|| ScmError::invalid(op, "from revision is required"))?;
        let to = self
            .to
            .ok_or_else(|| ScmError::invalid(op, "to revision is required"))?;
        if from == to {
            return Err(ScmError::invalid(
                op,
                format!("from and to are both {from}; nothing to revert"),
            ));
        }
        let message = self
            .message
            .unwrap_or_else(|| format!("Revert {from} back to {to}"));
        Ok(RevertCommitsRequest {
            from,
            to,
            message,
            merge_strategy: self.merge_strategy,
        })
    }
}

// ---------------------------------------------------------------------------
// Read-only queries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct DiffRequest {
    /// Start of the range (default: the working copy's base revision).
    pub from: Option<RevisionBound>,
    /// End of the range (default: the working copy).
    pub to: Option<RevisionBound>,
    pub paths: Vec<String>,
    /// Only report change kinds, no textual diffs.
    pub status_only: bool,
}

impl DiffRequest {
    pub fn builder() -> DiffRequestBuilder {
        DiffRequestBuilder::default()
    }

    /// Whether `path` is selected by the request's path filter.
    pub fn selects(&self, path: &str) -> bool {
        path_selected(&self.paths, path)
    }
}

#[derive(Debug, Default)]
pub struct DiffRequestBuilder {
    inner: DiffRequest,
}

impl DiffRequestBuilder {
    pub fn from(mut self, bound: RevisionBound) -> Self {
        self.inner.from = Some(bound);
        self
    }

    pub fn to(mut self, bound: RevisionBound) -> Self {
        self.inner.to = Some(bound);
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.inner.paths.push(path.into());
        self
    }

    pub fn status_only(mut self, status_only: bool) -> Self {
        self.inner.status_only = status_only;
        self
    }

    pub fn build(self) -> Result<DiffRequest, ScmError> {
        if self.inner.from.is_some() && self.inner.from == self.inner.to {
            return Err(ScmError::invalid(ScmOperation::Diff, "empty diff range"));
        }
        Ok(self.inner)
    }
}

#[derive(Debug, Clone, Default)]
pub struct HistoryRequest {
    /// Exclusive lower bound (older).
    pub from: Option<RevisionBound>,
    /// Inclusive upper bound (newer, default: remote head).
    pub to: Option<RevisionBound>,
    pub paths: Vec<String>,
    /// Keep only commits whose message matches every filter.
    pub message_filters: Vec<Regex>,
    pub limit: Option<usize>,
}

impl HistoryRequest {
    pub fn builder() -> HistoryRequestBuilder {
        HistoryRequestBuilder::default()
    }

    pub fn selects(&self, path: &str) -> bool {
        path_selected(&self.paths, path)
    }

    pub fn matches_message(&self, message: &str) -> bool {
        self.message_filters.iter().all(|re| re.is_match(message))
    }

    pub fn selects_any<'a>(&self, mut paths: impl Iterator<Item = &'a str>) -> bool {
        self.paths.is_empty() || paths.any(|p| self.selects(p))
    }
}

#[derive(Debug, Default)]
pub struct HistoryRequestBuilder {
    from: Option<RevisionBound>,
    to: Option<RevisionBound>,
    paths: Vec<String>,
    patterns: Vec<String>,
    limit: Option<usize>,
}

impl HistoryRequestBuilder {
    pub fn from(mut self, bound: RevisionBound) -> Self {
        self.from = Some(bound);
        self
    }

    pub fn to(mut self, bound: RevisionBound) -> Self {
        self.to = Some(bound);
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.paths.push(path.into());
        self
    }

    pub fn message_filter(mut self, pattern: impl Into<String>) -> Self {
        self.patterns.push(pattern.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn build(self) -> Result<HistoryRequest, ScmError> {
        let op = ScmOperation::History;
        let message_filters = self
            .patterns
            .iter()
            .map(|p| {
                Regex::new(p)
                    .map_err(|e| ScmError::invalid(op, format!("bad message filter '{p}': {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if self.limit == Some(0) {
            return Err(ScmError::invalid(op, "limit must be positive"));
        }
        Ok(HistoryRequest {
            from: self.from,
            to: self.to,
            paths: self.paths,
            message_filters,
            limit: self.limit,
        })
    }
}

/// A path filter entry selects the path itself and everything below it.
fn path_selected(filters: &[String], path: &str) -> bool {
    filters.is_empty()
        || filters.iter().any(|f| {
            let f = f.trim_end_matches('/');
            path == f || path.strip_prefix(f).is_some_and(|rest| rest.starts_with('/'))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_requires_name_and_message() {
        let err = TagRequest::builder().message("release").build().unwrap_err();
        assert!(matches!(err, ScmError::InvalidRequest { operation: ScmOperation::Tag, .. }));

        let err = TagRequest::builder().name("v1").build().unwrap_err();
        assert!(err.to_string().contains("tag message"));

        let err = TagRequest::builder().name("  ").message("m").build().unwrap_err();
        assert!(matches!(err, ScmError::InvalidRequest { .. }));

        let tag = TagRequest::builder().name("app-1.0").message("release 1.0").build().unwrap();
        assert_eq!(tag.name, "app-1.0");
        assert_eq!(tag.source, ReferenceSource::WorkingCopy);
    }

    #[test]
    fn test_tag_name_must_be_a_valid_reference() {
        for bad in ["has space", "a:b", "-x"] {
            assert!(TagRequest::builder().name(bad).message("m").build().is_err());
        }
    }

    #[test]
    fn test_revert_requires_both_revisions() {
        let err = RevertCommitsRequest::builder().from("82").build().unwrap_err();
        assert_eq!(err.operation(), ScmOperation::RevertCommits);
        assert!(RevertCommitsRequest::builder().to("80").build().is_err());
        assert!(RevertCommitsRequest::builder().from("80").to("80").build().is_err());

        let request = RevertCommitsRequest::builder().from("82").to("80").build().unwrap();
        assert_eq!(request.message, "Revert 82 back to 80");
    }

    #[test]
    fn test_commit_requires_message() {
        assert!(CommitRequest::builder().build().is_err());
        let request = CommitRequest::builder()
            .message("m")
            .paths(["a", "b"])
            .push(true)
            .build()
            .unwrap();
        assert_eq!(request.paths, ["a", "b"]);
        assert!(request.push);
    }

    #[test]
    fn test_checkout_validation() {
        assert!(CheckoutRequest::builder().build().is_err());
        assert!(CheckoutRequest::builder()
            .remote_url("u")
            .branch("b")
            .tag("t")
            .build()
            .is_err());
    }

    #[test]
    fn test_history_filters() {
        assert!(HistoryRequest::builder().message_filter("(").build().is_err());
        let request = HistoryRequest::builder()
            .message_filter("^release")
            .path("core")
            .build()
            .unwrap();
        assert!(request.matches_message("release 1.0"));
        assert!(!request.matches_message("fix: release"));
        assert!(request.selects("core/module.toml"));
        assert!(request.selects("core"));
        assert!(!request.selects("core2/module.toml"));
    }
}
