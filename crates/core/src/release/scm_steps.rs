//! Steps that record, commit and tag through the [`ScmProvider`](crate::scm::ScmProvider).

use tracing::{debug, info, warn};

use super::{ReleaseContext, COMMIT_MARKER};
use crate::errors::StepError;
use crate::pipeline::Step;
use crate::scm::{CommitRequest, DeleteTagRequest, RevertCommitsRequest, ScmRevision, TagRequest};

/// Commit the descriptors and publish them. Returns `(before, after)`.
fn commit_descriptors(context: &ReleaseContext, message: String) -> Result<(ScmRevision, ScmRevision), StepError> {
    let before = context.local_revision()?;
    let request = CommitRequest::builder()
        .message(message)
        .paths(context.descriptor_paths()?)
        .push(true)
        .merge_strategy(context.options.merge_strategy.clone())
        .build()?;
    let after = context.scm.commit(&request)?;
    info!(%before, %after, "committed descriptors");
    Ok((before, after))
}

/// Undo the commits between `before` and `after` on top of the remote.
fn revert_range(
    context: &ReleaseContext,
    before: Option<&ScmRevision>,
    after: Option<&ScmRevision>,
    what: &str,
) -> Result<(), StepError> {
    let (Some(before), Some(after)) = (before, after) else {
        debug!(what, "no checkpoints recorded, nothing to revert");
        return Ok(());
    };
    if before == after {
        debug!(what, revision = %after, "nothing was committed, nothing to revert");
        return Ok(());
    }
    let request = RevertCommitsRequest::builder()
        .from(after.clone())
        .to(before.clone())
        .message(format!("{COMMIT_MARKER} rollback {what}"))
        .merge_strategy(context.options.merge_strategy.clone())
        .build()?;
    let revision = context.scm.revert_commits(&request)?;
    info!(what, from = %after, to = %before, %revision, "reverted commits");
    Ok(())
}

/// Records the revision the release starts from.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreScmRevision;

impl Step<ReleaseContext> for StoreScmRevision {
    fn id(&self) -> &str {
        "store-scm-revision"
    }

    fn position(&self) -> u32 {
        30
    }

    fn requires_remote(&self) -> bool {
        true
    }

    fn execute(&self, context: &mut ReleaseContext) -> Result<(), StepError> {
        let local = context.local_revision()?;
        let remote = context.scm.latest_remote_revision()?;
        if local != remote {
            warn!(%local, %remote, "working copy is not at the remote head");
        }
        info!(revision = %local, "stored initial revision");
        context.metadata.revisions.initial = Some(local);
        Ok(())
    }
}

/// Commits the release versions.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommitRelease;

impl Step<ReleaseContext> for CommitRelease {
    fn id(&self) -> &str {
        "commit-release"
    }

    fn position(&self) -> u32 {
        90
    }

    fn requires_remote(&self) -> bool {
        true
    }

    fn execute(&self, context: &mut ReleaseContext) -> Result<(), StepError> {
        let message = format!("{COMMIT_MARKER} prepare release {}", context.tag()?);
        let (before, after) = commit_descriptors(context, message)?;
        context.metadata.revisions.release_before = Some(before);
        context.metadata.revisions.release_after = Some(after);
        Ok(())
    }

    fn rollback(&self, context: &mut ReleaseContext) -> Result<(), StepError> {
        let revisions = &context.metadata.revisions;
        revert_range(
            context,
            revisions.release_before.as_ref(),
            revisions.release_after.as_ref(),
            "release commit",
        )
    }
}

/// Tags the release commit.
#[derive(Debug, Clone, Copy, Default)]
pub struct TagRelease;

impl Step<ReleaseContext> for TagRelease {
    fn id(&self) -> &str {
        "tag-release"
    }

    fn position(&self) -> u32 {
        100
    }

    fn requires_remote(&self) -> bool {
        true
    }

    fn execute(&self, context: &mut ReleaseContext) -> Result<(), StepError> {
        let tag = context.tag()?;
        let request = TagRequest::builder()
            .name(tag)
            .message(format!("{COMMIT_MARKER} copy for tag {tag}"))
            .push(true)
            .merge_strategy(context.options.merge_strategy.clone())
            .build()?;
        let revision = context.scm.tag(&request)?;
        info!(tag, %revision, "tagged release");
        Ok(())
    }

    fn rollback(&self, context: &mut ReleaseContext) -> Result<(), StepError> {
        let tag = context.tag()?;
        if !context.scm.has_tag(tag)? {
            debug!(tag, "tag already gone");
            return Ok(());
        }
        let request = DeleteTagRequest::builder().name(tag).push(true).build()?;
        context.scm.delete_tag(&request)?;
        info!(tag, "deleted release tag");
        Ok(())
    }
}

/// Commits the next development versions.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommitDevelopment;

impl Step<ReleaseContext> for CommitDevelopment {
    fn id(&self) -> &str {
        "commit-development"
    }

    fn position(&self) -> u32 {
        120
    }

    fn requires_remote(&self) -> bool {
        true
    }

    fn execute(&self, context: &mut ReleaseContext) -> Result<(), StepError> {
        let message = format!("{COMMIT_MARKER} prepare for next development iteration");
        let (before, after) = commit_descriptors(context, message)?;
        context.metadata.revisions.dev_before = Some(before);
        context.metadata.revisions.dev_after = Some(after);
        Ok(())
    }

    fn rollback(&self, context: &mut ReleaseContext) -> Result<(), StepError> {
        let revisions = &context.metadata.revisions;
        revert_range(
            context,
            revisions.dev_before.as_ref(),
            revisions.dev_after.as_ref(),
            "development commit",
        )
    }
}
