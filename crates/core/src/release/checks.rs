//! Prechecks. None of these change the working copy or the remote.

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use super::ReleaseContext;
use crate::artifacts::ArtifactPresence;
use crate::errors::StepError;
use crate::metadata::ReleasePhase;
use crate::pipeline::Step;
use crate::version::is_snapshot;

/// Blocks when no module carries a pre-release version.
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckProjectVersions;

impl Step<ReleaseContext> for CheckProjectVersions {
    fn id(&self) -> &str {
        "check-project-versions"
    }

    fn position(&self) -> u32 {
        10
    }

    fn execute(&self, context: &mut ReleaseContext) -> Result<(), StepError> {
        let modules = context.project.modules()?;
        let snapshots = modules.iter().filter(|m| is_snapshot(&m.version)).count();
        if snapshots == 0 {
            return Err(StepError::blocked(format!(
                "none of the {} module(s) has a pre-release version; nothing to release",
                modules.len()
            )));
        }
        info!(modules = modules.len(), snapshots, "project has modules to release");
        Ok(())
    }
}

/// Blocks when a parent or dependency outside the project is a pre-release.
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckSnapshotDependencies;

impl Step<ReleaseContext> for CheckSnapshotDependencies {
    fn id(&self) -> &str {
        "check-snapshot-dependencies"
    }

    fn position(&self) -> u32 {
        20
    }

    fn execute(&self, context: &mut ReleaseContext) -> Result<(), StepError> {
        let modules = context.project.modules()?;
        let own: BTreeSet<_> = modules.iter().map(|m| &m.coordinate).collect();

        let mut offending = BTreeSet::new();
        for module in &modules {
            for (coordinate, version) in module.references() {
                if !own.contains(&coordinate) && is_snapshot(version) {
                    offending.insert(format!("{coordinate}:{version} (used by {})", module.coordinate));
                }
            }
        }
        if !offending.is_empty() {
            let list: Vec<String> = offending.into_iter().collect();
            return Err(StepError::blocked(format!(
                "unreleased pre-release dependencies: {}",
                list.join(", ")
            )));
        }
        Ok(())
    }
}

/// Blocks when a release version is already published.
///
/// A version present only in the local repository warns or blocks depending
/// on `allow_local_release_artifacts`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckReleaseArtifacts;

impl Step<ReleaseContext> for CheckReleaseArtifacts {
    fn id(&self) -> &str {
        "check-release-artifacts"
    }

    fn position(&self) -> u32 {
        50
    }

    fn requires_remote(&self) -> bool {
        true
    }

    fn execute(&self, context: &mut ReleaseContext) -> Result<(), StepError> {
        let Some(artifacts) = &context.artifacts else {
            debug!("no artifact repository configured, skipping");
            return Ok(());
        };

        let mut published = Vec::new();
        for (coordinate, version) in context.versions(ReleasePhase::Release) {
            match artifacts.lookup(&coordinate, &version)? {
                ArtifactPresence::Absent => {}
                ArtifactPresence::Remote => published.push(format!("{coordinate}:{version}")),
                ArtifactPresence::LocalOnly if context.options.allow_local_release_artifacts => {
                    warn!(%coordinate, version, "release version already installed locally");
                }
                ArtifactPresence::LocalOnly => {
                    return Err(StepError::blocked(format!(
                        "{coordinate}:{version} is already installed in the local repository"
                    )));
                }
            }
        }
        if !published.is_empty() {
            return Err(StepError::blocked(format!(
                "release version(s) already deployed: {}",
                published.join(", ")
            )));
        }
        Ok(())
    }
}

/// Blocks when the release tag already exists.
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckTagAbsent;

impl Step<ReleaseContext> for CheckTagAbsent {
    fn id(&self) -> &str {
        "check-tag-absent"
    }

    fn position(&self) -> u32 {
        60
    }

    fn requires_remote(&self) -> bool {
        true
    }

    fn execute(&self, context: &mut ReleaseContext) -> Result<(), StepError> {
        let tag = context.tag()?;
        if context.scm.has_tag(tag)? {
            return Err(StepError::blocked(format!("tag '{tag}' already exists")));
        }
        Ok(())
    }
}
