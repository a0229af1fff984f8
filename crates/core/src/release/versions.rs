//! Version calculation and rewriting.

use tracing::info;

use super::{render_tag, ReleaseContext};
use crate::errors::StepError;
use crate::metadata::ReleasePhase;
use crate::pipeline::Step;
use crate::version::{calculate_next_snapshot_version, calculate_release_version, is_snapshot};

/// Derives the release and next development version of every pre-release
/// module, plus the tag name from the first of them.
#[derive(Debug, Clone, Copy, Default)]
pub struct CalculateVersions;

impl Step<ReleaseContext> for CalculateVersions {
    fn id(&self) -> &str {
        "calculate-versions"
    }

    fn position(&self) -> u32 {
        40
    }

    fn execute(&self, context: &mut ReleaseContext) -> Result<(), StepError> {
        let strategy = context.options.upgrade_strategy;
        let mut tag = None;
        for module in context.project.modules()? {
            if !is_snapshot(&module.version) {
                continue;
            }
            let release = calculate_release_version(&module.version)?;
            let next = calculate_next_snapshot_version(&module.version, strategy)?;
            info!(coordinate = %module.coordinate, current = %module.version, %release, %next, "calculated versions");

            if tag.is_none() {
                tag = Some(render_tag(&context.options.tag_pattern, &module.coordinate, &release));
            }
            let metadata = &mut context.metadata;
            metadata.set_version(ReleasePhase::PreRelease, module.coordinate.clone(), module.version);
            metadata.set_version(ReleasePhase::Release, module.coordinate.clone(), release);
            metadata.set_version(ReleasePhase::PostRelease, module.coordinate, next);
        }

        let tag = tag.ok_or_else(|| StepError::state("no pre-release modules to calculate"))?;
        info!(%tag, "calculated tag name");
        context.metadata.tag = Some(tag);
        Ok(())
    }
}

/// Rewrites the descriptors to the release versions.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetReleaseVersions;

impl Step<ReleaseContext> for SetReleaseVersions {
    fn id(&self) -> &str {
        "set-release-versions"
    }

    fn position(&self) -> u32 {
        70
    }

    fn execute(&self, context: &mut ReleaseContext) -> Result<(), StepError> {
        context.apply_versions(ReleasePhase::Release)
    }

    fn rollback(&self, context: &mut ReleaseContext) -> Result<(), StepError> {
        context.apply_versions(ReleasePhase::PreRelease)
    }
}

/// Rewrites the descriptors to the next development versions.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetDevelopmentVersions;

impl Step<ReleaseContext> for SetDevelopmentVersions {
    fn id(&self) -> &str {
        "set-development-versions"
    }

    fn position(&self) -> u32 {
        110
    }

    fn execute(&self, context: &mut ReleaseContext) -> Result<(), StepError> {
        context.apply_versions(ReleasePhase::PostRelease)
    }

    fn rollback(&self, context: &mut ReleaseContext) -> Result<(), StepError> {
        context.apply_versions(ReleasePhase::Release)
    }
}
