//! The standard release workflow.
//!
//! [`release_pipeline`] assembles the steps that take a project from its
//! development versions to a tagged, published release and on to the next
//! development versions. Prechecks come first so that a blocked release
//! never touches the working copy or the remote.

pub mod checks;
pub mod context;
pub mod publish;
pub mod scm_steps;
pub mod versions;

#[cfg(test)]
pub(crate) mod fixture;

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::config::ReleaseConfig;
use crate::merge::MergeStrategy;
use crate::metadata::METADATA_FILE;
use crate::pipeline::Pipeline;
use crate::project::Coordinate;
use crate::version::VersionUpgradeStrategy;

pub use checks::{CheckProjectVersions, CheckReleaseArtifacts, CheckSnapshotDependencies, CheckTagAbsent};
pub use context::ReleaseContext;
pub use publish::{BuildRelease, DeployArtifacts, WriteReleaseMetadata};
pub use scm_steps::{CommitDevelopment, CommitRelease, StoreScmRevision, TagRelease};
pub use versions::{CalculateVersions, SetDevelopmentVersions, SetReleaseVersions};

/// Marker prefixed to every commit and tag message the release creates.
pub const COMMIT_MARKER: &str = "[scmrelease]";

/// Release policy for one run.
#[derive(Debug, Clone)]
pub struct ReleaseOptions {
    /// Tag name template with `{group}`, `{artifact}` and `{version}`.
    pub tag_pattern: String,
    pub upgrade_strategy: VersionUpgradeStrategy,
    pub merge_strategy: MergeStrategy,
    pub allow_local_release_artifacts: bool,
    /// Metadata file; relative paths resolve against the project root.
    pub metadata_file: PathBuf,
    /// Extra variables exported to the build.
    pub build_environment: BTreeMap<String, String>,
}

impl Default for ReleaseOptions {
    fn default() -> Self {
        Self {
            tag_pattern: "{artifact}-{version}".into(),
            upgrade_strategy: VersionUpgradeStrategy::Default,
            merge_strategy: MergeStrategy::DoNotMerge,
            allow_local_release_artifacts: true,
            metadata_file: PathBuf::from(METADATA_FILE),
            build_environment: BTreeMap::new(),
        }
    }
}

impl From<&ReleaseConfig> for ReleaseOptions {
    fn from(config: &ReleaseConfig) -> Self {
        Self {
            tag_pattern: config.release.tag_pattern.clone(),
            upgrade_strategy: config.release.upgrade_strategy,
            merge_strategy: config.scm.merge_strategy.strategy(),
            allow_local_release_artifacts: config.release.allow_local_release_artifacts,
            metadata_file: config.release.metadata_file.clone(),
            build_environment: config.build.environment.clone(),
        }
    }
}

/// Expand a tag template for the release of `coordinate` at `version`.
pub fn render_tag(pattern: &str, coordinate: &Coordinate, version: &str) -> String {
    pattern
        .replace("{group}", &coordinate.group)
        .replace("{artifact}", &coordinate.artifact)
        .replace("{version}", version)
}

/// The release steps in execution order.
pub fn release_pipeline() -> Pipeline<ReleaseContext> {
    Pipeline::new()
        .with_step(CheckProjectVersions)
        .with_step(CheckSnapshotDependencies)
        .with_step(StoreScmRevision)
        .with_step(CalculateVersions)
        .with_step(CheckReleaseArtifacts)
        .with_step(CheckTagAbsent)
        .with_step(SetReleaseVersions)
        .with_step(BuildRelease)
        .with_step(CommitRelease)
        .with_step(TagRelease)
        .with_step(SetDevelopmentVersions)
        .with_step(CommitDevelopment)
        .with_step(DeployArtifacts)
        .with_step(WriteReleaseMetadata)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_tag() {
        let coordinate = Coordinate::new("org.example", "app");
        assert_eq!(render_tag("{artifact}-{version}", &coordinate, "1.0"), "app-1.0");
        assert_eq!(
            render_tag("{group}/{artifact}/v{version}", &coordinate, "2.1"),
            "org.example/app/v2.1"
        );
    }

    #[test]
    fn test_pipeline_order() {
        let pipeline = release_pipeline();
        assert_eq!(
            pipeline.step_ids(),
            [
                "check-project-versions",
                "check-snapshot-dependencies",
                "store-scm-revision",
                "calculate-versions",
                "check-release-artifacts",
                "check-tag-absent",
                "set-release-versions",
                "build-release",
                "commit-release",
                "tag-release",
                "set-development-versions",
                "commit-development",
                "deploy-artifacts",
                "write-release-metadata",
            ]
        );
    }

    #[test]
    fn test_options_from_config() {
        let mut config = ReleaseConfig::default();
        config.release.tag_pattern = "v{version}".into();
        config.release.allow_local_release_artifacts = false;
        let options = ReleaseOptions::from(&config);
        assert_eq!(options.tag_pattern, "v{version}");
        assert!(!options.allow_local_release_artifacts);
        assert_eq!(options.merge_strategy.name(), "do-not-merge");
    }
}
