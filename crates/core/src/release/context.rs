//! Shared state of one release run.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use super::ReleaseOptions;
use crate::artifacts::{ArtifactLookupCache, ArtifactRepository};
use crate::build::BuildInvoker;
use crate::errors::StepError;
use crate::metadata::{ReleaseMetadata, ReleasePhase};
use crate::project::{Coordinate, ModuleInfo, ProjectModel};
use crate::scm::{ScmProvider, ScmRevision};

/// Everything the release steps read and write.
///
/// Built once per run and passed to every step; only the executing step
/// touches it.
pub struct ReleaseContext {
    pub project: Box<dyn ProjectModel>,
    pub scm: Box<dyn ScmProvider>,
    /// `None` skips the artifact checks and the deploy.
    pub artifacts: Option<ArtifactLookupCache>,
    /// `None` skips the build.
    pub build: Option<Box<dyn BuildInvoker>>,
    pub options: ReleaseOptions,
    /// Versions and checkpoints collected so far.
    pub metadata: ReleaseMetadata,
    /// Release descriptors captured after the build, deployed later.
    pub(crate) staging: Option<TempDir>,
}

impl ReleaseContext {
    pub fn new(project: Box<dyn ProjectModel>, scm: Box<dyn ScmProvider>, options: ReleaseOptions) -> Self {
        Self {
            project,
            scm,
            artifacts: None,
            build: None,
            options,
            metadata: ReleaseMetadata::default(),
            staging: None,
        }
    }

    pub fn with_artifacts(mut self, repository: Arc<dyn ArtifactRepository>) -> Self {
        self.artifacts = Some(ArtifactLookupCache::new(repository));
        self
    }

    pub fn with_build(mut self, build: Box<dyn BuildInvoker>) -> Self {
        self.build = Some(build);
        self
    }

    pub fn project_root(&self) -> &Path {
        self.project.root()
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.project_root().join(&self.options.metadata_file)
    }

    /// The calculated tag name.
    pub fn tag(&self) -> Result<&str, StepError> {
        self.metadata
            .tag
            .as_deref()
            .ok_or_else(|| StepError::state("tag name has not been calculated"))
    }

    /// Module versions recorded for `phase`, ordered by coordinate.
    pub fn versions(&self, phase: ReleasePhase) -> Vec<(Coordinate, String)> {
        self.metadata
            .phase(phase)
            .map(|(c, v)| (c.clone(), v.to_string()))
            .collect()
    }

    /// Set every module recorded for `phase` to its version in that phase.
    pub fn apply_versions(&mut self, phase: ReleasePhase) -> Result<(), StepError> {
        let versions = self.versions(phase);
        if versions.is_empty() {
            return Err(StepError::state(format!("no {phase} versions calculated")));
        }
        for (coordinate, version) in &versions {
            self.project.set_version(coordinate, version)?;
        }
        Ok(())
    }

    /// Modules taking part in the release, in project order.
    pub fn released_modules(&self) -> Result<Vec<ModuleInfo>, StepError> {
        let released = self.metadata.versions.get(&ReleasePhase::Release);
        Ok(self
            .project
            .modules()?
            .into_iter()
            .filter(|m| released.is_some_and(|r| r.contains_key(&m.coordinate)))
            .collect())
    }

    /// Descriptor paths as `/`-separated strings for commit requests.
    pub fn descriptor_paths(&self) -> Result<Vec<String>, StepError> {
        Ok(self
            .project
            .descriptor_paths()?
            .iter()
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .collect())
    }

    pub fn local_revision(&self) -> Result<ScmRevision, StepError> {
        Ok(self.scm.local_revision()?)
    }
}

impl std::fmt::Debug for ReleaseContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReleaseContext")
            .field("root", &self.project.root())
            .field("scm", &self.scm.name())
            .field("options", &self.options)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}
