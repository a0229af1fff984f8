//! Build, deploy and the metadata hand-off.

use std::path::Path;

use chrono::Utc;
use tracing::{debug, info};

use super::ReleaseContext;
use crate::build::BuildRequest;
use crate::errors::{BuildError, StepError};
use crate::metadata::{ReleaseMetadata, ReleasePhase};
use crate::pipeline::Step;

/// Environment variable carrying the release tag to the build.
pub const ENV_TAG: &str = "SCMRELEASE_TAG";
/// Environment variable carrying the root module's release version.
pub const ENV_VERSION: &str = "SCMRELEASE_VERSION";
/// Environment variable carrying the path of the release metadata file.
pub const ENV_METADATA: &str = "SCMRELEASE_METADATA";

fn stage_descriptor(root: &Path, staging: &Path, descriptor: &Path) -> Result<(), std::io::Error> {
    let target = staging.join(descriptor);
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(root.join(descriptor), target)?;
    Ok(())
}

fn build_and_stage(context: &mut ReleaseContext, metadata_path: &Path) -> Result<(), StepError> {
    let modules = context.released_modules()?;

    if let Some(build) = &context.build {
        let mut environment = context.options.build_environment.clone();
        environment.insert(ENV_TAG.into(), context.tag()?.to_string());
        environment.insert(ENV_METADATA.into(), metadata_path.display().to_string());
        if let Some(version) = modules
            .first()
            .and_then(|m| context.metadata.version(ReleasePhase::Release, &m.coordinate))
        {
            environment.insert(ENV_VERSION.into(), version.to_string());
        }
        let request = BuildRequest {
            working_directory: context.project_root().to_path_buf(),
            arguments: Vec::new(),
            environment,
        };
        build.build(&request)?;
    } else {
        debug!("no build configured, skipping");
    }

    if context.artifacts.is_some() {
        let staging = tempfile::tempdir().map_err(BuildError::from)?;
        for module in &modules {
            stage_descriptor(context.project_root(), staging.path(), &module.descriptor)
                .map_err(BuildError::from)?;
        }
        debug!(path = %staging.path().display(), modules = modules.len(), "staged release");
        context.staging = Some(staging);
    }
    Ok(())
}

/// Runs the build on the release versions and stages what gets deployed.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildRelease;

impl Step<ReleaseContext> for BuildRelease {
    fn id(&self) -> &str {
        "build-release"
    }

    fn position(&self) -> u32 {
        80
    }

    fn execute(&self, context: &mut ReleaseContext) -> Result<(), StepError> {
        // The build reads the versions and tag from here; later steps
        // rewrite it with their checkpoints.
        let metadata_path = context.metadata_path();
        context.metadata.persist(&metadata_path)?;
        debug!(path = %metadata_path.display(), "release metadata handed to the build");

        if let Err(err) = build_and_stage(context, &metadata_path) {
            ReleaseMetadata::delete(&metadata_path)?;
            return Err(err);
        }
        Ok(())
    }

    fn rollback(&self, context: &mut ReleaseContext) -> Result<(), StepError> {
        context.staging = None;
        ReleaseMetadata::delete(&context.metadata_path())?;
        Ok(())
    }
}

/// Publishes the staged release modules.
///
/// Published artifacts are not withdrawn on rollback.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeployArtifacts;

impl Step<ReleaseContext> for DeployArtifacts {
    fn id(&self) -> &str {
        "deploy-artifacts"
    }

    fn position(&self) -> u32 {
        130
    }

    fn requires_remote(&self) -> bool {
        true
    }

    fn execute(&self, context: &mut ReleaseContext) -> Result<(), StepError> {
        let Some(artifacts) = &context.artifacts else {
            debug!("no artifact repository configured, skipping");
            return Ok(());
        };
        let staging = context
            .staging
            .as_ref()
            .ok_or_else(|| StepError::state("release was not staged by the build"))?;

        for module in context.released_modules()? {
            let version = context
                .metadata
                .version(ReleasePhase::Release, &module.coordinate)
                .ok_or_else(|| StepError::state(format!("no release version for {}", module.coordinate)))?;
            artifacts.deploy(staging.path(), &module, version)?;
        }
        Ok(())
    }
}

/// Persists the collected versions and checkpoints.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteReleaseMetadata;

impl Step<ReleaseContext> for WriteReleaseMetadata {
    fn id(&self) -> &str {
        "write-release-metadata"
    }

    fn position(&self) -> u32 {
        140
    }

    fn execute(&self, context: &mut ReleaseContext) -> Result<(), StepError> {
        context.metadata.timestamp = Some(Utc::now());
        let path = context.metadata_path();
        context.metadata.persist(&path)?;
        info!(path = %path.display(), "release metadata written");
        Ok(())
    }

    fn rollback(&self, context: &mut ReleaseContext) -> Result<(), StepError> {
        ReleaseMetadata::delete(&context.metadata_path())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::artifacts::{ArtifactPresence, DirectoryArtifactRepository};
    use crate::build::BuildInvoker;
    use crate::project::Coordinate;
    use crate::release::fixture;
    use crate::release::versions::{CalculateVersions, SetReleaseVersions};

    struct CaptureEnv(std::sync::Mutex<Option<BuildRequest>>);

    impl BuildInvoker for Arc<CaptureEnv> {
        fn build(&self, request: &BuildRequest) -> Result<(), BuildError> {
            *self.0.lock().unwrap() = Some(request.clone());
            Ok(())
        }
    }

    /// Reads the metadata file named in its environment while building.
    struct ReadMetadata(std::sync::Mutex<Option<ReleaseMetadata>>);

    impl BuildInvoker for Arc<ReadMetadata> {
        fn build(&self, request: &BuildRequest) -> Result<(), BuildError> {
            let path = Path::new(&request.environment[ENV_METADATA]).to_path_buf();
            let metadata = ReleaseMetadata::load(&path).map_err(|e| BuildError::CommandFailed {
                exit_code: 1,
                stderr: e.to_string(),
            })?;
            *self.0.lock().unwrap() = Some(metadata);
            Ok(())
        }
    }

    #[test]
    fn test_build_exports_release_facts() {
        let dir = tempfile::tempdir().unwrap();
        let capture = Arc::new(CaptureEnv(std::sync::Mutex::new(None)));
        let (_, context) = fixture::context(dir.path());
        let mut context = context.with_build(Box::new(Arc::clone(&capture)));
        context.options.build_environment.insert("PROFILE".into(), "release".into());
        CalculateVersions.execute(&mut context).unwrap();

        BuildRelease.execute(&mut context).unwrap();
        let request = capture.0.lock().unwrap().take().unwrap();
        assert_eq!(request.environment[ENV_TAG], "parent-1.0");
        assert_eq!(request.environment[ENV_VERSION], "1.0");
        assert_eq!(request.environment["PROFILE"], "release");
        assert_eq!(
            Path::new(&request.environment[ENV_METADATA]),
            context.metadata_path().as_path()
        );
        assert!(context.staging.is_none());
    }

    #[test]
    fn test_build_reads_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let reader = Arc::new(ReadMetadata(std::sync::Mutex::new(None)));
        let (_, context) = fixture::context(dir.path());
        let mut context = context.with_build(Box::new(Arc::clone(&reader)));
        CalculateVersions.execute(&mut context).unwrap();
        SetReleaseVersions.execute(&mut context).unwrap();

        BuildRelease.execute(&mut context).unwrap();
        let seen = reader.0.lock().unwrap().take().unwrap();
        let lib = Coordinate::new("org.example", "lib");
        assert_eq!(seen.tag.as_deref(), Some("parent-1.0"));
        assert_eq!(seen.version(ReleasePhase::Release, &lib), Some("1.0"));
        assert_eq!(seen.version(ReleasePhase::PostRelease, &lib), Some("1.1-SNAPSHOT"));

        BuildRelease.rollback(&mut context).unwrap();
        assert!(!context.metadata_path().exists());
    }

    #[test]
    fn test_stage_and_deploy() {
        let dir = tempfile::tempdir().unwrap();
        let repository = Arc::new(DirectoryArtifactRepository::new(
            dir.path().join("local"),
            dir.path().join("shared"),
        ));
        let (_, context) = fixture::context(dir.path());
        let mut context = context.with_artifacts(repository);
        CalculateVersions.execute(&mut context).unwrap();
        SetReleaseVersions.execute(&mut context).unwrap();

        assert!(matches!(
            DeployArtifacts.execute(&mut context),
            Err(StepError::State(_))
        ));
        BuildRelease.execute(&mut context).unwrap();
        DeployArtifacts.execute(&mut context).unwrap();

        let artifacts = context.artifacts.as_ref().unwrap();
        let lib = Coordinate::new("org.example", "lib");
        assert_eq!(artifacts.lookup(&lib, "1.0").unwrap(), ArtifactPresence::Remote);
        let deployed =
            std::fs::read_to_string(dir.path().join("shared/org/example/lib/1.0/lib-1.0.toml")).unwrap();
        assert!(deployed.contains("version = \"1.0\""));

        BuildRelease.rollback(&mut context).unwrap();
        assert!(context.staging.is_none());
    }

    #[test]
    fn test_metadata_written_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let (_, mut context) = fixture::context(dir.path());
        CalculateVersions.execute(&mut context).unwrap();

        WriteReleaseMetadata.execute(&mut context).unwrap();
        let path = context.metadata_path();
        let loaded = ReleaseMetadata::load(&path).unwrap();
        assert_eq!(loaded.tag.as_deref(), Some("parent-1.0"));
        assert!(loaded.timestamp.is_some());

        WriteReleaseMetadata.rollback(&mut context).unwrap();
        assert!(!path.exists());
    }
}
