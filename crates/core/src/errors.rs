//! Error types for the scmrelease core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.

use std::fmt;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Version(#[from] VersionError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Scm(#[from] ScmError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Project(#[from] ProjectError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

// ---------------------------------------------------------------------------
// Version errors
// ---------------------------------------------------------------------------

/// Errors from parsing or calculating version strings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VersionError {
    /// An empty string is not a version.
    #[error("version string is empty")]
    Empty,

    /// The version has no release form (e.g. it is only the qualifier).
    #[error("version '{0}' has no release form")]
    NoReleaseForm(String),

    /// An upgrade strategy name was not recognised.
    #[error("unknown version upgrade strategy '{0}'")]
    UnknownStrategy(String),
}

// ---------------------------------------------------------------------------
// Merge errors
// ---------------------------------------------------------------------------

/// Errors from the three-way merge engine and merge clients.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MergeError {
    /// Both sides changed the primary version and local is not newer.
    #[error("version conflict: local '{local}' is not newer than remote '{remote}' (base '{base}')")]
    VersionConflict {
        local: String,
        remote: String,
        base: String,
    },

    /// The parent references could not be reconciled.
    #[error("parent conflict: {0}")]
    ParentConflict(String),

    /// A line-based merge left conflicting hunks.
    #[error("text conflict in {regions} region(s)")]
    TextConflict { regions: usize },

    /// One side deleted a path the other side changed.
    #[error("'{path}' was deleted on one side and modified on the other")]
    DeleteConflict { path: String },

    /// The strategy forbids reconciling divergent content.
    #[error("'{path}' diverged and the merge strategy forbids merging")]
    Diverged { path: String },

    /// A document given to a merge client could not be read.
    #[error("unreadable merge input: {0}")]
    Unreadable(String),
}

// ---------------------------------------------------------------------------
// SCM errors
// ---------------------------------------------------------------------------

/// Classification of the SCM operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScmOperation {
    Checkout,
    Commit,
    Push,
    Update,
    Tag,
    DeleteTag,
    Branch,
    DeleteBranch,
    Merge,
    RevertCommits,
    Diff,
    History,
    Info,
}

impl fmt::Display for ScmOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Checkout => "checkout",
            Self::Commit => "commit",
            Self::Push => "push",
            Self::Update => "update",
            Self::Tag => "tag",
            Self::DeleteTag => "delete-tag",
            Self::Branch => "branch",
            Self::DeleteBranch => "delete-branch",
            Self::Merge => "merge",
            Self::RevertCommits => "revert-commits",
            Self::Diff => "diff",
            Self::History => "history",
            Self::Info => "info",
        };
        f.write_str(name)
    }
}

/// Errors from SCM provider operations.
///
/// Every variant carries the [`ScmOperation`] that was attempted so callers
/// can tell which phase of a release failed.
#[derive(Debug, Error)]
pub enum ScmError {
    /// The operation failed on the backend.
    #[error("scm {operation} failed: {detail}")]
    Failed {
        operation: ScmOperation,
        detail: String,
    },

    /// A request violated its preconditions.
    #[error("invalid scm {operation} request: {detail}")]
    InvalidRequest {
        operation: ScmOperation,
        detail: String,
    },

    /// Local and remote state could not be reconciled.
    #[error("scm {operation} conflict on '{path}': {source}")]
    Conflict {
        operation: ScmOperation,
        path: String,
        #[source]
        source: MergeError,
    },

    /// A `git2` library error.
    #[error("scm {operation} failed: {source}")]
    Git {
        operation: ScmOperation,
        #[source]
        source: git2::Error,
    },

    /// The `svn` command exited with a non-zero status.
    #[error("scm {operation} failed: svn exited with {exit_code}: {stderr}")]
    SvnCommand {
        operation: ScmOperation,
        exit_code: i32,
        stderr: String,
    },

    /// Generic I/O wrapper.
    #[error("scm {operation} I/O error: {source}")]
    Io {
        operation: ScmOperation,
        #[source]
        source: std::io::Error,
    },
}

impl ScmError {
    /// The operation that was being attempted.
    pub fn operation(&self) -> ScmOperation {
        match self {
            Self::Failed { operation, .. }
            | Self::InvalidRequest { operation, .. }
            | Self::Conflict { operation, .. }
            | Self::Git { operation, .. }
            | Self::SvnCommand { operation, .. }
            | Self::Io { operation, .. } => *operation,
        }
    }

    pub fn failed(operation: ScmOperation, detail: impl Into<String>) -> Self {
        Self::Failed {
            operation,
            detail: detail.into(),
        }
    }

    pub fn invalid(operation: ScmOperation, detail: impl Into<String>) -> Self {
        Self::InvalidRequest {
            operation,
            detail: detail.into(),
        }
    }

    pub fn conflict(operation: ScmOperation, path: impl Into<String>, source: MergeError) -> Self {
        Self::Conflict {
            operation,
            path: path.into(),
            source,
        }
    }

    pub fn git(operation: ScmOperation) -> impl FnOnce(git2::Error) -> Self {
        move |source| Self::Git { operation, source }
    }

    pub fn io(operation: ScmOperation) -> impl FnOnce(std::io::Error) -> Self {
        move |source| Self::Io { operation, source }
    }
}

/// Errors from looking up a provider by name.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No provider is registered under the name.
    #[error("no scm provider registered for '{0}'")]
    NoSuchProvider(String),

    /// The connection string does not name a provider.
    #[error("cannot derive an scm provider from connection '{0}'")]
    UnrecognisedConnection(String),

    /// The provider factory failed.
    #[error(transparent)]
    Provider(#[from] ScmError),
}

// ---------------------------------------------------------------------------
// Project model errors
// ---------------------------------------------------------------------------

/// Errors from reading or rewriting module descriptors.
#[derive(Debug, Error)]
pub enum ProjectError {
    /// The descriptor file does not exist.
    #[error("module descriptor not found: {0}")]
    DescriptorNotFound(String),

    /// The descriptor could not be parsed.
    #[error("failed to parse module descriptor '{path}': {detail}")]
    Parse { path: String, detail: String },

    /// A required field is missing.
    #[error("module descriptor '{path}' is missing '{field}'")]
    MissingField { path: String, field: String },

    /// No module with the coordinate exists.
    #[error("module not found: {0}")]
    ModuleNotFound(String),

    /// Generic I/O wrapper.
    #[error("project I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Artifact / build errors
// ---------------------------------------------------------------------------

/// Errors from the artifact repository boundary.
#[derive(Debug, Error, Clone)]
pub enum ArtifactError {
    /// Looking up an artifact failed (not the same as "absent").
    #[error("artifact lookup failed for {coordinate}: {detail}")]
    Lookup { coordinate: String, detail: String },

    /// Deploying an artifact failed.
    #[error("artifact deploy failed for {coordinate}: {detail}")]
    Deploy { coordinate: String, detail: String },
}

/// Errors from invoking the external build.
#[derive(Debug, Error)]
pub enum BuildError {
    /// No build command was configured.
    #[error("no build command configured")]
    NotConfigured,

    /// The build exited with a non-zero status.
    #[error("build command failed (exit {exit_code}): {stderr}")]
    CommandFailed { exit_code: i32, stderr: String },

    /// Generic I/O wrapper.
    #[error("build I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Metadata errors
// ---------------------------------------------------------------------------

/// Errors from persisting or loading release metadata.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// Serialization failed.
    #[error("release metadata serialization error: {0}")]
    Serialize(String),

    /// The persisted file could not be parsed.
    #[error("release metadata parse error: {0}")]
    Parse(String),

    /// Generic I/O wrapper.
    #[error("release metadata I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A required environment variable is not set.
    #[error("required environment variable '{var}' is not set (referenced by config field '{field}')")]
    EnvVarMissing { var: String, field: String },

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Pipeline errors
// ---------------------------------------------------------------------------

/// Errors raised by a single pipeline step.
#[derive(Debug, Error)]
pub enum StepError {
    /// A pre-check decided the release cannot proceed.
    #[error("release blocked: {0}")]
    Blocked(String),

    #[error(transparent)]
    Version(#[from] VersionError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Scm(#[from] ScmError),

    #[error(transparent)]
    Project(#[from] ProjectError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    /// The step found the context in a state it cannot work with.
    #[error("{0}")]
    State(String),
}

impl StepError {
    pub fn blocked(reason: impl Into<String>) -> Self {
        Self::Blocked(reason.into())
    }

    pub fn state(detail: impl Into<String>) -> Self {
        Self::State(detail.into())
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked(_))
    }
}

/// A rollback that failed while recovering from an earlier failure.
#[derive(Debug)]
pub struct RollbackFailure {
    pub step: String,
    pub error: StepError,
}

impl fmt::Display for RollbackFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rollback of '{}' failed: {}", self.step, self.error)
    }
}

/// Errors returned by the pipeline executor.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A pre-check stopped the release before anything was changed.
    /// Completed steps are not rolled back, so `rollback_failures` is empty.
    #[error("release blocked by step '{step}': {source}{}", summarize(.rollback_failures))]
    Blocked {
        step: String,
        #[source]
        source: StepError,
        rollback_failures: Vec<RollbackFailure>,
    },

    /// A step failed mid-flight; completed steps were rolled back.
    #[error("release failed in step '{step}': {source}{}", summarize(.rollback_failures))]
    Failed {
        step: String,
        #[source]
        source: StepError,
        rollback_failures: Vec<RollbackFailure>,
    },

    /// Steps needing remote access were scheduled for an offline run.
    #[error("steps require remote access but the run is offline: {}", .steps.join(", "))]
    OfflineViolation { steps: Vec<String> },
}

impl PipelineError {
    /// Rollback failures attached to the original error.
    pub fn rollback_failures(&self) -> &[RollbackFailure] {
        match self {
            Self::Blocked {
                rollback_failures, ..
            }
            | Self::Failed {
                rollback_failures, ..
            } => rollback_failures,
            Self::OfflineViolation { .. } => &[],
        }
    }

    /// The step whose failure stopped the run, if any.
    pub fn failed_step(&self) -> Option<&str> {
        match self {
            Self::Blocked { step, .. } | Self::Failed { step, .. } => Some(step),
            Self::OfflineViolation { .. } => None,
        }
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked { .. })
    }
}

fn summarize(failures: &[RollbackFailure]) -> String {
    if failures.is_empty() {
        return String::new();
    }
    let details: Vec<String> = failures.iter().map(|f| f.to_string()).collect();
    format!(
        " ({} rollback failure(s): {})",
        failures.len(),
        details.join("; ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = VersionError::NoReleaseForm("SNAPSHOT".into());
        assert_eq!(err.to_string(), "version 'SNAPSHOT' has no release form");

        let err = ScmError::failed(ScmOperation::Tag, "tag exists");
        assert_eq!(err.to_string(), "scm tag failed: tag exists");

        let err = ConfigError::EnvVarMissing {
            var: "SCM_PASSWORD".into(),
            field: "scm.password_env".into(),
        };
        assert!(err.to_string().contains("SCM_PASSWORD"));
    }

    #[test]
    fn test_scm_error_keeps_operation() {
        let err = ScmError::conflict(
            ScmOperation::Push,
            "module.toml",
            MergeError::TextConflict { regions: 1 },
        );
        assert_eq!(err.operation(), ScmOperation::Push);

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = ScmError::io(ScmOperation::Checkout)(io);
        assert_eq!(err.operation(), ScmOperation::Checkout);
        assert!(err.to_string().starts_with("scm checkout I/O error"));
    }

    #[test]
    fn test_pipeline_error_lists_rollback_failures() {
        let err = PipelineError::Failed {
            step: "commit-release".into(),
            source: StepError::state("boom"),
            rollback_failures: vec![RollbackFailure {
                step: "set-release-versions".into(),
                error: StepError::state("cannot restore"),
            }],
        };
        let msg = err.to_string();
        assert!(msg.contains("commit-release"));
        assert!(msg.contains("1 rollback failure(s)"));
        assert!(msg.contains("set-release-versions"));
        assert_eq!(err.failed_step(), Some("commit-release"));
        assert!(!err.is_blocked());
    }

    #[test]
    fn test_core_error_from_subsystem() {
        let core_err: CoreError = VersionError::Empty.into();
        assert!(matches!(core_err, CoreError::Version(_)));

        let core_err: CoreError = RegistryError::NoSuchProvider("hg".into()).into();
        assert!(matches!(core_err, CoreError::Registry(_)));
    }
}
