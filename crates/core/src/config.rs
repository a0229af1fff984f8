//! TOML-based configuration for scmrelease.
//!
//! Secrets are never stored inline: `password_env` names an environment
//! variable that is resolved at runtime via
//! [`ReleaseConfig::resolve_env_vars`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::artifacts::{ArtifactRepository, DirectoryArtifactRepository};
use crate::errors::ConfigError;
use crate::merge::{DescriptorMergeClient, MergeStrategy};
use crate::metadata::METADATA_FILE;
use crate::scm::{ProviderSettings, SvnLayout};
use crate::version::VersionUpgradeStrategy;

/// Default configuration file name.
pub const CONFIG_FILE: &str = "scmrelease.toml";

/// Commented configuration written by `scmrelease init`.
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# scmrelease configuration

[scm]
# Connection string; defaults to the root module's [scm] section.
# connection = "scm:git:ssh://git@example.org/project.git"
working_directory = "."
# username = "release-bot"
# Name of the environment variable holding the password or token.
# password_env = "SCM_PASSWORD"
remote = "origin"
# do-not-merge | use-local | use-remote | full
merge_strategy = "do-not-merge"
trunk_path = "trunk"
branches_path = "branches"
tags_path = "tags"

[release]
# Placeholders: {group}, {artifact}, {version}
tag_pattern = "{artifact}-{version}"
# default | major | minor | incremental
upgrade_strategy = "default"
allow_local_release_artifacts = true
metadata_file = "release-metadata.toml"

[build]
# Program and arguments run in the working copy after versions are set.
command = []

[artifacts]
# local_dir = "/home/me/.artifacts"
# remote_dir = "/srv/artifacts"

[logging]
level = "warn"
"#;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReleaseConfig {
    #[serde(default)]
    pub scm: ScmConfig,

    #[serde(default)]
    pub release: ReleaseSettings,

    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default)]
    pub artifacts: ArtifactsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

// ---------------------------------------------------------------------------
// SCM
// ---------------------------------------------------------------------------

/// Named merge strategies selectable from configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeStrategyName {
    #[default]
    DoNotMerge,
    UseLocal,
    UseRemote,
    /// Descriptor-aware merge with a line merge for other files.
    Full,
}

impl MergeStrategyName {
    pub fn strategy(self) -> MergeStrategy {
        match self {
            Self::DoNotMerge => MergeStrategy::DoNotMerge,
            Self::UseLocal => MergeStrategy::UseLocal,
            Self::UseRemote => MergeStrategy::UseRemote,
            Self::Full => MergeStrategy::full(DescriptorMergeClient::with_text_fallback()),
        }
    }
}

/// Repository connection and working copy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScmConfig {
    /// Overrides the connection declared by the root module.
    #[serde(default)]
    pub connection: Option<String>,

    #[serde(default = "default_working_directory")]
    pub working_directory: PathBuf,

    #[serde(default)]
    pub username: Option<String>,

    /// Environment variable holding the password or token.
    #[serde(default)]
    pub password_env: Option<String>,

    /// Tracked remote for git.
    #[serde(default = "default_remote")]
    pub remote: String,

    #[serde(default)]
    pub merge_strategy: MergeStrategyName,

    #[serde(default = "default_trunk")]
    pub trunk_path: String,

    #[serde(default = "default_branches")]
    pub branches_path: String,

    #[serde(default = "default_tags")]
    pub tags_path: String,

    /// Resolved password (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub password: Option<String>,
}

fn default_working_directory() -> PathBuf {
    PathBuf::from(".")
}
fn default_remote() -> String {
    "origin".into()
}
fn default_trunk() -> String {
    "trunk".into()
}
fn default_branches() -> String {
    "branches".into()
}
fn default_tags() -> String {
    "tags".into()
}

impl Default for ScmConfig {
    fn default() -> Self {
        Self {
            connection: None,
            working_directory: default_working_directory(),
            username: None,
            password_env: None,
            remote: default_remote(),
            merge_strategy: MergeStrategyName::default(),
            trunk_path: default_trunk(),
            branches_path: default_branches(),
            tags_path: default_tags(),
            password: None,
        }
    }
}

impl ScmConfig {
    pub fn svn_layout(&self) -> SvnLayout {
        SvnLayout {
            trunk: self.trunk_path.clone(),
            branches: self.branches_path.clone(),
            tags: self.tags_path.clone(),
        }
    }

    /// Factory settings for the provider registry. The URL is filled in from
    /// the connection string at lookup time.
    pub fn provider_settings(&self) -> ProviderSettings {
        ProviderSettings {
            working_directory: self.working_directory.clone(),
            url: String::new(),
            username: self.username.clone(),
            password: self.password.clone(),
            remote_name: Some(self.remote.clone()),
            svn_layout: self.svn_layout(),
        }
    }
}

// ---------------------------------------------------------------------------
// Release
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseSettings {
    /// Tag name template: `{group}`, `{artifact}`, `{version}`.
    #[serde(default = "default_tag_pattern")]
    pub tag_pattern: String,

    #[serde(default)]
    pub upgrade_strategy: VersionUpgradeStrategy,

    /// Whether a release version found only in the local artifact
    /// repository is a warning (true) or blocks the release (false).
    #[serde(default = "default_true")]
    pub allow_local_release_artifacts: bool,

    /// Metadata file, relative to the working copy.
    #[serde(default = "default_metadata_file")]
    pub metadata_file: PathBuf,
}

fn default_tag_pattern() -> String {
    "{artifact}-{version}".into()
}
fn default_true() -> bool {
    true
}
fn default_metadata_file() -> PathBuf {
    PathBuf::from(METADATA_FILE)
}

impl Default for ReleaseSettings {
    fn default() -> Self {
        Self {
            tag_pattern: default_tag_pattern(),
            upgrade_strategy: VersionUpgradeStrategy::default(),
            allow_local_release_artifacts: true,
            metadata_file: default_metadata_file(),
        }
    }
}

// ---------------------------------------------------------------------------
// Build / artifacts / logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Program and arguments; empty skips the build.
    #[serde(default)]
    pub command: Vec<String>,

    /// Extra variables exported to the build.
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    #[serde(default)]
    pub local_dir: Option<PathBuf>,

    #[serde(default)]
    pub remote_dir: Option<PathBuf>,
}

impl ArtifactsConfig {
    /// A directory repository when both directories are configured.
    pub fn repository(&self) -> Option<Arc<dyn ArtifactRepository>> {
        match (&self.local_dir, &self.remote_dir) {
            (Some(local), Some(remote)) => Some(Arc::new(DirectoryArtifactRepository::new(
                local.clone(),
                remote.clone(),
            ))),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Minimum tracing level when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "warn".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const TAG_PLACEHOLDERS: [&str; 3] = ["{group}", "{artifact}", "{version}"];

impl ReleaseConfig {
    /// Load a [`ReleaseConfig`] from a TOML file.
    ///
    /// This does **not** resolve environment variables -- call
    /// [`resolve_env_vars`](Self::resolve_env_vars) afterwards.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: ReleaseConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Resolve `password_env`. A configured but unset variable is an error.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        if let Some(env_name) = &self.scm.password_env {
            match std::env::var(env_name) {
                Ok(value) if !value.is_empty() => {
                    debug!(env_name, "resolved scm password");
                    self.scm.password = Some(value);
                }
                _ => {
                    return Err(ConfigError::EnvVarMissing {
                        var: env_name.clone(),
                        field: "scm.password_env".into(),
                    })
                }
            }
        }
        if self.scm.password.is_some() && self.scm.username.is_none() {
            warn!("scm password configured without a username");
        }
        Ok(())
    }

    /// Validate that all fields are sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &str, detail: &str| ConfigError::InvalidValue {
            field: field.into(),
            detail: detail.into(),
        };

        if let Some(connection) = &self.scm.connection {
            if crate::scm::provider_name(connection).is_none() {
                return Err(invalid(
                    "scm.connection",
                    "expected 'scm:<provider>:<url>'",
                ));
            }
        }
        if self.scm.remote.trim().is_empty() {
            return Err(invalid("scm.remote", "remote name must not be empty"));
        }
        for (field, value) in [
            ("scm.trunk_path", &self.scm.trunk_path),
            ("scm.branches_path", &self.scm.branches_path),
            ("scm.tags_path", &self.scm.tags_path),
        ] {
            if value.trim().is_empty() || value.contains('/') {
                return Err(invalid(field, "must be a single non-empty path segment"));
            }
        }
        if !TAG_PLACEHOLDERS
            .iter()
            .any(|p| self.release.tag_pattern.contains(p))
        {
            return Err(invalid(
                "release.tag_pattern",
                "must contain at least one of {group}, {artifact}, {version}",
            ));
        }
        if self.release.metadata_file.as_os_str().is_empty() {
            return Err(invalid("release.metadata_file", "must not be empty"));
        }
        if self.artifacts.local_dir.is_some() != self.artifacts.remote_dir.is_some() {
            return Err(invalid(
                "artifacts",
                "local_dir and remote_dir must be configured together",
            ));
        }
        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            return Err(invalid(
                "logging.level",
                "expected one of trace, debug, info, warn, error",
            ));
        }
        Ok(())
    }

    /// Convenience: load, resolve, and validate in one call.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.resolve_env_vars()?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_toml() -> &'static str {
        r#"
[scm]
connection = "scm:svn|https://svn.example.com/repo/trunk"
working_directory = "/tmp/wc"
username = "release-bot"
password_env = "SCMRELEASE_TEST_UNUSED"
merge_strategy = "full"

[release]
tag_pattern = "{group}-{artifact}-{version}"
upgrade_strategy = "minor"
allow_local_release_artifacts = false

[build]
command = ["make", "dist"]

[build.environment]
PROFILE = "release"

[artifacts]
local_dir = "/tmp/local"
remote_dir = "/tmp/shared"

[logging]
level = "debug"
"#
    }

    #[test]
    fn test_parse_full_config() {
        let config: ReleaseConfig = toml::from_str(sample_toml()).expect("failed to parse toml");
        assert_eq!(config.scm.merge_strategy, MergeStrategyName::Full);
        assert_eq!(config.scm.merge_strategy.strategy().name(), "full-merge");
        assert_eq!(config.release.upgrade_strategy, VersionUpgradeStrategy::Minor);
        assert!(!config.release.allow_local_release_artifacts);
        assert_eq!(config.build.command, ["make", "dist"]);
        assert_eq!(config.build.environment["PROFILE"], "release");
        assert!(config.artifacts.repository().is_some());
        config.validate().unwrap();
    }

    #[test]
    fn test_defaults() {
        let config: ReleaseConfig = toml::from_str("").unwrap();
        assert_eq!(config.scm.remote, "origin");
        assert_eq!(config.scm.merge_strategy, MergeStrategyName::DoNotMerge);
        assert_eq!(config.release.tag_pattern, "{artifact}-{version}");
        assert!(config.release.allow_local_release_artifacts);
        assert_eq!(config.release.metadata_file, PathBuf::from(METADATA_FILE));
        assert_eq!(config.logging.level, "warn");
        assert!(config.build.command.is_empty());
        assert!(config.artifacts.repository().is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_template_parses_and_validates() {
        let config: ReleaseConfig = toml::from_str(DEFAULT_CONFIG_TEMPLATE).unwrap();
        config.validate().unwrap();
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(sample_toml().as_bytes()).unwrap();

        let config = ReleaseConfig::load_from_file(&path).expect("load_from_file failed");
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_file_not_found() {
        let result = ReleaseConfig::load_from_file("/nonexistent/scmrelease.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ReleaseConfig::default();
        config.release.tag_pattern = "release".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "release.tag_pattern"
        ));

        let mut config = ReleaseConfig::default();
        config.scm.connection = Some("https://example.org".into());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "scm.connection"
        ));

        let mut config = ReleaseConfig::default();
        config.artifacts.local_dir = Some("/tmp/local".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolve_env_vars() {
        std::env::set_var("SCMRELEASE_TEST_PW", "s3cret");
        let mut config = ReleaseConfig::default();
        config.scm.password_env = Some("SCMRELEASE_TEST_PW".into());
        config.resolve_env_vars().unwrap();
        assert_eq!(config.scm.password.as_deref(), Some("s3cret"));
        assert_eq!(config.scm.provider_settings().password.as_deref(), Some("s3cret"));
        std::env::remove_var("SCMRELEASE_TEST_PW");

        let mut config = ReleaseConfig::default();
        config.scm.password_env = Some("SCMRELEASE_TEST_MISSING".into());
        assert!(matches!(
            config.resolve_env_vars(),
            Err(ConfigError::EnvVarMissing { ref var, .. }) if var == "SCMRELEASE_TEST_MISSING"
        ));
    }
}
