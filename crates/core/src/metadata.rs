//! Release metadata hand-off file.
//!
//! A flat key/value TOML table written once at the end of a release for the
//! downstream build:
//!
//! ```toml
//! "version.release.org.example:app" = "1.0"
//! "scm.revision.initial" = "41"
//! "scm.tag" = "app-1.0"
//! "release.timestamp" = "2026-01-01T00:00:00+00:00"
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::MetadataError;
use crate::project::Coordinate;
use crate::scm::ScmRevision;

/// Default file name, relative to the working copy.
pub const METADATA_FILE: &str = "release-metadata.toml";

const KEY_INITIAL: &str = "scm.revision.initial";
const KEY_RELEASE_BEFORE: &str = "scm.revision.release_before";
const KEY_RELEASE_AFTER: &str = "scm.revision.release_after";
const KEY_DEV_BEFORE: &str = "scm.revision.dev_before";
const KEY_DEV_AFTER: &str = "scm.revision.dev_after";
const KEY_TAG: &str = "scm.tag";
const KEY_TIMESTAMP: &str = "release.timestamp";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReleasePhase {
    /// The development version found before the release.
    PreRelease,
    /// The frozen release version.
    Release,
    /// The next development version.
    PostRelease,
}

impl ReleasePhase {
    pub const ALL: [ReleasePhase; 3] = [Self::PreRelease, Self::Release, Self::PostRelease];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PreRelease => "pre-release",
            Self::Release => "release",
            Self::PostRelease => "post-release",
        }
    }
}

impl fmt::Display for ReleasePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReleasePhase {
    type Err = MetadataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| MetadataError::Parse(format!("unknown release phase '{s}'")))
    }
}

/// Revision checkpoints recorded during a release.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevisionCheckpoints {
    pub initial: Option<ScmRevision>,
    pub release_before: Option<ScmRevision>,
    pub release_after: Option<ScmRevision>,
    pub dev_before: Option<ScmRevision>,
    pub dev_after: Option<ScmRevision>,
}

/// Versions per phase and module plus the SCM facts of one release.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseMetadata {
    pub versions: BTreeMap<ReleasePhase, BTreeMap<Coordinate, String>>,
    pub revisions: RevisionCheckpoints,
    pub tag: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl ReleaseMetadata {
    pub fn set_version(&mut self, phase: ReleasePhase, coordinate: Coordinate, version: impl Into<String>) {
        self.versions
            .entry(phase)
            .or_default()
            .insert(coordinate, version.into());
    }

    pub fn version(&self, phase: ReleasePhase, coordinate: &Coordinate) -> Option<&str> {
        self.versions
            .get(&phase)
            .and_then(|m| m.get(coordinate))
            .map(String::as_str)
    }

    /// All modules of `phase`, ordered by coordinate.
    pub fn phase(&self, phase: ReleasePhase) -> impl Iterator<Item = (&Coordinate, &str)> {
        self.versions
            .get(&phase)
            .into_iter()
            .flat_map(|m| m.iter().map(|(c, v)| (c, v.as_str())))
    }

    fn to_table(&self) -> toml::Table {
        let mut table = toml::Table::new();
        for (phase, modules) in &self.versions {
            for (coordinate, version) in modules {
                table.insert(
                    format!("version.{phase}.{coordinate}"),
                    toml::Value::String(version.clone()),
                );
            }
        }
        let revisions = [
            (KEY_INITIAL, &self.revisions.initial),
            (KEY_RELEASE_BEFORE, &self.revisions.release_before),
            (KEY_RELEASE_AFTER, &self.revisions.release_after),
            (KEY_DEV_BEFORE, &self.revisions.dev_before),
            (KEY_DEV_AFTER, &self.revisions.dev_after),
        ];
        for (key, revision) in revisions {
            if let Some(revision) = revision {
                table.insert(key.into(), toml::Value::String(revision.to_string()));
            }
        }
        if let Some(tag) = &self.tag {
            table.insert(KEY_TAG.into(), toml::Value::String(tag.clone()));
        }
        if let Some(timestamp) = &self.timestamp {
            table.insert(KEY_TIMESTAMP.into(), toml::Value::String(timestamp.to_rfc3339()));
        }
        table
    }

    fn from_table(table: toml::Table) -> Result<Self, MetadataError> {
        let mut metadata = Self::default();
        for (key, value) in table {
            let toml::Value::String(value) = value else {
                return Err(MetadataError::Parse(format!("'{key}' is not a string")));
            };
            match key.as_str() {
                KEY_INITIAL => metadata.revisions.initial = Some(value.into()),
                KEY_RELEASE_BEFORE => metadata.revisions.release_before = Some(value.into()),
                KEY_RELEASE_AFTER => metadata.revisions.release_after = Some(value.into()),
                KEY_DEV_BEFORE => metadata.revisions.dev_before = Some(value.into()),
                KEY_DEV_AFTER => metadata.revisions.dev_after = Some(value.into()),
                KEY_TAG => metadata.tag = Some(value),
                KEY_TIMESTAMP => {
                    let parsed = DateTime::parse_from_rfc3339(&value)
                        .map_err(|e| MetadataError::Parse(format!("{key}: {e}")))?;
                    metadata.timestamp = Some(parsed.with_timezone(&Utc));
                }
                other => {
                    let Some((phase, coordinate)) = other
                        .strip_prefix("version.")
                        .and_then(|rest| rest.split_once('.'))
                    else {
                        debug!(key = other, "ignoring unknown metadata key");
                        continue;
                    };
                    let phase: ReleasePhase = phase.parse()?;
                    let coordinate: Coordinate = coordinate
                        .parse()
                        .map_err(|e: crate::errors::ProjectError| MetadataError::Parse(e.to_string()))?;
                    metadata.set_version(phase, coordinate, value);
                }
            }
        }
        Ok(metadata)
    }

    pub fn to_toml_string(&self) -> Result<String, MetadataError> {
        toml::to_string(&self.to_table()).map_err(|e| MetadataError::Serialize(e.to_string()))
    }

    pub fn from_toml_str(text: &str) -> Result<Self, MetadataError> {
        let table: toml::Table = toml::from_str(text).map_err(|e| MetadataError::Parse(e.to_string()))?;
        Self::from_table(table)
    }

    pub fn persist(&self, path: &Path) -> Result<(), MetadataError> {
        let text = self.to_toml_string()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, text)?;
        info!(path = %path.display(), "wrote release metadata");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, MetadataError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Remove a persisted file; a missing file is not an error.
    pub fn delete(path: &Path) -> Result<(), MetadataError> {
        match std::fs::remove_file(path) {
            Ok(()) => {
                info!(path = %path.display(), "deleted release metadata");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
