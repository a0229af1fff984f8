//! Project model: the multi-module tree a release operates on.
//!
//! The release workflow only needs a handful of facts per module (its
//! coordinate, version, parent, dependencies, and SCM connection) and one
//! mutation (set a module's version everywhere it is referenced). Everything
//! else about descriptors stays behind the [`ProjectModel`] trait.

pub mod descriptor;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ProjectError;
use crate::merge::ParentReference;

pub use descriptor::{TomlProject, DESCRIPTOR_FILE};

// ---------------------------------------------------------------------------
// Value types
// ---------------------------------------------------------------------------

/// Identity of a module: `group:artifact`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Coordinate {
    pub group: String,
    pub artifact: String,
}

impl Coordinate {
    pub fn new(group: impl Into<String>, artifact: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            artifact: artifact.into(),
        }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group, self.artifact)
    }
}

impl FromStr for Coordinate {
    type Err = ProjectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((group, artifact)) if !group.is_empty() && !artifact.is_empty() => {
                Ok(Self::new(group.trim(), artifact.trim()))
            }
            _ => Err(ProjectError::Parse {
                path: s.to_string(),
                detail: "expected 'group:artifact'".into(),
            }),
        }
    }
}

impl From<&ParentReference> for Coordinate {
    fn from(parent: &ParentReference) -> Self {
        Self::new(parent.group.clone(), parent.artifact.clone())
    }
}

/// A versioned reference to another module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub coordinate: Coordinate,
    pub version: String,
}

/// Repository connection strings declared by a module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScmConnection {
    pub connection: Option<String>,
    pub developer_connection: Option<String>,
}

impl ScmConnection {
    /// The developer connection when present, else the plain connection.
    pub fn preferred(&self) -> Option<&str> {
        self.developer_connection
            .as_deref()
            .or(self.connection.as_deref())
    }
}

/// Everything the release workflow knows about one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    pub coordinate: Coordinate,
    pub version: String,
    pub parent: Option<ParentReference>,
    pub dependencies: Vec<Dependency>,
    pub scm: Option<ScmConnection>,
    /// Descriptor path relative to the project root.
    pub descriptor: PathBuf,
}

impl ModuleInfo {
    /// Every versioned reference this module makes: parent first, then
    /// dependencies.
    pub fn references(&self) -> impl Iterator<Item = (Coordinate, &str)> {
        self.parent
            .iter()
            .map(|p| (Coordinate::from(p), p.version.as_str()))
            .chain(
                self.dependencies
                    .iter()
                    .map(|d| (d.coordinate.clone(), d.version.as_str())),
            )
    }
}

// ---------------------------------------------------------------------------
// Project model boundary
// ---------------------------------------------------------------------------

/// Read/write access to the project tree in the working copy.
pub trait ProjectModel: Send {
    /// Root directory of the project.
    fn root(&self) -> &Path;

    /// All modules, root module first.
    fn modules(&self) -> Result<Vec<ModuleInfo>, ProjectError>;

    /// Set the version of `coordinate` and every reference to it.
    fn set_version(&mut self, coordinate: &Coordinate, version: &str) -> Result<(), ProjectError>;

    /// Descriptor paths relative to [`Self::root`].
    fn descriptor_paths(&self) -> Result<Vec<PathBuf>, ProjectError> {
        Ok(self.modules()?.into_iter().map(|m| m.descriptor).collect())
    }

    /// Connection string of the root module, developer connection preferred.
    fn scm_connection(&self) -> Result<Option<String>, ProjectError> {
        Ok(self
            .modules()?
            .into_iter()
            .find_map(|m| m.scm.and_then(|s| s.preferred().map(str::to_owned))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_parse_and_display() {
        let coordinate: Coordinate = "org.example:app".parse().unwrap();
        assert_eq!(coordinate, Coordinate::new("org.example", "app"));
        assert_eq!(coordinate.to_string(), "org.example:app");
        assert!("no-colon".parse::<Coordinate>().is_err());
        assert!(":app".parse::<Coordinate>().is_err());
    }

    #[test]
    fn test_preferred_connection() {
        let scm = ScmConnection {
            connection: Some("scm:svn:http://a".into()),
            developer_connection: Some("scm:svn:https://a".into()),
        };
        assert_eq!(scm.preferred(), Some("scm:svn:https://a"));

        let scm = ScmConnection {
            connection: Some("scm:git:x".into()),
            developer_connection: None,
        };
        assert_eq!(scm.preferred(), Some("scm:git:x"));
        assert_eq!(ScmConnection::default().preferred(), None);
    }

    #[test]
    fn test_references_list_parent_first() {
        let module = ModuleInfo {
            coordinate: Coordinate::new("g", "child"),
            version: "1.0".into(),
            parent: Some(ParentReference {
                group: "g".into(),
                artifact: "root".into(),
                version: "2.0".into(),
            }),
            dependencies: vec![Dependency {
                coordinate: Coordinate::new("ext", "lib"),
                version: "3.0".into(),
            }],
            scm: None,
            descriptor: PathBuf::from("child/module.toml"),
        };
        let refs: Vec<_> = module.references().collect();
        assert_eq!(refs[0], (Coordinate::new("g", "root"), "2.0"));
        assert_eq!(refs[1], (Coordinate::new("ext", "lib"), "3.0"));
    }
}
