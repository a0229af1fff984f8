//! Artifact repository boundary.
//!
//! The release workflow only asks two things of an artifact store: is a
//! version already published (and where), and publish this module. Lookups
//! go through [`ArtifactLookupCache`] so each coordinate and version is
//! resolved at most once per run.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ArtifactError;
use crate::project::{Coordinate, ModuleInfo};

/// Where a version of an artifact can be found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactPresence {
    /// Not published anywhere.
    Absent,
    /// Only in the local repository of this machine.
    LocalOnly,
    /// Published to the shared repository.
    Remote,
}

pub trait ArtifactRepository: Send + Sync {
    /// Resolve `coordinate` at `version`. Absence is a result, not an error.
    fn lookup(&self, coordinate: &Coordinate, version: &str) -> Result<ArtifactPresence, ArtifactError>;

    /// Publish `module` at `version` from the project checked out at `project_root`.
    fn deploy(&self, project_root: &Path, module: &ModuleInfo, version: &str) -> Result<(), ArtifactError>;
}

// ---------------------------------------------------------------------------
// Read-through cache
// ---------------------------------------------------------------------------

type CacheKey = (Coordinate, String);

/// Read-through cache in front of an [`ArtifactRepository`].
///
/// Safe for concurrent readers. A miss takes the write lock and re-checks
/// before resolving, so a key is never resolved twice.
pub struct ArtifactLookupCache {
    repository: Arc<dyn ArtifactRepository>,
    entries: RwLock<HashMap<CacheKey, ArtifactPresence>>,
}

impl ArtifactLookupCache {
    pub fn new(repository: Arc<dyn ArtifactRepository>) -> Self {
        Self {
            repository,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn lookup(&self, coordinate: &Coordinate, version: &str) -> Result<ArtifactPresence, ArtifactError> {
        let key = (coordinate.clone(), version.to_string());
        if let Some(presence) = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(*presence);
        }

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(presence) = entries.get(&key) {
            return Ok(*presence);
        }
        let presence = self.repository.lookup(coordinate, version)?;
        debug!(%coordinate, version, ?presence, "resolved artifact");
        entries.insert(key, presence);
        Ok(presence)
    }

    /// Deploy through the repository and remember the artifact as published.
    pub fn deploy(&self, project_root: &Path, module: &ModuleInfo, version: &str) -> Result<(), ArtifactError> {
        self.repository.deploy(project_root, module, version)?;
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((module.coordinate.clone(), version.to_string()), ArtifactPresence::Remote);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ArtifactLookupCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactLookupCache")
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Directory-backed repository
// ---------------------------------------------------------------------------

/// Local and shared repositories laid out as `<group path>/<artifact>/<version>/`.
///
/// Deploying copies the module descriptor into both trees.
#[derive(Debug, Clone)]
pub struct DirectoryArtifactRepository {
    local: PathBuf,
    remote: PathBuf,
}

impl DirectoryArtifactRepository {
    pub fn new(local: impl Into<PathBuf>, remote: impl Into<PathBuf>) -> Self {
        Self {
            local: local.into(),
            remote: remote.into(),
        }
    }

    fn version_dir(base: &Path, coordinate: &Coordinate, version: &str) -> PathBuf {
        let mut dir = base.to_path_buf();
        dir.extend(coordinate.group.split('.'));
        dir.push(&coordinate.artifact);
        dir.push(version);
        dir
    }

    fn install(
        base: &Path,
        descriptor: &Path,
        module: &ModuleInfo,
        version: &str,
    ) -> Result<PathBuf, std::io::Error> {
        let dir = Self::version_dir(base, &module.coordinate, version);
        std::fs::create_dir_all(&dir)?;
        let target = dir.join(format!("{}-{}.toml", module.coordinate.artifact, version));
        std::fs::copy(descriptor, &target)?;
        Ok(target)
    }
}

impl ArtifactRepository for DirectoryArtifactRepository {
    fn lookup(&self, coordinate: &Coordinate, version: &str) -> Result<ArtifactPresence, ArtifactError> {
        let exists = |base: &Path| {
            Self::version_dir(base, coordinate, version)
                .try_exists()
                .map_err(|e| ArtifactError::Lookup {
                    coordinate: coordinate.to_string(),
                    detail: e.to_string(),
                })
        };
        if exists(&self.remote)? {
            Ok(ArtifactPresence::Remote)
        } else if exists(&self.local)? {
            Ok(ArtifactPresence::LocalOnly)
        } else {
            Ok(ArtifactPresence::Absent)
        }
    }

    fn deploy(&self, project_root: &Path, module: &ModuleInfo, version: &str) -> Result<(), ArtifactError> {
        let descriptor = project_root.join(&module.descriptor);
        let fail = |e: std::io::Error| ArtifactError::Deploy {
            coordinate: module.coordinate.to_string(),
            detail: e.to_string(),
        };
        Self::install(&self.local, &descriptor, module, version).map_err(fail)?;
        let target = Self::install(&self.remote, &descriptor, module, version).map_err(fail)?;
        info!(coordinate = %module.coordinate, version, target = %target.display(), "deployed artifact");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct CountingRepository {
        lookups: AtomicUsize,
    }

    impl ArtifactRepository for CountingRepository {
        fn lookup(&self, _: &Coordinate, version: &str) -> Result<ArtifactPresence, ArtifactError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok(if version == "1.0" {
                ArtifactPresence::Remote
            } else {
                ArtifactPresence::Absent
            })
        }

        fn deploy(&self, _: &Path, _: &ModuleInfo, _: &str) -> Result<(), ArtifactError> {
            Ok(())
        }
    }

    fn module(dir: &Path) -> ModuleInfo {
        std::fs::write(dir.join("module.toml"), "[module]\n").unwrap();
        ModuleInfo {
            coordinate: Coordinate::new("org.example", "app"),
            version: "1.1".into(),
            parent: None,
            dependencies: Vec::new(),
            scm: None,
            descriptor: PathBuf::from("module.toml"),
        }
    }

    #[test]
    fn test_cache_resolves_each_key_once() {
        let repository = Arc::new(CountingRepository {
            lookups: AtomicUsize::new(0),
        });
        let cache = Arc::new(ArtifactLookupCache::new(repository.clone()));
        let coordinate = Coordinate::new("g", "a");

        std::thread::scope(|scope| {
            for _ in 0..8 {
                let cache = Arc::clone(&cache);
                let coordinate = coordinate.clone();
                scope.spawn(move || {
                    assert_eq!(cache.lookup(&coordinate, "1.0").unwrap(), ArtifactPresence::Remote);
                });
            }
        });
        assert_eq!(cache.lookup(&coordinate, "1.1").unwrap(), ArtifactPresence::Absent);
        assert_eq!(repository.lookups.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_deploy_marks_remote() {
        let dir = tempfile::tempdir().unwrap();
        let repository = Arc::new(CountingRepository {
            lookups: AtomicUsize::new(0),
        });
        let cache = ArtifactLookupCache::new(repository.clone());
        let module = module(dir.path());
        cache.deploy(dir.path(), &module, "2.0").unwrap();
        assert_eq!(cache.lookup(&module.coordinate, "2.0").unwrap(), ArtifactPresence::Remote);
        assert_eq!(repository.lookups.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_directory_repository() {
        let dir = tempfile::tempdir().unwrap();
        let repository = DirectoryArtifactRepository::new(dir.path().join("local"), dir.path().join("shared"));
        let module = module(dir.path());

        assert_eq!(
            repository.lookup(&module.coordinate, "1.1").unwrap(),
            ArtifactPresence::Absent
        );
        repository.deploy(dir.path(), &module, "1.1").unwrap();
        assert_eq!(
            repository.lookup(&module.coordinate, "1.1").unwrap(),
            ArtifactPresence::Remote
        );
        assert!(dir
            .path()
            .join("shared/org/example/app/1.1/app-1.1.toml")
            .exists());

        std::fs::create_dir_all(dir.path().join("local/org/example/app/0.9")).unwrap();
        assert_eq!(
            repository.lookup(&module.coordinate, "0.9").unwrap(),
            ArtifactPresence::LocalOnly
        );
    }
}
