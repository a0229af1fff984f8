//! Three-way reconciliation of local and remote changes.
//!
//! The merge subsystem is responsible for:
//! 1. **Strategy** -- what an SCM operation does when local and remote diverged.
//! 2. **Reconciliation** -- per-path three-way decisions shared by every provider.
//! 3. **Clients** -- [`MergeClient`] implementations for text and module descriptors.

pub mod descriptor;
pub mod text;
pub mod versions;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::errors::MergeError;

pub use descriptor::DescriptorMergeClient;
pub use text::{TextMergeClient, TextMerger};
pub use versions::{merge_versions, DocumentVersions, ParentReference};

/// Merges the content of one file given local, remote and base snapshots.
pub trait MergeClient: Send + Sync {
    fn merge(&self, local: &[u8], remote: &[u8], base: &[u8]) -> Result<Vec<u8>, MergeError>;
}

/// How an operation reconciles local and remote state.
#[derive(Clone, Default)]
pub enum MergeStrategy {
    /// Fail on any divergence.
    #[default]
    DoNotMerge,
    /// Keep the local side.
    UseLocal,
    /// Keep the remote side.
    UseRemote,
    /// Merge through the client; unresolved conflicts are failures.
    FullMerge(Arc<dyn MergeClient>),
}

impl MergeStrategy {
    pub fn full(client: impl MergeClient + 'static) -> Self {
        Self::FullMerge(Arc::new(client))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::DoNotMerge => "do-not-merge",
            Self::UseLocal => "use-local",
            Self::UseRemote => "use-remote",
            Self::FullMerge(_) => "full-merge",
        }
    }
}

impl fmt::Debug for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Reconcile one path. `None` means the path does not exist on that side.
///
/// Returns the content the path should have afterwards (`None` = deleted).
pub fn reconcile(
    path: &str,
    base: Option<&[u8]>,
    local: Option<&[u8]>,
    remote: Option<&[u8]>,
    strategy: &MergeStrategy,
) -> Result<Option<Vec<u8>>, MergeError> {
    if local == remote || remote == base {
        return Ok(local.map(<[u8]>::to_vec));
    }
    if local == base {
        return Ok(remote.map(<[u8]>::to_vec));
    }

    debug!(path, strategy = strategy.name(), "both sides changed path");
    match strategy {
        MergeStrategy::DoNotMerge => Err(MergeError::Diverged {
            path: path.to_string(),
        }),
        MergeStrategy::UseLocal => Ok(local.map(<[u8]>::to_vec)),
        MergeStrategy::UseRemote => Ok(remote.map(<[u8]>::to_vec)),
        MergeStrategy::FullMerge(client) => match (local, remote) {
            (Some(l), Some(r)) => client.merge(l, r, base.unwrap_or_default()).map(Some),
            _ => Err(MergeError::DeleteConflict {
                path: path.to_string(),
            }),
        },
    }
}

/// Reconcile whole trees keyed by path.
///
/// On failure returns the offending path together with the merge error.
pub fn reconcile_trees(
    base: &BTreeMap<String, Vec<u8>>,
    local: &BTreeMap<String, Vec<u8>>,
    remote: &BTreeMap<String, Vec<u8>>,
    strategy: &MergeStrategy,
) -> Result<BTreeMap<String, Vec<u8>>, (String, MergeError)> {
    let mut paths: Vec<&String> = base.keys().chain(local.keys()).chain(remote.keys()).collect();
    paths.sort();
    paths.dedup();

    let mut merged = BTreeMap::new();
    for path in paths {
        let resolved = reconcile(
            path,
            base.get(path).map(Vec::as_slice),
            local.get(path).map(Vec::as_slice),
            remote.get(path).map(Vec::as_slice),
            strategy,
        )
        .map_err(|e| (path.clone(), e))?;
        if let Some(content) = resolved {
            merged.insert(path.clone(), content);
        }
    }
    Ok(merged)
}
