//! scmrelease core library.
//!
//! This crate provides the building blocks of a multi-module release: the
//! version-string model, three-way merging, a provider-agnostic SCM layer
//! with git, svn and in-memory backends, and the release pipeline that ties
//! them together with compensating rollback.

pub mod artifacts;
pub mod build;
pub mod config;
pub mod errors;
pub mod merge;
pub mod metadata;
pub mod pipeline;
pub mod project;
pub mod release;
pub mod scm;
pub mod version;

// Re-exports for convenience.
pub use config::ReleaseConfig;
pub use errors::CoreError;
pub use pipeline::{Pipeline, RunOptions, Step};
pub use release::{release_pipeline, ReleaseContext, ReleaseOptions};
pub use scm::{ScmProvider, ScmProviderRegistry, ScmRevision};
pub use version::{is_newer_version, Version, VersionUpgradeStrategy};
