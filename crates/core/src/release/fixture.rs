//! A two-module project on an in-memory repository for step tests.

use std::path::Path;

use super::{ReleaseContext, ReleaseOptions};
use crate::project::{TomlProject, DESCRIPTOR_FILE};
use crate::scm::{MemoryRepository, MemoryScm, Snapshot};

pub const ROOT: &str = r#"[module]
group = "org.example"
artifact = "parent"
version = "1.0-SNAPSHOT"
modules = ["lib"]

[scm]
connection = "scm:memory:local"
"#;

pub const LIB: &str = r#"[module]
artifact = "lib"
version = "1.0-SNAPSHOT"

[parent]
group = "org.example"
artifact = "parent"
version = "1.0-SNAPSHOT"

[dependencies]
"org.external:util" = "2.0"
"#;

pub fn tree(root: &str, lib: &str) -> Snapshot {
    Snapshot::from([
        (DESCRIPTOR_FILE.to_string(), root.as_bytes().to_vec()),
        (format!("lib/{DESCRIPTOR_FILE}"), lib.as_bytes().to_vec()),
    ])
}

/// A repository seeded with `root` and `lib`, checked out under `dir`.
pub fn context_with(dir: &Path, root: &str, lib: &str) -> (MemoryRepository, ReleaseContext) {
    let repository = MemoryRepository::new();
    repository.commit_tree(tree(root, lib), "initial import");
    let wc = dir.join("wc");
    let scm = MemoryScm::checked_out(repository.clone(), &wc).unwrap();
    let project = TomlProject::open(&wc).unwrap();
    let context = ReleaseContext::new(Box::new(project), Box::new(scm), ReleaseOptions::default());
    (repository, context)
}

pub fn context(dir: &Path) -> (MemoryRepository, ReleaseContext) {
    context_with(dir, ROOT, LIB)
}
