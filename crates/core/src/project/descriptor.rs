//! `module.toml` descriptors, read and rewritten losslessly with `toml_edit`.
//!
//! ```toml
//! [module]
//! group = "org.example"
//! artifact = "app"
//! version = "1.0-SNAPSHOT"
//! modules = ["core", "web"]
//!
//! [parent]
//! group = "org.example"
//! artifact = "parent"
//! version = "3"
//!
//! [scm]
//! developer_connection = "scm:git:ssh://git@example.org/app.git"
//!
//! [dependencies]
//! "org.example:lib" = "2.1"
//! ```

use std::path::{Path, PathBuf};

use toml_edit::{value, DocumentMut, Item, Table};
use tracing::{debug, info};

use super::{Coordinate, Dependency, ModuleInfo, ProjectModel, ScmConnection};
use crate::errors::ProjectError;
use crate::merge::{DocumentVersions, ParentReference};

/// File name of a module descriptor.
pub const DESCRIPTOR_FILE: &str = "module.toml";

/// Parse descriptor text. `label` names the source in errors.
pub fn parse_descriptor(label: &str, text: &str) -> Result<DocumentMut, ProjectError> {
    text.parse::<DocumentMut>()
        .map_err(|e| ProjectError::Parse {
            path: label.to_string(),
            detail: e.to_string(),
        })
}

fn table<'a>(doc: &'a DocumentMut, name: &str) -> Option<&'a Table> {
    doc.get(name).and_then(Item::as_table)
}

fn string_field(table: &Table, key: &str) -> Option<String> {
    table.get(key).and_then(Item::as_str).map(str::to_owned)
}

fn required(table: Option<&Table>, label: &str, field: &str) -> Result<String, ProjectError> {
    let key = field.rsplit('.').next().unwrap_or(field);
    table
        .and_then(|t| string_field(t, key))
        .ok_or_else(|| ProjectError::MissingField {
            path: label.to_string(),
            field: field.to_string(),
        })
}

fn read_parent(doc: &DocumentMut, label: &str) -> Result<Option<ParentReference>, ProjectError> {
    let Some(parent) = table(doc, "parent") else {
        return Ok(None);
    };
    Ok(Some(ParentReference {
        group: required(Some(parent), label, "parent.group")?,
        artifact: required(Some(parent), label, "parent.artifact")?,
        version: required(Some(parent), label, "parent.version")?,
    }))
}

/// The version facts a descriptor merge adjudicates.
pub fn read_versions(label: &str, doc: &DocumentMut) -> Result<DocumentVersions, ProjectError> {
    Ok(DocumentVersions {
        version: required(table(doc, "module"), label, "module.version")?,
        parent: read_parent(doc, label)?,
    })
}

/// Write adjudicated version facts into `doc`.
///
/// A parent of `None` removes the `[parent]` table.
pub fn apply_versions(doc: &mut DocumentMut, versions: &DocumentVersions) {
    doc["module"]["version"] = value(versions.version.as_str());
    match &versions.parent {
        Some(parent) => {
            doc["parent"]["group"] = value(parent.group.as_str());
            doc["parent"]["artifact"] = value(parent.artifact.as_str());
            doc["parent"]["version"] = value(parent.version.as_str());
        }
        None => {
            doc.remove("parent");
        }
    }
}

/// Read one module. `descriptor` is the path relative to the project root.
pub fn read_module(descriptor: &Path, doc: &DocumentMut) -> Result<ModuleInfo, ProjectError> {
    let label = descriptor.display().to_string();
    let module = table(doc, "module");
    let parent = read_parent(doc, &label)?;

    // The group may be inherited from the parent.
    let group = match module.and_then(|t| string_field(t, "group")) {
        Some(group) => group,
        None => parent
            .as_ref()
            .map(|p| p.group.clone())
            .ok_or_else(|| ProjectError::MissingField {
                path: label.clone(),
                field: "module.group".into(),
            })?,
    };
    let artifact = required(module, &label, "module.artifact")?;
    let version = required(module, &label, "module.version")?;

    let mut dependencies = Vec::new();
    if let Some(deps) = table(doc, "dependencies") {
        for (key, item) in deps.iter() {
            let coordinate: Coordinate = key.parse()?;
            let version = item.as_str().ok_or_else(|| ProjectError::Parse {
                path: label.clone(),
                detail: format!("dependency '{key}' must be a version string"),
            })?;
            dependencies.push(Dependency {
                coordinate,
                version: version.to_string(),
            });
        }
    }

    let scm = table(doc, "scm").map(|t| ScmConnection {
        connection: string_field(t, "connection"),
        developer_connection: string_field(t, "developer_connection"),
    });

    Ok(ModuleInfo {
        coordinate: Coordinate::new(group, artifact),
        version,
        parent,
        dependencies,
        scm,
        descriptor: descriptor.to_path_buf(),
    })
}

/// Child module directories listed in `[module] modules`.
pub fn child_modules(doc: &DocumentMut) -> Vec<String> {
    doc.get("module")
        .and_then(|m| m.get("modules"))
        .and_then(Item::as_array)
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_owned)).collect())
        .unwrap_or_default()
}

/// Rewrite every occurrence of `coordinate`'s version in `doc`.
///
/// Returns whether anything changed.
pub fn rewrite_version(
    doc: &mut DocumentMut,
    owner: &Coordinate,
    coordinate: &Coordinate,
    version: &str,
) -> bool {
    let mut changed = false;

    let own_version = table(doc, "module").and_then(|m| string_field(m, "version"));
    if owner == coordinate && own_version.as_deref() != Some(version) {
        doc["module"]["version"] = value(version);
        changed = true;
    }

    let parent_matches = table(doc, "parent").is_some_and(|p| {
        string_field(p, "group").as_deref() == Some(coordinate.group.as_str())
            && string_field(p, "artifact").as_deref() == Some(coordinate.artifact.as_str())
            && string_field(p, "version").as_deref() != Some(version)
    });
    if parent_matches {
        doc["parent"]["version"] = value(version);
        changed = true;
    }

    let key = coordinate.to_string();
    if let Some(deps) = doc.get_mut("dependencies").and_then(Item::as_table_mut) {
        if let Some(item) = deps.get_mut(&key) {
            if item.as_str().is_some_and(|v| v != version) {
                *item = value(version);
                changed = true;
            }
        }
    }

    changed
}

// ---------------------------------------------------------------------------
// TomlProject
// ---------------------------------------------------------------------------

/// A project of `module.toml` descriptors rooted at a directory.
///
/// Descriptors are re-read on every call, so the model always reflects the
/// working copy even after an SCM operation rewrote files underneath it.
#[derive(Debug, Clone)]
pub struct TomlProject {
    root: PathBuf,
}

impl TomlProject {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, ProjectError> {
        let root = root.into();
        let descriptor = root.join(DESCRIPTOR_FILE);
        if !descriptor.exists() {
            return Err(ProjectError::DescriptorNotFound(
                descriptor.display().to_string(),
            ));
        }
        Ok(Self { root })
    }

    fn load(&self, relative: &Path) -> Result<DocumentMut, ProjectError> {
        let path = self.root.join(relative);
        let text = std::fs::read_to_string(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                ProjectError::DescriptorNotFound(path.display().to_string())
            }
            _ => ProjectError::Io(e),
        })?;
        parse_descriptor(&relative.display().to_string(), &text)
    }

    /// Every descriptor with its parsed document, root first.
    fn documents(&self) -> Result<Vec<(PathBuf, DocumentMut)>, ProjectError> {
        let mut out = Vec::new();
        let mut pending = vec![PathBuf::from(DESCRIPTOR_FILE)];
        while let Some(relative) = pending.pop() {
            if out.iter().any(|(p, _)| *p == relative) {
                continue;
            }
            let doc = self.load(&relative)?;
            let dir = relative.parent().map(Path::to_path_buf).unwrap_or_default();
            // Reverse so children are visited in declaration order.
            for child in child_modules(&doc).into_iter().rev() {
                pending.push(dir.join(child).join(DESCRIPTOR_FILE));
            }
            out.push((relative, doc));
        }
        Ok(out)
    }
}

impl ProjectModel for TomlProject {
    fn root(&self) -> &Path {
        &self.root
    }

    fn modules(&self) -> Result<Vec<ModuleInfo>, ProjectError> {
        self.documents()?
            .iter()
            .map(|(path, doc)| read_module(path, doc))
            .collect()
    }

    fn set_version(&mut self, coordinate: &Coordinate, version: &str) -> Result<(), ProjectError> {
        let documents = self.documents()?;
        let mut found = false;
        for (relative, mut doc) in documents {
            let owner = read_module(&relative, &doc)?.coordinate;
            found |= owner == *coordinate;
            if rewrite_version(&mut doc, &owner, coordinate, version) {
                debug!(descriptor = %relative.display(), %coordinate, version, "rewrote descriptor");
                std::fs::write(self.root.join(&relative), doc.to_string())?;
            }
        }
        if !found {
            return Err(ProjectError::ModuleNotFound(coordinate.to_string()));
        }
        info!(%coordinate, version, "set module version");
        Ok(())
    }
}
