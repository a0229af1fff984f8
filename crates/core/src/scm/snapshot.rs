//! Whole-tree snapshots of file content keyed by relative path.
//!
//! Paths always use `/` separators so snapshots from different backends and
//! platforms compare equal.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::results::{ChangeType, DiffObject};

/// File content by relative path.
pub type Snapshot = BTreeMap<String, Vec<u8>>;

/// Administrative directories never included in a snapshot.
const IGNORED: [&str; 2] = [".git", ".svn"];

/// Read every file under `root`.
pub fn read_tree(root: &Path) -> io::Result<Snapshot> {
    let mut snapshot = Snapshot::new();
    let mut pending: Vec<PathBuf> = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            if IGNORED.iter().any(|i| name == *i) {
                continue;
            }
            let path = entry.path();
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                if let Some(key) = relative_key(root, &path) {
                    snapshot.insert(key, std::fs::read(&path)?);
                }
            }
        }
    }
    Ok(snapshot)
}

fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

/// Turn the files under `root` from `current` into `target`.
///
/// Only paths that differ are touched. Returns the changed paths.
pub fn apply_tree(root: &Path, current: &Snapshot, target: &Snapshot) -> io::Result<Vec<String>> {
    let mut changed = Vec::new();
    for (path, content) in target {
        if current.get(path) != Some(content) {
            let file = root.join(path);
            if let Some(parent) = file.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&file, content)?;
            changed.push(path.clone());
        }
    }
    for path in current.keys() {
        if !target.contains_key(path) {
            let file = root.join(path);
            match std::fs::remove_file(&file) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
            changed.push(path.clone());
        }
    }
    debug!(root = %root.display(), changed = changed.len(), "applied tree");
    Ok(changed)
}

/// Keep only the entries selected by `paths` (empty = everything).
pub fn restrict(snapshot: &Snapshot, paths: &[String]) -> Snapshot {
    if paths.is_empty() {
        return snapshot.clone();
    }
    snapshot
        .iter()
        .filter(|(p, _)| {
            paths.iter().any(|f| {
                let f = f.trim_end_matches('/');
                p.as_str() == f || p.strip_prefix(f).is_some_and(|r| r.starts_with('/'))
            })
        })
        .map(|(p, c)| (p.clone(), c.clone()))
        .collect()
}

/// Diff two snapshots into [`DiffObject`]s.
pub fn diff_trees(old: &Snapshot, new: &Snapshot, with_text: bool) -> Vec<DiffObject> {
    let mut objects = Vec::new();
    for (path, content) in new {
        let change_type = match old.get(path) {
            None => ChangeType::Added,
            Some(previous) if previous != content => ChangeType::Modified,
            Some(_) => continue,
        };
        let before = old.get(path).map(Vec::as_slice).unwrap_or_default();
        objects.push(DiffObject {
            change_type,
            old_path: (change_type != ChangeType::Added).then(|| path.clone()),
            new_path: Some(path.clone()),
            diff: with_text.then(|| text_diff(before, content)),
        });
    }
    for (path, content) in old {
        if !new.contains_key(path) {
            objects.push(DiffObject {
                change_type: ChangeType::Deleted,
                old_path: Some(path.clone()),
                new_path: None,
                diff: with_text.then(|| text_diff(content, &[])),
            });
        }
    }
    objects
}

fn text_diff(old: &[u8], new: &[u8]) -> String {
    let old = String::from_utf8_lossy(old);
    let new = String::from_utf8_lossy(new);
    diffy::create_patch(&old, &new).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_and_apply_tree() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a/.svn")).unwrap();
        std::fs::write(dir.path().join("a/.svn/entries"), "x").unwrap();
        std::fs::write(dir.path().join("a/one.txt"), "1").unwrap();
        std::fs::write(dir.path().join("two.txt"), "2").unwrap();

        let current = read_tree(dir.path()).unwrap();
        assert_eq!(current.keys().collect::<Vec<_>>(), ["a/one.txt", "two.txt"]);

        let mut target = current.clone();
        target.remove("two.txt");
        target.insert("b/three.txt".into(), b"3".to_vec());
        let changed = apply_tree(dir.path(), &current, &target).unwrap();
        assert_eq!(changed.len(), 2);
        assert_eq!(read_tree(dir.path()).unwrap(), target);
    }

    #[test]
    fn test_diff_trees() {
        let old = Snapshot::from([
            ("keep".to_string(), b"k".to_vec()),
            ("change".to_string(), b"old\n".to_vec()),
            ("gone".to_string(), b"g".to_vec()),
        ]);
        let new = Snapshot::from([
            ("keep".to_string(), b"k".to_vec()),
            ("change".to_string(), b"new\n".to_vec()),
            ("fresh".to_string(), b"f".to_vec()),
        ]);
        let objects = diff_trees(&old, &new, true);
        assert_eq!(objects.len(), 3);
        let change = objects.iter().find(|o| o.path() == Some("change")).unwrap();
        assert_eq!(change.change_type, ChangeType::Modified);
        assert!(change.diff.as_deref().unwrap().contains("+new"));
        assert!(objects.iter().any(|o| o.change_type == ChangeType::Deleted));
    }

    #[test]
    fn test_restrict() {
        let snapshot = Snapshot::from([
            ("core/a".to_string(), Vec::new()),
            ("core2/b".to_string(), Vec::new()),
        ]);
        let restricted = restrict(&snapshot, &["core".to_string()]);
        assert_eq!(restricted.len(), 1);
    }
}
