//! Reverting a commit range while the remote keeps moving.

use tempfile::TempDir;

use scmrelease_core::errors::{ScmError, ScmOperation};
use scmrelease_core::merge::{MergeStrategy, TextMergeClient};
use scmrelease_core::scm::{MemoryRepository, MemoryScm, RevertCommitsRequest, ScmProvider, ScmRevision};

/// A repository with `count` commits, commit `n` adding `file-n.txt`.
fn repository_with_commits(count: u32) -> (TempDir, MemoryRepository, MemoryScm) {
    let dir = tempfile::tempdir().unwrap();
    let repository = MemoryRepository::new();
    for n in 1..=count {
        repository.commit_file(&format!("file-{n}.txt"), format!("{n}\n").as_bytes(), &format!("commit {n}"));
    }
    let scm = MemoryScm::checked_out(repository.clone(), dir.path().join("wc")).unwrap();
    (dir, repository, scm)
}

#[test]
fn test_revert_layers_on_top_of_advanced_remote() {
    let (_dir, repository, scm) = repository_with_commits(80);
    // The range to revert...
    repository.commit_file("file-81.txt", b"81\n", "commit 81");
    repository.commit_file("file-82.txt", b"82\n", "commit 82");
    // ...and unrelated work that landed afterwards.
    for n in 83..=85 {
        repository.commit_file(&format!("file-{n}.txt"), format!("{n}\n").as_bytes(), &format!("commit {n}"));
    }

    let request = RevertCommitsRequest::builder()
        .from("82")
        .to("80")
        .message("revert 81 and 82")
        .build()
        .unwrap();
    let revision = scm.revert_commits(&request).unwrap();

    assert_eq!(revision, ScmRevision::from("86"));
    assert_eq!(repository.latest(), ScmRevision::from("86"));
    assert_eq!(repository.message(&revision).as_deref(), Some("revert 81 and 82"));

    let tree = repository.tree(&revision).unwrap();
    assert!(!tree.contains_key("file-81.txt"));
    assert!(!tree.contains_key("file-82.txt"));
    for n in [1, 80, 83, 84, 85] {
        assert!(tree.contains_key(&format!("file-{n}.txt")), "file-{n}.txt missing");
    }
    assert!(!scm.working_directory().join("file-82.txt").exists());
    assert!(scm.working_directory().join("file-85.txt").exists());
}

#[test]
fn test_revert_conflict_needs_merge_client() {
    let (_dir, repository, scm) = repository_with_commits(2);
    let original = "one\ntwo\nthree\nfour\nfive\nsix\nseven\n";
    let changed = original.replace("two", "TWO");
    let appended = format!("{changed}eight\n");
    repository.commit_file("shared.txt", original.as_bytes(), "add shared");
    repository.commit_file("shared.txt", changed.as_bytes(), "change line two");
    repository.commit_file("shared.txt", appended.as_bytes(), "append line eight");

    let request = RevertCommitsRequest::builder()
        .from("4")
        .to("3")
        .build()
        .unwrap();
    let err = scm.revert_commits(&request).unwrap_err();
    assert!(matches!(
        err,
        ScmError::Conflict {
            operation: ScmOperation::RevertCommits,
            ref path,
            ..
        } if path == "shared.txt"
    ));
    assert_eq!(repository.latest(), ScmRevision::from("5"));

    let request = RevertCommitsRequest::builder()
        .from("4")
        .to("3")
        .merge_strategy(MergeStrategy::full(TextMergeClient::default()))
        .build()
        .unwrap();
    let revision = scm.revert_commits(&request).unwrap();
    assert_eq!(revision, ScmRevision::from("6"));
    let tree = repository.tree(&revision).unwrap();
    assert_eq!(tree["shared.txt"], format!("{original}eight\n").into_bytes());
}

#[test]
fn test_revert_keeps_untracked_files() {
    let (_dir, repository, scm) = repository_with_commits(2);
    repository.commit_file("file-3.txt", b"3\n", "commit 3");
    let output = scm.working_directory().join("target/app.jar");
    std::fs::create_dir_all(output.parent().unwrap()).unwrap();
    std::fs::write(&output, b"built").unwrap();

    let request = RevertCommitsRequest::builder()
        .from("3")
        .to("2")
        .message("revert 3")
        .build()
        .unwrap();
    let revision = scm.revert_commits(&request).unwrap();

    assert_eq!(revision, ScmRevision::from("4"));
    assert_eq!(std::fs::read(&output).unwrap(), b"built");
    let tree = repository.tree(&revision).unwrap();
    assert!(!tree.contains_key("file-3.txt"));
    assert!(!tree.contains_key("target/app.jar"));
    assert!(!scm.working_directory().join("file-3.txt").exists());
}

#[test]
fn test_revert_rejects_backwards_range() {
    let (_dir, _repository, scm) = repository_with_commits(3);
    let request = RevertCommitsRequest::builder().from("1").to("3").build().unwrap();
    let err = scm.revert_commits(&request).unwrap_err();
    assert!(matches!(err, ScmError::InvalidRequest { .. }));
}
