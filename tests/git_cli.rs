//! End-to-end tests against a real local git repository. Skipped when no git
//! binary is available on the PATH.

use std::{
    io::Read,
    path::{Path, PathBuf},
    process::Command,
};

use treefetch::{
    archive::Format,
    fetch::{FetchError, FetchRequest},
    Treefetch,
};

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn require_git() -> bool {
    if git_available() {
        true
    } else {
        eprintln!("skipping test (no git binary on PATH)");
        false
    }
}

fn git(args: &[&str], cwd: &Path) {
    let output = Command::new("git")
        .args([
            "-c",
            "user.name=test",
            "-c",
            "user.email=test@example.test",
            "-c",
            "init.defaultBranch=main",
        ])
        .args(args)
        .current_dir(cwd)
        .output()
        .expect("failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Create an upstream repository with a README and a subdirectory, returning
/// its path and the tip commit of `main`.
fn init_upstream(root: &Path) -> (PathBuf, String) {
    let upstream = root.join("upstream");
    std::fs::create_dir_all(upstream.join("docs")).unwrap();
    git(&["init"], &upstream);
    std::fs::write(upstream.join("README.md"), "hello\n").unwrap();
    std::fs::write(upstream.join("docs/guide.md"), "guide\n").unwrap();
    git(&["add", "-A"], &upstream);
    git(&["commit", "-m", "initial"], &upstream);

    let output = Command::new("git")
        .args(["rev-parse", "main"])
        .current_dir(&upstream)
        .output()
        .unwrap();
    assert!(output.status.success());
    let commit = String::from_utf8(output.stdout).unwrap().trim().to_string();
    (upstream, commit)
}

fn request(upstream: &Path, commit: Option<&str>, tree: &str, format: Format) -> FetchRequest {
    FetchRequest {
        repo: upstream.display().to_string(),
        branch: "main".to_string(),
        commit: commit.map(str::to_string),
        tree: tree.to_string(),
        format,
    }
}

fn entry_names_and_mtimes(tar_bytes: &[u8]) -> Vec<(String, u64)> {
    let mut archive = tar::Archive::new(std::io::Cursor::new(tar_bytes));
    archive
        .entries()
        .unwrap()
        .map(|entry| {
            let entry = entry.unwrap();
            (
                entry.path().unwrap().to_string_lossy().into_owned(),
                entry.header().mtime().unwrap(),
            )
        })
        .collect()
}

fn gunzip(bytes: &[u8]) -> Vec<u8> {
    let mut decoder = flate2::read::GzDecoder::new(std::io::Cursor::new(bytes));
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).unwrap();
    out
}

#[test]
fn tip_of_branch_as_tgz_is_deterministic() {
    if !require_git() {
        return;
    }
    let root = tempfile::tempdir().unwrap();
    let (upstream, _commit) = init_upstream(root.path());
    let treefetch = Treefetch::builder()
        .cache_directory(root.path().join("cache"))
        .try_build()
        .unwrap();

    let request = request(&upstream, None, "", Format::Tgz);

    let mut first = Vec::new();
    treefetch.fetch(&request, &mut first).unwrap();
    let mut second = Vec::new();
    treefetch.fetch(&request, &mut second).unwrap();

    let tar_bytes = gunzip(&first);
    assert_eq!(tar_bytes, gunzip(&second));

    let entries = entry_names_and_mtimes(&tar_bytes);
    assert!(entries.iter().all(|(_, mtime)| *mtime == 0), "{entries:?}");
    assert!(entries.iter().any(|(name, _)| name == "README.md"));
    assert!(entries.iter().any(|(name, _)| name == "docs/guide.md"));
}

#[test]
fn known_commit_is_served_from_the_mirror() {
    if !require_git() {
        return;
    }
    let root = tempfile::tempdir().unwrap();
    let (upstream, commit) = init_upstream(root.path());
    let treefetch = Treefetch::builder()
        .cache_directory(root.path().join("cache"))
        .try_build()
        .unwrap();

    // Populate the mirror.
    let mut out = Vec::new();
    treefetch
        .fetch(&request(&upstream, None, "", Format::Tar), &mut out)
        .unwrap();

    // Remove the upstream: a pinned-commit request must now be satisfiable
    // purely from the mirror.
    std::fs::remove_dir_all(&upstream).unwrap();

    let mut pinned = Vec::new();
    treefetch
        .fetch(&request(&upstream, Some(&commit), "", Format::Tar), &mut pinned)
        .unwrap();
    assert_eq!(out, pinned);
}

#[test]
fn subtree_filters_the_archive() {
    if !require_git() {
        return;
    }
    let root = tempfile::tempdir().unwrap();
    let (upstream, commit) = init_upstream(root.path());
    let treefetch = Treefetch::builder()
        .cache_directory(root.path().join("cache"))
        .try_build()
        .unwrap();

    let mut out = Vec::new();
    treefetch
        .fetch(&request(&upstream, Some(&commit), "docs", Format::Tar), &mut out)
        .unwrap();

    let entries = entry_names_and_mtimes(&out);
    assert!(entries.iter().any(|(name, _)| name == "guide.md"));
    assert!(entries.iter().all(|(name, _)| !name.contains("README")));
}

#[test]
fn unknown_commit_fails_after_one_fetch_and_retry() {
    if !require_git() {
        return;
    }
    let root = tempfile::tempdir().unwrap();
    let (upstream, _commit) = init_upstream(root.path());
    let treefetch = Treefetch::builder()
        .cache_directory(root.path().join("cache"))
        .try_build()
        .unwrap();

    let missing = "0123456789abcdef0123456789abcdef01234567";
    let mut out = Vec::new();
    let result = treefetch.fetch(&request(&upstream, Some(missing), "", Format::Tar), &mut out);

    assert!(matches!(result, Err(FetchError::Archive(_))));
    // The failed attempts must not have produced partial archive bytes.
    assert!(out.is_empty());
}

#[test]
fn output_file_is_named_after_the_resolved_commit() {
    if !require_git() {
        return;
    }
    let root = tempfile::tempdir().unwrap();
    let (upstream, commit) = init_upstream(root.path());
    let treefetch = Treefetch::builder()
        .cache_directory(root.path().join("cache"))
        .try_build()
        .unwrap();

    let out_dir = root.path().join("out");
    std::fs::create_dir_all(&out_dir).unwrap();
    let path = treefetch
        .fetch_to_dir(&request(&upstream, None, "", Format::Tgz), &out_dir)
        .unwrap();

    assert_eq!(path, out_dir.join(format!("{commit}.tgz")));
    let entries = entry_names_and_mtimes(&gunzip(&std::fs::read(&path).unwrap()));
    assert!(entries.iter().any(|(name, _)| name == "README.md"));
}
