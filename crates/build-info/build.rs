use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::Utc;

fn main() {
    let manifest_dir = env::var_os("CARGO_MANIFEST_DIR")
        .map(PathBuf::from)
        .unwrap_or_default();

    // Without a repository nothing is watched and Cargo's default
    // (rerun when the package changes) applies.
    if let Some(git_dir) = find_git_dir(&manifest_dir) {
        watch_head(&git_dir);
    }

    let built_at = Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
    println!("cargo:rustc-env=LISTENER_BUILT_AT={built_at}");

    if let Some(revision) = git_revision(&manifest_dir) {
        println!("cargo:rustc-env=LISTENER_GIT_REVISION={revision}");
    }
}

fn find_git_dir(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(".git"))
        .find(|candidate| candidate.is_dir())
}

/// Reruns when HEAD moves to another branch or the current branch gets a commit.
fn watch_head(git_dir: &Path) {
    let head = git_dir.join("HEAD");
    println!("cargo:rerun-if-changed={}", head.display());

    let Ok(contents) = fs::read_to_string(&head) else {
        return;
    };
    if let Some(reference) = contents.strip_prefix("ref: ") {
        let branch = git_dir.join(reference.trim());
        if branch.exists() {
            println!("cargo:rerun-if-changed={}", branch.display());
        }
    }
}

fn git_revision(dir: &Path) -> Option<String> {
    let output = Command::new("git")
        .args(["describe", "--tags", "--always", "--dirty"])
        .current_dir(dir)
        .output()
        .ok()?;

    let revision = String::from_utf8(output.stdout).ok()?;
    let revision = revision.trim();
    (output.status.success() && !revision.is_empty()).then(|| revision.to_string())
}
