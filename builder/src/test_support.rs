//! Test-only fixtures: a local git remote shaped like the real source tree and
//! a build command that fakes `target/release` without invoking cargo.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};
use tempfile::TempDir;

use crate::io::config::{BuilderConfig, RepoConfig};

/// Folders every fixture remote contains besides the prune list.
pub const KEPT_FOLDERS: &[&str] = &["corpus_tools", "langwitch_tools"];

/// A throwaway git repository reachable through a `file://` URL.
pub struct TestRemote {
    dir: TempDir,
    pub url: String,
}

impl TestRemote {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Create a committed repository containing `folders` (the prune list) and
/// [`KEPT_FOLDERS`], each holding a small source file.
pub fn init_remote(folders: &[&str]) -> Result<TestRemote> {
    let dir = tempfile::tempdir().context("create remote tempdir")?;
    let root = dir.path();
    for folder in folders.iter().chain(KEPT_FOLDERS) {
        let src = root.join(folder).join("src");
        fs::create_dir_all(&src).with_context(|| format!("create {}", src.display()))?;
        fs::write(src.join("main.rs"), "fn main() {}\n")
            .with_context(|| format!("write {}", src.display()))?;
    }
    fs::write(root.join("Cargo.toml"), "[workspace]\nmembers = []\n")
        .context("write Cargo.toml")?;

    run_git(root, &["init", "--quiet"])?;
    run_git(root, &["add", "."])?;
    run_git(
        root,
        &[
            "-c",
            "user.name=Builder Test",
            "-c",
            "user.email=builder-test@local.invalid",
            "commit",
            "--quiet",
            "-m",
            "fixture",
        ],
    )?;

    let url = format!("file://{}", root.display());
    Ok(TestRemote { dir, url })
}

/// A `sh -c` build that fails if any of `pruned` still exists, then writes
/// executables named `bins` plus the usual cargo by-products into
/// `target/release`.
pub fn fake_build_command(pruned: &[&str], bins: &[&str]) -> Vec<String> {
    let mut script = String::from("set -e\n");
    for folder in pruned {
        script.push_str(&format!(
            "if [ -e '{folder}' ]; then echo 'unpruned {folder}' >&2; exit 9; fi\n"
        ));
    }
    script.push_str("mkdir -p target/release/deps target/release/.fingerprint\n");
    script.push_str("echo rlib > target/release/deps/libfixture.rlib\n");
    for bin in bins {
        script.push_str(&format!(
            "printf '#!/bin/sh\\n' > target/release/{bin}\n\
             chmod 755 target/release/{bin}\n\
             echo deps > target/release/{bin}.d\n"
        ));
    }
    vec!["sh".to_string(), "-c".to_string(), script]
}

/// A build that fails the way a compile error does.
pub fn failing_build_command() -> Vec<String> {
    vec![
        "sh".to_string(),
        "-c".to_string(),
        "echo 'error: could not compile `fixture`' >&2; exit 101".to_string(),
    ]
}

/// Default config pointed at `remote` with a fake build.
pub fn fixture_config(remote: &TestRemote, prune: &[&str], bins: &[&str]) -> BuilderConfig {
    let mut cfg = BuilderConfig {
        prune: prune.iter().map(PathBuf::from).collect(),
        repo: RepoConfig {
            url: remote.url.clone(),
            timeout_secs: 60,
            ..RepoConfig::default()
        },
        ..BuilderConfig::default()
    };
    cfg.build.command = fake_build_command(prune, bins);
    cfg.build.timeout_secs = 60;
    cfg
}

fn run_git(root: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(root)
        .output()
        .with_context(|| format!("run git {:?}", args))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("git {:?} failed: {}", args, stderr.trim());
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}
