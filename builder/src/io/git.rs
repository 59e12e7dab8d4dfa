//! Git adapter: the builder only ever needs a shallow clone.

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use crate::io::config::RepoConfig;
use crate::io::process::{CommandLimits, run_command};

const GIT_OUTPUT_LIMIT_BYTES: usize = 64 * 1024;

/// Arguments for `git clone`, excluding the program name.
pub fn clone_args(repo: &RepoConfig, dest: &Path) -> Vec<String> {
    let mut args = vec![
        "clone".to_string(),
        "--depth".to_string(),
        repo.depth.to_string(),
    ];
    if let Some(branch) = &repo.branch {
        args.push("--branch".to_string());
        args.push(branch.clone());
    }
    args.push("--".to_string());
    args.push(repo.url.clone());
    args.push(dest.display().to_string());
    args
}

/// Shallow-clone `repo` into `dest`, which must not exist yet.
#[instrument(skip_all, fields(url = %repo.url, dest = %dest.display()))]
pub fn shallow_clone(repo: &RepoConfig, dest: &Path) -> Result<()> {
    let args = clone_args(repo, dest);
    debug!(?args, "running git clone");

    let mut cmd = Command::new("git");
    cmd.args(&args).env("GIT_TERMINAL_PROMPT", "0");
    let timeout = Duration::from_secs(repo.timeout_secs);
    let output = run_command(
        cmd,
        CommandLimits {
            timeout,
            output_limit_bytes: GIT_OUTPUT_LIMIT_BYTES,
        },
    )
    .context("run git clone")?;
    output.ensure_success("git clone", timeout)?;
    debug!("clone finished");
    Ok(())
}
