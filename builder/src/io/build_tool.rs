//! Workspace build invocation.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use tracing::{debug, info, instrument};

use crate::io::config::BuildConfig;
use crate::io::process::{CommandLimits, run_command};

/// Run the configured build command from `workspace_root`.
///
/// Returns the artifact directory on success. The directory's existence is
/// checked by the collect stage, not here.
#[instrument(skip_all, fields(workspace = %workspace_root.display()))]
pub fn run_build(workspace_root: &Path, build: &BuildConfig) -> Result<PathBuf> {
    let Some((program, args)) = build.command.split_first() else {
        bail!("build.command is empty");
    };

    let mut cmd = Command::new(program);
    cmd.args(args).current_dir(workspace_root);
    let timeout = Duration::from_secs(build.timeout_secs);

    debug!(command = ?build.command, "starting build");
    let started = Instant::now();
    let output = run_command(
        cmd,
        CommandLimits {
            timeout,
            output_limit_bytes: build.output_limit_bytes,
        },
    )
    .with_context(|| format!("run {}", build.command.join(" ")))?;
    output.ensure_success(&build.command.join(" "), timeout)?;

    info!(
        duration_secs = started.elapsed().as_secs_f64(),
        "build finished"
    );
    Ok(artifact_path(workspace_root, build))
}

pub fn artifact_path(workspace_root: &Path, build: &BuildConfig) -> PathBuf {
    workspace_root.join(&build.artifact_dir)
}
