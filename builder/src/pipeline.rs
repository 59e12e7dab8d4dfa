//! The clone → prune → build → collect → cleanup pipeline.
//!
//! Each stage either succeeds or aborts the run. Stage failures carry their
//! [`Stage`] so the binary can map them to an exit code. When a stage after
//! the clone fails, the clone directory is discarded (unless `keep_source`)
//! and the output directory is left untouched if the build never succeeded.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::collect::collect;
use crate::exit_codes;
use crate::io::build_tool::run_build;
use crate::io::config::BuilderConfig;
use crate::io::fs_ops::{is_missing_or_empty, remove_if_exists};
use crate::io::git::shallow_clone;
use crate::prune::{PruneReport, prune};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Preflight,
    Clone,
    Prune,
    Build,
    Collect,
    Cleanup,
}

impl Stage {
    pub fn exit_code(self) -> i32 {
        match self {
            Stage::Preflight => exit_codes::INVALID,
            Stage::Clone => exit_codes::CLONE_FAILED,
            Stage::Prune => exit_codes::PRUNE_FAILED,
            Stage::Build => exit_codes::BUILD_FAILED,
            Stage::Collect => exit_codes::COLLECT_FAILED,
            Stage::Cleanup => exit_codes::CLEANUP_FAILED,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::Preflight => "preflight",
            Stage::Clone => "clone",
            Stage::Prune => "prune",
            Stage::Build => "build",
            Stage::Collect => "collect",
            Stage::Cleanup => "cleanup",
        }
    }
}

/// A stage failure.
#[derive(Debug, Error)]
#[error("{} failed: {source:#}", .stage.name())]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: anyhow::Error,
}

impl PipelineError {
    fn new(stage: Stage, source: anyhow::Error) -> Self {
        Self { stage, source }
    }
}

/// What a successful run produced.
#[derive(Debug)]
pub struct Summary {
    pub output_dir: PathBuf,
    pub pruned: PruneReport,
    /// Names of the moved artifacts, sorted.
    pub artifacts: Vec<String>,
    /// Set when the clone directory was left in place.
    pub source_kept: Option<PathBuf>,
    pub elapsed: Duration,
}

/// Run every stage with paths resolved against `root`.
#[instrument(skip_all, fields(root = %root.display(), url = %cfg.repo.url))]
pub fn run(root: &Path, cfg: &BuilderConfig) -> Result<Summary, PipelineError> {
    let started = Instant::now();
    let (clone_dir, output_dir) = cfg
        .resolve_dirs(root)
        .map_err(|e| PipelineError::new(Stage::Preflight, e))?;

    preflight(&clone_dir, &output_dir, cfg.force)
        .map_err(|e| PipelineError::new(Stage::Preflight, e))?;

    println!("clone: url={} dest={}", cfg.repo.url, clone_dir.display());
    if let Err(err) = shallow_clone(&cfg.repo, &clone_dir) {
        discard_clone(&clone_dir);
        return Err(PipelineError::new(Stage::Clone, err));
    }

    let (pruned, artifacts) = match prune_build_collect(&clone_dir, &output_dir, cfg) {
        Ok(done) => done,
        Err(err) => {
            if cfg.keep_source {
                info!(clone_dir = %clone_dir.display(), "keeping source after failure");
            } else {
                discard_clone(&clone_dir);
            }
            return Err(err);
        }
    };

    let source_kept = if cfg.keep_source {
        println!("cleanup: kept={}", clone_dir.display());
        Some(clone_dir)
    } else {
        remove_if_exists(&clone_dir).map_err(|e| PipelineError::new(Stage::Cleanup, e))?;
        println!("cleanup: removed={}", clone_dir.display());
        None
    };

    let elapsed = started.elapsed();
    info!(
        artifacts = artifacts.len(),
        elapsed_secs = elapsed.as_secs_f64(),
        "pipeline finished"
    );
    Ok(Summary {
        output_dir,
        pruned,
        artifacts,
        source_kept,
        elapsed,
    })
}

fn prune_build_collect(
    clone_dir: &Path,
    output_dir: &Path,
    cfg: &BuilderConfig,
) -> Result<(PruneReport, Vec<String>), PipelineError> {
    let pruned =
        prune(clone_dir, &cfg.prune).map_err(|e| PipelineError::new(Stage::Prune, e))?;
    println!(
        "prune: removed={} absent={}",
        pruned.removed.len(),
        pruned.absent.len()
    );

    println!("build: command={:?}", cfg.build.command.join(" "));
    let artifact_dir =
        run_build(clone_dir, &cfg.build).map_err(|e| PipelineError::new(Stage::Build, e))?;
    println!("build: ok artifacts={}", artifact_dir.display());

    let artifacts = collect(&artifact_dir, output_dir, cfg.collect)
        .map_err(|e| PipelineError::new(Stage::Collect, e))?;
    println!(
        "collect: moved={} output={}",
        artifacts.len(),
        output_dir.display()
    );
    Ok((pruned, artifacts))
}

/// Refuse to start over a previous run's leftovers unless `force` is set.
fn preflight(clone_dir: &Path, output_dir: &Path, force: bool) -> anyhow::Result<()> {
    if clone_dir.exists() {
        if !force {
            anyhow::bail!(
                "clone directory {} already exists (use --force to replace it)",
                clone_dir.display()
            );
        }
        debug!(clone_dir = %clone_dir.display(), "removing stale clone");
        remove_if_exists(clone_dir)?;
    }
    if !is_missing_or_empty(output_dir)? {
        if !force {
            anyhow::bail!(
                "output directory {} is not empty (use --force to replace it)",
                output_dir.display()
            );
        }
        debug!(output_dir = %output_dir.display(), "removing previous output");
        remove_if_exists(output_dir)?;
    }
    Ok(())
}

/// Best-effort removal after a failure; the stage error is what gets reported.
fn discard_clone(clone_dir: &Path) {
    match remove_if_exists(clone_dir) {
        Ok(true) => debug!(clone_dir = %clone_dir.display(), "discarded clone after failure"),
        Ok(false) => {}
        Err(err) => warn!(
            clone_dir = %clone_dir.display(),
            err = %format!("{err:#}"),
            "failed to discard clone after failure"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn stage_exit_codes_are_distinct() {
        let stages = [
            Stage::Preflight,
            Stage::Clone,
            Stage::Prune,
            Stage::Build,
            Stage::Collect,
            Stage::Cleanup,
        ];
        let mut codes: Vec<i32> = stages.iter().map(|s| s.exit_code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), stages.len());
        assert!(!codes.contains(&exit_codes::OK));
    }

    #[test]
    fn error_display_names_stage() {
        let err = PipelineError::new(Stage::Build, anyhow::anyhow!("cargo exploded"));
        assert_eq!(err.to_string(), "build failed: cargo exploded");
    }

    #[test]
    fn preflight_rejects_existing_clone_dir() {
        let temp = tempfile::tempdir().expect("tempdir");
        let clone = temp.path().join("everything");
        fs::create_dir_all(&clone).expect("mkdir");
        let err = preflight(&clone, &temp.path().join("binaries"), false).expect_err("reject");
        assert!(err.to_string().contains("already exists"));
        assert!(clone.exists());
    }

    #[test]
    fn preflight_accepts_empty_output_dir() {
        let temp = tempfile::tempdir().expect("tempdir");
        let out = temp.path().join("binaries");
        fs::create_dir_all(&out).expect("mkdir");
        preflight(&temp.path().join("everything"), &out, false).expect("preflight");
    }

    #[test]
    fn preflight_rejects_populated_output_dir() {
        let temp = tempfile::tempdir().expect("tempdir");
        let out = temp.path().join("binaries");
        fs::create_dir_all(&out).expect("mkdir");
        fs::write(out.join("old-tool"), "x").expect("write");
        let err = preflight(&temp.path().join("everything"), &out, false).expect_err("reject");
        assert!(err.to_string().contains("not empty"));
    }

    #[test]
    fn preflight_force_removes_leftovers() {
        let temp = tempfile::tempdir().expect("tempdir");
        let clone = temp.path().join("everything");
        let out = temp.path().join("binaries");
        fs::create_dir_all(clone.join("fun")).expect("mkdir");
        fs::create_dir_all(&out).expect("mkdir");
        fs::write(out.join("old-tool"), "x").expect("write");

        preflight(&clone, &out, true).expect("preflight");
        assert!(!clone.exists());
        assert!(!out.exists());
    }

    #[test]
    fn preflight_failure_stops_before_clone() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(temp.path().join("everything")).expect("mkdir");
        let cfg = BuilderConfig {
            repo: crate::io::config::RepoConfig {
                url: "file:///nonexistent/remote".to_string(),
                ..Default::default()
            },
            ..BuilderConfig::default()
        };
        let err = run(temp.path(), &cfg).expect_err("should fail");
        assert_eq!(err.stage, Stage::Preflight);
        assert!(temp.path().join("everything").exists());
    }
}
