//! Moving build outputs into the output directory.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::{debug, instrument};

use crate::io::config::CollectMode;
use crate::io::fs_ops::{is_executable, move_entry};

/// Names of the artifact directory entries selected by `mode`, sorted.
///
/// Hidden entries (`.fingerprint`, `.cargo-lock`) are never selected, matching
/// a shell `*` glob.
pub fn select_artifacts(artifact_dir: &Path, mode: CollectMode) -> Result<Vec<String>> {
    if !artifact_dir.is_dir() {
        bail!("artifact directory {} does not exist", artifact_dir.display());
    }
    let mut names = Vec::new();
    for entry in
        fs::read_dir(artifact_dir).with_context(|| format!("read {}", artifact_dir.display()))?
    {
        let entry = entry.context("read entry")?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        let keep = match mode {
            CollectMode::All => true,
            CollectMode::Executables => is_executable(&entry.path())?,
        };
        if keep {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Move the selected artifacts into `output_dir`, creating it.
///
/// Returns the moved names. On failure the error says how many entries were
/// already moved; those stay in `output_dir`.
#[instrument(skip_all, fields(artifact_dir = %artifact_dir.display(), output_dir = %output_dir.display(), mode = ?mode))]
pub fn collect(artifact_dir: &Path, output_dir: &Path, mode: CollectMode) -> Result<Vec<String>> {
    let names = select_artifacts(artifact_dir, mode)?;
    move_artifacts(artifact_dir, output_dir, &names)?;
    Ok(names)
}

/// Move `names` from `artifact_dir` into `output_dir`, creating it.
pub fn move_artifacts(artifact_dir: &Path, output_dir: &Path, names: &[String]) -> Result<()> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("create output dir {}", output_dir.display()))?;

    for (moved, name) in names.iter().enumerate() {
        let src = artifact_dir.join(name);
        let dest = output_dir.join(name);
        move_entry(&src, &dest).with_context(|| {
            format!(
                "move {} -> {} ({moved} of {} moved before failure)",
                src.display(),
                dest.display(),
                names.len()
            )
        })?;
        debug!(artifact = %name, "moved");
    }
    Ok(())
}
