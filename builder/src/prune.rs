//! Concurrent removal of the prune list from a fresh clone.
//!
//! Each folder is removed on its own scoped thread; all threads are joined
//! before the result is inspected, so every folder gets an attempt even when
//! another fails.

use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{Result, anyhow, bail};
use tracing::{debug, instrument, warn};

use crate::io::fs_ops::remove_if_exists;

/// What happened to the prune list.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PruneReport {
    /// Folders that existed and were removed.
    pub removed: Vec<PathBuf>,
    /// Folders that were already absent.
    pub absent: Vec<PathBuf>,
}

/// Remove every folder in `folders` (relative to `root`) concurrently.
///
/// Fails if any removal fails, listing every failure, or if any folder still
/// exists after the join.
#[instrument(skip_all, fields(root = %root.display(), count = folders.len()))]
pub fn prune(root: &Path, folders: &[PathBuf]) -> Result<PruneReport> {
    let results: Vec<(&PathBuf, Result<bool>)> = thread::scope(|scope| {
        let handles: Vec<_> = folders
            .iter()
            .map(|folder| {
                let target = root.join(folder);
                (folder, scope.spawn(move || remove_if_exists(&target)))
            })
            .collect();
        handles
            .into_iter()
            .map(|(folder, handle)| {
                let result = handle
                    .join()
                    .unwrap_or_else(|_| Err(anyhow!("prune thread panicked")));
                (folder, result)
            })
            .collect()
    });

    let mut report = PruneReport::default();
    let mut failures = Vec::new();
    for (folder, result) in results {
        match result {
            Ok(true) => {
                debug!(folder = %folder.display(), "removed");
                report.removed.push(folder.clone());
            }
            Ok(false) => {
                debug!(folder = %folder.display(), "already absent");
                report.absent.push(folder.clone());
            }
            Err(err) => {
                warn!(folder = %folder.display(), err = %format!("{err:#}"), "prune failed");
                failures.push(format!("{}: {err:#}", folder.display()));
            }
        }
    }
    if !failures.is_empty() {
        bail!(
            "failed to prune {} of {} folders:\n{}",
            failures.len(),
            folders.len(),
            failures.join("\n")
        );
    }

    let remaining: Vec<String> = folders
        .iter()
        .filter(|folder| root.join(folder).exists())
        .map(|folder| folder.display().to_string())
        .collect();
    if !remaining.is_empty() {
        bail!("folders still present after prune: {}", remaining.join(", "));
    }

    Ok(report)
}
