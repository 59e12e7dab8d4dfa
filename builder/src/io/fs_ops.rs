//! Filesystem helpers: recursive removal, moves that survive device boundaries.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Remove a file or directory tree. Returns `false` if nothing was there.
pub fn remove_if_exists(path: &Path) -> Result<bool> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e).with_context(|| format!("stat {}", path.display())),
    };
    if meta.is_dir() {
        fs::remove_dir_all(path).with_context(|| format!("remove {}", path.display()))?;
    } else {
        fs::remove_file(path).with_context(|| format!("remove {}", path.display()))?;
    }
    Ok(true)
}

/// True if `path` is missing or an empty directory.
pub fn is_missing_or_empty(path: &Path) -> Result<bool> {
    if !path.exists() {
        return Ok(true);
    }
    let mut entries = fs::read_dir(path).with_context(|| format!("read {}", path.display()))?;
    Ok(entries.next().is_none())
}

/// Move `src` to `dest`, replacing whatever is at `dest`.
///
/// Tries `rename` first; if that fails (typically across filesystems), copies
/// the tree and removes the source.
pub fn move_entry(src: &Path, dest: &Path) -> Result<()> {
    remove_if_exists(dest)?;
    match fs::rename(src, dest) {
        Ok(()) => return Ok(()),
        Err(e) => {
            debug!(err = %e, src = %src.display(), "rename failed, copying instead");
        }
    }
    copy_tree(src, dest)?;
    if let Err(e) = remove_if_exists(src) {
        warn!(err = %e, src = %src.display(), "copied but failed to remove source");
        return Err(e);
    }
    Ok(())
}

fn copy_tree(src: &Path, dest: &Path) -> Result<()> {
    for entry in WalkDir::new(src) {
        let entry = entry.with_context(|| format!("walk {}", src.display()))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .with_context(|| format!("relativize {}", entry.path().display()))?;
        let target = if rel.as_os_str().is_empty() {
            dest.to_path_buf()
        } else {
            dest.join(rel)
        };
        let file_type = entry.file_type();
        if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else if file_type.is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("create {}", target.display()))?;
        } else {
            fs::copy(entry.path(), &target).with_context(|| {
                format!("copy {} -> {}", entry.path().display(), target.display())
            })?;
        }
    }
    Ok(())
}

/// Recreate the link at `src` as `dest`, pointing at the same target.
fn copy_symlink(src: &Path, dest: &Path) -> Result<()> {
    let link = fs::read_link(src).with_context(|| format!("readlink {}", src.display()))?;
    #[cfg(unix)]
    let created = std::os::unix::fs::symlink(&link, dest);
    #[cfg(windows)]
    let created = if fs::metadata(src).is_ok_and(|m| m.is_dir()) {
        std::os::windows::fs::symlink_dir(&link, dest)
    } else {
        std::os::windows::fs::symlink_file(&link, dest)
    };
    created.with_context(|| format!("link {} -> {}", dest.display(), link.display()))
}

/// Whether `path` is an executable regular file.
#[cfg(unix)]
pub fn is_executable(path: &Path) -> Result<bool> {
    use std::os::unix::fs::PermissionsExt;

    let meta = fs::metadata(path).with_context(|| format!("stat {}", path.display()))?;
    Ok(meta.is_file() && meta.permissions().mode() & 0o111 != 0)
}

/// Whether `path` is an executable regular file.
#[cfg(not(unix))]
pub fn is_executable(path: &Path) -> Result<bool> {
    let meta = fs::metadata(path).with_context(|| format!("stat {}", path.display()))?;
    Ok(meta.is_file()
        && path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(std::env::consts::EXE_EXTENSION)))
}
