//! Builder configuration, read from `builder.toml` when present.

use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Default config file name, resolved against the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "builder.toml";

/// Builder configuration (TOML).
///
/// Every field has a default, so a missing file or an empty one reproduces
/// the stock run: clone `ckoshka/everything`, prune six folders, build the
/// workspace in release mode and collect into `./binaries`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BuilderConfig {
    /// Clone target, relative to the working directory. Removed after the run.
    pub clone_dir: PathBuf,

    /// Destination for collected artifacts.
    pub output_dir: PathBuf,

    /// Folders (relative to the clone root) removed before building.
    pub prune: Vec<PathBuf>,

    /// Leave the clone directory in place after the run, successful or not.
    pub keep_source: bool,

    /// Remove a stale clone directory and an existing output directory
    /// instead of refusing to start.
    pub force: bool,

    pub collect: CollectMode,

    pub repo: RepoConfig,

    pub build: BuildConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RepoConfig {
    pub url: String,
    /// History depth passed to `git clone --depth`.
    pub depth: u32,
    /// Branch to check out; the remote HEAD when unset.
    pub branch: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BuildConfig {
    /// Command run from the clone root (e.g. `["cargo","build","--release","--workspace"]`).
    pub command: Vec<String>,
    /// Where the build leaves its outputs, relative to the clone root.
    pub artifact_dir: PathBuf,
    pub timeout_secs: u64,
    /// Bytes of build stdout/stderr kept in memory for error reports.
    pub output_limit_bytes: usize,
}

/// Which entries of the artifact directory are moved into the output directory.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CollectMode {
    /// Every top-level entry not starting with `.`.
    #[default]
    All,
    /// Executable regular files only.
    Executables,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            url: "https://github.com/ckoshka/everything".to_string(),
            depth: 1,
            branch: None,
            timeout_secs: 10 * 60,
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            command: ["cargo", "build", "--release", "--workspace"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            artifact_dir: PathBuf::from("target/release"),
            timeout_secs: 2 * 60 * 60,
            output_limit_bytes: 100_000,
        }
    }
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            clone_dir: PathBuf::from("everything"),
            output_dir: PathBuf::from("binaries"),
            prune: [
                "ai_stuff",
                "archived",
                "experimental",
                "fun",
                "useful",
                "wasm_libs",
            ]
            .iter()
            .map(PathBuf::from)
            .collect(),
            keep_source: false,
            force: false,
            collect: CollectMode::All,
            repo: RepoConfig::default(),
            build: BuildConfig::default(),
        }
    }
}

impl BuilderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.repo.url.trim().is_empty() {
            return Err(anyhow!("repo.url must be non-empty"));
        }
        if self.repo.depth == 0 {
            return Err(anyhow!("repo.depth must be > 0"));
        }
        if let Some(branch) = &self.repo.branch
            && branch.trim().is_empty()
        {
            return Err(anyhow!("repo.branch must be non-empty when set"));
        }
        if self.repo.timeout_secs == 0 {
            return Err(anyhow!("repo.timeout_secs must be > 0"));
        }
        if self.build.timeout_secs == 0 {
            return Err(anyhow!("build.timeout_secs must be > 0"));
        }
        if self.build.output_limit_bytes == 0 {
            return Err(anyhow!("build.output_limit_bytes must be > 0"));
        }
        if self.build.command.is_empty() || self.build.command[0].trim().is_empty() {
            return Err(anyhow!("build.command must be a non-empty array"));
        }
        ensure_contained("clone_dir", &self.clone_dir)?;
        ensure_contained("build.artifact_dir", &self.build.artifact_dir)?;
        for entry in &self.prune {
            ensure_contained("prune entry", entry)?;
        }
        if self.output_dir.is_absolute() {
            ensure_no_dot_components("output_dir", &self.output_dir)?;
        } else {
            ensure_contained("output_dir", &self.output_dir)?;
            ensure_disjoint(&self.clone_dir, &self.output_dir)?;
        }
        Ok(())
    }

    /// Resolve the clone and output directories against `root`.
    ///
    /// Rejects an output directory that is `root` or one of its ancestors, and
    /// any overlap between the two directories once both are absolute.
    pub fn resolve_dirs(&self, root: &Path) -> Result<(PathBuf, PathBuf)> {
        let clone_dir = lexical_normalize(&root.join(&self.clone_dir));
        let output_dir = lexical_normalize(&root.join(&self.output_dir));
        if lexical_normalize(root).starts_with(&output_dir) {
            return Err(anyhow!(
                "output_dir {} must not be the working directory or one of its parents",
                output_dir.display()
            ));
        }
        ensure_disjoint(&clone_dir, &output_dir)?;
        Ok((clone_dir, output_dir))
    }
}

/// Drop `.` components. `..` is rejected by validation before paths get here.
fn lexical_normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// The clone is deleted after collection, so neither directory may contain the other.
fn ensure_disjoint(clone_dir: &Path, output_dir: &Path) -> Result<()> {
    let clone = lexical_normalize(clone_dir);
    let output = lexical_normalize(output_dir);
    if output.starts_with(&clone) || clone.starts_with(&output) {
        return Err(anyhow!(
            "output_dir {} and clone_dir {} must not overlap",
            output_dir.display(),
            clone_dir.display()
        ));
    }
    Ok(())
}

fn ensure_no_dot_components(label: &str, path: &Path) -> Result<()> {
    if path
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::CurDir))
    {
        return Err(anyhow!(
            "{label} {} must not contain '.' or '..'",
            path.display()
        ));
    }
    Ok(())
}

/// Reject paths that are empty, absolute, or climb out with `..`.
///
/// These paths are deleted recursively, so they must stay under their base.
fn ensure_contained(label: &str, path: &Path) -> Result<()> {
    let mut normal = 0usize;
    for component in path.components() {
        match component {
            Component::Normal(_) => normal += 1,
            Component::CurDir => {}
            _ => {
                return Err(anyhow!(
                    "{label} {} must be a relative path without '..'",
                    path.display()
                ));
            }
        }
    }
    if normal == 0 {
        return Err(anyhow!("{label} must name a directory, got '{}'", path.display()));
    }
    Ok(())
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub repo_url: Option<String>,
    pub branch: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub clone_dir: Option<PathBuf>,
    pub keep_source: bool,
    pub force: bool,
    pub executables_only: bool,
}

/// Apply command-line overrides to a loaded config and validate the result.
pub fn apply_overrides(mut base: BuilderConfig, overrides: &Overrides) -> Result<BuilderConfig> {
    if let Some(url) = &overrides.repo_url {
        base.repo.url = url.clone();
    }
    if let Some(branch) = &overrides.branch {
        base.repo.branch = Some(branch.clone());
    }
    if let Some(output_dir) = &overrides.output_dir {
        base.output_dir = output_dir.clone();
    }
    if let Some(clone_dir) = &overrides.clone_dir {
        base.clone_dir = clone_dir.clone();
    }
    base.keep_source |= overrides.keep_source;
    base.force |= overrides.force;
    if overrides.executables_only {
        base.collect = CollectMode::Executables;
    }
    base.validate()?;
    Ok(base)
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `BuilderConfig::default()`.
pub fn load_config(path: &Path) -> Result<BuilderConfig> {
    if !path.exists() {
        let cfg = BuilderConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: BuilderConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &BuilderConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    let tmp_path = path.with_extension("toml.tmp");
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(&tmp_path, buf).with_context(|| format!("write {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}
