use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use builder::exit_codes;
use builder::io::config::{DEFAULT_CONFIG_FILE, Overrides, apply_overrides, load_config};
use builder::logging;
use builder::pipeline;

#[derive(Parser)]
#[command(
    name = "builder",
    version,
    about = "Clone a workspace, prune it, build it and collect the binaries"
)]
struct Cli {
    /// Config file; built-in defaults apply when it does not exist.
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    /// Repository to clone.
    #[arg(long)]
    repo: Option<String>,
    /// Branch to clone instead of the remote HEAD.
    #[arg(long)]
    branch: Option<String>,
    /// Directory the artifacts are moved into.
    #[arg(long)]
    output: Option<PathBuf>,
    /// Directory the repository is cloned into.
    #[arg(long)]
    clone_dir: Option<PathBuf>,
    /// Keep the cloned tree after the run.
    #[arg(long)]
    keep_source: bool,
    /// Replace leftovers from a previous run.
    #[arg(short, long)]
    force: bool,
    /// Collect executables only, skipping deps/, build/ and *.d files.
    #[arg(long)]
    executables_only: bool,
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    std::process::exit(run(cli));
}

fn run(cli: Cli) -> i32 {
    let root = match std::env::current_dir().context("resolve working directory") {
        Ok(root) => root,
        Err(err) => {
            eprintln!("{:#}", err);
            return exit_codes::INVALID;
        }
    };
    let cfg = match load(&cli) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("{:#}", err);
            return exit_codes::INVALID;
        }
    };

    match pipeline::run(&root, &cfg) {
        Ok(summary) => {
            println!(
                "done: artifacts={} output={} elapsed_secs={:.1}",
                summary.artifacts.len(),
                summary.output_dir.display(),
                summary.elapsed.as_secs_f64()
            );
            exit_codes::OK
        }
        Err(err) => {
            eprintln!("{}", err);
            err.stage.exit_code()
        }
    }
}

fn load(cli: &Cli) -> Result<builder::io::config::BuilderConfig> {
    let base = load_config(&cli.config).context("load config")?;
    let overrides = Overrides {
        repo_url: cli.repo.clone(),
        branch: cli.branch.clone(),
        output_dir: cli.output.clone(),
        clone_dir: cli.clone_dir.clone(),
        keep_source: cli.keep_source,
        force: cli.force,
        executables_only: cli.executables_only,
    };
    apply_overrides(base, &overrides).context("apply command-line overrides")
}
