//! Library-level pipeline tests against a local fixture remote.

#![cfg(unix)]

use std::fs;
use std::path::PathBuf;

use builder::pipeline::{Stage, run};
use builder::test_support::{failing_build_command, fixture_config, init_remote};

#[test]
fn summary_reports_pruned_and_collected() {
    let remote = init_remote(&["fun", "useful"]).expect("remote");
    let work = tempfile::tempdir().expect("workdir");
    let mut cfg = fixture_config(&remote, &["fun", "useful"], &["pinyin"]);
    cfg.prune.push(PathBuf::from("wasm_libs"));

    let summary = run(work.path(), &cfg).expect("pipeline");
    assert_eq!(
        summary.pruned.removed,
        vec![PathBuf::from("fun"), PathBuf::from("useful")]
    );
    assert_eq!(summary.pruned.absent, vec![PathBuf::from("wasm_libs")]);
    assert_eq!(summary.artifacts, vec!["deps", "pinyin", "pinyin.d"]);
    assert_eq!(summary.output_dir, work.path().join("binaries"));
    assert!(summary.source_kept.is_none());
    assert!(!work.path().join("everything").exists());
}

#[test]
fn keep_source_is_reported() {
    let remote = init_remote(&["archived"]).expect("remote");
    let work = tempfile::tempdir().expect("workdir");
    let mut cfg = fixture_config(&remote, &["archived"], &["tool"]);
    cfg.keep_source = true;

    let summary = run(work.path(), &cfg).expect("pipeline");
    assert_eq!(summary.source_kept, Some(work.path().join("everything")));
    assert!(!work.path().join("everything/archived").exists());
}

#[test]
fn build_failure_is_tagged_with_build_stage() {
    let remote = init_remote(&["fun"]).expect("remote");
    let work = tempfile::tempdir().expect("workdir");
    let mut cfg = fixture_config(&remote, &["fun"], &[]);
    cfg.build.command = failing_build_command();

    let err = run(work.path(), &cfg).expect_err("build should fail");
    assert_eq!(err.stage, Stage::Build);
    assert!(!work.path().join("binaries").exists());
    assert!(!work.path().join("everything").exists());
}

#[test]
fn missing_artifact_dir_is_a_collect_failure() {
    let remote = init_remote(&["fun"]).expect("remote");
    let work = tempfile::tempdir().expect("workdir");
    let mut cfg = fixture_config(&remote, &["fun"], &[]);
    cfg.build.command = vec!["true".to_string()];

    let err = run(work.path(), &cfg).expect_err("collect should fail");
    assert_eq!(err.stage, Stage::Collect);
    assert!(err.to_string().contains("does not exist"));
    assert!(!work.path().join("everything").exists());
    assert!(
        fs::read_dir(work.path())
            .expect("read workdir")
            .next()
            .is_none()
    );
}

#[test]
fn prune_failure_discards_clone_and_creates_no_output() {
    let remote = init_remote(&["fun"]).expect("remote");
    let work = tempfile::tempdir().expect("workdir");
    let mut cfg = fixture_config(&remote, &["fun"], &["tool"]);
    // The fixture's Cargo.toml is a file, so nothing below it can be removed.
    cfg.prune.push(PathBuf::from("Cargo.toml/experimental"));

    let err = run(work.path(), &cfg).expect_err("prune should fail");
    assert_eq!(err.stage, Stage::Prune);
    assert!(err.to_string().contains("Cargo.toml/experimental"), "{err}");
    assert!(!work.path().join("everything").exists());
    assert!(!work.path().join("binaries").exists());
}

#[test]
fn forced_run_refuses_working_directory_as_output() {
    let remote = init_remote(&["fun"]).expect("remote");
    let work = tempfile::tempdir().expect("workdir");
    fs::write(work.path().join("precious.txt"), "keep me").expect("write");
    let mut cfg = fixture_config(&remote, &["fun"], &["tool"]);
    cfg.output_dir = work.path().to_path_buf();
    cfg.force = true;

    let err = run(work.path(), &cfg).expect_err("should refuse");
    assert_eq!(err.stage, Stage::Preflight);
    assert!(work.path().join("precious.txt").exists());
}

#[test]
fn output_spelled_as_clone_is_refused() {
    let remote = init_remote(&["fun"]).expect("remote");
    let work = tempfile::tempdir().expect("workdir");
    let mut cfg = fixture_config(&remote, &["fun"], &["tool"]);
    cfg.clone_dir = PathBuf::from("./everything");
    cfg.output_dir = work.path().join("everything");

    let err = run(work.path(), &cfg).expect_err("should refuse");
    assert_eq!(err.stage, Stage::Preflight);
    assert!(!work.path().join("everything").exists());
}
