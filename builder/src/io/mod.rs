//! I/O helpers for the build pipeline.

pub mod build_tool;
pub mod config;
pub mod fs_ops;
pub mod git;
pub mod process;
