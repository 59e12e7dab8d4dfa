//! Stable exit codes for the `builder` binary.

/// Every stage succeeded.
pub const OK: i32 = 0;
/// Invalid configuration or a failed preflight check; nothing was touched.
pub const INVALID: i32 = 1;
/// `git clone` failed or timed out.
pub const CLONE_FAILED: i32 = 2;
/// At least one prune folder could not be removed.
pub const PRUNE_FAILED: i32 = 3;
/// The workspace build failed or timed out. The output directory is not created.
pub const BUILD_FAILED: i32 = 4;
/// Moving artifacts into the output directory failed.
pub const COLLECT_FAILED: i32 = 5;
/// Artifacts were collected but the clone directory could not be removed.
pub const CLEANUP_FAILED: i32 = 6;
