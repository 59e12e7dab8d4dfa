//! Fetch-and-build orchestration.
//!
//! Clones a repository, prunes a fixed set of folders, runs a workspace build
//! and moves the release artifacts into an output directory.
//!
//! - **[`io`]**: side effects (config file, git, build tool, filesystem, child processes).
//! - **[`prune`]** and **[`collect`]**: the two filesystem stages.
//! - **[`pipeline`]**: stage ordering and the partial-failure policy.

pub mod collect;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
pub mod prune;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
