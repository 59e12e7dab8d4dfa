//! Where the builder's output goes.
//!
//! A run writes two streams. Stage progress (`clone: ...`, `prune: ...`,
//! `done: ...`) is printed by [`crate::pipeline`] to stdout, always, and is
//! what scripts wrapping the builder parse. Spans and events from `tracing`
//! (per-folder prune results, rename fallbacks, child process timings) go to
//! stderr and stay quiet unless `RUST_LOG` asks for them.

use std::io::IsTerminal;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset or unparsable: stage failures and
/// cleanup warnings only.
const DEFAULT_FILTER: &str = "warn";

/// Install the stderr subscriber. Call once, before the pipeline starts.
///
/// ```bash
/// RUST_LOG=builder::prune=debug,builder::io::process=debug builder
/// ```
pub fn init() {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let stderr = std::io::stderr();

    tracing_subscriber::registry()
        .with(diagnostics_filter(directives.as_deref()))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(stderr.is_terminal())
                .compact(),
        )
        .init();
}

fn diagnostics_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}
