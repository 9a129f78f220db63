//! Diagnostic tracing on stderr.
//!
//! Turn text and the session summary go to stdout; everything here goes to
//! stderr so the two never interleave in a captured transcript. Exports under
//! `io/exports` are written regardless of the filter.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise `autoplay` logs at `info` when
/// `verbose` is on and everything else stays at `warn`.
///
/// ```bash
/// RUST_LOG=autoplay=debug autoplay play --max-moves 5
/// ```
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .init();
}

fn default_directives(verbose: bool) -> &'static str {
    if verbose { "warn,autoplay=info" } else { "warn" }
}
