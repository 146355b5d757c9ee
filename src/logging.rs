//! Logging setup
//!
//! Diagnostics go to stderr through `tracing`; stdout carries only the report
//! stream.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Default filter for a `-v` count
///
/// `RUST_LOG`, when set, takes precedence over this.
pub fn default_level(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

/// Initialize stderr logging
///
/// Uses `RUST_LOG` if set, otherwise the level implied by `verbosity`.
/// Calling it a second time is a no-op.
pub fn init(verbosity: u8) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level(verbosity)));

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(verbosity > 1)
                .with_filter(env_filter),
        )
        .try_init();
}
