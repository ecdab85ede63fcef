//! Diagnostic logging setup.
//!
//! Logs go to stderr through a `tracing-subscriber` `fmt` layer so that
//! command output on stdout stays clean. `RUST_LOG` overrides the default
//! level.

use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber. Returns `false` if one was already set.
pub fn init(default_level: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .is_ok()
}
