//! Tracing initialization.

use tracing_subscriber::EnvFilter;

/// Installs the global JSON subscriber. Filtering follows `RUST_LOG` and
/// defaults to `info`.
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();
}
