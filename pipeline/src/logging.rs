//! Tracing setup shared by the CLI and the server.
//!
//! Diagnostics go to stderr so that stdout stays reserved for the JSON
//! reports the CLI prints.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Falls back to `default_filter` if unset or invalid.
///
/// # Example
/// ```bash
/// RUST_LOG=pipeline=debug pipeline chat --repo data/widgets ...
/// ```
pub fn init(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
