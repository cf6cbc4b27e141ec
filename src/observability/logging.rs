//! Structured logging setup.

use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber.
///
/// The log level is controlled by the `RUST_LOG` environment variable,
/// defaulting to debug output for this crate and `info` elsewhere.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("apm_http=debug,info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
