//! Logging configuration using tracing
//!
//! Structured logging to stderr. `RUST_LOG` always wins; without it the filter
//! depends on the requested verbosity.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when RUST_LOG is not set: pass summaries, skips and failures
pub const DEFAULT_FILTER: &str = "info";

/// Filter used with `--verbose`: per-plot change decisions and fetch details
pub const VERBOSE_FILTER: &str = "info,fieldsync=debug";

/// Pick the fallback filter for a verbosity flag
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        VERBOSE_FILTER
    } else {
        DEFAULT_FILTER
    }
}

/// Initialize the tracing subscriber
///
/// # Example RUST_LOG values
/// - `RUST_LOG=debug` - Everything, including axum and reqwest internals
/// - `RUST_LOG=fieldsync=trace` - Trace level for fieldsync only
/// - `RUST_LOG=fieldsync=debug,tower_http=info` - Different levels per crate
///
/// # Errors
/// Returns an error if the subscriber has already been initialized
pub fn init(verbose: bool) -> crate::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_line_number(true)
                .with_writer(std::io::stderr),
        )
        .try_init()
        .map_err(|e| crate::SyncError::Other(format!("Failed to initialize tracing: {}", e)))?;

    Ok(())
}

/// Initialize logging for tests (no-op if already initialized)
pub fn init_test() {
    let _ = init(true);
}
