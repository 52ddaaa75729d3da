//! Logging configuration for Weaver
//!
//! Plain tracing-based logging to stderr.
//!
//! # Example
//!
//! ```no_run
//! use weaver::telemetry::init_logging;
//!
//! init_logging();
//! ```

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Env var checked before `RUST_LOG`
pub const LOG_ENV: &str = "WEAVER_LOG";

/// Initialize logging with tracing-subscriber
///
/// Filter directives come from `WEAVER_LOG`, then `RUST_LOG`, and default to
/// `info`. Calling it again after a subscriber is installed does nothing.
pub fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init();
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}
