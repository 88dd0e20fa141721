//! Logging bootstrap.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info,vkcraft=debug,tobj=warn";

/// Installs the global tracing subscriber.
///
/// Reads `RUST_LOG` when present, otherwise falls back to [`DEFAULT_FILTER`].
/// Must be called once, by the binary, before any renderer object is built.
///
/// # Example
/// ```no_run
/// vkcraft_core::init_logging();
/// tracing::info!("renderer starting");
/// ```
pub fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}
