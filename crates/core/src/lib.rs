//! Shared foundations for the vkcraft crates.
//!
//! - [`Error`] and the [`Result`] alias used by the driver-facing crates
//! - [`init_logging`], the single place the tracing subscriber is installed
//! - [`FrameTimer`] for per-frame delta and elapsed time
//! - [`RunConfig`], the injected run configuration

mod config;
mod error;
mod logging;
mod timer;

pub use config::{RendererEntry, RunConfig, DEFAULT_RUNCFG_FILE, RUNCFG_ENV};
pub use error::{Error, Result};
pub use logging::{init_logging, DEFAULT_FILTER};
pub use timer::{FrameTime, FrameTimer};
