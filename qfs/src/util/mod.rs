//! General utility code that didn't fit anywhere else
// (c) 2025 qfs contributors

mod tracing;
pub use tracing::TimeFormat;
pub(crate) use tracing::{LogOptions, is_initialized as tracing_is_initialised, setup as setup_tracing};
