//! Command Line Interface for qfs
// (c) 2025 qfs contributors
mod args;
pub(crate) use args::Parameters;
mod cli_main;
pub(crate) mod styles;
pub use cli_main::cli;
