// (c) 2025 qfs contributors
//! # 📖 Configuration management
//!
//! qfs obtains run-time configuration from the following sources, highest priority first:
//! 1. Command-line options
//! 2. Environment variables, named for the option with a `QFS_` prefix (e.g. `QFS_CHUNK_SIZE=64`)
//! 3. The configuration file
//!    * `--config FILE`, if given;
//!    * otherwise the per-user file, `qfs/qfs.toml` in the platform's configuration directory
//!      (e.g. `~/.config/qfs/qfs.toml` on Linux)
//! 4. Hard-wired defaults
//!
//! Run `qfs config-files` to see which file applies, and `qfs show-config` to see the
//! result of merging everything (with the token redacted).
//!
//! ## File format
//!
//! The file is [TOML](https://toml.io/). Keys are the field names of [`Configuration`].
//!
//! ```toml
//! address = "files.example.com:50051"
//! ca_cert = "/etc/qfs/ca.pem"
//! token = "my-secret-token"
//! chunk_size = 65536
//! pacing_ms = 0
//! ```
//!
//! The token may only be set in the file or in the environment (`QFS_TOKEN`),
//! never on the command line.

mod manager;
mod structure;

pub use manager::{ENV_PREFIX, Manager};
pub use structure::{Configuration, ConfigurationOverrides};
