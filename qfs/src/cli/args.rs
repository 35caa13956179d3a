//! Command-line arguments
// (c) 2025 qfs contributors

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::ConfigurationOverrides;

/// Options which may be provided on the command line, but are not persistent configuration options
#[derive(Debug, Parser, Clone, Default)]
pub(crate) struct Parameters {
    /// Enable detailed debug output
    ///
    /// This has the same effect as setting `RUST_LOG=qfs=debug` in the environment.
    /// If present, `RUST_LOG` overrides this option.
    #[arg(short, long, action, global = true, help_heading("Output"))]
    pub debug: bool,

    /// Quiet mode: reports only errors
    #[arg(short, long, action, global = true, conflicts_with("debug"), help_heading("Output"))]
    pub quiet: bool,

    /// Log to a file
    ///
    /// By default the log receives everything printed to stderr.
    /// To override this, set the environment variable `RUST_LOG_FILE_DETAIL` (same semantics as `RUST_LOG`).
    #[arg(short('l'), long, value_name("FILE"), global = true, help_heading("Output"))]
    pub log_file: Option<String>,

    /// Read configuration from this file instead of the per-user configuration file
    #[arg(short('c'), long, value_name("FILE"), global = true, help_heading("Configuration"))]
    pub config: Option<PathBuf>,
}

/// What to do
#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub(crate) enum Command {
    /// Lists the files held by the server, one per line
    Ls,
    /// Downloads a file
    Get {
        /// Name of the file on the server
        filename: String,
        /// Where to write it (default: standard output)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Uploads a file, then reports how many bytes the server received
    Put {
        /// The local file. Relative paths are taken from `local_dir`, if configured.
        path: PathBuf,
    },
    /// Uploads a file, reporting the server's progress messages as they arrive
    PutProgress {
        /// The local file. Relative paths are taken from `local_dir`, if configured.
        path: PathBuf,
    },
    /// Shows the merged configuration, and where each value came from
    ShowConfig,
    /// Lists the configuration files which would be read
    ConfigFiles,
}

/// Client for a remote file service
#[derive(Debug, Parser)]
#[command(
    author,
    version(crate::version::short()),
    about,
    styles(super::styles::CLAP_STYLES),
    infer_long_args(true)
)]
pub(crate) struct CliArgs {
    #[command(flatten)]
    pub params: Parameters,

    #[command(flatten)]
    pub overrides: ConfigurationOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod test {
    use super::{CliArgs, Command};
    use clap::{CommandFactory as _, Parser as _};
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    #[test]
    fn cli_is_consistent() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn get_with_output() {
        let a = CliArgs::try_parse_from(["qfs", "get", "name.txt", "-o", "/tmp/out"]).unwrap();
        assert_eq!(
            a.command,
            Command::Get {
                filename: "name.txt".into(),
                output: Some(PathBuf::from("/tmp/out")),
            }
        );
    }

    #[test]
    fn overrides_before_the_command() {
        let a = CliArgs::try_parse_from([
            "qfs",
            "--plaintext",
            "--chunk-size",
            "64",
            "put",
            "sports.txt",
        ])
        .unwrap();
        assert!(a.overrides.plaintext);
        assert_eq!(a.overrides.chunk_size, Some(64));
        assert_eq!(a.overrides.address, None);
        assert_eq!(a.command, Command::Put { path: "sports.txt".into() });
    }

    #[test]
    fn debug_and_quiet_conflict() {
        assert!(CliArgs::try_parse_from(["qfs", "-d", "-q", "ls"]).is_err());
    }

    #[test]
    fn command_required() {
        assert!(CliArgs::try_parse_from(["qfs"]).is_err());
    }

    #[test]
    fn no_token_option() {
        assert!(CliArgs::try_parse_from(["qfs", "--token", "x", "ls"]).is_err());
    }
}
