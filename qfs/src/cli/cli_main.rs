//! Main CLI for qfs
// (c) 2025 qfs contributors

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context as _, Result};
use clap::Parser as _;
use human_repr::HumanCount as _;
use tracing::{debug, info};

use super::args::{CliArgs, Command};
use super::styles::{error, use_colours};
use crate::call::{CallError, ErrorClass};
use crate::client::{FileServiceClient, open_source};
use crate::config::{Configuration, Manager};
use crate::util::{LogOptions, setup_tracing, tracing_is_initialised};

/// Exit status for failures with no more specific status
const EXIT_FAILURE: u8 = 1;
/// Exit status when the server has no such file
const EXIT_NOT_FOUND: u8 = 2;
/// Exit status when a call ran out of time
const EXIT_DEADLINE: u8 = 3;

/// Main CLI entrypoint
///
/// Call this from `main`, passing the arguments to use.
/// Normally you will call `cli(std::env::args_os())` but you can pass in alternate arguments for CLI testing.
///
/// # Exit status
/// * 0 on success
/// * 2 if the server reported that a file was not found
/// * 3 if a call's time budget ran out
/// * 1 on any other failure
///
/// # Note
/// This function may start a tokio runtime and perform work in it.
#[must_use]
pub fn cli<I, T>(args: I) -> ExitCode
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    match cli_inner(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if tracing_is_initialised() {
                tracing::error!("{e:#}");
            } else {
                let style = error();
                eprintln!("{}Error:{} {e:#}", style.render(), style.render_reset());
            }
            ExitCode::from(exit_status_for(&e))
        }
    }
}

/// Maps a failure to the process exit status, by the class of the call error within it (if any)
fn exit_status_for(e: &anyhow::Error) -> u8 {
    let class = e
        .chain()
        .find_map(|cause| cause.downcast_ref::<CallError>())
        .map(CallError::class);
    match class {
        Some(ErrorClass::NotFound) => EXIT_NOT_FOUND,
        Some(ErrorClass::DeadlineExceeded) => EXIT_DEADLINE,
        _ => EXIT_FAILURE,
    }
}

fn cli_inner<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let Some(args) = parse_args(args)? else {
        return Ok(()); // help/version shown; exit
    };
    let config_file = args.params.config.as_deref();

    let mut manager = Manager::standard(config_file);
    manager.apply_overrides(&args.overrides);

    match args.command {
        Command::ConfigFiles => {
            for f in Manager::config_files(config_file) {
                println!("{f}");
            }
            return Ok(());
        }
        Command::ShowConfig => {
            print!("{}", manager.to_display_string()?);
            return manager.get()?.validate();
        }
        _ => (),
    }

    let config = manager.get()?;
    setup_tracing(&LogOptions {
        colour: use_colours(),
        ..LogOptions::new(&args.params, config.time_format)
    })?;
    debug!("configuration files read: {:?}", manager.files_read());
    run(args.command, &config)
}

fn parse_args<I, T>(args: I) -> Result<Option<CliArgs>>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    use clap::error::ErrorKind::{DisplayHelp, DisplayVersion};
    match CliArgs::try_parse_from(args) {
        Ok(args) => Ok(Some(args)),
        Err(e) if matches!(e.kind(), DisplayHelp | DisplayVersion) => {
            let message = e.render();
            if use_colours() {
                print!("{}", message.ansi());
            } else {
                print!("{message}");
            }
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Relative upload paths are taken from `local_dir`, if set
fn resolve_local(config: &Configuration, path: &Path) -> PathBuf {
    if path.is_relative() && !config.local_dir.is_empty() {
        Path::new(&config.local_dir).join(path)
    } else {
        path.to_path_buf()
    }
}

// MODE HANDLERS ///////////////////////////////////////////////////////////

#[tokio::main(flavor = "current_thread")]
async fn run(command: Command, config: &Configuration) -> Result<()> {
    let client = FileServiceClient::connect(config).await?;
    let result = run_command(&client, command, config).await;
    client.close().await;
    result
}

async fn run_command(
    client: &FileServiceClient,
    command: Command,
    config: &Configuration,
) -> Result<()> {
    match command {
        Command::Ls => {
            for name in client.list_files(client.context()).await? {
                println!("{name}");
            }
        }
        Command::Get { filename, output } => {
            let result = if let Some(path) = output {
                let mut file = tokio::fs::File::create(&path)
                    .await
                    .with_context(|| format!("creating {}", path.display()))?;
                client.download_to(&filename, &mut file, client.context()).await
            } else {
                let mut stdout = tokio::io::stdout();
                client.download_to(&filename, &mut stdout, client.context()).await
            };
            let n = result.with_context(|| format!("downloading {filename}"))?;
            debug!("{filename}: {}", n.human_count_bytes());
        }
        Command::Put { path } => {
            let path = resolve_local(config, &path);
            let source = open_source(&path)
                .await
                .with_context(|| format!("opening {}", path.display()))?;
            let size = client
                .upload(source, client.upload_context())
                .await
                .with_context(|| format!("uploading {}", path.display()))?;
            info!("uploaded {} ({})", path.display(), size.human_count_bytes());
            println!("received data size: {size}");
        }
        Command::PutProgress { path } => {
            let path = resolve_local(config, &path);
            let source = open_source(&path)
                .await
                .with_context(|| format!("opening {}", path.display()))?;
            let report = client
                .upload_with_progress(source, client.upload_context(), |msg| info!("{msg}"))
                .await
                .with_context(|| format!("uploading {}", path.display()))?;
            info!("uploaded {}: {report}", path.display());
        }
        // handled without connecting
        Command::ShowConfig | Command::ConfigFiles => (),
    }
    Ok(())
}
