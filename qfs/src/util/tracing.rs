//! Log output to the console and to an optional file
// (c) 2025 qfs contributors

use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context as _;
use serde::{Deserialize, Serialize, de};
use strum::VariantNames as _;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::fmt::time::{ChronoLocal, ChronoUtc, FormatTime};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, prelude::*};

static INSTALLED: AtomicBool = AtomicBool::new(false);

const LOCAL_STAMP: &str = "%Y-%m-%d %H:%M:%SL";
const UTC_STAMP: &str = "%Y-%m-%d %H:%M:%SZ";

/// Filter directives for the console, in `EnvFilter` syntax
const CONSOLE_VAR: &str = "RUST_LOG";
/// Filter directives for the log file; the console's apply when unset
const FILE_DETAIL_VAR: &str = "RUST_LOG_FILE_DETAIL";

/// How time stamps are written in log output
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    Eq,
    PartialEq,
    strum::Display,
    strum::EnumString,
    strum::VariantNames,
    clap::ValueEnum,
    Serialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "kebab-case")]
pub enum TimeFormat {
    /// Local wall-clock time, to the second
    #[default]
    Local,
    /// UTC, to the second
    Utc,
    /// Local time with offset, as in RFC 3339 (`2010-03-14T18:32:03+01:00`)
    Rfc3339,
}

impl<'de> Deserialize<'de> for TimeFormat {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse()
            .map_err(|_| de::Error::unknown_variant(&s, Self::VARIANTS))
    }
}

/// What to log, and where, for one run of the tool
#[derive(Debug, Clone, Copy)]
pub(crate) struct LogOptions<'a> {
    /// Level for our own events, unless the environment says otherwise
    pub level: &'static str,
    /// Log to stderr
    pub console: bool,
    pub file: Option<&'a Path>,
    pub time_format: TimeFormat,
    pub colour: bool,
}

impl<'a> LogOptions<'a> {
    /// Console logging at the level the command-line flags ask for
    pub(crate) fn new(params: &'a crate::cli::Parameters, time_format: TimeFormat) -> Self {
        let level = match (params.debug, params.quiet) {
            (true, _) => "debug",
            (false, true) => "error",
            (false, false) => "info",
        };
        Self {
            level,
            console: true,
            file: params.log_file.as_deref().map(Path::new),
            time_format,
            colour: false,
        }
    }
}

/// The filter for one sink: the directives in `var` if it is set, otherwise
/// our own events at `level`. The flag is true when the environment supplied the filter.
fn sink_filter(var: &str, level: &str) -> anyhow::Result<(EnvFilter, bool)> {
    match std::env::var(var) {
        Ok(directives) => {
            let filter = EnvFilter::try_new(&directives)
                .with_context(|| format!("{var} (set in environment) was not understood"))?;
            Ok((filter, true))
        }
        Err(_) => Ok((EnvFilter::try_new(format!("qfs={level}"))?, false)),
    }
}

type BoxedLayer = Box<dyn Layer<tracing_subscriber::Registry> + Send + Sync>;

fn timed_layer<S, T, W>(
    timer: T,
    writer: W,
    filter: EnvFilter,
    show_target: bool,
    ansi: bool,
) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'span> LookupSpan<'span>,
    T: FormatTime + Send + Sync + 'static,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt::layer()
        .compact()
        .with_target(show_target)
        .with_ansi(ansi)
        .with_timer(timer)
        .with_writer(writer)
        .with_filter(filter)
        .boxed()
}

fn sink_layer<W>(
    writer: W,
    (filter, from_env): (EnvFilter, bool),
    time_format: TimeFormat,
    ansi: bool,
) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    // Environment filters may select other crates, so name the target
    match time_format {
        TimeFormat::Local => timed_layer(
            ChronoLocal::new(LOCAL_STAMP.into()),
            writer,
            filter,
            from_env,
            ansi,
        ),
        TimeFormat::Utc => {
            timed_layer(ChronoUtc::new(UTC_STAMP.into()), writer, filter, from_env, ansi)
        }
        TimeFormat::Rfc3339 => {
            timed_layer(ChronoLocal::rfc_3339(), writer, filter, from_env, ansi)
        }
    }
}

fn sinks(opts: &LogOptions<'_>) -> anyhow::Result<Vec<BoxedLayer>> {
    let mut layers = Vec::new();
    if opts.console {
        let filter = sink_filter(CONSOLE_VAR, opts.level)?;
        layers.push(sink_layer(std::io::stderr, filter, opts.time_format, opts.colour));
    }
    if let Some(path) = opts.file {
        let file = File::create(path)
            .with_context(|| format!("could not create log file {}", path.display()))?;
        let var = if std::env::var_os(FILE_DETAIL_VAR).is_some() {
            FILE_DETAIL_VAR
        } else {
            CONSOLE_VAR
        };
        let filter = sink_filter(var, opts.level)?;
        layers.push(sink_layer(Arc::new(file), filter, opts.time_format, false));
    }
    Ok(layers)
}

/// Installs the global log subscriber.
///
/// Only the first call in a process has any effect. If this fails nothing is logged,
/// so the caller must report the error some other way.
pub(crate) fn setup(opts: &LogOptions<'_>) -> anyhow::Result<()> {
    if INSTALLED.swap(true, Ordering::Relaxed) {
        tracing::warn!("logging was already set up");
        return Ok(());
    }
    tracing_subscriber::registry().with(sinks(opts)?).init();
    Ok(())
}

pub(crate) fn is_initialized() -> bool {
    INSTALLED.load(Ordering::Relaxed)
}
