//! Configuration structure
// (c) 2025 qfs contributors

use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Result, ensure};
use clap::Args;
use serde::{Deserialize, Serialize};

use crate::call::StreamOptions;
use crate::client::BearerToken;
use crate::protocol::file_service::MAX_CHUNK_SIZE;
use crate::util::TimeFormat;

/// The set of configurable options supported by qfs.
///
/// In configuration files and environment variables, field names are `snake_case`
/// (`chunk_size`, `QFS_CHUNK_SIZE`). On the command line they are kebab-case (`--chunk-size`).
///
/// There is no `default()`. The hard-wired defaults are [`Configuration::system_default()`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Configuration {
    /// Address of the file service, as `host:port`
    pub address: String,
    /// Use TLS (QUIC). If false, calls are made in plaintext over TCP.
    pub tls: bool,
    /// CA certificate (PEM file) against which to check the server's certificate.
    /// Required when `tls` is set.
    pub ca_cert: String,
    /// TLS server name to check the certificate against, if it differs from the host in `address`
    pub server_name: String,
    /// Bearer token to attach to calls. Empty means none.
    pub token: String,
    /// Upload chunk size, in bytes
    pub chunk_size: u32,
    /// Delay between upload chunks, in milliseconds
    pub pacing_ms: u64,
    /// Time budget for list and download calls, in seconds. 0 means none.
    pub timeout: u64,
    /// Time budget for upload calls, in seconds. 0 means none.
    pub upload_timeout: u64,
    /// Connection setup timeout, in seconds
    pub connect_timeout: u64,
    /// Base directory for relative upload paths. Empty means the current directory.
    pub local_dir: String,
    /// Format of log timestamps
    pub time_format: TimeFormat,
}

static SYSTEM_DEFAULT_CONFIG: LazyLock<Configuration> = LazyLock::new(|| Configuration {
    address: "localhost:50051".into(),
    tls: true,
    ca_cert: String::new(),
    server_name: String::new(),
    token: String::new(),
    chunk_size: 5,
    pacing_ms: 1000,
    timeout: 10,
    upload_timeout: 0,
    connect_timeout: 5,
    local_dir: String::new(),
    time_format: TimeFormat::Local,
});

fn seconds(s: u64) -> Option<Duration> {
    (s > 0).then(|| Duration::from_secs(s))
}

impl Configuration {
    /// Hard-wired configuration defaults
    #[must_use]
    pub fn system_default() -> &'static Self {
        &SYSTEM_DEFAULT_CONFIG
    }

    /// Performs semantic checks which deserialization cannot
    pub fn validate(&self) -> Result<()> {
        ensure!(!self.address.is_empty(), "address must not be empty");
        ensure!(
            self.chunk_size > 0 && self.chunk_size <= MAX_CHUNK_SIZE,
            "chunk_size ({}) must be between 1 and {MAX_CHUNK_SIZE}",
            self.chunk_size
        );
        ensure!(
            !self.tls || !self.ca_cert.is_empty(),
            "TLS requires a CA certificate (ca_cert)"
        );
        ensure!(self.connect_timeout > 0, "connect_timeout must be positive");
        Ok(())
    }

    /// Time budget for list and download calls
    #[must_use]
    pub fn call_timeout(&self) -> Option<Duration> {
        seconds(self.timeout)
    }

    /// Time budget for upload calls
    #[must_use]
    pub fn upload_call_timeout(&self) -> Option<Duration> {
        seconds(self.upload_timeout)
    }

    /// Connection setup timeout
    #[must_use]
    pub fn connect_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    /// Stream writer settings
    #[must_use]
    pub fn stream_options(&self) -> StreamOptions {
        StreamOptions {
            chunk_size: self.chunk_size as usize,
            pacing: Duration::from_millis(self.pacing_ms),
        }
    }

    /// The configured credential, if any
    #[must_use]
    pub fn bearer_token(&self) -> Option<BearerToken> {
        (!self.token.is_empty()).then(|| BearerToken::new(self.token.as_str()))
    }
}

/// Configuration options which may be given on the command line.
///
/// Unset options do not override lower priority sources.
/// The token is deliberately absent; command lines are too easily seen by other users.
#[derive(Debug, Clone, Default, PartialEq, Eq, Args, Serialize)]
pub struct ConfigurationOverrides {
    /// Address of the file service [default: localhost:50051]
    #[arg(short, long, value_name = "host:port", help_heading("Connection"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    /// Connect in plaintext (TCP) instead of TLS (QUIC)
    #[arg(long, help_heading("Connection"))]
    #[serde(rename = "tls", skip_serializing_if = "is_false", serialize_with = "invert")]
    pub plaintext: bool,

    /// CA certificate (PEM) to check the server's certificate against
    #[arg(long, value_name = "FILE", help_heading("Connection"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<String>,

    /// TLS server name, if it differs from the host in the address
    #[arg(long, value_name = "NAME", help_heading("Connection"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,

    /// Connection setup timeout in seconds [default: 5]
    #[arg(long, value_name = "sec", help_heading("Connection"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_timeout: Option<u64>,

    /// Upload chunk size in bytes [default: 5]
    #[arg(long, value_name = "bytes", help_heading("Transfer"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<u32>,

    /// Delay between upload chunks in milliseconds [default: 1000]
    #[arg(long, value_name = "ms", help_heading("Transfer"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pacing_ms: Option<u64>,

    /// Time budget for list and download calls in seconds, 0 for none [default: 10]
    #[arg(long, value_name = "sec", help_heading("Transfer"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    /// Time budget for uploads in seconds, 0 for none [default: 0]
    #[arg(long, value_name = "sec", help_heading("Transfer"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_timeout: Option<u64>,

    /// Base directory for relative upload paths
    #[arg(long, value_name = "DIR", help_heading("Transfer"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_dir: Option<String>,

    /// Format of log timestamps [default: local]
    #[arg(long, value_name = "FORMAT", help_heading("Output"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_format: Option<TimeFormat>,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(b: &bool) -> bool {
    !*b
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn invert<S: serde::Serializer>(plaintext: &bool, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_bool(!*plaintext)
}
