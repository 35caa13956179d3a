//! Call errors and their classification
// (c) 2025 qfs contributors

use std::io::ErrorKind;

use tracing::debug;

use crate::protocol::status::{Code, Status};

/// The caller-actionable category of a failed call
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum ErrorClass {
    /// The server reports that the requested resource does not exist. Not retryable.
    NotFound,
    /// The call's time budget elapsed before it completed. May be retried.
    DeadlineExceeded,
    /// Any other failure reported by or attributed to the remote side or the network
    Transport,
    /// The call could not be made, or was abandoned, because of a local problem
    Local,
}

/// The terminal failure of one call.
///
/// Each call produces at most one of these. The classification ([`CallError::class`]) is
/// derived from the status code attached to the failure, never from message text.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    /// The caller supplied an unusable argument; nothing was sent
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Local I/O failed, e.g. reading the upload source
    #[error("local I/O error: {0}")]
    LocalIo(#[source] std::io::Error),
    /// The call failed with a status, from the server or synthesised locally for transport failures and expiry
    #[error(transparent)]
    Status(#[from] Status),
}

impl CallError {
    /// Classifies this error
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            CallError::InvalidArgument(_) | CallError::LocalIo(_) => ErrorClass::Local,
            CallError::Status(s) => match s.code() {
                Code::NotFound => ErrorClass::NotFound,
                Code::DeadlineExceeded => ErrorClass::DeadlineExceeded,
                _ => ErrorClass::Transport,
            },
        }
    }

    /// The status attached to the failure, if there was one
    #[must_use]
    pub fn status(&self) -> Option<&Status> {
        match self {
            CallError::Status(s) => Some(s),
            _ => None,
        }
    }

    /// The status code attached to the failure, if there was one
    #[must_use]
    pub fn code(&self) -> Option<Code> {
        self.status().map(Status::code)
    }

    /// Might the call succeed if repeated?
    ///
    /// This is advisory; nothing in this crate retries on its own.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.code(),
            Some(Code::DeadlineExceeded | Code::Unavailable)
        )
    }

    /// Wraps a failure to read or write local data
    pub(crate) fn local(e: std::io::Error) -> Self {
        CallError::LocalIo(e)
    }

    /// Classifies a failure observed while operating the call's stream
    pub(crate) fn transport(e: &anyhow::Error) -> Self {
        let status = classify(e);
        debug!("transport failure classified as {status}: {e:#}");
        CallError::Status(status)
    }

    /// A protocol violation by the server
    pub(crate) fn protocol(msg: &str) -> Self {
        CallError::Status(Status::new(Code::Internal, msg))
    }

    /// Is this a failure of the stream itself, rather than a verdict or a local problem?
    ///
    /// Such failures are worth a brief wait for the server's trailer, which may explain them.
    pub(crate) fn is_stream_failure(&self) -> bool {
        matches!(self.code(), Some(Code::Unavailable | Code::Unknown))
    }
}

/// Maps a low-level stream failure to a [`Status`].
///
/// This works by inspecting the error chain for known error types. Errors we cannot
/// place become [`Code::Unknown`], with the original message preserved for humans.
#[must_use]
pub fn classify(e: &anyhow::Error) -> Status {
    for cause in e.chain() {
        if let Some(s) = cause.downcast_ref::<Status>() {
            return s.clone();
        }
        if let Some(ce) = cause.downcast_ref::<quinn::ConnectionError>() {
            return classify_connection(ce);
        }
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            return classify_io(io);
        }
        if cause.downcast_ref::<serde_bare::error::Error>().is_some() {
            return Status::new(Code::Internal, format!("undecodable message: {e:#}"));
        }
    }
    Status::new(Code::Unknown, format!("{e:#}"))
}

fn classify_connection(e: &quinn::ConnectionError) -> Status {
    use quinn::ConnectionError as CE;
    let code = match e {
        CE::TimedOut | CE::Reset | CE::ConnectionClosed(_) | CE::ApplicationClosed(_) => {
            Code::Unavailable
        }
        CE::LocallyClosed => Code::Cancelled,
        CE::VersionMismatch | CE::TransportError(_) => Code::Internal,
        _ => Code::Unknown,
    };
    Status::new(code, e.to_string())
}

fn classify_io(e: &std::io::Error) -> Status {
    // quinn stream errors arrive wrapped in io::Error
    if let Some(inner) = e.get_ref() {
        if let Some(re) = inner.downcast_ref::<quinn::ReadError>() {
            return classify_read(re);
        }
        if let Some(we) = inner.downcast_ref::<quinn::WriteError>() {
            return classify_write(we);
        }
    }
    let msg = match e.kind() {
        ErrorKind::UnexpectedEof => format!("stream ended part-way through a message: {e}"),
        _ => e.to_string(),
    };
    Status::new(Code::Unavailable, msg)
}

fn classify_read(e: &quinn::ReadError) -> Status {
    match e {
        quinn::ReadError::ConnectionLost(ce) => classify_connection(ce),
        _ => Status::new(Code::Unavailable, e.to_string()),
    }
}

fn classify_write(e: &quinn::WriteError) -> Status {
    match e {
        quinn::WriteError::ConnectionLost(ce) => classify_connection(ce),
        _ => Status::new(Code::Unavailable, e.to_string()),
    }
}
