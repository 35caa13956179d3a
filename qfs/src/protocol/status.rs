//! Call status codes and the status trailer
// (c) 2025 qfs contributors

use serde::{Deserialize, Serialize};
use serde_bare::Uint;
use std::fmt::Display;

use super::common::ProtocolMessage;

/// Machine-readable codes advising of the outcome of a call.
///
/// The numbering follows the status codes conventionally used by RPC systems, so that
/// servers written against other stacks map onto it naturally.
///
/// On the wire a code travels as a [`Uint`] inside [`Status`], so a peer may send values we
/// do not know. See [`Status::code`], which copes with that.
#[derive(
    PartialEq,
    Eq,
    Debug,
    Clone,
    Copy,
    Hash,
    strum_macros::Display,
    strum_macros::FromRepr,
    strum_macros::EnumIter,
)]
#[allow(missing_docs)]
#[non_exhaustive]
pub enum Code {
    Ok = 0,
    Cancelled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

impl From<Code> for Uint {
    fn from(value: Code) -> Self {
        Self(value as u64)
    }
}

impl PartialEq<Uint> for Code {
    fn eq(&self, other: &Uint) -> bool {
        *self as u64 == other.0
    }
}

impl PartialEq<Code> for Uint {
    fn eq(&self, other: &Code) -> bool {
        self.0 == *other as u64
    }
}

/// The terminal outcome of a call, as sent by the server in the stream trailer.
///
/// Errors raised locally (transport failures, deadline expiry) are expressed as a `Status`
/// too, so every classified failure carries a code rather than relying on message text.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, thiserror::Error)]
pub struct Status {
    /// Outcome of the call. This is a [`Code`], but may be outside of the set of values we know.
    pub code: Uint,
    /// A human-readable message giving more information, if any is pertinent
    pub message: Option<String>,
}

impl ProtocolMessage for Status {
    const WIRE_ENCODING_LIMIT: u32 = 65_536;
}

impl Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = match Code::from_repr(usize::try_from(self.code.0).unwrap_or(usize::MAX)) {
            Some(c) => c.to_string(),
            None => format!("Unknown status code {}", self.code.0),
        };
        match &self.message {
            Some(msg) => write!(f, "{code}: {msg}"),
            None => write!(f, "{code}"),
        }
    }
}

impl Status {
    /// Constructor
    pub fn new<S: Into<String>>(code: Code, message: S) -> Self {
        Self {
            code: code.into(),
            message: Some(message.into()),
        }
    }

    /// A successful outcome, with no message
    #[must_use]
    pub fn ok() -> Self {
        Self {
            code: Code::Ok.into(),
            message: None,
        }
    }

    /// Interprets the code. Values we do not recognise are reported as [`Code::Unknown`].
    #[must_use]
    pub fn code(&self) -> Code {
        usize::try_from(self.code.0)
            .ok()
            .and_then(Code::from_repr)
            .unwrap_or(Code::Unknown)
    }

    /// Was this a successful outcome?
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.code == Code::Ok
    }
}

impl From<Code> for Status {
    fn from(code: Code) -> Self {
        Self {
            code: code.into(),
            message: None,
        }
    }
}
