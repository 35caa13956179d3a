//! Call envelope shared by every method
// (c) 2025 qfs contributors
//!
//! Every call runs over one bidirectional stream, which carries nothing else.
//!
//! * Client ➡️ Server: (opens stream)
//! * C ➡️ S : [`CallHeader`], naming the method and carrying metadata and the remaining time budget.
//! * C ➡️ S : zero or more request messages, one frame each.
//!   The client signals end of input by finishing (half-closing) its send side.
//! * S ➡️ C : zero or more [`Frame::Message`], then exactly one [`Frame::Trailer`].
//!   The server finishes its send side after the trailer.
//!
//! The trailer carries the terminal [`Status`] of the call.
//! A stream which ends without a trailer means the call was lost in transit.
//!
//! How many request and response messages a method carries depends on its [`CallShape`].

use serde::{Deserialize, Serialize};
use serde_bare::Uint;
use std::collections::BTreeMap;

use super::common::ProtocolMessage;
use super::status::Status;

/// The number of messages which flow in each direction of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum CallShape {
    /// One request, one response
    Unary,
    /// One request, a stream of responses
    ServerStreaming,
    /// A stream of requests, one response
    ClientStreaming,
    /// A stream in each direction
    Bidirectional,
}

/// The methods offered by the file service
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, Copy, Hash, strum_macros::Display)]
pub enum Method {
    /// Lists the files held by the server
    ListFiles,
    /// Retrieves one file, in chunks
    Download,
    /// Stores a file sent in chunks; the server reports how much it received
    Upload,
    /// As [`Method::Upload`], with progress messages flowing back while the upload runs
    UploadAndNotifyProgress,
}

impl Method {
    /// The shape of calls to this method
    #[must_use]
    pub fn shape(self) -> CallShape {
        match self {
            Method::ListFiles => CallShape::Unary,
            Method::Download => CallShape::ServerStreaming,
            Method::Upload => CallShape::ClientStreaming,
            Method::UploadAndNotifyProgress => CallShape::Bidirectional,
        }
    }
}

/// Call metadata: header name to value.
///
/// Names are conventionally lower case.
pub type Metadata = BTreeMap<String, String>;

/// The first message of every call, client to server
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
pub struct CallHeader {
    /// Method being invoked
    pub method: Method,
    /// Outgoing metadata, e.g. `authorization`
    pub metadata: Metadata,
    /// Remaining time budget for the call, in milliseconds, if it has a deadline
    pub timeout_ms: Option<Uint>,
}

impl ProtocolMessage for CallHeader {
    const WIRE_ENCODING_LIMIT: u32 = 65_536;
}

impl CallHeader {
    /// Constructor
    #[must_use]
    pub fn new(method: Method, metadata: Metadata, timeout_ms: Option<u64>) -> Self {
        Self {
            method,
            metadata,
            timeout_ms: timeout_ms.map(Uint),
        }
    }
}

/// A server to client message: either a response message, or the trailer which ends the call
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
pub enum Frame<T> {
    /// A response message
    Message(T),
    /// The terminal status of the call
    Trailer(Status),
}

impl<T: ProtocolMessage> ProtocolMessage for Frame<T> {
    // Room for the enum tag and for a trailer
    const WIRE_ENCODING_LIMIT: u32 = {
        let inner = T::WIRE_ENCODING_LIMIT + 16;
        if inner > Status::WIRE_ENCODING_LIMIT + 16 {
            inner
        } else {
            Status::WIRE_ENCODING_LIMIT + 16
        }
    };
}

/// Binds a method to its request and response types.
///
/// Implemented by zero-sized marker types, so that calls are strongly typed per method.
pub trait Rpc: Send + Sync + 'static {
    /// Method identifier sent in the [`CallHeader`]
    const METHOD: Method;
    /// Request message type
    type Request: ProtocolMessage + 'static;
    /// Response message type
    type Response: ProtocolMessage + 'static;

    /// Rejects a request which must not be sent, describing the problem
    fn check_request(_request: &Self::Request) -> Result<(), String> {
        Ok(())
    }
}

/// A request message which carries a chunk of raw bytes
pub trait DataChunk: ProtocolMessage + Sized {
    /// Wraps a chunk
    fn from_chunk(data: Vec<u8>) -> Self;
    /// Returns the chunk
    fn chunk(&self) -> &[u8];
}
