//! File service method definitions
// (c) 2025 qfs contributors
//!
//! ### ListFiles
//! * C ➡️ S: [`ListFilesRequest`]
//! * S ➡️ C: one [`ListFilesResponse`], then the trailer
//!
//! ### Download
//! * C ➡️ S: [`DownloadRequest`]
//! * S ➡️ C: any number of [`DownloadResponse`], then the trailer.
//!   Concatenating the chunks in stream order yields the file content.
//!   An unknown file is reported as `NotFound` in the trailer, with no chunks.
//!
//! ### Upload
//! * C ➡️ S: any number of [`UploadRequest`], then finish
//! * S ➡️ C: one [`UploadResponse`] giving the total number of bytes received, then the trailer
//!
//! ### UploadAndNotifyProgress
//! * C ➡️ S: any number of [`UploadAndNotifyProgressRequest`], then finish
//! * S ➡️ C: any number of [`UploadAndNotifyProgressResponse`], then the trailer.
//!
//! The two directions are independent. There is no defined correlation between a chunk
//! sent and a progress message received.

use serde::{Deserialize, Serialize};
use serde_bare::Uint;

use super::common::ProtocolMessage;
use super::rpc::{DataChunk, Method, Rpc};

/// Wire limit of messages carrying file data
pub const DATA_WIRE_ENCODING_LIMIT: u32 = 1_048_576;

/// The largest chunk which fits in a data-carrying request.
///
/// The difference from [`DATA_WIRE_ENCODING_LIMIT`] is room for the length prefix.
pub const MAX_CHUNK_SIZE: u32 = DATA_WIRE_ENCODING_LIMIT - 16;

/// Request for [`ListFiles`]
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, Copy, Default)]
pub struct ListFilesRequest {
    /// Reserved for future use. Send 0.
    pub extension: u8,
}
impl ProtocolMessage for ListFilesRequest {
    const WIRE_ENCODING_LIMIT: u32 = 64;
}

/// Response to [`ListFiles`]
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, Default)]
pub struct ListFilesResponse {
    /// Names of the files held by the server
    pub filenames: Vec<String>,
}
impl ProtocolMessage for ListFilesResponse {}

/// Request for [`Download`]
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
pub struct DownloadRequest {
    /// Name of the file to retrieve. Must not be empty.
    pub filename: String,
}
impl ProtocolMessage for DownloadRequest {
    const WIRE_ENCODING_LIMIT: u32 = 65_536;
}

/// One chunk of a [`Download`]
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
pub struct DownloadResponse {
    /// File data
    pub data: Vec<u8>,
}
impl ProtocolMessage for DownloadResponse {
    const WIRE_ENCODING_LIMIT: u32 = DATA_WIRE_ENCODING_LIMIT;
}

/// One chunk of an [`Upload`]
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
pub struct UploadRequest {
    /// File data
    pub data: Vec<u8>,
}
impl ProtocolMessage for UploadRequest {
    const WIRE_ENCODING_LIMIT: u32 = DATA_WIRE_ENCODING_LIMIT;
}
impl DataChunk for UploadRequest {
    fn from_chunk(data: Vec<u8>) -> Self {
        Self { data }
    }
    fn chunk(&self) -> &[u8] {
        &self.data
    }
}

/// Response to [`Upload`]
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
pub struct UploadResponse {
    /// Total number of bytes the server received
    pub size: Uint,
}
impl ProtocolMessage for UploadResponse {
    const WIRE_ENCODING_LIMIT: u32 = 64;
}

/// One chunk of an [`UploadAndNotifyProgress`]
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
pub struct UploadAndNotifyProgressRequest {
    /// File data
    pub data: Vec<u8>,
}
impl ProtocolMessage for UploadAndNotifyProgressRequest {
    const WIRE_ENCODING_LIMIT: u32 = DATA_WIRE_ENCODING_LIMIT;
}
impl DataChunk for UploadAndNotifyProgressRequest {
    fn from_chunk(data: Vec<u8>) -> Self {
        Self { data }
    }
    fn chunk(&self) -> &[u8] {
        &self.data
    }
}

/// A progress message from [`UploadAndNotifyProgress`]
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
pub struct UploadAndNotifyProgressResponse {
    /// Human-readable status
    pub msg: String,
}
impl ProtocolMessage for UploadAndNotifyProgressResponse {
    const WIRE_ENCODING_LIMIT: u32 = 65_536;
}

/// Marker for the `ListFiles` method
#[derive(Debug, Clone, Copy)]
pub struct ListFiles;
impl Rpc for ListFiles {
    const METHOD: Method = Method::ListFiles;
    type Request = ListFilesRequest;
    type Response = ListFilesResponse;
}

/// Marker for the `Download` method
#[derive(Debug, Clone, Copy)]
pub struct Download;
impl Rpc for Download {
    const METHOD: Method = Method::Download;
    type Request = DownloadRequest;
    type Response = DownloadResponse;

    fn check_request(request: &DownloadRequest) -> Result<(), String> {
        if request.filename.is_empty() {
            return Err("filename must not be empty".into());
        }
        Ok(())
    }
}

/// Marker for the `Upload` method
#[derive(Debug, Clone, Copy)]
pub struct Upload;
impl Rpc for Upload {
    const METHOD: Method = Method::Upload;
    type Request = UploadRequest;
    type Response = UploadResponse;
}

/// Marker for the `UploadAndNotifyProgress` method
#[derive(Debug, Clone, Copy)]
pub struct UploadAndNotifyProgress;
impl Rpc for UploadAndNotifyProgress {
    const METHOD: Method = Method::UploadAndNotifyProgress;
    type Request = UploadAndNotifyProgressRequest;
    type Response = UploadAndNotifyProgressResponse;
}
