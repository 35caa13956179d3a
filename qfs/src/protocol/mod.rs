// (c) 2025 qfs contributors
//! # 📖 The qfs wire protocol
//!
//! qfs speaks a small streaming RPC protocol to a remote file service.
//!
//! Each call occupies one bidirectional byte stream:
//! a QUIC stream on a shared connection in encrypted mode, or a dedicated TCP connection in plaintext mode.
//! See [transport](crate::transport).
//!
//! * Every message on the wire is framed and encoded as described in [common].
//! * The call envelope (method selection, metadata, status trailer) is described in [rpc].
//! * Call outcomes are expressed as a [`Status`](status::Status), described in [status].
//! * The methods of the file service, and their messages, are described in [`file_service`].
//!
//! ## Call shapes
//!
//! | Method | Requests | Responses |
//! |---|---|---|
//! | ListFiles | one | one |
//! | Download | one | stream |
//! | Upload | stream | one |
//! | UploadAndNotifyProgress | stream | stream |
//!
//! Within one direction of a stream, message order is preserved.
//! There is no ordering between the two directions.

pub mod common;
pub mod file_service;
pub mod rpc;
pub mod status;

#[cfg(test)]
pub(crate) mod test_helpers;
