// (c) 2025 qfs contributors
//! 📞 The call layer: typed calls of every shape over a [`Session`](crate::transport::Session)
//!
//! * [`Invoker`] starts calls. Each takes a [`CallContext`] carrying its deadline,
//!   cancellation token and outgoing metadata.
//! * [`Streaming`] reads the server's side of a call, one message at a time.
//! * [`CallSender`] and [`StreamWriter`] produce the client's side.
//! * [`BidiCall::run`] drives both sides of a bidirectional call at once.
//! * Every failure is a [`CallError`], which [classifies](CallError::class) itself.
//!
//! A call's deadline and cancellation apply at every point where it may block.
//! When either fires, the call's stream is aborted and the call fails with
//! `DeadlineExceeded` (or `Cancelled`).
//!
//! ```no_run
//! use qfs::call::{CallContext, Invoker};
//! use qfs::protocol::file_service::{Download, DownloadRequest};
//! # async fn example(session: &qfs::transport::Session) -> Result<(), qfs::call::CallError> {
//! let request = DownloadRequest { filename: "notes.txt".into() };
//! let ctx = CallContext::new().with_timeout(std::time::Duration::from_secs(10));
//! let mut chunks = Invoker::new(session).server_streaming::<Download>(&request, ctx).await?;
//! while let Some(chunk) = chunks.message().await? {
//!     println!("{} bytes", chunk.data.len());
//! }
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

mod bidi;
mod context;
mod error;
mod invoker;
mod reader;
mod writer;

pub use bidi::BidiReport;
pub use context::{AUTHORIZATION, CallContext};
pub use error::{CallError, ErrorClass, classify};
pub use invoker::{BidiCall, ClientStreamingCall, Invoker};
pub use reader::Streaming;
pub use writer::{CallSender, StreamOptions, StreamWriter, WriteSummary};

/// How long to wait for the server's trailer after our sending side fails
pub(crate) const TRAILER_GRACE: Duration = Duration::from_millis(500);
