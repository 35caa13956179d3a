//! Stream Reader: consumes the server-to-client side of a call
// (c) 2025 qfs contributors

use std::marker::PhantomData;
use std::time::Duration;

use futures_util::Stream;
use tracing::trace;

use super::context::Expiry;
use super::error::CallError;
use crate::protocol::common::{BoxedRecv, ProtocolMessage};
use crate::protocol::rpc::Frame;
use crate::protocol::status::{Code, Status};
use crate::transport::StreamGuard;

/// The receiving side of a call: a lazy, forward-only sequence of response messages.
///
/// Messages are delivered one at a time as they arrive.
/// The sequence ends at the server's status trailer: with `Ok(None)` if the status was OK,
/// or with the classified error otherwise. After that (or after any error) the stream handle
/// has been released and every further read returns `Ok(None)` without touching it.
#[derive(Debug)]
pub struct Streaming<T> {
    recv: Option<BoxedRecv>,
    guard: Option<StreamGuard>,
    expiry: Expiry,
    received: u64,
    trailer_seen: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T: ProtocolMessage> Streaming<T> {
    pub(crate) fn new(recv: BoxedRecv, expiry: Expiry, guard: StreamGuard) -> Self {
        Self {
            recv: Some(recv),
            guard: Some(guard),
            expiry,
            received: 0,
            trailer_seen: false,
            _marker: PhantomData,
        }
    }

    /// Receives the next message.
    ///
    /// * `Ok(Some(msg))`: a message arrived
    /// * `Ok(None)`: the call completed successfully (or had already finished)
    /// * `Err(e)`: the call failed; this is its one terminal outcome
    pub async fn message(&mut self) -> Result<Option<T>, CallError> {
        let Some(recv) = self.recv.as_mut() else {
            return Ok(None);
        };
        let outcome = match self
            .expiry
            .run(Frame::<T>::from_reader_async_framed_or_eof(recv))
            .await
        {
            Ok(Ok(Some(Frame::Message(msg)))) => {
                self.received += 1;
                trace!("received message {}", self.received);
                return Ok(Some(msg));
            }
            Ok(Ok(Some(Frame::Trailer(status)))) => {
                self.trailer_seen = true;
                if status.is_ok() {
                    Ok(None)
                } else {
                    Err(CallError::Status(status))
                }
            }
            Ok(Ok(None)) => Err(CallError::Status(Status::new(
                Code::Unavailable,
                "stream ended without a status",
            ))),
            Ok(Err(e)) => Err(CallError::transport(&e)),
            Err(expired) => Err(CallError::Status(expired)),
        };
        self.release(outcome.is_err());
        outcome
    }

    /// Receives exactly one message, followed by a successful trailer
    pub(crate) async fn single(mut self) -> Result<T, CallError> {
        let Some(msg) = self.message().await? else {
            return Err(CallError::protocol("call completed without a response"));
        };
        match self.message().await? {
            None => Ok(msg),
            Some(_) => {
                self.release(true);
                Err(CallError::protocol("call sent more than one response"))
            }
        }
    }

    /// Waits briefly for the server's verdict on a call whose sending side has failed.
    ///
    /// Returns the status from the trailer, if one arrives in time and it is not OK.
    /// Any messages before the trailer are discarded.
    pub(crate) async fn server_verdict(&mut self, grace: Duration) -> Option<Status> {
        let wait = async {
            loop {
                match self.message().await {
                    Ok(Some(_)) => (),
                    Ok(None) => return None,
                    Err(e) => {
                        return if self.trailer_seen {
                            e.status().cloned()
                        } else {
                            None
                        };
                    }
                }
            }
        };
        tokio::time::timeout(grace, wait).await.ok().flatten()
    }

    /// Did the server deliver its status trailer?
    pub(crate) fn trailer_seen(&self) -> bool {
        self.trailer_seen
    }

    /// The number of messages received so far
    #[must_use]
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Has the call reached its terminal state?
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.recv.is_none()
    }

    /// Releases the stream handle. An abandoned stream is aborted.
    fn release(&mut self, abort: bool) {
        if let Some(mut recv) = self.recv.take() {
            if abort {
                recv.abort();
            }
            drop(recv);
        }
        drop(self.guard.take());
    }

    /// Converts into a [`Stream`] of messages.
    ///
    /// The stream yields `Err` at most once, and then ends.
    pub fn into_stream(self) -> impl Stream<Item = Result<T, CallError>> + Send {
        futures_util::stream::unfold(self, |mut s| async move {
            match s.message().await {
                Ok(Some(msg)) => Some((Ok(msg), s)),
                Ok(None) => None,
                Err(e) => Some((Err(e), s)),
            }
        })
    }
}

impl<T> Drop for Streaming<T> {
    fn drop(&mut self) {
        if let Some(mut recv) = self.recv.take() {
            trace!("abandoning unfinished response stream");
            recv.abort();
        }
    }
}
