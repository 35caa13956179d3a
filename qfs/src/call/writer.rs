//! Stream Writer: produces the client-to-server side of a call
// (c) 2025 qfs contributors

use std::marker::PhantomData;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt as _, AsyncWriteExt as _};
use tracing::{debug, trace};

use super::context::Expiry;
use super::error::CallError;
use crate::protocol::common::{BoxedSend, ProtocolMessage};
use crate::protocol::file_service::MAX_CHUNK_SIZE;
use crate::protocol::rpc::DataChunk;
use crate::protocol::status::{Code, Status};

/// Tuning for the [`StreamWriter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamOptions {
    /// Maximum bytes per request message
    pub chunk_size: usize,
    /// Delay between consecutive sends
    pub pacing: Duration,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            chunk_size: 5,
            pacing: Duration::from_secs(1),
        }
    }
}

impl StreamOptions {
    /// Checks that the options are usable
    pub fn validate(&self) -> Result<(), CallError> {
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE as usize {
            return Err(CallError::InvalidArgument(format!(
                "chunk size {} must be between 1 and {MAX_CHUNK_SIZE}",
                self.chunk_size
            )));
        }
        Ok(())
    }
}

/// The sending side of a call.
///
/// Once finished (half-closed) it is consumed, so it can never be written to again.
/// If it is dropped without being finished, the stream is reset so the server does not
/// mistake an abandoned upload for a complete one.
#[derive(Debug)]
pub struct CallSender<T> {
    send: Option<BoxedSend>,
    expiry: Expiry,
    sent: u64,
    _marker: PhantomData<fn(T)>,
}

impl<T: ProtocolMessage> CallSender<T> {
    pub(crate) fn new(send: BoxedSend, expiry: Expiry) -> Self {
        Self {
            send: Some(send),
            expiry,
            sent: 0,
            _marker: PhantomData,
        }
    }

    pub(crate) fn expiry(&self) -> &Expiry {
        &self.expiry
    }

    /// Sends any protocol message, framed
    pub(crate) async fn send_raw<M: ProtocolMessage>(&mut self, msg: &M) -> Result<(), CallError> {
        let Some(send) = self.send.as_mut() else {
            return Err(Status::new(Code::FailedPrecondition, "stream is closed for sending").into());
        };
        match self.expiry.run(msg.to_writer_async_framed(send)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                self.abort();
                Err(CallError::transport(&e))
            }
            Err(expired) => {
                self.abort();
                Err(expired.into())
            }
        }
    }

    /// Sends one request message.
    ///
    /// Returns when the message has been handed to the transport; the next send may then proceed.
    pub async fn send(&mut self, msg: &T) -> Result<(), CallError> {
        self.send_raw(msg).await?;
        self.sent += 1;
        trace!("sent message {}", self.sent);
        Ok(())
    }

    /// Signals end of input (half-close). The receiving side of the call remains open.
    pub async fn finish(mut self) -> Result<(), CallError> {
        let Some(mut send) = self.send.take() else {
            return Err(Status::new(Code::FailedPrecondition, "stream is closed for sending").into());
        };
        match self.expiry.run(send.shutdown()).await {
            Ok(Ok(())) => {
                debug!("finished sending after {} message(s)", self.sent);
                Ok(())
            }
            Ok(Err(e)) => {
                send.abort();
                Err(CallError::transport(&e.into()))
            }
            Err(expired) => {
                send.abort();
                Err(expired.into())
            }
        }
    }

    /// Abruptly terminates the sending side
    pub fn abort(&mut self) {
        if let Some(mut send) = self.send.take() {
            debug!("aborting send stream after {} message(s)", self.sent);
            send.abort();
        }
    }

    /// The number of messages sent so far
    #[must_use]
    pub fn sent(&self) -> u64 {
        self.sent
    }
}

impl<T> Drop for CallSender<T> {
    fn drop(&mut self) {
        if let Some(mut send) = self.send.take() {
            trace!("abandoning unfinished send stream");
            send.abort();
        }
    }
}

/// What a [`StreamWriter`] sent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, derive_more::Display)]
#[display("{bytes} bytes in {chunks} chunk(s)")]
pub struct WriteSummary {
    /// Number of chunk messages sent
    pub chunks: u64,
    /// Total bytes of chunk data sent
    pub bytes: u64,
}

/// Segments a byte source into chunks and sends them, in order, on a call.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamWriter {
    options: StreamOptions,
}

impl StreamWriter {
    /// Constructor. Fails if the options are unusable.
    pub fn new(options: StreamOptions) -> Result<Self, CallError> {
        options.validate()?;
        Ok(Self { options })
    }

    /// Accessor
    #[must_use]
    pub fn options(&self) -> &StreamOptions {
        &self.options
    }

    /// Reads `source` to exhaustion, sending each chunk as a request message.
    ///
    /// Each send completes before the next chunk is read. The configured pacing delay
    /// separates consecutive sends. This does not finish the sending side; the caller decides
    /// what happens next.
    ///
    /// `source` is consumed and released on every exit path. Any failure aborts the sending side.
    pub async fn pump<T, S>(
        &self,
        mut source: S,
        sender: &mut CallSender<T>,
    ) -> Result<WriteSummary, CallError>
    where
        T: DataChunk,
        S: AsyncRead + Unpin + Send,
    {
        let mut summary = WriteSummary::default();
        loop {
            let expiry = sender.expiry().clone();
            let chunk = match expiry
                .run(read_chunk(&mut source, self.options.chunk_size))
                .await
            {
                Ok(Ok(chunk)) => chunk,
                Ok(Err(e)) => {
                    sender.abort();
                    return Err(CallError::local(e));
                }
                Err(expired) => {
                    sender.abort();
                    return Err(expired.into());
                }
            };
            if chunk.is_empty() {
                break;
            }
            if summary.chunks > 0
                && !self.options.pacing.is_zero()
                && let Err(expired) = expiry.run(tokio::time::sleep(self.options.pacing)).await
            {
                sender.abort();
                return Err(expired.into());
            }
            let len = chunk.len() as u64;
            sender.send(&T::from_chunk(chunk)).await?;
            summary.chunks += 1;
            summary.bytes += len;
        }
        debug!("source exhausted: sent {summary}");
        Ok(summary)
    }
}

/// Reads up to `size` bytes, stopping short only at end of input
async fn read_chunk<S>(source: &mut S, size: usize) -> std::io::Result<Vec<u8>>
where
    S: AsyncRead + Unpin + Send,
{
    let mut buf = vec![0u8; size];
    let mut filled = 0;
    while filled < size {
        let n = source.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(buf)
}
