//! Call Invoker: starts calls of each shape on a session
// (c) 2025 qfs contributors

use tokio::io::AsyncRead;
use tracing::debug;

use super::bidi::{BidiReport, coordinate};
use super::context::CallContext;
use super::error::CallError;
use super::reader::Streaming;
use super::writer::{CallSender, StreamWriter};
use super::TRAILER_GRACE;
use crate::protocol::rpc::{CallHeader, CallShape, DataChunk, Rpc};
use crate::transport::Session;

/// Starts typed calls on a [`Session`].
///
/// The invoker never retries. A failed call surfaces immediately; the caller decides what to do.
#[derive(Debug, Clone, Copy)]
pub struct Invoker<'s> {
    session: &'s Session,
}

impl<'s> Invoker<'s> {
    /// Constructor
    #[must_use]
    pub fn new(session: &'s Session) -> Self {
        Self { session }
    }

    /// Opens the stream and sends the call header, which carries the metadata.
    ///
    /// A method can only be called in its own shape.
    async fn start<R: Rpc>(
        &self,
        shape: CallShape,
        ctx: CallContext,
    ) -> Result<(CallSender<R::Request>, Streaming<R::Response>), CallError> {
        if R::METHOD.shape() != shape {
            return Err(CallError::InvalidArgument(format!(
                "{} is a {} method, not {shape}",
                R::METHOD,
                R::METHOD.shape()
            )));
        }
        let (metadata, expiry) = ctx.into_parts();
        let (streams, guard) = match expiry.run(self.session.open_stream()).await {
            Ok(Ok(opened)) => opened,
            Ok(Err(e)) => return Err(CallError::transport(&e)),
            Err(expired) => return Err(expired.into()),
        };
        let header = CallHeader::new(R::METHOD, metadata, expiry.remaining_ms());
        debug!(
            "{} ({shape}) call started on {} ({} metadata entries)",
            R::METHOD,
            self.session.target(),
            header.metadata.len()
        );
        let receiver = Streaming::new(streams.recv, expiry.clone(), guard);
        let mut sender = CallSender::new(streams.send, expiry);
        sender.send_raw(&header).await?;
        Ok((sender, receiver))
    }

    /// Sends one request then half-closes
    async fn request<R: Rpc>(
        &self,
        shape: CallShape,
        request: &R::Request,
        ctx: CallContext,
    ) -> Result<Streaming<R::Response>, CallError> {
        R::check_request(request).map_err(CallError::InvalidArgument)?;
        let (mut sender, mut receiver) = self.start::<R>(shape, ctx).await?;
        let sent = match sender.send(request).await {
            Ok(()) => sender.finish().await,
            Err(e) => Err(e),
        };
        match sent {
            Ok(()) => Ok(receiver),
            Err(e) => Err(prefer_verdict(e, &mut receiver).await),
        }
    }

    /// Makes a unary call: one request, one response
    pub async fn unary<R: Rpc>(
        &self,
        request: &R::Request,
        ctx: CallContext,
    ) -> Result<R::Response, CallError> {
        self.request::<R>(CallShape::Unary, request, ctx)
            .await?
            .single()
            .await
    }

    /// Starts a server-streaming call: one request, then a lazy stream of responses
    pub async fn server_streaming<R: Rpc>(
        &self,
        request: &R::Request,
        ctx: CallContext,
    ) -> Result<Streaming<R::Response>, CallError> {
        self.request::<R>(CallShape::ServerStreaming, request, ctx)
            .await
    }

    /// Starts a client-streaming call
    pub async fn client_streaming<R: Rpc>(
        &self,
        ctx: CallContext,
    ) -> Result<ClientStreamingCall<R>, CallError> {
        let (sender, receiver) = self.start::<R>(CallShape::ClientStreaming, ctx).await?;
        Ok(ClientStreamingCall { sender, receiver })
    }

    /// Starts a bidirectional call
    pub async fn bidirectional<R: Rpc>(&self, ctx: CallContext) -> Result<BidiCall<R>, CallError> {
        let (sender, receiver) = self.start::<R>(CallShape::Bidirectional, ctx).await?;
        Ok(BidiCall { sender, receiver })
    }
}

/// After a stream failure on the sending side, the server's trailer may hold the real reason
async fn prefer_verdict<T>(e: CallError, receiver: &mut Streaming<T>) -> CallError
where
    T: crate::protocol::common::ProtocolMessage,
{
    if !e.is_stream_failure() {
        return e;
    }
    match receiver.server_verdict(TRAILER_GRACE).await {
        Some(status) => {
            debug!("send failed ({e}); server says {status}");
            CallError::Status(status)
        }
        None => e,
    }
}

/// A client-streaming call in progress: send any number of requests, then collect the single response
#[derive(Debug)]
pub struct ClientStreamingCall<R: Rpc> {
    sender: CallSender<R::Request>,
    receiver: Streaming<R::Response>,
}

impl<R: Rpc> ClientStreamingCall<R> {
    /// Sends one request message
    pub async fn send(&mut self, request: &R::Request) -> Result<(), CallError> {
        match self.sender.send(request).await {
            Ok(()) => Ok(()),
            Err(e) => Err(prefer_verdict(e, &mut self.receiver).await),
        }
    }

    /// Half-closes, then waits for the response
    pub async fn close_and_recv(self) -> Result<R::Response, CallError> {
        let Self {
            sender,
            mut receiver,
        } = self;
        if let Err(e) = sender.finish().await {
            return Err(prefer_verdict(e, &mut receiver).await);
        }
        receiver.single().await
    }

    /// Sends the whole of `source` in chunks, then waits for the response
    pub async fn send_all<S>(mut self, source: S, writer: &StreamWriter) -> Result<R::Response, CallError>
    where
        R::Request: DataChunk,
        S: AsyncRead + Unpin + Send,
    {
        if let Err(e) = writer.pump(source, &mut self.sender).await {
            return Err(prefer_verdict(e, &mut self.receiver).await);
        }
        self.close_and_recv().await
    }
}

/// A bidirectional call in progress
#[derive(Debug)]
pub struct BidiCall<R: Rpc> {
    sender: CallSender<R::Request>,
    receiver: Streaming<R::Response>,
}

impl<R: Rpc> BidiCall<R> {
    /// Sends the whole of `source` in chunks while passing each response to `on_message`.
    ///
    /// Completes once the server has ended the call; see [`BidiReport`].
    pub async fn run<S, F>(
        self,
        source: S,
        writer: StreamWriter,
        on_message: F,
    ) -> Result<BidiReport, CallError>
    where
        R::Request: DataChunk,
        S: AsyncRead + Unpin + Send + 'static,
        F: FnMut(R::Response) + Send + 'static,
    {
        coordinate::<R, S, F>(self.sender, self.receiver, source, writer, on_message).await
    }

    /// Splits the call into its two halves, for callers who want to drive them directly
    #[must_use]
    pub fn split(self) -> (CallSender<R::Request>, Streaming<R::Response>) {
        (self.sender, self.receiver)
    }
}
