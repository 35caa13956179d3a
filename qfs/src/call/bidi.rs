//! Bidirectional Coordinator: runs both directions of a call concurrently
// (c) 2025 qfs contributors

use tokio::io::AsyncRead;
use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, trace};

use super::context::Expiry;
use super::error::CallError;
use super::reader::Streaming;
use super::writer::{CallSender, StreamWriter, WriteSummary};
use super::TRAILER_GRACE;
use crate::protocol::common::ProtocolMessage;
use crate::protocol::rpc::{DataChunk, Rpc};
use crate::protocol::status::{Code, Status};

/// The outcome of a successful bidirectional call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, derive_more::Display)]
#[display("sent {bytes_sent} bytes in {chunks_sent} chunk(s), received {messages_received} message(s)")]
pub struct BidiReport {
    /// Chunk messages sent
    pub chunks_sent: u64,
    /// Bytes of chunk data sent
    pub bytes_sent: u64,
    /// Messages received from the server
    pub messages_received: u64,
}

/// What the receive task reports, exactly once, when it has finished
#[derive(Debug)]
struct ReceiveOutcome {
    result: Result<u64, CallError>,
    trailer_seen: bool,
}

/// A spawned task which is aborted if its handle goes out of scope
struct TaskHandle<T> {
    handle: JoinHandle<T>,
    joined: bool,
}

impl<T> TaskHandle<T> {
    fn spawn<F>(task: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        Self {
            handle: tokio::spawn(task),
            joined: false,
        }
    }

    /// Must not be called again once it has returned
    async fn join(&mut self) -> Result<T, JoinError> {
        let result = (&mut self.handle).await;
        self.joined = true;
        result
    }

    /// Aborts the task, if still unjoined, and waits until it has been dropped
    async fn release(mut self) {
        if !self.joined {
            self.handle.abort();
            let _ = (&mut self.handle).await;
            self.joined = true;
        }
    }
}

impl<T> Drop for TaskHandle<T> {
    fn drop(&mut self) {
        if !self.joined {
            self.handle.abort();
        }
    }
}

type SendTask = TaskHandle<Result<WriteSummary, CallError>>;

/// Drives both sides of a bidirectional call.
///
/// * The send task reads `source` to exhaustion through `writer`, then half-closes.
/// * The receive task passes each incoming message to `on_message` as it arrives,
///   until the stream terminates.
///
/// This returns only once the receive task has observed the end of the stream, even when
/// the send task finishes first. A failure in either task is the outcome of the call; the
/// other task is then aborted. There is no correlation between the messages in each direction.
///
/// Neither task outlives this function: by the time it returns, `source` has been dropped
/// and the stream no longer counts as open.
pub(crate) async fn coordinate<R, S, F>(
    sender: CallSender<R::Request>,
    receiver: Streaming<R::Response>,
    source: S,
    writer: StreamWriter,
    on_message: F,
) -> Result<BidiReport, CallError>
where
    R: Rpc,
    R::Request: DataChunk,
    S: AsyncRead + Unpin + Send + 'static,
    F: FnMut(R::Response) + Send + 'static,
{
    let expiry = sender.expiry().clone();
    let mut send_task = TaskHandle::spawn(send_side(sender, source, writer));
    let (done_tx, mut done_rx) = oneshot::channel();
    let receive_task = TaskHandle::spawn(receive_side(receiver, on_message, done_tx));

    let outcome = drive(&expiry, &mut send_task, &mut done_rx).await;
    send_task.release().await;
    receive_task.release().await;
    outcome
}

async fn drive(
    expiry: &Expiry,
    send_task: &mut SendTask,
    done_rx: &mut oneshot::Receiver<ReceiveOutcome>,
) -> Result<BidiReport, CallError> {
    let mut sent: Option<WriteSummary> = None;
    let received = loop {
        tokio::select! {
            biased;
            outcome = &mut *done_rx => {
                break outcome.unwrap_or_else(|_| ReceiveOutcome {
                    result: Err(task_lost("receive")),
                    trailer_seen: false,
                });
            }
            joined = send_task.join(), if sent.is_none() => match flatten(joined) {
                Ok(summary) => {
                    trace!("send side complete; awaiting the receive side");
                    sent = Some(summary);
                }
                Err(e) => return Err(verdict_after_send_failure(e, done_rx).await),
            },
            status = expiry.expired() => return Err(status.into()),
        }
    };

    let messages = received.result?;
    let sent = match sent {
        Some(s) => s,
        None => {
            // The server ended the call while we were still sending
            debug!("receive side finished first; awaiting the send side");
            flatten(expiry.run(send_task.join()).await?)?
        }
    };
    Ok(BidiReport {
        chunks_sent: sent.chunks,
        bytes_sent: sent.bytes,
        messages_received: messages,
    })
}

async fn send_side<T, S>(
    mut sender: CallSender<T>,
    source: S,
    writer: StreamWriter,
) -> Result<WriteSummary, CallError>
where
    T: DataChunk,
    S: AsyncRead + Unpin + Send,
{
    let summary = writer.pump(source, &mut sender).await?;
    sender.finish().await?;
    Ok(summary)
}

async fn receive_side<T, F>(
    mut receiver: Streaming<T>,
    mut on_message: F,
    done: oneshot::Sender<ReceiveOutcome>,
) where
    T: ProtocolMessage,
    F: FnMut(T),
{
    let result = loop {
        match receiver.message().await {
            Ok(Some(msg)) => on_message(msg),
            Ok(None) => break Ok(receiver.received()),
            Err(e) => break Err(e),
        }
    };
    let _ = done.send(ReceiveOutcome {
        result,
        trailer_seen: receiver.trailer_seen(),
    });
}

/// A send failure may be explained by the server's trailer, if it arrives promptly
async fn verdict_after_send_failure(
    e: CallError,
    done: &mut oneshot::Receiver<ReceiveOutcome>,
) -> CallError {
    if !e.is_stream_failure() {
        return e;
    }
    match tokio::time::timeout(TRAILER_GRACE, done).await {
        Ok(Ok(ReceiveOutcome {
            result: Err(verdict),
            trailer_seen: true,
        })) => {
            debug!("send failed ({e}); server says {verdict}");
            verdict
        }
        _ => e,
    }
}

fn flatten<T>(joined: Result<Result<T, CallError>, JoinError>) -> Result<T, CallError> {
    joined.unwrap_or_else(|e| Err(task_lost(&e.to_string())))
}

fn task_lost(what: &str) -> CallError {
    CallError::Status(Status::new(
        Code::Internal,
        format!("call task ended abnormally: {what}"),
    ))
}
