//! In-memory transport and a scriptable file service, for testing the call layer
// (c) 2025 qfs contributors

use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_bare::Uint;
use tokio::io::{AsyncWrite, AsyncWriteExt as _, DuplexStream};

use super::{CallStreams, Connector, SecurityMode, Session};
use crate::protocol::common::{ProtocolMessage, SendReceivePair, SendingStream};
use crate::protocol::file_service::{
    DownloadRequest, DownloadResponse, ListFilesRequest, ListFilesResponse,
    UploadAndNotifyProgressRequest, UploadAndNotifyProgressResponse, UploadRequest,
    UploadResponse,
};
use crate::protocol::rpc::{CallHeader, DataChunk, Frame, Method};
use crate::protocol::status::{Code, Status};
use crate::protocol::test_helpers::{TestStreamPair, test_plumbing};

/// Misbehaviours the fake service can be asked to commit
#[derive(Debug, Clone, Default)]
pub(crate) struct Faults {
    /// Read the call header, then never respond
    pub stall: bool,
    /// Wait this long before sending the trailer, after the client has finished sending
    pub trailing_delay: Option<Duration>,
    /// Stop reading after this many request chunks, leaving the response side idle
    pub drop_inbound_after: Option<usize>,
    /// End every call with this status, without doing any work
    pub status: Option<Status>,
    /// Send this many messages in a unary response
    pub unary_responses: Option<usize>,
    /// Delay each progress message by this much
    pub progress_delay: Option<Duration>,
}

/// What the fake service saw
#[derive(Debug, Default)]
pub(crate) struct Observed {
    pub headers: Vec<CallHeader>,
    /// Chunks received by each upload, in order
    pub uploads: Vec<Vec<Vec<u8>>>,
    /// Whether each upload ended with a clean finish (as opposed to an error or reset)
    pub upload_complete: Vec<bool>,
}

/// A file service which runs in-process
#[derive(Debug, Default)]
pub(crate) struct FakeFileService {
    pub files: BTreeMap<String, Vec<u8>>,
    /// Chunk size for downloads
    pub download_chunk: usize,
    pub faults: Faults,
    pub observed: Mutex<Observed>,
}

impl FakeFileService {
    pub(crate) fn with_files(files: &[(&str, &[u8])]) -> Self {
        Self {
            files: files
                .iter()
                .map(|(k, v)| ((*k).to_string(), v.to_vec()))
                .collect(),
            download_chunk: 3,
            ..Default::default()
        }
    }

    pub(crate) fn faults(mut self, faults: Faults) -> Self {
        self.faults = faults;
        self
    }

    /// Creates a session whose calls are served by this service
    pub(crate) fn session(self: &Arc<Self>) -> Session {
        Session::with_connector(
            Box::new(MemoryConnector {
                service: Some(self.clone()),
            }),
            "memory",
            SecurityMode::Plaintext,
        )
    }

    fn record_upload(&self, chunks: Vec<Vec<u8>>, complete: bool) {
        let mut obs = self.observed.lock().unwrap();
        obs.uploads.push(chunks);
        obs.upload_complete.push(complete);
    }

    async fn serve(self: Arc<Self>, mut pair: TestStreamPair, reset: Arc<AtomicBool>) -> Result<()> {
        let Some(header) = CallHeader::from_reader_async_framed_or_eof(&mut pair.recv).await?
        else {
            return Ok(());
        };
        self.observed.lock().unwrap().headers.push(header.clone());

        if self.faults.stall {
            // Hold the stream open without responding
            std::future::pending::<()>().await;
        }

        match header.method {
            Method::ListFiles => self.list_files(pair).await,
            Method::Download => self.download(pair).await,
            Method::Upload => self.upload(pair, &reset).await,
            Method::UploadAndNotifyProgress => self.upload_with_progress(pair, &reset).await,
        }
    }

    async fn trailer<T: ProtocolMessage>(
        &self,
        pair: &mut TestStreamPair,
        status: Status,
    ) -> Result<()> {
        if let Some(d) = self.faults.trailing_delay {
            tokio::time::sleep(d).await;
        }
        Frame::<T>::Trailer(status)
            .to_writer_async_framed(&mut pair.send)
            .await?;
        pair.send.shutdown().await?;
        Ok(())
    }

    async fn list_files(&self, mut pair: TestStreamPair) -> Result<()> {
        let _ = ListFilesRequest::from_reader_async_framed(&mut pair.recv).await?;
        if let Some(st) = self.faults.status.clone() {
            return self.trailer::<ListFilesResponse>(&mut pair, st).await;
        }
        let response = ListFilesResponse {
            filenames: self.files.keys().cloned().collect(),
        };
        for _ in 0..self.faults.unary_responses.unwrap_or(1) {
            Frame::Message(response.clone())
                .to_writer_async_framed(&mut pair.send)
                .await?;
        }
        self.trailer::<ListFilesResponse>(&mut pair, Status::ok())
            .await
    }

    async fn download(&self, mut pair: TestStreamPair) -> Result<()> {
        let req = DownloadRequest::from_reader_async_framed(&mut pair.recv).await?;
        if let Some(st) = self.faults.status.clone() {
            return self.trailer::<DownloadResponse>(&mut pair, st).await;
        }
        let Some(content) = self.files.get(&req.filename) else {
            let st = Status::new(Code::NotFound, format!("no such file: {}", req.filename));
            return self.trailer::<DownloadResponse>(&mut pair, st).await;
        };
        for chunk in content.chunks(self.download_chunk.max(1)) {
            Frame::Message(DownloadResponse {
                data: chunk.to_vec(),
            })
            .to_writer_async_framed(&mut pair.send)
            .await?;
        }
        self.trailer::<DownloadResponse>(&mut pair, Status::ok())
            .await
    }

    /// Reads upload chunks until the client finishes, optionally reporting progress after each.
    /// Returns the chunks, and whether the client finished cleanly.
    async fn read_chunks<T>(
        &self,
        pair: &mut TestStreamPair,
        reset: &AtomicBool,
        progress: bool,
    ) -> (Vec<Vec<u8>>, bool)
    where
        T: ProtocolMessage + DataChunk,
    {
        let mut chunks = Vec::new();
        let mut total = 0usize;
        loop {
            if self
                .faults
                .drop_inbound_after
                .is_some_and(|n| chunks.len() >= n)
            {
                // Drop our receiving side; the client's next send fails
                let (dead, _) = tokio::io::duplex(1);
                drop(std::mem::replace(&mut pair.recv, dead));
                std::future::pending::<()>().await;
            }
            match T::from_reader_async_framed_or_eof(&mut pair.recv).await {
                Ok(Some(msg)) => {
                    total += msg.chunk().len();
                    chunks.push(msg.chunk().to_vec());
                    if progress && self.progress(pair, format!("received {total} bytes")).await.is_err() {
                        return (chunks, false);
                    }
                }
                Ok(None) => return (chunks, !reset.load(Ordering::SeqCst)),
                Err(_) => return (chunks, false),
            }
        }
    }

    async fn progress(&self, pair: &mut TestStreamPair, msg: String) -> Result<()> {
        if let Some(d) = self.faults.progress_delay {
            tokio::time::sleep(d).await;
        }
        Frame::Message(UploadAndNotifyProgressResponse { msg })
            .to_writer_async_framed(&mut pair.send)
            .await
    }

    async fn upload(&self, mut pair: TestStreamPair, reset: &AtomicBool) -> Result<()> {
        if let Some(st) = self.faults.status.clone() {
            return self.trailer::<UploadResponse>(&mut pair, st).await;
        }
        let (chunks, complete) = self
            .read_chunks::<UploadRequest>(&mut pair, reset, false)
            .await;
        let size: usize = chunks.iter().map(Vec::len).sum();
        self.record_upload(chunks, complete);
        if !complete {
            return Ok(());
        }
        Frame::Message(UploadResponse {
            size: Uint(size as u64),
        })
        .to_writer_async_framed(&mut pair.send)
        .await?;
        self.trailer::<UploadResponse>(&mut pair, Status::ok()).await
    }

    async fn upload_with_progress(&self, mut pair: TestStreamPair, reset: &AtomicBool) -> Result<()> {
        if let Some(st) = self.faults.status.clone() {
            return self
                .trailer::<UploadAndNotifyProgressResponse>(&mut pair, st)
                .await;
        }
        let (chunks, complete) = self
            .read_chunks::<UploadAndNotifyProgressRequest>(&mut pair, reset, true)
            .await;
        self.record_upload(chunks, complete);
        if !complete {
            return Ok(());
        }
        self.progress(&mut pair, "upload complete".into()).await?;
        self.trailer::<UploadAndNotifyProgressResponse>(&mut pair, Status::ok())
            .await
    }
}

/// Connects calls to an in-process [`FakeFileService`], or to nothing at all
#[derive(Debug, Default)]
pub(crate) struct MemoryConnector {
    service: Option<Arc<FakeFileService>>,
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn open_stream(&self) -> Result<CallStreams> {
        let (client, server) = test_plumbing();
        let reset = Arc::new(AtomicBool::new(false));
        if let Some(service) = &self.service {
            let _ = tokio::spawn(service.clone().serve(server, reset.clone()));
        }
        // With no service, the server side is dropped; the call sees a dead stream
        let send = ResettableSend {
            inner: client.send,
            reset,
        };
        Ok(SendReceivePair::from((send, client.recv)).boxed())
    }

    async fn close(&self) {}
}

/// A pipe can only end cleanly, so a reset is signalled to the server out of band
#[derive(Debug)]
struct ResettableSend {
    inner: DuplexStream,
    reset: Arc<AtomicBool>,
}

impl SendingStream for ResettableSend {
    fn abort(&mut self) {
        self.reset.store(true, Ordering::SeqCst);
    }
}

impl AsyncWrite for ResettableSend {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
