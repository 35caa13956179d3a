//! 🖥️ The file service client: one method per remote operation
// (c) 2025 qfs contributors

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt as _};
use tracing::{debug, info};

use crate::Configuration;
use crate::call::{
    AUTHORIZATION, BidiReport, CallContext, CallError, Invoker, StreamOptions, StreamWriter,
    Streaming,
};
use crate::protocol::file_service::{
    Download, DownloadRequest, DownloadResponse, ListFiles, ListFilesRequest, Upload,
    UploadAndNotifyProgress,
};
use crate::transport::Session;

mod credentials;
pub use credentials::BearerToken;

/// A client for the remote file service.
///
/// Every call takes its own [`CallContext`]. If the client holds a credential, it is attached
/// to each call unless the context already carries an `authorization` entry.
/// [`FileServiceClient::context`] and [`FileServiceClient::upload_context`] make contexts with the
/// configured time budgets.
#[derive(Debug)]
pub struct FileServiceClient {
    session: Session,
    token: Option<BearerToken>,
    writer: StreamWriter,
    timeout: Option<Duration>,
    upload_timeout: Option<Duration>,
}

impl FileServiceClient {
    /// Wraps a session, with default stream options and no time budgets
    #[must_use]
    pub fn new(session: Session) -> Self {
        Self {
            session,
            token: None,
            writer: StreamWriter::default(),
            timeout: None,
            upload_timeout: None,
        }
    }

    /// Connects to the service and sets up the client as configured
    pub async fn connect(config: &Configuration) -> Result<Self> {
        config.validate()?;
        let session = Session::connect(config).await?;
        Ok(Self::new(session)
            .with_token(config.bearer_token())
            .with_stream_options(config.stream_options())?
            .with_timeouts(config.call_timeout(), config.upload_call_timeout()))
    }

    /// Sets (or clears) the credential attached to calls
    #[must_use]
    pub fn with_token(mut self, token: Option<BearerToken>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    /// Sets the chunking and pacing of uploads
    pub fn with_stream_options(mut self, options: StreamOptions) -> Result<Self, CallError> {
        self.writer = StreamWriter::new(options)?;
        Ok(self)
    }

    /// Sets the time budgets used by [`FileServiceClient::context`] and [`FileServiceClient::upload_context`]
    #[must_use]
    pub fn with_timeouts(mut self, timeout: Option<Duration>, upload: Option<Duration>) -> Self {
        self.timeout = timeout;
        self.upload_timeout = upload;
        self
    }

    /// A fresh context for listing or downloading, with the configured time budget
    #[must_use]
    pub fn context(&self) -> CallContext {
        budget(self.timeout)
    }

    /// A fresh context for uploading, with the configured time budget
    #[must_use]
    pub fn upload_context(&self) -> CallContext {
        budget(self.upload_timeout)
    }

    /// Accessor
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    fn authorize(&self, ctx: CallContext) -> CallContext {
        match &self.token {
            Some(token) if !ctx.has_metadata(AUTHORIZATION) => ctx.with_bearer_token(token),
            _ => ctx,
        }
    }

    fn invoker(&self) -> Invoker<'_> {
        Invoker::new(&self.session)
    }

    /// Lists the files held by the server
    pub async fn list_files(&self, ctx: CallContext) -> Result<Vec<String>, CallError> {
        let response = self
            .invoker()
            .unary::<ListFiles>(&ListFilesRequest::default(), self.authorize(ctx))
            .await?;
        debug!("server holds {} file(s)", response.filenames.len());
        Ok(response.filenames)
    }

    /// Starts downloading a file. The chunks arrive lazily, one at a time.
    ///
    /// An unknown file ends the stream with a `NotFound` error and no chunks.
    pub async fn download(
        &self,
        filename: &str,
        ctx: CallContext,
    ) -> Result<Streaming<DownloadResponse>, CallError> {
        let request = DownloadRequest {
            filename: filename.to_string(),
        };
        self.invoker()
            .server_streaming::<Download>(&request, self.authorize(ctx))
            .await
    }

    /// Downloads a file into `sink`, writing each chunk as it arrives.
    ///
    /// Returns the number of bytes written. On failure, `sink` may hold a partial file.
    pub async fn download_to<W>(
        &self,
        filename: &str,
        sink: &mut W,
        ctx: CallContext,
    ) -> Result<u64, CallError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut stream = self.download(filename, ctx).await?;
        let mut total = 0u64;
        while let Some(chunk) = stream.message().await? {
            sink.write_all(&chunk.data).await.map_err(CallError::local)?;
            total += chunk.data.len() as u64;
        }
        sink.flush().await.map_err(CallError::local)?;
        info!("downloaded {filename}: {total} bytes in {} chunk(s)", stream.received());
        Ok(total)
    }

    /// Uploads the whole of `source`. Returns the number of bytes the server reports receiving.
    pub async fn upload<S>(&self, source: S, ctx: CallContext) -> Result<u64, CallError>
    where
        S: AsyncRead + Unpin + Send,
    {
        let response = self
            .invoker()
            .client_streaming::<Upload>(self.authorize(ctx))
            .await?
            .send_all(source, &self.writer)
            .await?;
        Ok(response.size.0)
    }

    /// Uploads the whole of `source`, passing each progress message from the server to `on_progress`
    pub async fn upload_with_progress<S, F>(
        &self,
        source: S,
        ctx: CallContext,
        mut on_progress: F,
    ) -> Result<BidiReport, CallError>
    where
        S: AsyncRead + Unpin + Send + 'static,
        F: FnMut(&str) + Send + 'static,
    {
        self.invoker()
            .bidirectional::<UploadAndNotifyProgress>(self.authorize(ctx))
            .await?
            .run(source, self.writer, move |m| on_progress(&m.msg))
            .await
    }

    /// Closes the session
    pub async fn close(self) {
        self.session.close().await;
    }
}

fn budget(timeout: Option<Duration>) -> CallContext {
    match timeout {
        Some(t) => CallContext::new().with_timeout(t),
        None => CallContext::new(),
    }
}

/// Opens a local file for upload.
///
/// Failure is a local error: no call is made.
pub async fn open_source(path: &Path) -> Result<tokio::fs::File, CallError> {
    tokio::fs::File::open(path).await.map_err(CallError::local)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod test {
    use std::io::Cursor;
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::{BearerToken, FileServiceClient, open_source};
    use crate::call::{AUTHORIZATION, CallContext, ErrorClass, StreamOptions};
    use crate::transport::memory::FakeFileService;

    fn client(svc: &Arc<FakeFileService>) -> FileServiceClient {
        FileServiceClient::new(svc.session())
            .with_stream_options(StreamOptions {
                chunk_size: 4,
                pacing: Duration::ZERO,
            })
            .unwrap()
    }

    #[tokio::test]
    async fn token_is_attached_to_every_call() {
        let svc = Arc::new(FakeFileService::with_files(&[("a", b"1234567")]));
        let c = client(&svc).with_token(Some(BearerToken::from("test-token")));
        let _ = c.list_files(c.context()).await.unwrap();
        let mut sink = Vec::new();
        let _ = c.download_to("a", &mut sink, c.context()).await.unwrap();
        let _ = c
            .upload(Cursor::new(b"xyz".to_vec()), c.upload_context())
            .await
            .unwrap();
        let obs = svc.observed.lock().unwrap();
        assert_eq!(obs.headers.len(), 3);
        for h in &obs.headers {
            assert_eq!(h.metadata.get(AUTHORIZATION).unwrap(), "Bearer test-token");
        }
    }

    #[tokio::test]
    async fn caller_authorization_wins() {
        let svc = Arc::new(FakeFileService::default());
        let c = client(&svc).with_token(Some(BearerToken::from("default")));
        let ctx = CallContext::new().with_metadata(AUTHORIZATION, "Bearer other");
        let _ = c.list_files(ctx).await.unwrap();
        let obs = svc.observed.lock().unwrap();
        assert_eq!(obs.headers[0].metadata.get(AUTHORIZATION).unwrap(), "Bearer other");
    }

    #[tokio::test]
    async fn no_token_no_authorization() {
        let svc = Arc::new(FakeFileService::default());
        let c = client(&svc).with_token(Some(BearerToken::from("")));
        let _ = c.list_files(c.context()).await.unwrap();
        assert!(svc.observed.lock().unwrap().headers[0].metadata.is_empty());
    }

    #[tokio::test]
    async fn download_to_a_sink() {
        let svc = Arc::new(FakeFileService::with_files(&[("name.txt", b"hello, world")]));
        let c = client(&svc);
        let mut sink = Vec::new();
        let n = c.download_to("name.txt", &mut sink, c.context()).await.unwrap();
        assert_eq!(n, 12);
        assert_eq!(sink, b"hello, world");

        let mut sink = Vec::new();
        let e = c.download_to("other.txt", &mut sink, c.context()).await.unwrap_err();
        assert_eq!(e.class(), ErrorClass::NotFound);
        assert!(sink.is_empty());
        assert_eq!(c.session().open_streams(), 0);
    }

    #[tokio::test]
    async fn empty_filename_is_a_caller_error() {
        let svc = Arc::new(FakeFileService::default());
        let c = client(&svc);
        let e = c.download("", c.context()).await.unwrap_err();
        assert_eq!(e.class(), ErrorClass::Local);
    }

    #[tokio::test]
    async fn upload_reports_size() {
        let svc = Arc::new(FakeFileService::default());
        let c = client(&svc);
        let n = c
            .upload(Cursor::new(vec![9u8; 10]), c.upload_context())
            .await
            .unwrap();
        assert_eq!(n, 10);
        assert_eq!(svc.observed.lock().unwrap().uploads[0].len(), 3);
    }

    #[tokio::test]
    async fn upload_with_progress_forwards_messages() {
        let svc = Arc::new(FakeFileService::default());
        let c = client(&svc);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let report = c
            .upload_with_progress(Cursor::new(b"12345678".to_vec()), c.upload_context(), move |m| {
                sink.lock().unwrap().push(m.to_string());
            })
            .await
            .unwrap();
        assert_eq!(report.chunks_sent, 2);
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["received 4 bytes", "received 8 bytes", "upload complete"]
        );
    }

    #[tokio::test]
    async fn missing_local_file_is_local() {
        let e = open_source(Path::new("/definitely/not/here")).await.unwrap_err();
        assert_eq!(e.class(), ErrorClass::Local);
    }

    #[tokio::test(start_paused = true)]
    async fn contexts_carry_budgets() {
        let svc = Arc::new(FakeFileService::default());
        let c = client(&svc).with_timeouts(Some(Duration::from_secs(10)), None);
        assert!(c.context().deadline().is_some());
        assert!(c.upload_context().deadline().is_none());
    }
}
