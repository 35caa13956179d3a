//! A small file service, for exercising the client over real sockets
// (c) 2025 qfs contributors

#![allow(dead_code)] // each test binary uses a different subset

use std::collections::BTreeMap;
use std::io::Write as _;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use quinn::crypto::rustls::QuicServerConfig;
use rustls_pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
use serde_bare::Uint;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt as _};

use qfs::Configuration;
use qfs::protocol::common::ProtocolMessage;
use qfs::protocol::file_service::{
    DownloadRequest, DownloadResponse, ListFilesRequest, ListFilesResponse,
    UploadAndNotifyProgressRequest, UploadAndNotifyProgressResponse, UploadRequest,
    UploadResponse,
};
use qfs::protocol::rpc::{CallHeader, DataChunk, Frame, Method};
use qfs::protocol::status::{Code, Status};

/// Size of the chunks the service sends when downloading
const DOWNLOAD_CHUNK: usize = 4;

/// What the service holds, and what it has seen
#[derive(Debug, Default)]
pub struct Store {
    pub files: BTreeMap<String, Vec<u8>>,
    /// If set, calls must carry `authorization: Bearer <token>`
    pub token: Option<String>,
    pub headers: Vec<CallHeader>,
    pub uploads: Vec<Vec<u8>>,
}

pub type Shared = Arc<Mutex<Store>>;

pub fn store(files: &[(&str, &[u8])], token: Option<&str>) -> Shared {
    Arc::new(Mutex::new(Store {
        files: files
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.to_vec()))
            .collect(),
        token: token.map(str::to_string),
        ..Default::default()
    }))
}

async fn trailer<T, W>(send: &mut W, status: Status) -> Result<()>
where
    T: ProtocolMessage,
    W: AsyncWrite + Unpin + Send,
{
    Frame::<T>::Trailer(status)
        .to_writer_async_framed(send)
        .await?;
    send.shutdown().await?;
    Ok(())
}

async fn message<T, W>(send: &mut W, msg: T) -> Result<()>
where
    T: ProtocolMessage,
    W: AsyncWrite + Unpin + Send,
{
    Frame::Message(msg).to_writer_async_framed(send).await
}

async fn read_all<T, R>(recv: &mut R) -> Result<Vec<u8>>
where
    T: DataChunk,
    R: AsyncRead + Unpin + Send,
{
    let mut data = Vec::new();
    while let Some(chunk) = T::from_reader_async_framed_or_eof(recv).await? {
        data.extend_from_slice(chunk.chunk());
    }
    Ok(data)
}

/// Serves one call
pub async fn serve_call<R, W>(store: Shared, mut recv: R, mut send: W) -> Result<()>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let Some(header) = CallHeader::from_reader_async_framed_or_eof(&mut recv).await? else {
        // a reachability check
        return Ok(());
    };
    let authorized = {
        let mut st = store.lock().unwrap();
        st.headers.push(header.clone());
        st.token.as_ref().is_none_or(|t| {
            header.metadata.get("authorization") == Some(&format!("Bearer {t}"))
        })
    };
    if !authorized {
        let status = Status::new(Code::Unauthenticated, "bad token");
        return trailer::<ListFilesResponse, _>(&mut send, status).await;
    }

    match header.method {
        Method::ListFiles => {
            let _ = ListFilesRequest::from_reader_async_framed(&mut recv).await?;
            let filenames = store.lock().unwrap().files.keys().cloned().collect();
            message(&mut send, ListFilesResponse { filenames }).await?;
            trailer::<ListFilesResponse, _>(&mut send, Status::ok()).await
        }
        Method::Download => {
            let req = DownloadRequest::from_reader_async_framed(&mut recv).await?;
            let content = store.lock().unwrap().files.get(&req.filename).cloned();
            let Some(content) = content else {
                let status = Status::new(Code::NotFound, format!("{} not found", req.filename));
                return trailer::<DownloadResponse, _>(&mut send, status).await;
            };
            for chunk in content.chunks(DOWNLOAD_CHUNK) {
                message(&mut send, DownloadResponse { data: chunk.to_vec() }).await?;
            }
            trailer::<DownloadResponse, _>(&mut send, Status::ok()).await
        }
        Method::Upload => {
            let data = read_all::<UploadRequest, _>(&mut recv).await?;
            let size = Uint(data.len() as u64);
            store.lock().unwrap().uploads.push(data);
            message(&mut send, UploadResponse { size }).await?;
            trailer::<UploadResponse, _>(&mut send, Status::ok()).await
        }
        Method::UploadAndNotifyProgress => {
            let mut data = Vec::new();
            while let Some(chunk) =
                UploadAndNotifyProgressRequest::from_reader_async_framed_or_eof(&mut recv).await?
            {
                data.extend_from_slice(chunk.chunk());
                let msg = format!("received {} bytes", data.len());
                message(&mut send, UploadAndNotifyProgressResponse { msg }).await?;
            }
            store.lock().unwrap().uploads.push(data);
            let msg = "upload complete".to_string();
            message(&mut send, UploadAndNotifyProgressResponse { msg }).await?;
            trailer::<UploadAndNotifyProgressResponse, _>(&mut send, Status::ok()).await
        }
    }
}

/// A QUIC file service, with a freshly minted certificate for `localhost`
pub struct QuicServer {
    pub addr: SocketAddr,
    /// Holds the CA certificate (the server's own, self-signed)
    pub ca_file: tempfile::NamedTempFile,
    endpoint: quinn::Endpoint,
}

impl QuicServer {
    pub fn start(store: Shared) -> Result<Self> {
        let rcgen::CertifiedKey { cert, key_pair } =
            rcgen::generate_simple_self_signed(vec!["localhost".into()])?;
        let mut ca_file = tempfile::Builder::new().suffix(".pem").tempfile()?;
        ca_file.write_all(cert.pem().as_bytes())?;
        ca_file.flush()?;

        let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let mut tls = rustls::ServerConfig::builder_with_provider(provider)
            .with_protocol_versions(&[&rustls::version::TLS13])?
            .with_no_client_auth()
            .with_single_cert(vec![cert.der().clone()], key)?;
        tls.alpn_protocols = vec![qfs::transport::ALPN.to_vec()];
        let server_config =
            quinn::ServerConfig::with_crypto(Arc::new(QuicServerConfig::try_from(tls)?));

        let endpoint =
            quinn::Endpoint::server(server_config, (Ipv4Addr::LOCALHOST, 0).into())?;
        let addr = endpoint.local_addr()?;
        let ep = endpoint.clone();
        let _ = tokio::spawn(async move {
            while let Some(incoming) = ep.accept().await {
                let store = store.clone();
                let _ = tokio::spawn(async move {
                    let Ok(conn) = incoming.await else { return };
                    while let Ok((send, recv)) = conn.accept_bi().await {
                        let _ = tokio::spawn(serve_call(store.clone(), recv, send));
                    }
                });
            }
        });
        Ok(Self {
            addr,
            ca_file,
            endpoint,
        })
    }

    /// Client configuration to reach this server
    pub fn config(&self) -> Configuration {
        Configuration {
            address: self.addr.to_string(),
            tls: true,
            ca_cert: self.ca_file.path().to_string_lossy().to_string(),
            server_name: "localhost".into(),
            pacing_ms: 0,
            ..Configuration::system_default().clone()
        }
    }
}

impl Drop for QuicServer {
    fn drop(&mut self) {
        self.endpoint.close(0u32.into(), b"");
    }
}

/// A plaintext (TCP) file service; each connection carries one call
pub struct TcpServer {
    pub addr: SocketAddr,
    task: tokio::task::JoinHandle<()>,
}

impl TcpServer {
    pub async fn start(store: Shared) -> Result<Self> {
        let listener = tokio::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?;
        let addr = listener.local_addr()?;
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let (recv, send) = stream.into_split();
                let _ = tokio::spawn(serve_call(store.clone(), recv, send));
            }
        });
        Ok(Self { addr, task })
    }

    /// Client configuration to reach this server
    pub fn config(&self) -> Configuration {
        Configuration {
            address: self.addr.to_string(),
            tls: false,
            pacing_ms: 0,
            ..Configuration::system_default().clone()
        }
    }
}

impl Drop for TcpServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}
