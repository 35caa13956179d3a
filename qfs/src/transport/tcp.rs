//! Plaintext transport over TCP, one connection per call
// (c) 2025 qfs contributors

use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use tokio::io::AsyncWrite;
use tokio::net::{TcpStream, tcp::OwnedReadHalf, tcp::OwnedWriteHalf};
use tracing::{debug, trace};

use super::{CallStreams, Connector};
use crate::config::Configuration;
use crate::protocol::common::{ReceivingStream, SendReceivePair, SendingStream};

impl ReceivingStream for OwnedReadHalf {}

/// Sending half of a call's TCP connection.
///
/// TCP cannot reset one direction of a connection. Aborting therefore withholds the FIN
/// and arranges for the eventual close to be a reset.
#[derive(Debug)]
pub(crate) struct TcpSend(Option<OwnedWriteHalf>);

impl TcpSend {
    fn inner(&mut self) -> std::io::Result<Pin<&mut OwnedWriteHalf>> {
        self.0
            .as_mut()
            .map(Pin::new)
            .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::BrokenPipe))
    }
}

impl AsyncWrite for TcpSend {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut().inner() {
            Ok(w) => w.poll_write(cx, buf),
            Err(e) => Poll::Ready(Err(e)),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut().inner() {
            Ok(w) => w.poll_flush(cx),
            Err(e) => Poll::Ready(Err(e)),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut().inner() {
            Ok(w) => w.poll_shutdown(cx),
            Err(e) => Poll::Ready(Err(e)),
        }
    }
}

impl SendingStream for TcpSend {
    fn abort(&mut self) {
        if let Some(half) = self.0.take() {
            #[allow(deprecated)]
            let _ = half.as_ref().set_linger(Some(Duration::ZERO));
            half.forget();
        }
    }
}

/// Opens a fresh TCP connection for every call
#[derive(Debug)]
pub(crate) struct TcpConnector {
    addr: SocketAddr,
    connect_timeout: Duration,
}

impl TcpConnector {
    /// Resolves the target and checks that it accepts connections
    pub(crate) async fn connect(config: &Configuration) -> Result<Self> {
        let addr = super::resolve(&config.address).await?;
        let connector = Self {
            addr,
            connect_timeout: config.connect_timeout_duration(),
        };
        // An unreachable server is a setup error rather than a call error
        drop(connector.dial().await?);
        debug!("plaintext target {addr} is reachable");
        Ok(connector)
    }

    async fn dial(&self) -> Result<TcpStream> {
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(self.addr))
            .await
            .with_context(|| format!("timed out connecting to {}", self.addr))?
            .with_context(|| format!("connecting to {}", self.addr))?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn open_stream(&self) -> Result<CallStreams> {
        let stream = self.dial().await?;
        trace!("opened call connection from {:?}", stream.local_addr().ok());
        let (recv, send) = stream.into_split();
        Ok(SendReceivePair::from((TcpSend(Some(send)), recv)).boxed())
    }

    async fn close(&self) {
        // Each call's connection closes with the call
    }
}
