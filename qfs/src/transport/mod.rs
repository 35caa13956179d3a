//! The transport session: one long-lived channel to the file service, on which calls open streams
// (c) 2025 qfs contributors
//!
//! Two transports are available:
//! * **Encrypted** ([`quic`]): one QUIC connection, TLS 1.3, server certificate checked against a
//!   configured CA certificate. Each call opens a bidirectional QUIC stream on it.
//! * **Plaintext** ([`tcp`]): TCP has no stream multiplexing, so each call makes its own connection.
//!
//! Either way, each call sees a [`SendReceivePair`] of byte streams.
//! The send side may be finished (half-closed) independently of the receive side.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::Configuration;
use crate::protocol::common::{BoxedRecv, BoxedSend, SendReceivePair};

pub(crate) mod quic;
pub use quic::ALPN;
pub(crate) mod tcp;

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
pub(crate) mod memory;

/// The byte streams of one call
pub type CallStreams = SendReceivePair<BoxedSend, BoxedRecv>;

/// Transport security in use on a [`Session`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum SecurityMode {
    /// No encryption
    Plaintext,
    /// TLS, server authenticated against a CA certificate
    Tls,
}

/// A way of opening call streams to a remote endpoint
#[async_trait]
pub trait Connector: Send + Sync + std::fmt::Debug {
    /// Opens the byte streams for one call
    async fn open_stream(&self) -> Result<CallStreams>;
    /// Releases the underlying connection, politely if possible
    async fn close(&self);
}

/// One active channel to the remote file service.
///
/// All calls are issued against a `Session`. It is closed exactly once, by [`Session::close`],
/// which consumes it.
#[derive(Debug)]
pub struct Session {
    connector: Box<dyn Connector>,
    target: String,
    mode: SecurityMode,
    open: Arc<AtomicUsize>,
}

impl Session {
    /// Establishes a session according to the configuration.
    ///
    /// Errors here are setup errors, fatal to the session.
    pub async fn connect(config: &Configuration) -> Result<Self> {
        let (connector, mode): (Box<dyn Connector>, _) = if config.tls {
            let c = quic::QuicConnector::connect(config)
                .await
                .with_context(|| format!("connecting to {} (TLS)", config.address))?;
            (Box::new(c), SecurityMode::Tls)
        } else {
            let c = tcp::TcpConnector::connect(config)
                .await
                .with_context(|| format!("connecting to {} (plaintext)", config.address))?;
            (Box::new(c), SecurityMode::Plaintext)
        };
        info!("connected to {} ({mode})", config.address);
        Ok(Self::with_connector(connector, &config.address, mode))
    }

    /// Wraps an already-established connector
    #[must_use]
    pub fn with_connector(connector: Box<dyn Connector>, target: &str, mode: SecurityMode) -> Self {
        Self {
            connector,
            target: target.to_string(),
            mode,
            open: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Opens the streams for one call.
    ///
    /// The returned guard counts the call towards [`Session::open_streams`] until it is dropped.
    pub(crate) async fn open_stream(&self) -> Result<(CallStreams, StreamGuard)> {
        let streams = self.connector.open_stream().await?;
        Ok((streams, StreamGuard::new(&self.open)))
    }

    /// The number of call streams currently open on this session
    #[must_use]
    pub fn open_streams(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    /// The address this session connects to
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Transport security in use
    #[must_use]
    pub fn mode(&self) -> SecurityMode {
        self.mode
    }

    /// Closes the session
    pub async fn close(self) {
        let open = self.open_streams();
        if open > 0 {
            debug!("closing session with {open} call stream(s) still open");
        }
        self.connector.close().await;
        debug!("session to {} closed", self.target);
    }
}

/// Counts one open call stream against its [`Session`]
#[derive(Debug)]
pub(crate) struct StreamGuard(Arc<AtomicUsize>);

impl StreamGuard {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        let _ = counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }

    #[cfg(test)]
    pub(crate) fn for_test(counter: &Arc<AtomicUsize>) -> Self {
        Self::new(counter)
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        let _ = self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Splits `host:port` (or `[v6addr]:port`) into its host part
#[must_use]
pub(crate) fn host_part(address: &str) -> &str {
    if let Some(rest) = address.strip_prefix('[')
        && let Some((host, _)) = rest.split_once(']')
    {
        return host;
    }
    address.rsplit_once(':').map_or(address, |(host, _)| host)
}

/// Resolves the configured address to a socket address
pub(crate) async fn resolve(address: &str) -> Result<std::net::SocketAddr> {
    tokio::net::lookup_host(address)
        .await
        .with_context(|| format!("host name lookup for {address} failed"))?
        .next()
        .with_context(|| format!("host name lookup for {address} returned no addresses"))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod test {
    use super::{Session, host_part, memory::MemoryConnector};
    use pretty_assertions::assert_eq;

    #[test]
    fn host_parts() {
        assert_eq!(host_part("localhost:50051"), "localhost");
        assert_eq!(host_part("[::1]:50051"), "::1");
        assert_eq!(host_part("example.com"), "example.com");
        assert_eq!(host_part("10.1.2.3:9"), "10.1.2.3");
    }

    #[tokio::test]
    async fn resolve_literal() {
        let a = super::resolve("127.0.0.1:50051").await.unwrap();
        assert_eq!(a.port(), 50051);
        assert!(super::resolve("no-port-here").await.is_err());
    }

    #[tokio::test]
    async fn guard_counts_streams() {
        let session = Session::with_connector(
            Box::new(MemoryConnector::default()),
            "memory",
            super::SecurityMode::Plaintext,
        );
        assert_eq!(session.open_streams(), 0);
        let (s1, g1) = session.open_stream().await.unwrap();
        let (s2, g2) = session.open_stream().await.unwrap();
        assert_eq!(session.open_streams(), 2);
        drop((s1, g1));
        assert_eq!(session.open_streams(), 1);
        drop((s2, g2));
        assert_eq!(session.open_streams(), 0);
        session.close().await;
    }
}
