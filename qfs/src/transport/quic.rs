//! Encrypted transport over QUIC
// (c) 2025 qfs contributors

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use quinn::crypto::rustls::QuicClientConfig;
use quinn::{TransportConfig, VarInt};
use rustls::RootCertStore;
use rustls_pki_types::{CertificateDer, pem::PemObject as _};
use tracing::{debug, trace};

use super::{CallStreams, Connector};
use crate::config::Configuration;
use crate::protocol::common::SendReceivePair;

/// ALPN protocol identifier
pub const ALPN: &[u8] = b"qfs/1";

/// Keepalive interval for the QUIC connection
pub(crate) const PROTOCOL_KEEPALIVE: Duration = Duration::from_secs(5);

/// How long to wait for the connection to close politely
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Application close code for a normal shutdown
const CLOSE_NORMAL: u32 = 0;

/// Reads the CA certificate(s) used to verify the server
pub(crate) fn load_roots(path: &Path) -> Result<RootCertStore> {
    let mut roots = RootCertStore::empty();
    for cert in CertificateDer::pem_file_iter(path)
        .with_context(|| format!("reading CA certificate {}", path.display()))?
    {
        let cert = cert.with_context(|| format!("parsing CA certificate {}", path.display()))?;
        roots.add(cert)?;
    }
    anyhow::ensure!(
        !roots.is_empty(),
        "no certificates found in {}",
        path.display()
    );
    Ok(roots)
}

/// Creates the TLS client configuration
pub(crate) fn client_tls_config(roots: RootCertStore) -> Result<rustls::ClientConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut tls = rustls::ClientConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS13])?
        .with_root_certificates(roots)
        .with_no_client_auth();
    tls.alpn_protocols = vec![ALPN.to_vec()];
    Ok(tls)
}

/// Creates a `quinn::TransportConfig` for the connection
pub(crate) fn transport_config() -> Arc<TransportConfig> {
    let mut config = TransportConfig::default();
    let _ = config
        .max_concurrent_uni_streams(0u8.into())
        .keep_alive_interval(Some(PROTOCOL_KEEPALIVE));
    config.into()
}

/// One QUIC connection, carrying one bidirectional stream per call
#[derive(Debug)]
pub(crate) struct QuicConnector {
    endpoint: quinn::Endpoint,
    connection: quinn::Connection,
}

impl QuicConnector {
    pub(crate) async fn connect(config: &Configuration) -> Result<Self> {
        anyhow::ensure!(
            !config.ca_cert.is_empty(),
            "TLS requires a CA certificate (ca_cert)"
        );
        let roots = load_roots(Path::new(&config.ca_cert))?;
        let tls = client_tls_config(roots)?;
        let mut client_cfg = quinn::ClientConfig::new(Arc::new(QuicClientConfig::try_from(tls)?));
        let _ = client_cfg.transport_config(transport_config());

        let addr = super::resolve(&config.address).await?;
        let bind: SocketAddr = if addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        trace!("create endpoint on {bind}");
        let mut endpoint = quinn::Endpoint::client(bind)?;
        endpoint.set_default_client_config(client_cfg);

        let server_name = if config.server_name.is_empty() {
            super::host_part(&config.address).to_string()
        } else {
            config.server_name.clone()
        };
        debug!("connecting to {addr} as {server_name}");
        let connecting = endpoint.connect(addr, &server_name)?;
        let connection = tokio::time::timeout(config.connect_timeout_duration(), connecting)
            .await
            .with_context(|| format!("timed out connecting to {addr}"))??;
        Ok(Self {
            endpoint,
            connection,
        })
    }
}

#[async_trait]
impl Connector for QuicConnector {
    async fn open_stream(&self) -> Result<CallStreams> {
        let (send, recv) = self.connection.open_bi().await?;
        trace!("opened stream {}", send.id());
        Ok(SendReceivePair::from((send, recv)).boxed())
    }

    async fn close(&self) {
        self.connection
            .close(VarInt::from_u32(CLOSE_NORMAL), b"session closed");
        if tokio::time::timeout(CLOSE_TIMEOUT, self.endpoint.wait_idle())
            .await
            .is_err()
        {
            debug!("endpoint did not go idle in time");
        }
    }
}
