//! Test helpers for functions dealing with on-wire protocols
// (c) 2025 qfs contributors

use crate::protocol::common::{ReceivingStream, SendReceivePair, SendingStream};

use tokio::io::{DuplexStream, duplex};

pub(crate) type TestStreamPair = SendReceivePair<DuplexStream, DuplexStream>;

impl SendingStream for DuplexStream {}
impl ReceivingStream for DuplexStream {}

const STREAM_BUFFER_SIZE: usize = 4_096;

/// In order to test a streaming function we need a bi-directional stream whose
/// directions can be closed independently.
///
/// A single duplex pipe isn't enough: dropping one half of a split stream leaves the
/// other half alive. We use one duplex pipe per direction; each side takes the writing
/// end of one and the reading end of the other.
/// Dropping either end of a direction makes the peer observe it (EOF or broken pipe).
pub(crate) fn test_plumbing() -> (TestStreamPair, TestStreamPair) {
    test_plumbing_with_capacity(STREAM_BUFFER_SIZE)
}

/// As [`test_plumbing`], with a specific buffer size in each direction
pub(crate) fn test_plumbing_with_capacity(size: usize) -> (TestStreamPair, TestStreamPair) {
    let (c2s_tx, c2s_rx) = duplex(size);
    let (s2c_tx, s2c_rx) = duplex(size);
    let client = (c2s_tx, s2c_rx).into();
    let server = (s2c_tx, c2s_rx).into();
    (client, server)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod test {
    use super::test_plumbing;
    use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};

    #[tokio::test]
    async fn directions_are_independent() {
        let (mut client, mut server) = test_plumbing();
        client.send.write_all(b"hi").await.unwrap();
        client.send.shutdown().await.unwrap();
        let mut buf = Vec::new();
        let _ = server.recv.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"hi");

        // client has half-closed, but the other direction still works
        server.send.write_all(b"yo").await.unwrap();
        drop(server);
        let mut buf = Vec::new();
        let _ = client.recv.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"yo");
    }

    #[tokio::test]
    async fn dropped_reader_breaks_writer() {
        let (mut client, server) = test_plumbing();
        drop(server);
        assert!(client.send.write_all(b"hi").await.is_err());
    }
}
