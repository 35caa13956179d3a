// (c) 2025 qfs contributors

//! Stream typedefs and on-wire framing shared by every call
//!
//! # On-Wire Framing
//!
//! All protocol messages are sent in two parts:
//!
//! * [`MessageHeader`]
//! * The encoded message
//!
//! Both the header and payload are encoded using [BARE].
//!
//! A stream may end cleanly only on a frame boundary. Readers that need to tell the two
//! apart use [`ProtocolMessage::from_reader_async_framed_or_eof`].
//!
//! [BARE]: https://www.ietf.org/archive/id/draft-devault-bare-11.html

use anyhow::Error;
use bytes::BytesMut;
use serde_bare::error::Error as sbError;
use std::io::ErrorKind;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/////////////////////////////////////////////////////////////////////////////////////////////
// STREAM TYPEDEFS

/// QUIC application error code sent when we abandon a stream
pub const ABANDONED_STREAM_CODE: u32 = 1;

/// Marker trait for streams used for sending data
pub trait SendingStream: AsyncWrite + Send + Unpin {
    /// Abruptly terminates this direction of the stream.
    ///
    /// Transports which distinguish a reset from a graceful finish must signal a reset here,
    /// so the peer does not mistake an abandoned upload for a complete one.
    /// The default does nothing; dropping the stream is enough.
    fn abort(&mut self) {}
}

impl SendingStream for quinn::SendStream {
    fn abort(&mut self) {
        let _ = self.reset(ABANDONED_STREAM_CODE.into());
    }
}
impl SendingStream for Box<dyn SendingStream> {
    fn abort(&mut self) {
        self.as_mut().abort();
    }
}

/// Marker trait for streams used for receiving data
pub trait ReceivingStream: AsyncRead + Send + Unpin {
    /// Tells the peer we will not read any more from this stream.
    ///
    /// The default does nothing; dropping the stream is enough.
    fn abort(&mut self) {}
}

impl ReceivingStream for quinn::RecvStream {
    fn abort(&mut self) {
        let _ = self.stop(ABANDONED_STREAM_CODE.into());
    }
}
impl ReceivingStream for Box<dyn ReceivingStream> {
    fn abort(&mut self) {
        self.as_mut().abort();
    }
}

/// The sending half of a call's stream, type-erased over the transport
pub type BoxedSend = Box<dyn SendingStream>;
/// The receiving half of a call's stream, type-erased over the transport
pub type BoxedRecv = Box<dyn ReceivingStream>;

/// Syntactic sugar helper type
#[derive(Debug)]
pub struct SendReceivePair<S: SendingStream, R: ReceivingStream> {
    /// outbound data
    pub send: S,
    /// inbound data
    pub recv: R,
}

impl<S: SendingStream, R: ReceivingStream> From<(S, R)> for SendReceivePair<S, R> {
    fn from(value: (S, R)) -> Self {
        Self {
            send: value.0,
            recv: value.1,
        }
    }
}

impl<S: SendingStream, R: ReceivingStream> SendReceivePair<S, R> {
    /// Abruptly terminates both directions
    pub fn abort(&mut self) {
        self.send.abort();
        self.recv.abort();
    }
}

impl<S: SendingStream + 'static, R: ReceivingStream + 'static> SendReceivePair<S, R> {
    /// Erases the concrete stream types
    #[must_use]
    pub fn boxed(self) -> SendReceivePair<BoxedSend, BoxedRecv> {
        SendReceivePair {
            send: Box::new(self.send),
            recv: Box::new(self.recv),
        }
    }
}

// Needed so `Box<dyn ...>` can be formatted inside `SendReceivePair`
impl std::fmt::Debug for dyn SendingStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("<SendingStream>")
    }
}
impl std::fmt::Debug for dyn ReceivingStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("<ReceivingStream>")
    }
}

/////////////////////////////////////////////////////////////////////////////////////////////
// WIRE MESSAGE FRAMING

/// Framing header used on the wire for protocol messages
#[derive(serde::Serialize, serde::Deserialize, PartialEq, Eq, Debug, Default, Clone, Copy)]
pub struct MessageHeader {
    /// Size of the payload that follows the header
    pub size: u32,
}

impl MessageHeader {
    /// The on-wire size of this struct (of `MessageHeader` itself), which is fixed (any change would constitute a breaking protocol change)
    pub const SIZE: u32 = 4;
}
impl ProtocolMessage for MessageHeader {}

/// Provides I/O functions for all structs taking part in our protocol.
///
/// Callers are expected to use the `..._framed` functions, which include framing.
///
/// N.B. Message structs are not expected to override the provided implementations.
pub trait ProtocolMessage
where
    Self: serde::Serialize + serde::de::DeserializeOwned + Send + Sync,
{
    /// Specifies an absolute limit on the wire encoding of this type.
    /// The `from_..._framed` functions reject any attempts to deserialise
    /// a message with a header frame longer than the given value for the type.
    ///
    /// This limit prevents excessive memory consumption in the event of bugs or network corruption.
    const WIRE_ENCODING_LIMIT: u32 = 1_048_576;

    /// Checks the passed-in limit against this type's [`WIRE_ENCODING_LIMIT`](Self::WIRE_ENCODING_LIMIT).
    fn check_size(size: u32) -> Result<(), Error> {
        Self::check_size_usize(size as usize)
    }

    /// Checks the passed-in limit against this type's [`WIRE_ENCODING_LIMIT`](Self::WIRE_ENCODING_LIMIT).
    fn check_size_usize(size: usize) -> Result<(), Error> {
        anyhow::ensure!(
            size <= Self::WIRE_ENCODING_LIMIT as usize,
            "Wire message size {} was too long for {} (limit: {})",
            size,
            std::any::type_name::<Self>(),
            Self::WIRE_ENCODING_LIMIT
        );
        Ok(())
    }

    /// Creates this struct from a slice of bytes.
    /// The slice must be the correct size for the payload (that's what [`MessageHeader`] is for).
    fn from_slice(slice: &[u8]) -> Result<Self, sbError> {
        serde_bare::from_slice(slice)
    }

    /// Serializes this struct into a vector of bytes
    fn to_vec(&self) -> Result<Vec<u8>, sbError> {
        serde_bare::to_vec(&self)
    }

    /// Computes the size of this struct on the wire, excluding framing
    fn encoded_size(&self) -> Result<usize, sbError> {
        Ok(self.to_vec()?.len())
    }

    /// Deserializes this struct asynchronously using a given number of bytes from an async reader.
    fn from_reader_async<R>(
        reader: &mut R,
        size: u32,
    ) -> impl Future<Output = Result<Self, Error>> + Send
    where
        R: AsyncReadExt + Unpin + Send + ?Sized,
    {
        async move {
            let mut buffer = BytesMut::zeroed(usize::try_from(size)?);
            let _ = reader.read_exact(&mut buffer).await?;
            Ok(serde_bare::from_slice(&buffer)?)
        }
    }

    /// Deserializes this struct asynchronously by reading a [`MessageHeader`], then this struct as payload.
    ///
    /// This function checks the struct's [`WIRE_ENCODING_LIMIT`](Self::WIRE_ENCODING_LIMIT).
    /// End of stream anywhere is an error; see [`from_reader_async_framed_or_eof`](Self::from_reader_async_framed_or_eof).
    fn from_reader_async_framed<R>(
        reader: &mut R,
    ) -> impl Future<Output = Result<Self, Error>> + Send
    where
        R: AsyncReadExt + Unpin + Send + ?Sized,
    {
        async move {
            match Self::from_reader_async_framed_or_eof(reader).await? {
                Some(msg) => Ok(msg),
                None => Err(std::io::Error::from(ErrorKind::UnexpectedEof).into()),
            }
        }
    }

    /// As [`from_reader_async_framed`](Self::from_reader_async_framed), but a clean end of stream
    /// before the first byte of the header yields `Ok(None)`.
    ///
    /// End of stream part-way through a frame is still an error.
    fn from_reader_async_framed_or_eof<R>(
        reader: &mut R,
    ) -> impl Future<Output = Result<Option<Self>, Error>> + Send
    where
        R: AsyncReadExt + Unpin + Send + ?Sized,
    {
        async move {
            let mut raw = [0u8; MessageHeader::SIZE as usize];
            let mut filled = 0;
            while filled < raw.len() {
                let n = reader.read(&mut raw[filled..]).await?;
                if n == 0 {
                    if filled == 0 {
                        return Ok(None);
                    }
                    return Err(std::io::Error::from(ErrorKind::UnexpectedEof).into());
                }
                filled += n;
            }
            let header = MessageHeader::from_slice(&raw)?;
            Self::check_size(header.size)?;
            Ok(Some(Self::from_reader_async(reader, header.size).await?))
        }
    }

    /// Serializes this struct asynchronously into an arbitrary async writer by writing a [`MessageHeader`], then this struct as payload
    fn to_writer_async_framed<W>(
        &self,
        writer: &mut W,
    ) -> impl Future<Output = Result<(), Error>> + Send
    where
        W: AsyncWriteExt + Unpin + Send + ?Sized,
    {
        async move {
            let vec = self.to_vec()?;
            Self::check_size_usize(vec.len())?;
            #[allow(clippy::cast_possible_truncation)] // already checked
            let header = MessageHeader {
                size: vec.len() as u32,
            }
            .to_vec()?;
            writer.write_all(&header).await?;
            Ok(writer.write_all(&vec).await?)
        }
    }
}

/////////////////////////////////////////////////////////////////////////////////////////////
