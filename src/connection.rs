// ABOUTME: Frame-based TCP transport shared by every dialect, client and server side alike
// ABOUTME: Buffered two-phase reads (header bounds, then whole body) and a lockable writer half

use crate::error::{GatewayError, GatewayResult};
use crate::protocol::Protocol;
use bytes::{Buf, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::marker::PhantomData;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;
use tracing::trace;

/// Lifecycle of a client or server session. `Closing` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum SessionState {
    Connecting = 0,
    LoggedIn = 1,
    Closing = 2,
}

/// [`SessionState`] readable from any task
#[derive(Debug)]
pub struct AtomicState(AtomicU8);

impl AtomicState {
    pub fn new(state: SessionState) -> Self {
        Self(AtomicU8::new(state.into()))
    }

    pub fn load(&self) -> SessionState {
        SessionState::try_from(self.0.load(Ordering::Acquire)).unwrap_or(SessionState::Closing)
    }

    /// Move to `LoggedIn` unless the session is already closing
    pub fn login(&self) -> bool {
        self.0
            .compare_exchange(
                SessionState::Connecting.into(),
                SessionState::LoggedIn.into(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Enter `Closing`. True only for the caller that made the transition.
    pub fn begin_close(&self) -> bool {
        self.0.swap(SessionState::Closing.into(), Ordering::AcqRel) != u8::from(SessionState::Closing)
    }
}

/// Read half of a connection.
///
/// Bytes are accumulated until [`Protocol::check`] reports a whole packet;
/// partial bodies are never handed to the decoder. Leftover bytes stay
/// buffered for the next call.
#[derive(Debug)]
pub struct FrameReader<P: Protocol> {
    stream: OwnedReadHalf,
    buffer: BytesMut,
    _protocol: PhantomData<P>,
}

impl<P: Protocol> FrameReader<P> {
    pub fn new(stream: OwnedReadHalf) -> Self {
        Self {
            stream,
            // One maximum-size packet plus change
            buffer: BytesMut::with_capacity(4 * 1024),
            _protocol: PhantomData,
        }
    }

    /// Read a single frame decoded with the negotiated `version`.
    ///
    /// Returns `Ok(None)` when the peer closed the socket on a packet
    /// boundary. A framing error (bad length, unknown command) leaves the
    /// stream out of sync and the caller must drop the connection; a body
    /// decode error consumes the offending packet, see
    /// [`GatewayError::is_body_error`].
    pub async fn read_frame(&mut self, version: u8) -> GatewayResult<Option<P::Frame>> {
        loop {
            if let Some(frame) = self.parse_frame(version)? {
                return Ok(Some(frame));
            }

            if 0 == self.stream.read_buf(&mut self.buffer).await? {
                return if self.buffer.is_empty() {
                    Ok(None)
                } else {
                    Err(GatewayError::Connection(std::io::Error::new(
                        std::io::ErrorKind::ConnectionReset,
                        "connection reset by peer",
                    )))
                };
            }
        }
    }

    fn parse_frame(&mut self, version: u8) -> GatewayResult<Option<P::Frame>> {
        let Some(len) = P::check(&self.buffer[..])? else {
            return Ok(None);
        };

        let frame = P::parse(&self.buffer[..len], version);
        self.buffer.advance(len);

        let frame = frame?;
        trace!(
            isp = %P::ISP,
            command_id = format_args!("{:#x}", P::command_of(&frame)),
            seq = %P::sequence_of(&frame),
            "frame received"
        );
        Ok(Some(frame))
    }
}

/// Write half of a connection
#[derive(Debug)]
pub struct FrameWriter<P: Protocol> {
    stream: BufWriter<OwnedWriteHalf>,
    _protocol: PhantomData<P>,
}

impl<P: Protocol> FrameWriter<P> {
    pub fn new(stream: OwnedWriteHalf) -> Self {
        Self {
            stream: BufWriter::new(stream),
            _protocol: PhantomData,
        }
    }

    /// Encode and flush one frame
    pub async fn write_frame(&mut self, frame: &P::Frame) -> GatewayResult<()> {
        let bytes = P::encode_frame(frame);
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        trace!(
            isp = %P::ISP,
            command_id = format_args!("{:#x}", P::command_of(frame)),
            seq = %P::sequence_of(frame),
            len = bytes.len(),
            "frame sent"
        );
        Ok(())
    }

    pub async fn shutdown(&mut self) -> GatewayResult<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

/// A whole connection, used during the login exchange before the halves go
/// their separate ways.
#[derive(Debug)]
pub struct Connection<P: Protocol> {
    pub reader: FrameReader<P>,
    pub writer: FrameWriter<P>,
    peer: Option<SocketAddr>,
}

impl<P: Protocol> Connection<P> {
    pub fn new(socket: TcpStream) -> Connection<P> {
        let peer = socket.peer_addr().ok();
        let (read, write) = socket.into_split();
        Connection {
            reader: FrameReader::new(read),
            writer: FrameWriter::new(write),
            peer,
        }
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub async fn read_frame(&mut self, version: u8) -> GatewayResult<Option<P::Frame>> {
        self.reader.read_frame(version).await
    }

    pub async fn write_frame(&mut self, frame: &P::Frame) -> GatewayResult<()> {
        self.writer.write_frame(frame).await
    }

    pub fn into_split(self) -> (FrameReader<P>, FrameWriter<P>) {
        (self.reader, self.writer)
    }
}

/// Writer shared between a reader task, worker tasks and supervisors.
///
/// Writes are serialized by an async mutex. After [`SharedWriter::shutdown`]
/// every send fails with [`GatewayError::ConnectionClosed`].
#[derive(Debug)]
pub struct SharedWriter<P: Protocol> {
    inner: Mutex<Option<FrameWriter<P>>>,
}

impl<P: Protocol> SharedWriter<P> {
    pub fn new(writer: FrameWriter<P>) -> Self {
        Self {
            inner: Mutex::new(Some(writer)),
        }
    }

    pub async fn send(&self, frame: &P::Frame) -> GatewayResult<()> {
        let mut guard = self.inner.lock().await;
        match guard.as_mut() {
            Some(writer) => writer.write_frame(frame).await,
            None => Err(GatewayError::ConnectionClosed),
        }
    }

    /// Close the socket's write side. Safe to call more than once.
    pub async fn shutdown(&self) {
        let writer = self.inner.lock().await.take();
        if let Some(mut writer) = writer {
            // The peer may already be gone
            let _ = writer.shutdown().await;
        }
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.lock().await.is_none()
    }
}
