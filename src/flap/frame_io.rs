use std::fmt::{Debug, Formatter};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
#[cfg(test)] use mockall::automock;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::select;
use tokio::sync::{watch, Mutex};
use tokio::time;
use tracing::{debug, trace};

use crate::error::{TocError, TocResult};
use crate::flap::frame::{Frame, FrameKind};
use crate::util::random::{Random, RngRandom};


/// Result of polling the stream for the next frame: running into the read timeout is a normal
///  outcome while the connection is idle, not an error.
#[derive(Debug, Eq, PartialEq)]
pub enum ReadOutcome {
    Frame(Frame),
    Idle,
}


/// Reading side of a connected stream. Bytes are accumulated in an internal buffer, so a read
///  timeout in the middle of a frame loses nothing: the next call continues where the previous
///  one stopped.
pub struct FrameReader<R = OwnedReadHalf> {
    read: R,
    buf: BytesMut,
    closed: watch::Receiver<bool>,
    timeout: Duration,
}
impl <R> Debug for FrameReader<R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "FrameReader{{buffered:{}, timeout:{:?}}}", self.buf.len(), self.timeout)
    }
}

impl <R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(read: R, closed: watch::Receiver<bool>, timeout: Duration) -> FrameReader<R> {
        FrameReader {
            read,
            buf: BytesMut::with_capacity(8192),
            closed,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub async fn read_frame(&mut self) -> TocResult<ReadOutcome> {
        loop {
            if let Some(frame) = Frame::try_decode(&mut self.buf)? {
                trace!("received {:?}", frame);
                return Ok(ReadOutcome::Frame(frame));
            }
            if !self.fill().await? {
                return Ok(ReadOutcome::Idle);
            }
        }
    }

    /// Reads a fixed number of raw bytes, bypassing frame decoding. Used for the signon
    ///  acknowledgement block during the handshake.
    pub async fn read_block(&mut self, len: usize) -> TocResult<Option<Bytes>> {
        while self.buf.len() < len {
            if !self.fill().await? {
                return Ok(None);
            }
        }
        Ok(Some(self.buf.split_to(len).freeze()))
    }

    /// returns `false` if no data arrived within the timeout
    async fn fill(&mut self) -> TocResult<bool> {
        if *self.closed.borrow() {
            return Err(TocError::ConnectionClosed);
        }

        select! {
            result = time::timeout(self.timeout, self.read.read_buf(&mut self.buf)) => {
                match result {
                    Err(_) => Ok(false),
                    Ok(Ok(0)) => {
                        if self.buf.is_empty() {
                            Err(TocError::ClosedRemotely)
                        }
                        else {
                            Err(TocError::ProtocolViolation(format!("stream ended with {} bytes of an incomplete frame", self.buf.len())))
                        }
                    }
                    Ok(Ok(_)) => Ok(true),
                    Ok(Err(e)) => Err(TocError::TerminalIo(e)),
                }
            }
            _ = self.closed.changed() => {
                debug!("stream was closed locally while reading");
                Err(TocError::ConnectionClosed)
            }
        }
    }
}


/// The seam between the rate limiter and the actual stream
#[cfg_attr(test, automock)]
#[async_trait]
pub trait FrameSink: Send + Sync + 'static {
    async fn write_frame(&self, kind: FrameKind, payload: &[u8]) -> TocResult<()>;
}


/// Writing side of a connected stream. It owns the outbound sequence counter, which starts at a
///  random value per stream and wraps around.
pub struct FrameWriter<W = OwnedWriteHalf> {
    inner: Mutex<WriterInner<W>>,
    closed: watch::Receiver<bool>,
}
struct WriterInner<W> {
    write: Option<W>,
    next_sequence: u16,
}
impl <W> Debug for FrameWriter<W> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "FrameWriter{{closed:{}}}", *self.closed.borrow())
    }
}

impl <W: AsyncWrite + Unpin + Send> FrameWriter<W> {
    pub fn new(write: W, closed: watch::Receiver<bool>) -> FrameWriter<W> {
        Self::with_initial_sequence(write, closed, RngRandom::next_u16())
    }

    pub fn with_initial_sequence(write: W, closed: watch::Receiver<bool>, initial_sequence: u16) -> FrameWriter<W> {
        FrameWriter {
            inner: Mutex::new(WriterInner {
                write: Some(write),
                next_sequence: initial_sequence,
            }),
            closed,
        }
    }

    /// Writes bytes that are not frame wrapped, i.e. the handshake preamble
    pub async fn write_raw(&self, data: &[u8]) -> TocResult<()> {
        let mut inner = self.inner.lock().await;
        let write = self.live_stream(&mut inner)?;
        write.write_all(data).await.map_err(TocError::TerminalIo)?;
        write.flush().await.map_err(TocError::TerminalIo)
    }

    fn live_stream<'a>(&self, inner: &'a mut WriterInner<W>) -> TocResult<&'a mut W> {
        if *self.closed.borrow() {
            // release the write half so the socket gets closed once the reader is gone as well
            inner.write = None;
        }
        inner.write.as_mut()
            .ok_or(TocError::ConnectionClosed)
    }
}

#[async_trait]
impl <W: AsyncWrite + Unpin + Send + Sync + 'static> FrameSink for FrameWriter<W> {
    async fn write_frame(&self, kind: FrameKind, payload: &[u8]) -> TocResult<()> {
        let mut inner = self.inner.lock().await;
        let sequence = inner.next_sequence;

        let mut buf = BytesMut::new();
        Frame::encode_parts(kind, sequence, payload, &mut buf)?;

        let write = self.live_stream(&mut inner)?;
        write.write_all(&buf).await.map_err(TocError::TerminalIo)?;
        write.flush().await.map_err(TocError::TerminalIo)?;

        inner.next_sequence = sequence.wrapping_add(1);
        trace!(sequence, ?kind, len = payload.len(), "sent frame");
        Ok(())
    }
}
