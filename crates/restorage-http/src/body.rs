//! Body types bridging hyper and the blocking engine.
//!
//! [`RestorageBody`] is the response body: buffered JSON, an empty body, or
//! a stream of chunks produced by a blocking download task.
//! [`ChannelReader`] is the other direction: a [`std::io::Read`] over chunks
//! that the async side forwards from the request body.

use std::io::{self, Read};
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Buf, Bytes};
use http_body_util::Full;
use tokio::sync::mpsc;

/// Chunks in flight between the engine and the connection.
pub type ChunkReceiver = mpsc::Receiver<io::Result<Bytes>>;

/// Response body for ReStorage HTTP responses.
#[derive(Debug, Default)]
pub enum RestorageBody {
    /// A fully buffered body (JSON payloads, error bodies).
    Buffered(Full<Bytes>),
    /// Object payload produced incrementally by a blocking reader.
    Streaming(StreamingBody),
    /// No body (204 responses, HEAD responses).
    #[default]
    Empty,
}

impl RestorageBody {
    /// Create a buffered body from bytes.
    #[must_use]
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self::Buffered(Full::new(data.into()))
    }

    /// Create an empty body.
    #[must_use]
    pub fn empty() -> Self {
        Self::Empty
    }

    /// Create a streaming body that will yield exactly `length` bytes.
    #[must_use]
    pub fn streaming(rx: ChunkReceiver, length: u64) -> Self {
        Self::Streaming(StreamingBody { rx, remaining: length })
    }
}

/// Payload chunks received from a download task.
#[derive(Debug)]
pub struct StreamingBody {
    rx: ChunkReceiver,
    remaining: u64,
}

impl http_body::Body for RestorageBody {
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<http_body::Frame<Self::Data>, Self::Error>>> {
        match self.get_mut() {
            Self::Buffered(full) => Pin::new(full)
                .poll_frame(cx)
                .map_err(|never| match never {}),
            Self::Streaming(stream) => match stream.rx.poll_recv(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    stream.remaining = stream.remaining.saturating_sub(chunk.len() as u64);
                    Poll::Ready(Some(Ok(http_body::Frame::data(chunk))))
                }
                Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(e))),
                Poll::Ready(None) => Poll::Ready(None),
                Poll::Pending => Poll::Pending,
            },
            Self::Empty => Poll::Ready(None),
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            Self::Buffered(full) => full.is_end_stream(),
            Self::Streaming(stream) => stream.remaining == 0,
            Self::Empty => true,
        }
    }

    fn size_hint(&self) -> http_body::SizeHint {
        match self {
            Self::Buffered(full) => full.size_hint(),
            Self::Streaming(stream) => http_body::SizeHint::with_exact(stream.remaining),
            Self::Empty => http_body::SizeHint::with_exact(0),
        }
    }
}

/// Blocking [`Read`] over chunks sent from the async side.
///
/// Reads park the calling thread, so this must only be driven from a
/// blocking context such as `tokio::task::spawn_blocking`. The stream ends
/// when every sender is dropped; an `Err` chunk surfaces as a read error.
#[derive(Debug)]
pub struct ChannelReader {
    rx: ChunkReceiver,
    current: Bytes,
}

impl ChannelReader {
    /// Wrap the receiving half of an upload channel.
    #[must_use]
    pub fn new(rx: ChunkReceiver) -> Self {
        Self {
            rx,
            current: Bytes::new(),
        }
    }
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.current.is_empty() {
            match self.rx.blocking_recv() {
                Some(Ok(chunk)) => self.current = chunk,
                Some(Err(e)) => return Err(e),
                None => return Ok(0),
            }
        }
        let n = buf.len().min(self.current.len());
        buf[..n].copy_from_slice(&self.current[..n]);
        self.current.advance(n);
        Ok(n)
    }
}
