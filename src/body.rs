//! Request/response bodies and the in-memory replay buffer.
//!
//! A [`Body`] is either absent ([`Body::empty`]), a single contiguous chunk of [`Bytes`], or a
//! boxed stream of chunks. An empty body is treated as "no body" everywhere in the crate, so a
//! zero-length chunk never triggers buffering.
//!
//! [`ReplayBody`] drains a body once and then hands out fresh views over the captured bytes, one
//! per attempt. Views share the same allocation; rewinding is free.
//!
//! ```rust
//! use retrans::{Body, ReplayBody};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let replay = ReplayBody::capture(Body::from("payload")).await.unwrap();
//! assert_eq!(replay.body().collect().await.unwrap(), "payload");
//! assert_eq!(replay.body().collect().await.unwrap(), "payload");
//! # });
//! ```

use bytes::{Bytes, BytesMut};
use futures::stream::{BoxStream, Stream, StreamExt};
use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Body carried by requests and responses flowing through the transport.
pub struct Body {
    kind: Kind,
}

enum Kind {
    Empty,
    Full(Bytes),
    Stream(BoxStream<'static, io::Result<Bytes>>),
}

impl Body {
    /// A body with no content; requests carrying it are never buffered.
    pub fn empty() -> Self {
        Self { kind: Kind::Empty }
    }

    /// Wrap a stream of chunks. The stream is consumed lazily by whoever reads the body.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        Self { kind: Kind::Stream(stream.boxed()) }
    }

    /// True when the body carries nothing at all.
    pub fn is_empty(&self) -> bool {
        matches!(self.kind, Kind::Empty)
    }

    /// Read every chunk into one contiguous buffer.
    pub async fn collect(self) -> io::Result<Bytes> {
        match self.kind {
            Kind::Empty => Ok(Bytes::new()),
            Kind::Full(bytes) => Ok(bytes),
            Kind::Stream(mut stream) => {
                let mut buf = BytesMut::new();
                while let Some(chunk) = stream.next().await {
                    buf.extend_from_slice(&chunk?);
                }
                Ok(buf.freeze())
            }
        }
    }

    /// Read and discard the remaining content, returning how many bytes were thrown away.
    pub async fn drain(mut self) -> io::Result<usize> {
        let mut discarded = 0;
        while let Some(chunk) = self.next().await {
            discarded += chunk?.len();
        }
        Ok(discarded)
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            Kind::Empty => f.write_str("Body(Empty)"),
            Kind::Full(bytes) => f.debug_tuple("Body").field(&bytes.len()).finish(),
            Kind::Stream(_) => f.write_str("Body(Stream)"),
        }
    }
}

impl Stream for Body {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match &mut this.kind {
            Kind::Empty => Poll::Ready(None),
            Kind::Full(bytes) => {
                let bytes = std::mem::take(bytes);
                this.kind = Kind::Empty;
                Poll::Ready(Some(Ok(bytes)))
            }
            Kind::Stream(stream) => stream.as_mut().poll_next(cx),
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        if bytes.is_empty() {
            Self::empty()
        } else {
            Self { kind: Kind::Full(bytes) }
        }
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Bytes::from(bytes).into()
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Bytes::from(s).into()
    }
}

impl From<&'static str> for Body {
    fn from(s: &'static str) -> Self {
        Bytes::from_static(s.as_bytes()).into()
    }
}

/// In-memory copy of a request body that can be submitted once per attempt.
///
/// Owned by a single retry sequence; never shared between requests.
#[derive(Debug, Clone)]
pub struct ReplayBody {
    buf: Bytes,
    replays: usize,
}

impl ReplayBody {
    /// Drain `body` completely. On a read error the original content is lost and the error is
    /// returned as-is.
    pub async fn capture(body: Body) -> io::Result<Self> {
        let buf = body.collect().await?;
        Ok(Self { buf, replays: 0 })
    }

    /// Fresh view positioned at the start of the captured bytes.
    pub fn body(&self) -> Body {
        Body::from(self.buf.clone())
    }

    /// Rewind for the next attempt and return the view to install on the request.
    pub fn rewind(&mut self) -> Body {
        self.replays += 1;
        self.body()
    }

    /// Number of times the buffer was rewound.
    pub fn replays(&self) -> usize {
        self.replays
    }

    /// Captured length in bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True if the captured body was empty.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}
