//! Combinators for streams of [`Bytes`](bytes::Bytes) chunks.
//!
//! Remote protocols rarely let us ask for "exactly bytes 10 to 19". FTP can
//! only seek to a start offset (`REST`), and HTTP servers are free to ignore
//! a `Range` header. These adapters cut an arbitrary chunk stream down to the
//! requested window:
//!
//! - [`SkippedStream`] drops the first `n` bytes.
//! - [`LimitedStream`] ends the stream after `n` bytes, truncating the chunk
//!   that crosses the boundary and never polling the inner stream again.

mod limit;
mod skip;

pub use crate::limit::LimitedStream;
pub use crate::skip::SkippedStream;
use bytes::Bytes;
use futures::Stream;

/// Extension methods for fallible byte streams.
pub trait ByteStreamExt: Stream + Sized {
    /// Yield at most `limit` bytes, then end the stream.
    fn limit_bytes(self, limit: u64) -> LimitedStream<Self> {
        LimitedStream::new(self, limit)
    }

    /// Discard the first `count` bytes.
    fn skip_bytes(self, count: u64) -> SkippedStream<Self> {
        SkippedStream::new(self, count)
    }

    /// Keep only the `len` bytes starting at `offset`.
    fn slice_bytes(self, offset: u64, len: u64) -> LimitedStream<SkippedStream<Self>>
    where
        SkippedStream<Self>: ByteStreamExt,
    {
        self.skip_bytes(offset).limit_bytes(len)
    }
}
impl<S, E> ByteStreamExt for S where S: Stream<Item = Result<Bytes, E>> {}
