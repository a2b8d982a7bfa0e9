use bytes::Bytes;
use futures::Stream;
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

pin_project! {
    /// Ends the inner stream once `remaining` bytes have been yielded.
    ///
    /// The chunk that crosses the limit is truncated. Once the limit is hit
    /// the inner stream is never polled again, so a remote transfer that
    /// would have continued is simply abandoned when this is dropped.
    pub struct LimitedStream<S> {
        #[pin]
        inner: S,
        remaining: u64,
    }
}

impl<S> LimitedStream<S> {
    pub fn new(inner: S, limit: u64) -> Self {
        Self { inner, remaining: limit }
    }

    /// Bytes still allowed through.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S, E> Stream for LimitedStream<S>
where
    S: Stream<Item = Result<Bytes, E>>,
{
    type Item = Result<Bytes, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        if *this.remaining == 0 {
            return Poll::Ready(None);
        }
        match ready!(this.inner.poll_next(cx)) {
            Some(Ok(mut chunk)) => {
                // Only truncate when the chunk is longer than what's left, so
                // the cast back to usize can't overflow.
                if chunk.len() as u64 > *this.remaining {
                    chunk.truncate(*this.remaining as usize);
                }
                *this.remaining -= chunk.len() as u64;
                Poll::Ready(Some(Ok(chunk)))
            },
            other => Poll::Ready(other),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self.remaining {
            0 => (0, Some(0)),
            _ => (0, self.inner.size_hint().1),
        }
    }
}
