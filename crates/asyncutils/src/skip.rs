use bytes::Bytes;
use futures::Stream;
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

pin_project! {
    /// Discards the first `pending` bytes of the inner stream.
    pub struct SkippedStream<S> {
        #[pin]
        inner: S,
        pending: u64,
    }
}

impl<S> SkippedStream<S> {
    pub fn new(inner: S, count: u64) -> Self {
        Self { inner, pending: count }
    }
}

impl<S, E> Stream for SkippedStream<S>
where
    S: Stream<Item = Result<Bytes, E>>,
{
    type Item = Result<Bytes, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        loop {
            match ready!(this.inner.as_mut().poll_next(cx)) {
                Some(Ok(mut chunk)) if *this.pending > 0 => {
                    let len = chunk.len() as u64;
                    if len <= *this.pending {
                        *this.pending -= len;
                        continue;
                    }
                    let tail = chunk.split_off(*this.pending as usize);
                    *this.pending = 0;
                    return Poll::Ready(Some(Ok(tail)));
                },
                other => return Poll::Ready(other),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::ByteStreamExt;
    use bytes::Bytes;
    use futures::{TryStreamExt, stream};
    use rstest::rstest;
    use std::convert::Infallible;

    #[rstest]
    #[case(0, 10, b"abcdefghij")]
    #[case(2, 3, b"cde")]
    #[case(4, 3, b"efg")]
    #[case(5, 5, b"fghij")]
    #[case(9, 5, b"j")]
    #[case(12, 5, b"")]
    #[tokio::test]
    async fn test_slice_window(#[case] offset: u64, #[case] len: u64, #[case] expected: &[u8]) {
        let inner = stream::iter(
            [&b"abcde"[..], b"fgh", b"", b"ij"]
                .map(|p| Ok::<_, Infallible>(Bytes::copy_from_slice(p))),
        );
        let collected: Vec<Bytes> = inner.slice_bytes(offset, len).try_collect().await.unwrap();
        assert_eq!(collected.concat(), expected);
    }
}
