use std::pin::Pin;
use std::task::{Context, Poll};
use bytes::Bytes;
use futures::Stream;
use pin_project_lite::pin_project;
use crate::core::{ProgressCallback, ProgressInfo};

pin_project! {
    /// Counts body bytes as reqwest pulls them and reports each step
    pub struct ProgressStream<S> {
        #[pin]
        inner: S,
        bytes_loaded: u64,
        bytes_total: u64,
        callback: ProgressCallback,
    }
}

impl<S> ProgressStream<S> {
    pub fn new(inner: S, bytes_total: u64, callback: ProgressCallback) -> Self {
        Self {
            inner,
            bytes_loaded: 0,
            bytes_total,
            callback,
        }
    }
}

impl<S> Stream for ProgressStream<S>
where
    S: Stream<Item = std::io::Result<Bytes>>,
{
    type Item = std::io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();

        match this.inner.poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                if !chunk.is_empty() {
                    *this.bytes_loaded += chunk.len() as u64;
                    (this.callback)(ProgressInfo {
                        bytes_loaded: *this.bytes_loaded,
                        bytes_total: *this.bytes_total,
                    });
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            other => other,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}
