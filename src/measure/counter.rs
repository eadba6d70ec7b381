//! Pass-through byte counting

use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use tokio::io::AsyncWrite;
use tokio::sync::oneshot;

/// Counts bytes on their way to an inner writer
///
/// Only bytes the inner writer accepted are counted, so the total always
/// matches what was forwarded. The total is sent exactly once, when the
/// stream is shut down; dropping the counter without a shutdown never
/// reports.
#[derive(Debug)]
pub struct ByteCounter<W> {
    inner: W,
    total: u64,
    done: Option<oneshot::Sender<u64>>,
}

impl<W> ByteCounter<W> {
    /// Wrap `inner`, returning the counter and the receiver of its final total
    pub fn new(inner: W) -> (Self, oneshot::Receiver<u64>) {
        let (tx, rx) = oneshot::channel();
        let counter = Self {
            inner,
            total: 0,
            done: Some(tx),
        };
        (counter, rx)
    }

    #[cfg(test)]
    fn total(&self) -> u64 {
        self.total
    }

    fn report(&mut self) {
        if let Some(done) = self.done.take() {
            // The receiver may already be gone on an aborted run
            let _ = done.send(self.total);
        }
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for ByteCounter<W> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let written = ready!(Pin::new(&mut this.inner).poll_write(cx, buf))?;
        this.total += written as u64;
        Poll::Ready(Ok(written))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        // No writes follow a shutdown, so the total is final here
        this.report();
        Pin::new(&mut this.inner).poll_shutdown(cx)
    }
}
