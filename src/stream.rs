//! Stream facade over a tail running in the background.

use crate::error::Result;
use crate::tailer::Tailer;
use futures::Stream;
use std::io::{self, Write};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A stream of output chunks from a [`Tailer`].
///
/// Each item is one write of tail output: a whole line for line windows, a
/// block of bytes for byte windows. A failure that ends the tail arrives as
/// the last item. Dropping the stream stops the background task.
pub struct TailStream {
    receiver: mpsc::UnboundedReceiver<Result<Vec<u8>>>,
    cancel: CancellationToken,
    _task_handle: JoinHandle<()>,
}

impl TailStream {
    /// Spawns the tail onto the current tokio runtime.
    pub fn new(tailer: Tailer) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let task_cancel = cancel.clone();
        let task_handle = tokio::spawn(async move {
            let mut writer = ChannelWriter { tx: tx.clone() };
            if let Err(e) = tailer.tail(&mut writer, &task_cancel).await {
                debug!(path = %tailer.config().path.display(), error = %e, "tail ended");
                let _ = tx.send(Err(e));
            }
        });

        TailStream {
            receiver: rx,
            cancel,
            _task_handle: task_handle,
        }
    }

    /// Check if the stream has been closed/dropped
    #[cfg(test)]
    pub fn is_closed(&self) -> bool {
        self.receiver.is_closed()
    }
}

impl Drop for TailStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl Stream for TailStream {
    type Item = Result<Vec<u8>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_recv(cx)
    }
}

/// Forwards each write as one stream item.
struct ChannelWriter {
    tx: mpsc::UnboundedSender<Result<Vec<u8>>>,
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.tx
            .send(Ok(buf.to_vec()))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "tail stream dropped"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
