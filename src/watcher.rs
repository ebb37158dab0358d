//! Size-change detection by polling, independent of line handling.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// A change in file size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    /// The new file size.
    pub size: u64,
    /// True when the file shrank.
    pub truncated: bool,
}

/// Stats a path on a fixed interval and reports size changes.
///
/// Identity changes alone produce no event.
#[derive(Debug, Clone)]
pub struct PollingWatcher {
    path: PathBuf,
    poll_interval: Duration,
}

impl PollingWatcher {
    pub fn new<P: AsRef<Path>>(path: P, poll_interval: Duration) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            poll_interval,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Starts polling in a background task.
    ///
    /// Fails if the path cannot be stat'ed right now. The returned stream ends
    /// once `cancel` fires.
    pub async fn watch(&self, cancel: CancellationToken) -> Result<ReceiverStream<Event>> {
        let metadata = tokio::fs::metadata(&self.path)
            .await
            .map_err(|e| Error::from_open(&self.path, e))?;

        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(poll_sizes(
            self.path.clone(),
            self.poll_interval,
            metadata.len(),
            tx,
            cancel,
        ));

        Ok(ReceiverStream::new(rx))
    }
}

async fn poll_sizes(
    path: PathBuf,
    poll_interval: Duration,
    mut last_size: u64,
    tx: mpsc::Sender<Event>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + poll_interval, poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let size = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata.len(),
            Err(e) => {
                // Likely mid-rotation.
                trace!(path = %path.display(), error = %e, "stat failed");
                continue;
            }
        };
        if size == last_size {
            continue;
        }

        let event = Event {
            size,
            truncated: size < last_size,
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            sent = tx.send(event) => {
                if sent.is_err() {
                    return;
                }
                last_size = size;
            }
        }
    }
}
