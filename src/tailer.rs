//! Initial window extraction and hand-off to follow mode.

use crate::bytes;
use crate::config::{FollowMode, WailConfig, Window};
use crate::error::{Error, Result};
use crate::follow::{DescriptorFollow, FollowContext, Follower, NameFollow};
use crate::line::LineFormat;
use crate::lines;
use crate::opener::{FileOpener, SystemOpener};
use crate::process::{ProcessAlive, SystemProcess};
use std::io::Write;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::AsyncRead;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Tails one target described by a [`WailConfig`].
#[derive(Clone)]
pub struct Tailer {
    config: WailConfig,
    opener: Arc<dyn FileOpener>,
    process: Arc<dyn ProcessAlive>,
}

impl Tailer {
    pub fn new(config: WailConfig) -> Self {
        Self {
            config: config.normalized(),
            opener: Arc::new(SystemOpener),
            process: Arc::new(SystemProcess),
        }
    }

    pub fn with_opener(mut self, opener: Arc<dyn FileOpener>) -> Self {
        self.opener = opener;
        self
    }

    pub fn with_process(mut self, process: Arc<dyn ProcessAlive>) -> Self {
        self.process = process;
        self
    }

    pub fn config(&self) -> &WailConfig {
        &self.config
    }

    /// Writes the initial window of the file, then follows it if configured.
    ///
    /// Returns once the window is written (no follow), or when `cancel` fires
    /// or the watched PID exits (follow). With retry enabled a missing file is
    /// waited for instead of reported.
    pub async fn tail<W>(&self, out: &mut W, cancel: &CancellationToken) -> Result<()>
    where
        W: Write + ?Sized,
    {
        let mut file = match self.open() {
            Ok(file) => file,
            Err(e) if self.config.retry => {
                debug!(path = %self.config.path.display(), error = %e, "waiting for file");
                match self.wait_for_file(cancel).await {
                    Some(file) => file,
                    None => return Ok(()),
                }
            }
            Err(e) => return Err(e),
        };

        let position = self.write_window(&mut file, out).await?;
        out.flush().map_err(Error::Output)?;

        let follower = match self.config.follow {
            FollowMode::Off => return Ok(()),
            FollowMode::Descriptor => Follower::Descriptor(DescriptorFollow::new(file, position)),
            FollowMode::Name => {
                drop(file);
                Follower::Name(
                    NameFollow::start(
                        self.config.path.clone(),
                        Arc::clone(&self.opener),
                        position,
                        self.config.max_unchanged_stats,
                    )
                    .await,
                )
            }
        };

        follower.run(&self.follow_context(cancel), out).await
    }

    /// Writes the window of a stream that cannot seek, such as stdin.
    ///
    /// Streams are read once; follow settings do not apply.
    pub async fn tail_reader<R, W>(&self, input: &mut R, out: &mut W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: Write + ?Sized,
    {
        let format = self.format();
        match self.config.window {
            Window::LastBytes(n) => {
                bytes::last_bytes_stream(input, n, out).await?;
            }
            Window::FromByte(n) => {
                bytes::from_byte_stream(input, n, out).await?;
            }
            Window::LastLines(n) => {
                let (tail, _) = lines::last_lines_forward(input, n, format).await?;
                lines::write_lines(format, &tail, out)?;
            }
            Window::FromLine(n) => {
                lines::from_line(input, n, format, out).await?;
            }
        }
        out.flush().map_err(Error::Output)
    }

    /// Writes the configured window and returns the offset follow resumes from.
    async fn write_window<W>(&self, file: &mut File, out: &mut W) -> Result<u64>
    where
        W: Write + ?Sized,
    {
        let format = self.format();
        match self.config.window {
            Window::LastBytes(n) => bytes::last_bytes_seekable(file, n, out).await,
            Window::FromByte(n) => bytes::from_byte_seekable(file, n, out).await,
            Window::LastLines(n) => {
                let (tail, end) = lines::last_lines_seekable(file, n, format).await?;
                lines::write_lines(format, &tail, out)?;
                Ok(end)
            }
            Window::FromLine(n) => lines::from_line(file, n, format, out).await,
        }
    }

    fn open(&self) -> Result<File> {
        let path = &self.config.path;
        self.opener
            .open(path)
            .map(File::from_std)
            .map_err(|e| Error::from_open(path, e))
    }

    /// Polls for the file until it opens. `None` if cancelled first.
    async fn wait_for_file(&self, cancel: &CancellationToken) -> Option<File> {
        let interval = self.config.poll_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                _ = ticker.tick() => {}
            }
            match self.open() {
                Ok(file) => {
                    debug!(path = %self.config.path.display(), "file appeared");
                    return Some(file);
                }
                Err(e) => debug!(error = %e, "file still unavailable"),
            }
        }
    }

    fn format(&self) -> LineFormat {
        LineFormat::from_config(&self.config)
    }

    fn follow_context(&self, cancel: &CancellationToken) -> FollowContext {
        FollowContext {
            format: self.format(),
            poll_interval: self.config.poll_interval,
            pid: self.config.pid,
            process: Arc::clone(&self.process),
            cancel: cancel.clone(),
        }
    }
}
