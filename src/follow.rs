//! Polling follow loops: by descriptor and by name.
//!
//! Both variants share one tick loop (cancellation, PID liveness, tick timer)
//! and differ only in what a tick does. Failures inside a tick are absorbed;
//! only an output failure ends the loop.

use crate::error::{Error, Result};
use crate::line::LineFormat;
use crate::opener::FileOpener;
use crate::process::ProcessAlive;
use std::fs::Metadata;
use std::io::{SeekFrom, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncSeekExt};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Identifies the file behind a path, independent of its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileIdentity {
    #[cfg(unix)]
    device: u64,
    #[cfg(unix)]
    inode: u64,
    #[cfg(not(unix))]
    created: Option<std::time::SystemTime>,
}

impl FileIdentity {
    pub fn from_metadata(metadata: &Metadata) -> Self {
        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            Self {
                device: metadata.dev(),
                inode: metadata.ino(),
            }
        }
        #[cfg(not(unix))]
        {
            Self {
                created: metadata.created().ok(),
            }
        }
    }
}

/// Everything a follow loop needs besides the variant state.
pub(crate) struct FollowContext {
    pub(crate) format: LineFormat,
    pub(crate) poll_interval: Duration,
    pub(crate) pid: Option<u32>,
    pub(crate) process: Arc<dyn ProcessAlive>,
    pub(crate) cancel: CancellationToken,
}

/// A follow strategy, chosen once when following starts.
pub(crate) enum Follower {
    Descriptor(DescriptorFollow),
    Name(NameFollow),
}

impl Follower {
    /// Ticks until cancelled, the watched PID exits, or output fails.
    pub(crate) async fn run<W>(mut self, ctx: &FollowContext, out: &mut W) -> Result<()>
    where
        W: Write + ?Sized,
    {
        let mut ticker =
            tokio::time::interval_at(Instant::now() + ctx.poll_interval, ctx.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if let Some(pid) = ctx.pid {
                if !ctx.process.is_alive(pid) {
                    info!(pid, "watched process exited, stopping follow");
                    return Ok(());
                }
            }

            tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => return Ok(()),
                _ = ticker.tick() => {}
            }

            let tick = match &mut self {
                Follower::Descriptor(state) => state.tick(ctx.format, out).await,
                Follower::Name(state) => state.tick(ctx.format, out).await,
            }
            .and_then(|()| out.flush().map_err(Error::Output));

            if let Err(e) = tick {
                if e.is_fatal_for_follow() {
                    return Err(e);
                }
                debug!(error = %e, "follow tick failed, retrying next interval");
            }
        }
    }
}

/// Keeps reading the handle opened for the initial window.
///
/// Renames are invisible here and truncation is not detected: a truncated
/// file leaves `position` past its end and nothing more is read.
pub(crate) struct DescriptorFollow {
    file: File,
    position: u64,
}

impl DescriptorFollow {
    pub(crate) fn new(file: File, position: u64) -> Self {
        Self { file, position }
    }

    pub(crate) async fn tick<W: Write + ?Sized>(
        &mut self,
        format: LineFormat,
        out: &mut W,
    ) -> Result<()> {
        self.file.seek(SeekFrom::Start(self.position)).await?;
        drain_complete_lines(&mut self.file, &mut self.position, format, out).await
    }
}

/// Re-stats the path every tick and reopens it to read new content.
pub(crate) struct NameFollow {
    path: PathBuf,
    opener: Arc<dyn FileOpener>,
    position: u64,
    last_size: u64,
    identity: Option<FileIdentity>,
    unchanged: u32,
    max_unchanged_stats: Option<u32>,
}

impl NameFollow {
    /// Starts from `position`, taking size and identity from a fresh stat
    /// when the path is currently there.
    pub(crate) async fn start(
        path: PathBuf,
        opener: Arc<dyn FileOpener>,
        position: u64,
        max_unchanged_stats: Option<u32>,
    ) -> Self {
        let (last_size, identity) = match tokio::fs::metadata(&path).await {
            Ok(metadata) => (metadata.len(), Some(FileIdentity::from_metadata(&metadata))),
            Err(_) => (0, None),
        };

        Self {
            path,
            opener,
            position,
            last_size,
            identity,
            unchanged: 0,
            max_unchanged_stats,
        }
    }

    pub(crate) async fn tick<W: Write + ?Sized>(
        &mut self,
        format: LineFormat,
        out: &mut W,
    ) -> Result<()> {
        let metadata = match tokio::fs::metadata(&self.path).await {
            Ok(metadata) => metadata,
            Err(e) => {
                // Missing mid-rotation, or gone for good; wait for it either way.
                trace!(path = %self.path.display(), error = %e, "stat failed");
                return Ok(());
            }
        };
        let size = metadata.len();
        let identity = FileIdentity::from_metadata(&metadata);

        // A file showing up after the path was missing at start is a new file too.
        if self.identity != Some(identity) {
            info!(path = %self.path.display(), "file replaced, reading new file from start");
            self.position = 0;
            self.last_size = 0;
            self.identity = Some(identity);
            self.unchanged = 0;
        }

        if size < self.last_size || size < self.position {
            info!(path = %self.path.display(), size, "file truncated");
            self.position = 0;
            self.last_size = size;
        }

        if size == self.last_size && self.position == self.last_size {
            self.unchanged += 1;
            self.recheck_identity_if_stalled().await;
            return Ok(());
        }
        self.unchanged = 0;

        let file = self.opener.open(&self.path)?;
        let mut file = File::from_std(file);
        file.seek(SeekFrom::Start(self.position)).await?;
        drain_complete_lines(&mut file, &mut self.position, format, out).await?;

        // The file may have grown between the stat and the read.
        self.last_size = size.max(self.position);
        Ok(())
    }

    /// After enough idle ticks, stat once more to catch a replacement that
    /// kept the same size.
    async fn recheck_identity_if_stalled(&mut self) {
        let Some(max) = self.max_unchanged_stats else {
            return;
        };
        if self.unchanged < max {
            return;
        }
        self.unchanged = 0;

        if let Ok(metadata) = tokio::fs::metadata(&self.path).await {
            let identity = FileIdentity::from_metadata(&metadata);
            if self.identity.is_some_and(|known| known != identity) {
                info!(path = %self.path.display(), "replacement found after idle ticks");
                self.position = 0;
                self.last_size = 0;
                self.identity = Some(identity);
            }
        }
    }
}

/// Writes every complete line available from `source`, advancing `position`
/// past each one as it is written. A trailing partial line is left unread.
///
/// A line over the length limit is skipped once its delimiter has arrived.
async fn drain_complete_lines<R, W>(
    source: &mut R,
    position: &mut u64,
    format: LineFormat,
    out: &mut W,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: Write + ?Sized,
{
    let start = *position;
    let mut reader = format.reader(source);

    loop {
        match reader.next_line().await {
            Ok(Some(line)) if line.terminated => {
                format.write_line(out, &line.content)?;
            }
            Ok(_) => return Ok(()),
            Err(Error::LineTooLong { limit }) => {
                if !reader.skip_line().await? {
                    return Ok(());
                }
                warn!(limit, offset = *position, "skipped line over the length limit");
            }
            Err(e) => return Err(e),
        }
        *position = start + reader.consumed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_MAX_LINE_LENGTH, Delimiter};
    use crate::opener::SystemOpener;
    use crate::process::SystemProcess;
    use crate::test_helpers::TempLogFile;

    fn newline() -> LineFormat {
        LineFormat {
            delimiter: Delimiter::Newline,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }

    async fn open(temp: &TempLogFile) -> File {
        File::open(temp.path()).await.unwrap()
    }

    async fn by_name(temp: &TempLogFile, position: u64) -> NameFollow {
        NameFollow::start(temp.path().to_path_buf(), Arc::new(SystemOpener), position, None).await
    }

    #[tokio::test]
    async fn test_descriptor_reads_appended_lines() {
        let temp = TempLogFile::with_content("old\n").unwrap();
        let mut follow = DescriptorFollow::new(open(&temp).await, 4);
        let mut out = Vec::new();

        temp.append("new1\nnew2\n").unwrap();
        follow.tick(newline(), &mut out).await.unwrap();

        assert_eq!(out, b"new1\nnew2\n");
        assert_eq!(follow.position, 14);
    }

    #[tokio::test]
    async fn test_descriptor_holds_partial_line_until_terminated() {
        let temp = TempLogFile::new().unwrap();
        let mut follow = DescriptorFollow::new(open(&temp).await, 0);
        let mut out = Vec::new();

        temp.append("par").unwrap();
        follow.tick(newline(), &mut out).await.unwrap();
        assert!(out.is_empty());
        assert_eq!(follow.position, 0);

        temp.append("tial\r\n").unwrap();
        follow.tick(newline(), &mut out).await.unwrap();
        assert_eq!(out, b"partial\n");
        assert_eq!(follow.position, 9);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_descriptor_follows_renamed_file() {
        let temp = TempLogFile::with_content("start\n").unwrap();
        let mut follow = DescriptorFollow::new(open(&temp).await, 6);
        let mut out = Vec::new();

        let moved = temp.rotate().unwrap();
        TempLogFile::append_to(&moved, "to old inode\n").unwrap();
        temp.append("to new file\n").unwrap();
        follow.tick(newline(), &mut out).await.unwrap();

        assert_eq!(out, b"to old inode\n");
    }

    #[tokio::test]
    async fn test_descriptor_ignores_truncation() {
        let temp = TempLogFile::with_content("0123456789\n").unwrap();
        let mut follow = DescriptorFollow::new(open(&temp).await, 11);
        let mut out = Vec::new();

        temp.truncate().unwrap();
        temp.append("short\n").unwrap();
        follow.tick(newline(), &mut out).await.unwrap();

        assert!(out.is_empty());
        assert_eq!(follow.position, 11);
    }

    #[tokio::test]
    async fn test_name_reads_growth() {
        let temp = TempLogFile::with_content("a\n").unwrap();
        let mut follow = by_name(&temp, 2).await;
        let mut out = Vec::new();

        follow.tick(newline(), &mut out).await.unwrap();
        assert!(out.is_empty());
        assert_eq!(follow.unchanged, 1);

        temp.append("b\n").unwrap();
        follow.tick(newline(), &mut out).await.unwrap();

        assert_eq!(out, b"b\n");
        assert_eq!(follow.position, 4);
        assert_eq!(follow.last_size, 4);
        assert_eq!(follow.unchanged, 0);
    }

    #[tokio::test]
    async fn test_name_restarts_after_truncation() {
        let temp = TempLogFile::with_content("first line\nsecond line\n").unwrap();
        let mut follow = by_name(&temp, 23).await;
        let mut out = Vec::new();

        temp.truncate().unwrap();
        temp.append("fresh\n").unwrap();
        follow.tick(newline(), &mut out).await.unwrap();

        assert_eq!(out, b"fresh\n");
        assert_eq!(follow.position, 6);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_name_switches_to_replacement() {
        let temp = TempLogFile::with_content("old content\n").unwrap();
        let mut follow = by_name(&temp, 12).await;
        let mut out = Vec::new();

        let moved = temp.rotate().unwrap();
        TempLogFile::append_to(&moved, "lost to rotation\n").unwrap();
        temp.append("new content\n").unwrap();
        follow.tick(newline(), &mut out).await.unwrap();

        assert_eq!(out, b"new content\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_name_waits_while_file_missing() {
        let temp = TempLogFile::with_content("x\n").unwrap();
        let mut follow = by_name(&temp, 2).await;
        let mut out = Vec::new();

        let _moved = temp.rotate().unwrap();
        follow.tick(newline(), &mut out).await.unwrap();
        assert!(out.is_empty());

        temp.append("back\n").unwrap();
        follow.tick(newline(), &mut out).await.unwrap();
        assert_eq!(out, b"back\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_name_stalled_recheck_catches_same_size_replacement() {
        let temp = TempLogFile::with_content("aaaa\n").unwrap();
        let mut follow = NameFollow::start(
            temp.path().to_path_buf(),
            Arc::new(SystemOpener),
            5,
            Some(2),
        )
        .await;
        let mut out = Vec::new();

        follow.tick(newline(), &mut out).await.unwrap();
        assert_eq!(follow.unchanged, 1);

        // Same size as before, different file.
        let _moved = temp.rotate().unwrap();
        temp.append("bbbb\n").unwrap();

        follow.unchanged = 1;
        follow.recheck_identity_if_stalled().await;
        assert_eq!(follow.position, 5, "below threshold nothing happens");

        follow.unchanged = 2;
        follow.recheck_identity_if_stalled().await;
        assert_eq!(follow.position, 0);
        assert_eq!(follow.unchanged, 0);

        follow.tick(newline(), &mut out).await.unwrap();
        assert_eq!(out, b"bbbb\n");
    }

    #[tokio::test]
    async fn test_nul_delimited_follow_keeps_delimiter() {
        let temp = TempLogFile::new().unwrap();
        let mut follow = by_name(&temp, 0).await;
        let format = LineFormat {
            delimiter: Delimiter::Nul,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        };
        let mut out = Vec::new();

        temp.append("one\0two\0thr").unwrap();
        follow.tick(format, &mut out).await.unwrap();

        assert_eq!(out, b"one\0two\0");
        assert_eq!(follow.position, 8);
    }

    #[tokio::test]
    async fn test_run_exits_when_pid_is_gone() {
        let temp = TempLogFile::with_content("x\n").unwrap();
        let ctx = FollowContext {
            format: newline(),
            poll_interval: Duration::from_secs(60),
            pid: Some(999_999_999),
            process: Arc::new(SystemProcess),
            cancel: CancellationToken::new(),
        };
        let follower = Follower::Descriptor(DescriptorFollow::new(open(&temp).await, 2));
        let mut out = Vec::new();

        let result =
            tokio::time::timeout(Duration::from_millis(500), follower.run(&ctx, &mut out)).await;

        assert!(result.is_ok(), "follow should stop without waiting a tick");
        assert!(result.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let temp = TempLogFile::new().unwrap();
        let ctx = FollowContext {
            format: newline(),
            poll_interval: Duration::from_millis(10),
            pid: None,
            process: Arc::new(SystemProcess),
            cancel: CancellationToken::new(),
        };
        let follower = Follower::Name(by_name(&temp, 0).await);
        let cancel = ctx.cancel.clone();

        let handle = tokio::spawn(async move {
            let mut out = Vec::new();
            follower.run(&ctx, &mut out).await
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_millis(500), handle).await;
        assert!(result.is_ok());
        assert!(result.unwrap().unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_run_ends_on_output_failure() {
        struct ClosedSink;
        impl Write for ClosedSink {
            fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let temp = TempLogFile::new().unwrap();
        temp.append("line\n").unwrap();
        let ctx = FollowContext {
            format: newline(),
            poll_interval: Duration::from_millis(10),
            pid: None,
            process: Arc::new(SystemProcess),
            cancel: CancellationToken::new(),
        };
        let follower = Follower::Descriptor(DescriptorFollow::new(open(&temp).await, 0));

        let result = tokio::time::timeout(
            Duration::from_millis(500),
            follower.run(&ctx, &mut ClosedSink),
        )
        .await
        .expect("output failure should end the loop");

        assert!(matches!(result, Err(crate::error::Error::Output(_))));
    }

    fn limited(max_line_length: usize) -> LineFormat {
        LineFormat {
            delimiter: Delimiter::Newline,
            max_line_length,
        }
    }

    #[tokio::test]
    async fn test_descriptor_skips_overlong_line() {
        let temp = TempLogFile::new().unwrap();
        let mut follow = DescriptorFollow::new(open(&temp).await, 0);
        let mut out = Vec::new();

        temp.append("this line is far too long\nok\n").unwrap();
        follow.tick(limited(8), &mut out).await.unwrap();
        assert_eq!(out, b"ok\n");
        assert_eq!(follow.position, 29);

        temp.append("later\n").unwrap();
        follow.tick(limited(8), &mut out).await.unwrap();
        assert_eq!(out, b"ok\nlater\n");
    }

    #[tokio::test]
    async fn test_name_skips_overlong_line() {
        let temp = TempLogFile::new().unwrap();
        let mut follow = by_name(&temp, 0).await;
        let mut out = Vec::new();

        temp.append("this line is far too long\nok\n").unwrap();
        follow.tick(limited(8), &mut out).await.unwrap();
        temp.append("later\n").unwrap();
        follow.tick(limited(8), &mut out).await.unwrap();

        assert_eq!(out, b"ok\nlater\n");
        assert_eq!(follow.position, 35);
    }

    #[tokio::test]
    async fn test_overlong_line_waits_for_its_delimiter() {
        let temp = TempLogFile::new().unwrap();
        let mut follow = DescriptorFollow::new(open(&temp).await, 0);
        let mut out = Vec::new();

        temp.append("still being written").unwrap();
        follow.tick(limited(8), &mut out).await.unwrap();
        assert!(out.is_empty());
        assert_eq!(follow.position, 0);

        temp.append(" and done\nnext\n").unwrap();
        follow.tick(limited(8), &mut out).await.unwrap();
        assert_eq!(out, b"next\n");
    }

    /// Appends once right before opening, as a writer racing the stat would.
    struct GrowsOnOpen {
        extra: &'static str,
        fired: std::sync::atomic::AtomicBool,
    }

    impl FileOpener for GrowsOnOpen {
        fn open(&self, path: &std::path::Path) -> std::io::Result<std::fs::File> {
            if !self.fired.swap(true, std::sync::atomic::Ordering::SeqCst) {
                TempLogFile::append_to(path, self.extra)?;
            }
            std::fs::File::open(path)
        }
    }

    #[tokio::test]
    async fn test_name_detects_truncation_after_read_past_stat() {
        let temp = TempLogFile::with_content("aaaa\nbbbb\n").unwrap();
        let opener = Arc::new(GrowsOnOpen {
            extra: "dddd\n",
            fired: Default::default(),
        });
        let mut follow = NameFollow::start(temp.path().to_path_buf(), opener, 10, None).await;
        let mut out = Vec::new();

        temp.append("cccc\n").unwrap();
        follow.tick(newline(), &mut out).await.unwrap();
        assert_eq!(out, b"cccc\ndddd\n");
        assert_eq!(follow.position, 20);
        assert_eq!(follow.last_size, 20);

        // Shrinks, but stays above the size seen at the last stat.
        temp.truncate().unwrap();
        temp.append("new1\nnew2\nnew3\n").unwrap();
        out.clear();
        follow.tick(newline(), &mut out).await.unwrap();

        assert_eq!(out, b"new1\nnew2\nnew3\n");
    }

    #[tokio::test]
    async fn test_name_reads_file_that_appears_after_start() {
        let temp = TempLogFile::new().unwrap();
        let path = temp.path().with_file_name("later.log");
        let mut follow = NameFollow::start(path.clone(), Arc::new(SystemOpener), 5, None).await;
        let mut out = Vec::new();

        follow.tick(newline(), &mut out).await.unwrap();
        assert!(out.is_empty());

        TempLogFile::publish(&path, "abcdefgh\n").unwrap();
        follow.tick(newline(), &mut out).await.unwrap();

        assert_eq!(out, b"abcdefgh\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_name_unchanged_counter_resets_at_threshold() {
        let temp = TempLogFile::with_content("aaaa\n").unwrap();
        let mut follow =
            NameFollow::start(temp.path().to_path_buf(), Arc::new(SystemOpener), 5, Some(3))
                .await;
        let mut out = Vec::new();

        for expected in [1, 2, 0, 1] {
            follow.tick(newline(), &mut out).await.unwrap();
            assert_eq!(follow.unchanged, expected);
        }

        let _moved = temp.rotate().unwrap();
        TempLogFile::publish(temp.path(), "bbbb\n").unwrap();
        follow.tick(newline(), &mut out).await.unwrap();

        assert_eq!(out, b"bbbb\n");
        assert_eq!(follow.unchanged, 0);
    }
}
