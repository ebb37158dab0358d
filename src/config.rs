//! Request description for one tailed target.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Lines emitted when no count is given.
pub const DEFAULT_LINES: u64 = 10;

/// Poll interval used when none (or zero) is configured.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Longest line the splitter accepts before failing.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Which part of the source the initial read emits.
///
/// Counts for the `From*` variants are 1-indexed: `FromByte(1)` and
/// `FromLine(1)` both start at the beginning of the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    LastLines(u64),
    FromLine(u64),
    LastBytes(u64),
    FromByte(u64),
}

impl Window {
    /// Builds a window from separately parsed line and byte counts.
    ///
    /// Bytes take precedence when both are set. Lines fall back to
    /// [`DEFAULT_LINES`] when unset or zero.
    pub fn resolve(lines: Option<u64>, bytes: Option<u64>, from_start: bool) -> Self {
        match (bytes, from_start) {
            (Some(n), false) => Window::LastBytes(n),
            (Some(n), true) => Window::FromByte(n),
            (None, from_start) => {
                let n = lines.filter(|n| *n > 0).unwrap_or(DEFAULT_LINES);
                if from_start {
                    Window::FromLine(n)
                } else {
                    Window::LastLines(n)
                }
            }
        }
    }

    /// Applies the documented defaults to degenerate counts.
    pub(crate) fn normalized(self) -> Self {
        match self {
            Window::LastLines(0) => Window::LastLines(DEFAULT_LINES),
            Window::FromLine(0) => Window::FromLine(1),
            other => other,
        }
    }
}

impl Default for Window {
    fn default() -> Self {
        Window::LastLines(DEFAULT_LINES)
    }
}

/// Byte that terminates a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delimiter {
    /// `\n`, with a trailing `\r` stripped from each line.
    #[default]
    Newline,
    /// NUL, for `-z` style records.
    Nul,
}

impl Delimiter {
    pub fn byte(self) -> u8 {
        match self {
            Delimiter::Newline => b'\n',
            Delimiter::Nul => b'\0',
        }
    }
}

/// How, if at all, to keep reading after the initial window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FollowMode {
    #[default]
    Off,
    /// Keep the original handle, ignoring renames and truncation.
    Descriptor,
    /// Re-stat and reopen the path, detecting rotation and truncation.
    Name,
}

/// Immutable description of what to tail and how.
#[derive(Debug, Clone)]
pub struct WailConfig {
    pub path: PathBuf,
    pub window: Window,
    pub delimiter: Delimiter,
    pub follow: FollowMode,
    /// Wait for the file to appear (or reappear) instead of failing.
    pub retry: bool,
    pub poll_interval: Duration,
    /// Stop following once this process is gone.
    pub pid: Option<u32>,
    /// With name following, force an identity check after this many idle ticks.
    pub max_unchanged_stats: Option<u32>,
    pub max_line_length: usize,
}

impl Default for WailConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            window: Window::default(),
            delimiter: Delimiter::default(),
            follow: FollowMode::default(),
            retry: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
            pid: None,
            max_unchanged_stats: None,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

impl WailConfig {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    pub fn with_window(mut self, window: Window) -> Self {
        self.window = window;
        self
    }

    pub fn with_delimiter(mut self, delimiter: Delimiter) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_follow(mut self, follow: FollowMode) -> Self {
        self.follow = follow;
        self
    }

    pub fn with_retry(mut self, retry: bool) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    pub fn with_max_unchanged_stats(mut self, ticks: u32) -> Self {
        self.max_unchanged_stats = Some(ticks);
        self
    }

    pub fn with_max_line_length(mut self, limit: usize) -> Self {
        self.max_line_length = limit;
        self
    }

    /// Returns a copy with defaults applied to zero or degenerate values.
    pub(crate) fn normalized(mut self) -> Self {
        if self.poll_interval.is_zero() {
            self.poll_interval = DEFAULT_POLL_INTERVAL;
        }
        if self.max_line_length == 0 {
            self.max_line_length = DEFAULT_MAX_LINE_LENGTH;
        }
        self.max_unchanged_stats = self.max_unchanged_stats.filter(|n| *n > 0);
        self.window = self.window.normalized();
        self
    }
}
