//! A tail engine: print the end of a file, then keep following it.
//!
//! A [`Tailer`] writes the selected window of a file (last or from-the-start
//! lines or bytes) to any [`std::io::Write`] sink and, if configured, polls
//! the file for new content. Following by descriptor stays on the open file;
//! following by name survives truncation and rotation. [`watch_tail`] exposes
//! the same output as an async stream.
//!
//! # Example
//!
//! ```rust,no_run
//! use wail::{watch_tail, FollowMode, WailConfig, Window};
//! use tokio_stream::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = WailConfig::new("app.log")
//!         .with_window(Window::LastLines(20))
//!         .with_follow(FollowMode::Name);
//!     let mut stream = watch_tail(config);
//!
//!     while let Some(chunk) = stream.next().await {
//!         print!("{}", String::from_utf8_lossy(&chunk?));
//!     }
//!
//!     Ok(())
//! }
//! ```

mod bytes;
mod config;
mod error;
mod follow;
mod line;
mod lines;
mod opener;
mod output;
mod process;
mod ring;
mod stream;
mod tailer;
mod watcher;

#[cfg(test)]
mod test_helpers;

// Public API exports
pub use config::{
    DEFAULT_LINES, DEFAULT_MAX_LINE_LENGTH, DEFAULT_POLL_INTERVAL, Delimiter, FollowMode,
    WailConfig, Window,
};
pub use error::{Error, Result};
pub use follow::FileIdentity;
pub use opener::{FileOpener, SystemOpener};
pub use output::{LabeledWriter, OutputGuard, follow_all};
pub use process::{ProcessAlive, SystemProcess};
pub use stream::TailStream;
pub use tailer::Tailer;
pub use watcher::{Event, PollingWatcher};

/// Read granularity for chunked and backward reads.
pub(crate) const CHUNK_SIZE: usize = 64 * 1024;

/// Tails the file described by `config` in the background.
///
/// Must be called from within a tokio runtime.
///
/// # Example
///
/// ```rust,no_run
/// use wail::{watch_tail, WailConfig};
/// use tokio_stream::StreamExt;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut stream = watch_tail(WailConfig::new("app.log"));
///
///     while let Some(chunk) = stream.next().await {
///         print!("{}", String::from_utf8_lossy(&chunk?));
///     }
///
///     Ok(())
/// }
/// ```
pub fn watch_tail(config: WailConfig) -> TailStream {
    TailStream::new(Tailer::new(config))
}
