//! Shared output for several targets, with `==> name <==` headers.

use crate::error::{Error, Result};
use crate::tailer::Tailer;
use futures::future::join_all;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::debug;

struct GuardState {
    writer: Box<dyn Write + Send>,
    last_label: Option<String>,
    wrote_any: bool,
}

/// One output sink shared by every target.
///
/// A header is written whenever output switches to a different target, so
/// interleaved follow output stays attributable.
#[derive(Clone)]
pub struct OutputGuard {
    state: Arc<Mutex<GuardState>>,
    headers: bool,
}

impl OutputGuard {
    pub fn new<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            state: Arc::new(Mutex::new(GuardState {
                writer: Box::new(writer),
                last_label: None,
                wrote_any: false,
            })),
            headers: true,
        }
    }

    /// Disables headers, as `--quiet` does.
    pub fn with_headers(mut self, headers: bool) -> Self {
        self.headers = headers;
        self
    }

    /// A writer whose output is introduced by a header naming `label`.
    pub fn labeled(&self, label: impl Into<String>) -> LabeledWriter {
        LabeledWriter {
            state: Arc::clone(&self.state),
            label: self.headers.then(|| label.into()),
        }
    }

    /// A writer that never prints a header.
    pub fn plain(&self) -> LabeledWriter {
        LabeledWriter {
            state: Arc::clone(&self.state),
            label: None,
        }
    }
}

/// Handle to an [`OutputGuard`] for one target.
pub struct LabeledWriter {
    state: Arc<Mutex<GuardState>>,
    label: Option<String>,
}

impl LabeledWriter {
    /// Prints this target's header now, even if it never writes anything.
    pub fn announce(&mut self) -> io::Result<()> {
        let mut state = self.lock()?;
        self.switch_to(&mut state)
    }

    fn lock(&self) -> io::Result<MutexGuard<'_, GuardState>> {
        self.state
            .lock()
            .map_err(|_| io::Error::other("output lock poisoned"))
    }

    fn switch_to(&self, state: &mut GuardState) -> io::Result<()> {
        if let Some(label) = &self.label
            && state.last_label.as_deref() != Some(label.as_str())
        {
            let separator = if state.wrote_any { "\n" } else { "" };
            writeln!(state.writer, "{separator}==> {label} <==")?;
            state.last_label = Some(label.clone());
            state.wrote_any = true;
        }
        Ok(())
    }
}

impl Write for LabeledWriter {
    /// Writes all of `buf` under one lock so a line is never split by another target.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.lock()?;
        if !buf.is_empty() {
            self.switch_to(&mut state)?;
            state.writer.write_all(buf)?;
            state.wrote_any = true;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.lock()?.writer.flush()
    }
}

/// Runs every tailer concurrently against one shared output.
///
/// Each target reports its own outcome; a failing target does not stop the
/// others. Returns once all targets have finished or `cancel` fires.
pub async fn follow_all(
    tailers: Vec<Tailer>,
    guard: &OutputGuard,
    cancel: &CancellationToken,
) -> Vec<(PathBuf, Result<()>)> {
    let tasks = tailers.into_iter().map(|tailer| {
        let path = tailer.config().path.clone();
        let mut writer = guard.labeled(path.display().to_string());
        let cancel = cancel.clone();
        let handle = tokio::spawn(async move { tailer.tail(&mut writer, &cancel).await });
        async move {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(Error::Io(io::Error::other(e))),
            };
            if let Err(e) = &result {
                debug!(path = %path.display(), error = %e, "target finished with error");
            }
            (path, result)
        }
    });

    join_all(tasks).await
}
