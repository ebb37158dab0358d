//! Test utilities for temporary log files and capturing tail output.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub struct TempLogFile {
    pub path: PathBuf,
    _temp_dir: tempfile::TempDir,
}

impl TempLogFile {
    /// Create a new empty temporary log file
    pub fn new() -> std::io::Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("test.log");

        File::create(&path)?;

        Ok(Self {
            path,
            _temp_dir: temp_dir,
        })
    }

    /// Create a temporary log file holding exactly `content`
    pub fn with_content(content: &str) -> std::io::Result<Self> {
        let temp_file = Self::new()?;
        temp_file.append(content)?;
        Ok(temp_file)
    }

    /// Append raw content, creating the file if it was moved away
    pub fn append(&self, content: &str) -> std::io::Result<()> {
        Self::append_to(&self.path, content)
    }

    pub fn append_to(path: &Path, content: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(content.as_bytes())?;
        file.flush()
    }

    /// Create `path` with `content` in one step, so a poller never sees it half written
    pub fn publish(path: &Path, content: &str) -> std::io::Result<()> {
        let staging = path.with_extension("staging");
        std::fs::write(&staging, content)?;
        std::fs::rename(&staging, path)
    }

    /// Truncate in place (copy-truncate rotation)
    pub fn truncate(&self) -> std::io::Result<()> {
        OpenOptions::new().write(true).open(&self.path)?.set_len(0)
    }

    /// Rename the file aside to `<name>.1`, leaving the path free
    pub fn rotate(&self) -> std::io::Result<PathBuf> {
        let rotated = self.path.with_extension("log.1");
        std::fs::rename(&self.path, &rotated)?;
        Ok(rotated)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// A cloneable in-memory sink so a spawned tail can be inspected while it runs.
#[derive(Clone, Default)]
pub struct SharedBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn contents(&self) -> Vec<u8> {
        self.inner.lock().unwrap().clone()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.contents()).into_owned()
    }

    /// Polls until the captured text contains `needle` or `timeout` passes.
    pub async fn wait_for(&self, needle: &str, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.text().contains(needle) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.text().contains(needle)
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_log_file_creation() {
        let temp_file = TempLogFile::new().unwrap();
        assert!(temp_file.path().exists());
    }

    #[test]
    fn test_with_content_is_exact() {
        let temp_file = TempLogFile::with_content("a\nb").unwrap();
        assert_eq!(std::fs::read(temp_file.path()).unwrap(), b"a\nb");
    }

    #[test]
    fn test_truncate() {
        let temp_file = TempLogFile::with_content("initial content").unwrap();
        temp_file.truncate().unwrap();

        assert!(std::fs::read(temp_file.path()).unwrap().is_empty());
    }

    #[test]
    fn test_rotate_frees_path() {
        let temp_file = TempLogFile::with_content("old").unwrap();
        let rotated = temp_file.rotate().unwrap();

        assert!(!temp_file.path().exists());
        assert_eq!(std::fs::read(&rotated).unwrap(), b"old");

        temp_file.append("new").unwrap();
        assert_eq!(std::fs::read(temp_file.path()).unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_shared_buffer_wait_for() {
        let buffer = SharedBuffer::default();
        let mut writer = buffer.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            writer.write_all(b"ready\n").unwrap();
        });

        assert!(buffer.wait_for("ready", Duration::from_millis(500)).await);
    }
}
