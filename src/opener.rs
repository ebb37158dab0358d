//! Opening files for reading without locking out writers or rotators.

use std::fs::File;
use std::io;
use std::path::Path;

/// Opens a path for reading and seeking.
///
/// Implementations must let other processes keep writing to, renaming and
/// deleting the file while it is open. A missing file must surface as
/// [`io::ErrorKind::NotFound`].
pub trait FileOpener: Send + Sync {
    fn open(&self, path: &Path) -> io::Result<File>;
}

/// The platform opener.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemOpener;

#[cfg(not(windows))]
impl FileOpener for SystemOpener {
    fn open(&self, path: &Path) -> io::Result<File> {
        File::open(path)
    }
}

#[cfg(windows)]
impl FileOpener for SystemOpener {
    fn open(&self, path: &Path) -> io::Result<File> {
        use std::os::windows::fs::OpenOptionsExt;

        const FILE_SHARE_READ: u32 = 0x1;
        const FILE_SHARE_WRITE: u32 = 0x2;
        const FILE_SHARE_DELETE: u32 = 0x4;

        std::fs::OpenOptions::new()
            .read(true)
            .share_mode(FILE_SHARE_READ | FILE_SHARE_WRITE | FILE_SHARE_DELETE)
            .open(extended_length_path(path))
    }
}

/// Paths past the legacy MAX_PATH limit need the `\\?\` prefix on Windows.
#[cfg_attr(not(windows), allow(dead_code))]
fn extended_length_path(path: &Path) -> std::path::PathBuf {
    let raw = path.to_string_lossy();
    if raw.len() <= 259 || raw.starts_with(r"\\?\") {
        return path.to_path_buf();
    }
    match raw.strip_prefix(r"\\") {
        Some(unc) => format!(r"\\?\UNC\{}", unc).into(),
        None => format!(r"\\?\{}", raw).into(),
    }
}
