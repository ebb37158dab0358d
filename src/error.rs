//! Error types for the tail engine.

use thiserror::Error;

/// The main error type for tail operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors while opening, seeking or reading a source.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file to tail does not exist.
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    /// A single line grew past the configured maximum length.
    #[error("Line exceeds maximum length of {limit} bytes")]
    LineTooLong { limit: usize },

    /// The output sink rejected a write.
    #[error("Output error: {0}")]
    Output(#[source] std::io::Error),
}

impl Error {
    /// Maps an open failure for `path`, keeping absence distinguishable.
    pub(crate) fn from_open(path: &std::path::Path, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Error::FileNotFound {
                path: path.display().to_string(),
            }
        } else {
            Error::Io(err)
        }
    }

    /// Returns true if follow loops cannot continue after this error.
    pub(crate) fn is_fatal_for_follow(&self) -> bool {
        matches!(self, Error::Output(_))
    }
}

/// A convenient Result type for tail operations.
pub type Result<T> = std::result::Result<T, Error>;
