//! Delimiter-aware line splitting over async byte streams.

use crate::config::{Delimiter, WailConfig};
use crate::error::{Error, Result};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// A line as it came off the stream, delimiter stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Line {
    pub(crate) content: Vec<u8>,
    /// False only for a final chunk that ended without a delimiter.
    pub(crate) terminated: bool,
}

/// How lines are split and re-emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LineFormat {
    pub(crate) delimiter: Delimiter,
    pub(crate) max_line_length: usize,
}

impl LineFormat {
    pub(crate) fn from_config(config: &WailConfig) -> Self {
        Self {
            delimiter: config.delimiter,
            max_line_length: config.max_line_length,
        }
    }

    pub(crate) fn reader<R: AsyncRead + Unpin>(&self, inner: R) -> LineReader<R> {
        LineReader::new(inner, *self)
    }

    /// Writes `content` followed by the delimiter in a single call so a line
    /// is never split across a concurrent writer's output.
    pub(crate) fn write_line<W: Write + ?Sized>(&self, out: &mut W, content: &[u8]) -> Result<()> {
        let mut record = Vec::with_capacity(content.len() + 1);
        record.extend_from_slice(content);
        record.push(self.delimiter.byte());
        out.write_all(&record).map_err(Error::Output)
    }
}

/// Splits a byte stream into lines on demand.
///
/// With the newline delimiter a `\r` directly before the delimiter (or before
/// end of stream on the last line) is dropped, so CRLF and LF input read the same.
pub(crate) struct LineReader<R> {
    reader: BufReader<R>,
    format: LineFormat,
    consumed: u64,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub(crate) fn new(inner: R, format: LineFormat) -> Self {
        Self {
            reader: BufReader::with_capacity(crate::CHUNK_SIZE, inner),
            format,
            consumed: 0,
        }
    }

    /// Bytes consumed from the underlying reader by lines returned so far,
    /// delimiters included.
    pub(crate) fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Returns the next line, or `None` once the stream is exhausted.
    ///
    /// The length limit applies to the content after any `\r` is stripped.
    pub(crate) async fn next_line(&mut self) -> Result<Option<Line>> {
        let delimiter = self.format.delimiter.byte();
        let limit = self.format.max_line_length;
        // A pending line may carry one `\r` that will not count.
        let slack = usize::from(self.format.delimiter == Delimiter::Newline);
        let mut content = Vec::new();

        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                if content.is_empty() {
                    return Ok(None);
                }
                let line = self.finish(content, false);
                if line.content.len() > limit {
                    return Err(Error::LineTooLong { limit });
                }
                return Ok(Some(line));
            }

            match memchr::memchr(delimiter, available) {
                Some(index) => {
                    let ends_with_cr = match index {
                        0 => content.last() == Some(&b'\r'),
                        _ => available[index - 1] == b'\r',
                    };
                    let stripped = usize::from(slack == 1 && ends_with_cr);
                    if content.len() + index - stripped > limit {
                        return Err(Error::LineTooLong { limit });
                    }
                    content.extend_from_slice(&available[..index]);
                    self.reader.consume(index + 1);
                    self.consumed += index as u64 + 1;
                    return Ok(Some(self.finish(content, true)));
                }
                None => {
                    let len = available.len();
                    if content.len() + len > limit + slack {
                        return Err(Error::LineTooLong { limit });
                    }
                    content.extend_from_slice(available);
                    self.reader.consume(len);
                    self.consumed += len as u64;
                }
            }
        }
    }

    /// Discards input up to and including the next delimiter, as after a
    /// [`Error::LineTooLong`]. Returns false if the stream ends first.
    pub(crate) async fn skip_line(&mut self) -> Result<bool> {
        let delimiter = self.format.delimiter.byte();

        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                return Ok(false);
            }

            let (len, found) = match memchr::memchr(delimiter, available) {
                Some(index) => (index + 1, true),
                None => (available.len(), false),
            };
            self.reader.consume(len);
            self.consumed += len as u64;
            if found {
                return Ok(true);
            }
        }
    }

    fn finish(&self, mut content: Vec<u8>, terminated: bool) -> Line {
        if self.format.delimiter == Delimiter::Newline && content.last() == Some(&b'\r') {
            content.pop();
        }
        Line {
            content,
            terminated,
        }
    }
}
