//! Line windows: last N lines or everything from line N.

use crate::error::Result;
use crate::line::LineFormat;
use crate::ring::RingWindow;
use crate::CHUNK_SIZE;
use std::io::{SeekFrom, Write};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};
use tracing::trace;

/// Last `n` lines of a forward scan, plus the bytes the scan consumed.
pub(crate) async fn last_lines_forward<R>(
    source: &mut R,
    n: u64,
    format: LineFormat,
) -> Result<(Vec<Vec<u8>>, u64)>
where
    R: AsyncRead + Unpin,
{
    let mut reader = format.reader(source);
    let mut ring = RingWindow::new(usize::try_from(n).unwrap_or(usize::MAX));

    while let Some(line) = reader.next_line().await? {
        ring.push(line.content);
    }

    Ok((ring.into_vec(), reader.consumed()))
}

/// Last `n` lines of a seekable source, scanning backward from the end when
/// the source is larger than one chunk. Returns the lines and the offset reached.
pub(crate) async fn last_lines_seekable<S>(
    source: &mut S,
    n: u64,
    format: LineFormat,
) -> Result<(Vec<Vec<u8>>, u64)>
where
    S: AsyncRead + AsyncSeek + Unpin,
{
    let size = source.seek(SeekFrom::End(0)).await?;
    if size == 0 {
        return Ok((Vec::new(), 0));
    }

    let start = if size <= CHUNK_SIZE as u64 {
        0
    } else {
        find_tail_start(source, size, n, format.delimiter.byte()).await?
    };
    trace!(size, start, "scanning tail lines");

    source.seek(SeekFrom::Start(start)).await?;
    let (lines, consumed) = last_lines_forward(source, n, format).await?;
    Ok((lines, start + consumed))
}

/// Walks backward in chunks until `n + 1` delimiters have been seen and
/// returns the offset just past the last one counted, or 0 at start of file.
/// The extra delimiter covers a trailing delimiter at end of file.
async fn find_tail_start<S>(source: &mut S, size: u64, n: u64, delimiter: u8) -> Result<u64>
where
    S: AsyncRead + AsyncSeek + Unpin,
{
    let needed = n.saturating_add(1);
    let mut found = 0u64;
    let mut pos = size;
    let mut chunk = vec![0u8; CHUNK_SIZE];

    while pos > 0 {
        let len = (CHUNK_SIZE as u64).min(pos) as usize;
        pos -= len as u64;

        source.seek(SeekFrom::Start(pos)).await?;
        source.read_exact(&mut chunk[..len]).await?;

        for index in memchr::memrchr_iter(delimiter, &chunk[..len]) {
            found += 1;
            if found >= needed {
                return Ok(pos + index as u64 + 1);
            }
        }
    }

    Ok(0)
}

/// Writes every line whose 1-indexed ordinal is at least `n`. Returns the
/// bytes consumed from `source`.
pub(crate) async fn from_line<R, W>(
    source: &mut R,
    n: u64,
    format: LineFormat,
    out: &mut W,
) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: Write + ?Sized,
{
    let mut reader = format.reader(source);
    let mut ordinal = 0u64;

    while let Some(line) = reader.next_line().await? {
        ordinal += 1;
        if ordinal >= n {
            format.write_line(out, &line.content)?;
        }
    }

    Ok(reader.consumed())
}

pub(crate) fn write_lines<W: Write + ?Sized>(
    format: LineFormat,
    lines: &[Vec<u8>],
    out: &mut W,
) -> Result<()> {
    for line in lines {
        format.write_line(out, line)?;
    }
    Ok(())
}
