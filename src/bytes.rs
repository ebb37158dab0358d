//! Byte windows: last N bytes or everything from byte N.

use crate::error::{Error, Result};
use crate::ring::RingWindow;
use crate::CHUNK_SIZE;
use std::io::{SeekFrom, Write};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

/// Writes the last `n` bytes of a seekable source. Returns the offset reached.
pub(crate) async fn last_bytes_seekable<S, W>(source: &mut S, n: u64, out: &mut W) -> Result<u64>
where
    S: AsyncRead + AsyncSeek + Unpin,
    W: Write + ?Sized,
{
    let size = source.seek(SeekFrom::End(0)).await?;
    let start = size.saturating_sub(n);
    source.seek(SeekFrom::Start(start)).await?;
    let copied = copy_to_end(source, out).await?;
    Ok(start + copied)
}

/// Writes everything from 1-indexed byte `n` onward. Returns the offset reached.
pub(crate) async fn from_byte_seekable<S, W>(source: &mut S, n: u64, out: &mut W) -> Result<u64>
where
    S: AsyncRead + AsyncSeek + Unpin,
    W: Write + ?Sized,
{
    let start = n.saturating_sub(1);
    source.seek(SeekFrom::Start(start)).await?;
    let copied = copy_to_end(source, out).await?;
    Ok(start + copied)
}

/// Discards the first `n - 1` bytes of a stream and writes the rest.
pub(crate) async fn from_byte_stream<R, W>(source: &mut R, n: u64, out: &mut W) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: Write + ?Sized,
{
    let skip = n.saturating_sub(1);
    let skipped = tokio::io::copy(&mut (&mut *source).take(skip), &mut tokio::io::sink()).await?;
    let copied = copy_to_end(source, out).await?;
    Ok(skipped + copied)
}

/// Writes the last `n` bytes of a stream that cannot seek, holding at most
/// `n` bytes (plus one read chunk) in memory.
pub(crate) async fn last_bytes_stream<R, W>(source: &mut R, n: u64, out: &mut W) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: Write + ?Sized,
{
    let capacity = usize::try_from(n).unwrap_or(usize::MAX);
    let mut ring = RingWindow::new(capacity);
    let mut chunk = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;

    loop {
        let read = source.read(&mut chunk).await?;
        if read == 0 {
            break;
        }
        ring.extend_from_slice(&chunk[..read]);
        total += read as u64;
    }

    let tail = ring.into_vec();
    if !tail.is_empty() {
        out.write_all(&tail).map_err(Error::Output)?;
    }
    Ok(total)
}

/// Streams the remainder of `source` to `out` in fixed-size chunks.
pub(crate) async fn copy_to_end<R, W>(source: &mut R, out: &mut W) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: Write + ?Sized,
{
    let mut chunk = vec![0u8; CHUNK_SIZE];
    let mut copied = 0u64;

    loop {
        let read = source.read(&mut chunk).await?;
        if read == 0 {
            return Ok(copied);
        }
        out.write_all(&chunk[..read]).map_err(Error::Output)?;
        copied += read as u64;
    }
}
