//! Line I/O for the control channel

use eyre::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Default upper bound on a single control line
pub const DEFAULT_MAX_LINE_BYTES: usize = 64 * 1024;

/// Read one line as raw bytes, without its terminator
///
/// Returns `Ok(None)` on end-of-stream. A line longer than `max_len` bytes is
/// an error. The bytes are not checked for UTF-8.
pub async fn read_line_bytes<R: AsyncBufRead + Unpin>(reader: &mut R, max_len: usize) -> Result<Option<Vec<u8>>> {
    let mut line = Vec::new();
    let bytes_read = (&mut *reader)
        .take(max_len as u64 + 1)
        .read_until(b'\n', &mut line)
        .await
        .context("Failed to read control line")?;

    if bytes_read == 0 {
        debug!("read_line_bytes: end of stream");
        return Ok(None);
    }

    if line.last() != Some(&b'\n') && bytes_read > max_len {
        return Err(eyre::eyre!("Control line too large: more than {} bytes", max_len));
    }

    while matches!(line.last(), Some(b'\n' | b'\r')) {
        line.pop();
    }
    Ok(Some(line))
}

/// Read one UTF-8 line, without its terminator
///
/// Same contract as [`read_line_bytes`]; invalid UTF-8 is an error.
pub async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R, max_len: usize) -> Result<Option<String>> {
    match read_line_bytes(reader, max_len).await? {
        Some(bytes) => Ok(Some(String::from_utf8(bytes).context("Control line is not valid UTF-8")?)),
        None => Ok(None),
    }
}

/// Write one line and flush
pub async fn write_line<W: AsyncWrite + Unpin + ?Sized>(writer: &mut W, text: &str) -> Result<()> {
    writer
        .write_all(text.as_bytes())
        .await
        .context("Failed to write control line")?;
    writer.write_all(b"\n").await.context("Failed to write newline")?;
    writer.flush().await.context("Failed to flush control line")?;
    debug!(%text, "write_line: sent");
    Ok(())
}
