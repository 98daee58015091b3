//! Newline-delimited JSON framing
//!
//! A frame is one JSON document followed by `\n`. Frames above the size cap
//! are rejected before they are fully buffered.

use crate::error::ProtocolError;
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Default frame size cap (1 MiB)
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Read one frame without its terminator.
///
/// Returns `Ok(None)` on a clean EOF before any byte. A final frame without
/// a trailing newline is accepted.
pub async fn read_frame<R>(reader: &mut R, max_frame_bytes: usize) -> Result<Option<Vec<u8>>, ProtocolError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let limit = max_frame_bytes as u64 + 1;
    let n = (&mut *reader).take(limit).read_until(b'\n', &mut buf).await?;
    if n == 0 {
        return Ok(None);
    }

    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    } else if buf.len() > max_frame_bytes {
        return Err(ProtocolError::FrameTooLarge {
            limit: max_frame_bytes,
        });
    }
    Ok(Some(buf))
}

/// Serialize `value` as one frame and flush it
pub async fn write_frame<W, T>(writer: &mut W, value: &T) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
    T: Serialize + ?Sized,
{
    let mut bytes = serde_json::to_vec(value)?;
    bytes.push(b'\n');
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}
