//! Newline-delimited JSON framing for chat messages.
//!
//! Each message travels as one JSON object followed by `\n`. Reads are
//! bounded so a peer cannot make the receiver buffer an endless line.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::message::Message;

/// Default maximum size of one encoded message, newline excluded (64 KiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 65_536;

/// Errors produced while framing or parsing messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("message exceeds maximum size ({max} bytes)")]
    TooLarge { max: usize },

    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Serializes a message into one wire frame, newline included.
///
/// Broadcasting encodes once and writes the same frame to every recipient.
pub fn encode_message(message: &Message) -> Result<Vec<u8>, ProtocolError> {
    let mut frame = serde_json::to_vec(message)?;
    frame.push(b'\n');
    Ok(frame)
}

/// Writes an already-encoded frame and flushes.
pub async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    writer.write_all(frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Encodes and writes a single message.
pub async fn write_message<W>(writer: &mut W, message: &Message) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let frame = encode_message(message)?;
    write_frame(writer, &frame).await
}

/// Reads the next message.
///
/// Returns `Ok(None)` on a clean end of stream. Blank lines are skipped.
pub async fn read_message<R>(
    reader: &mut R,
    max_size: usize,
) -> Result<Option<Message>, ProtocolError>
where
    R: AsyncBufRead + Unpin,
{
    // One extra byte leaves room for the terminating newline.
    let limit = u64::try_from(max_size).unwrap_or(u64::MAX).saturating_add(1);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = (&mut *reader).take(limit).read_line(&mut line).await?;

        if bytes_read == 0 {
            return Ok(None);
        }

        if !line.ends_with('\n') && bytes_read > max_size {
            return Err(ProtocolError::TooLarge { max: max_size });
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        return Ok(Some(serde_json::from_str(trimmed)?));
    }
}
