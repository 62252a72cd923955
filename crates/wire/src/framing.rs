// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Length-prefix framing: little-endian u32 length + UTF-8 JSON payload.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single frame. Anything larger is a protocol violation,
/// not a legitimate message.
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

/// Errors from framing and message I/O.
#[derive(Debug, Error)]
pub enum FramingError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("frame of {0} bytes exceeds maximum")]
    FrameTooLarge(u32),

    #[error("timed out")]
    Timeout,
}

/// Serialize a message to its JSON payload (no length prefix).
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, FramingError> {
    Ok(serde_json::to_vec(message)?)
}

/// Deserialize a JSON payload.
pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, FramingError> {
    Ok(serde_json::from_slice(payload)?)
}

/// Write one length-prefixed frame.
pub async fn write_message<W>(writer: &mut W, payload: &[u8]) -> Result<(), FramingError>
where
    W: AsyncWrite + Unpin,
{
    let len = u32::try_from(payload.len()).map_err(|_| FramingError::FrameTooLarge(u32::MAX))?;
    if len > MAX_FRAME_LEN {
        return Err(FramingError::FrameTooLarge(len));
    }
    writer.write_all(&len.to_le_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed frame. EOF before a complete length prefix is
/// a clean close; EOF mid-payload is an IO error.
pub async fn read_message<R>(reader: &mut R) -> Result<Vec<u8>, FramingError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(FramingError::ConnectionClosed)
        }
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_le_bytes(len_buf);
    if len > MAX_FRAME_LEN {
        return Err(FramingError::FrameTooLarge(len));
    }
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

/// [`read_message`] bounded by a timeout.
pub async fn read_message_timeout<R>(
    reader: &mut R,
    timeout: Duration,
) -> Result<Vec<u8>, FramingError>
where
    R: AsyncRead + Unpin,
{
    tokio::time::timeout(timeout, read_message(reader))
        .await
        .map_err(|_| FramingError::Timeout)?
}

/// [`write_message`] bounded by a timeout.
pub async fn write_message_timeout<W>(
    writer: &mut W,
    payload: &[u8],
    timeout: Duration,
) -> Result<(), FramingError>
where
    W: AsyncWrite + Unpin,
{
    tokio::time::timeout(timeout, write_message(writer, payload))
        .await
        .map_err(|_| FramingError::Timeout)?
}

#[cfg(test)]
#[path = "framing_tests.rs"]
mod tests;
