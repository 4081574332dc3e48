// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command bridge wire framing (C8 transport).
//!
//! One JSON object per line, `\n`-terminated — the same codec discipline as
//! the Agent JLP, just over the command socket instead of a child's pipes.
//! Bridge commands carry no intrinsic timeout (the client manages its own);
//! `DEFAULT_READ_TIMEOUT` below only guards the per-line read against a
//! client that opens a connection and never writes.

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::command::{BridgeRequest, BridgeResponse};

/// Matches the Agent JLP line cap so nothing downstream has to special-case
/// frame size per transport.
pub const MAX_LINE_SIZE: usize = 256 * 1024;

pub const DEFAULT_READ_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum WireError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("line exceeds max size of {max} bytes ({actual} bytes)")]
    LineTooLarge { actual: usize, max: usize },
    #[error("connection closed")]
    ConnectionClosed,
    #[error("timed out waiting for a request")]
    Timeout,
}

/// Reads one `\n`-terminated request line and decodes it, with a read
/// timeout so a silent connection cannot pin a server task forever.
pub async fn read_request<R>(
    reader: &mut BufReader<R>,
    timeout: std::time::Duration,
) -> Result<BridgeRequest, WireError>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut line = String::new();
    let n = tokio::time::timeout(timeout, reader.read_line(&mut line))
        .await
        .map_err(|_| WireError::Timeout)??;

    if n == 0 {
        return Err(WireError::ConnectionClosed);
    }
    if line.len() > MAX_LINE_SIZE {
        return Err(WireError::LineTooLarge {
            actual: line.len(),
            max: MAX_LINE_SIZE,
        });
    }

    Ok(serde_json::from_str(line.trim_end_matches('\n'))?)
}

/// Encodes and writes one response line, flushing before returning so the
/// client sees it promptly even under Nagle-friendly socket defaults.
pub async fn write_response<W>(writer: &mut W, response: &BridgeResponse) -> Result<(), WireError>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    let mut line = serde_json::to_string(response)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
#[path = "wire_tests.rs"]
mod tests;
