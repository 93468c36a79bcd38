//! Frame-level transport for Taco messages.
//!
//! A frame is one JSON message followed by a newline, the literal sentinel
//! line `// END`, and a trailing newline. The reader accumulates lines until
//! it sees the sentinel; end-of-stream with nothing accumulated is the normal
//! shutdown signal (`Ok(None)`), end-of-stream inside a frame is fatal.
//! Writes flush immediately; the peer is blocked reading, so nothing may be
//! held back in a buffer.

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::codec;
use crate::error::{Result, TacoError};
use crate::protocol::END_MARKER;

/// Upper bound on one message's accumulated payload text.
pub const MAX_MESSAGE_BYTES: usize = 32 * 1024 * 1024;

/// Message transport over a pair of byte streams.
///
/// Strictly half-duplex: one `read` or `write` at a time, one frame per call.
#[derive(Debug)]
pub struct Transport<R, W> {
    reader: R,
    writer: W,
}

impl<R, W> Transport<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Read one message from the input stream.
    ///
    /// Returns `Ok(None)` when the peer has closed the stream between
    /// frames; a stream that ends mid-frame is a transport error.
    pub async fn read(&mut self) -> Result<Option<Value>> {
        let mut text = String::new();
        let mut line = String::new();

        loop {
            line.clear();
            let n = self.reader.read_line(&mut line).await?;

            if n == 0 {
                if text.is_empty() {
                    return Ok(None);
                }
                return Err(TacoError::Transport {
                    message: "end of stream inside message frame".to_string(),
                    source: None,
                });
            }

            if line.starts_with(END_MARKER) {
                break;
            }

            text.push_str(&line);
            if text.len() > MAX_MESSAGE_BYTES {
                return Err(TacoError::Transport {
                    message: format!("message frame exceeds {MAX_MESSAGE_BYTES} bytes"),
                    source: None,
                });
            }
        }

        if text.is_empty() {
            return Ok(None);
        }

        trace!(bytes = text.len(), "frame received");
        codec::decode(&text).map(Some)
    }

    /// Write one message to the output stream and flush.
    pub async fn write(&mut self, message: &Value) -> Result<()> {
        let text = codec::encode(message)?;
        trace!(bytes = text.len(), "frame sent");

        self.writer.write_all(text.as_bytes()).await?;
        self.writer
            .write_all(format!("\n{END_MARKER}\n").as_bytes())
            .await?;
        self.writer.flush().await?;
        Ok(())
    }
}
