//! MELSEC batch-read client
//!
//! Runs one request/response exchange per block over a caller-owned stream.
//! The client never retries and never closes the stream; the poller decides
//! what a failure means for the connection.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, trace};

use super::codec::field_to_value;
use super::constants::{describe_end_code, RECV_CHUNK};
use super::frame::{body_length, build_request, header_len, parse_response};
use super::types::{DataBlock, DataCode, FieldMap};
use crate::error::{MelsrvError, Result};

/// Default per-read timeout
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct MelsecClient {
    read_timeout: Duration,
}

impl Default for MelsecClient {
    fn default() -> Self {
        Self::new(DEFAULT_READ_TIMEOUT)
    }
}

impl MelsecClient {
    pub fn new(read_timeout: Duration) -> Self {
        Self { read_timeout }
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Read every block in order and decode all of their fields
    ///
    /// Fields with the same name in different blocks overwrite each other;
    /// the last block wins.
    pub async fn read_blocks<S>(
        &self,
        stream: &mut S,
        blocks: &[DataBlock],
        code: DataCode,
    ) -> Result<FieldMap>
    where
        S: AsyncRead + AsyncWrite + Unpin + ?Sized,
    {
        let mut values = FieldMap::new();
        for block in blocks {
            self.read_block(stream, block, code, &mut values).await?;
        }
        Ok(values)
    }

    async fn read_block<S>(
        &self,
        stream: &mut S,
        block: &DataBlock,
        code: DataCode,
        values: &mut FieldMap,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + ?Sized,
    {
        let request = build_request(block, code)?;
        trace!("TX {}{} ({}): {:02X?}", block.register, block.baseaddress, code, request);
        stream.write_all(&request).await?;
        stream.flush().await?;

        let header = self.receive(stream, header_len(code), false).await?;
        let expected = body_length(&header, code)?;
        let body = self.receive(stream, expected, true).await?;
        if body.len() != expected {
            return Err(MelsrvError::protocol(format!(
                "Extra data received: expected {} bytes, received {}",
                expected,
                body.len()
            )));
        }
        trace!("RX {}{}: {:02X?}", block.register, block.baseaddress, body);

        let (end_code, payload) = parse_response(&body, code)?;
        if end_code != 0 {
            return Err(MelsrvError::protocol(describe_end_code(end_code)));
        }
        if payload.len() != block.byte_length() {
            return Err(MelsrvError::protocol(format!(
                "Block {}{}: expected {} data bytes for {} words, received {}",
                block.register,
                block.baseaddress,
                block.byte_length(),
                block.wordlength,
                payload.len()
            )));
        }

        let base = block.base_word_address()?;
        for field in &block.datafields {
            let value = field_to_value(base, field, &payload)?;
            values.insert(field.name.clone(), value);
        }
        debug!(
            "Read {}{} x{}: {} field(s)",
            block.register,
            block.baseaddress,
            block.wordlength,
            block.datafields.len()
        );
        Ok(())
    }

    /// Read until at least `expected` bytes are buffered
    ///
    /// Non-greedy reads never take more than `expected` bytes off the stream.
    /// Greedy reads take whatever is available so that oversized frames are
    /// detected by the caller.
    async fn receive<S>(&self, stream: &mut S, expected: usize, greedy: bool) -> Result<Vec<u8>>
    where
        S: AsyncRead + Unpin + ?Sized,
    {
        let mut buffer = Vec::with_capacity(expected);
        let mut chunk = [0u8; RECV_CHUNK];

        while buffer.len() < expected {
            let want = if greedy {
                RECV_CHUNK
            } else {
                (expected - buffer.len()).min(RECV_CHUNK)
            };

            let n = match timeout(self.read_timeout, stream.read(&mut chunk[..want])).await {
                Ok(result) => result?,
                Err(_) => {
                    return Err(MelsrvError::protocol(format!(
                        "Timed out after reading {} of {} bytes",
                        buffer.len(),
                        expected
                    )))
                },
            };
            if n == 0 {
                return Err(MelsrvError::protocol(format!(
                    "Premature EOF after reading {} of {} bytes",
                    buffer.len(),
                    expected
                )));
            }
            buffer.extend_from_slice(&chunk[..n]);
        }

        Ok(buffer)
    }
}
