//! In-memory stream for client tests

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Serves queued response chunks and records everything written
///
/// Once the queue is empty the stream either reports EOF or never becomes
/// readable again, which lets tests drive the read timeout.
pub struct ScriptedStream {
    chunks: VecDeque<Vec<u8>>,
    pub written: Vec<u8>,
    hang_when_empty: bool,
}

impl ScriptedStream {
    pub fn new(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            chunks: chunks.into_iter().filter(|c| !c.is_empty()).collect(),
            written: Vec::new(),
            hang_when_empty: false,
        }
    }

    pub fn hanging(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            hang_when_empty: true,
            ..Self::new(chunks)
        }
    }
}

impl AsyncRead for ScriptedStream {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match this.chunks.front_mut() {
            Some(chunk) => {
                let n = chunk.len().min(buf.remaining());
                buf.put_slice(&chunk[..n]);
                chunk.drain(..n);
                if chunk.is_empty() {
                    this.chunks.pop_front();
                }
                Poll::Ready(Ok(()))
            },
            // the caller's timeout owns the wakeup
            None if this.hang_when_empty => Poll::Pending,
            None => Poll::Ready(Ok(())),
        }
    }
}

impl AsyncWrite for ScriptedStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.get_mut().written.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
