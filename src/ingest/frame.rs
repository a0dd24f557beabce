//! Send-or-wait framing over the engine's stdin.
//!
//! A frame is written in full before the next one starts. When the pipe is
//! full the write future parks until the reader drains it; nothing is
//! written while parked.

use std::future::poll_fn;
use std::io;
use std::pin::Pin;
use std::task::Poll;
use tokio::io::{AsyncWrite, AsyncWriteExt};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frames: usize,
    pub bytes: usize,
    /// Times a write found the pipe full and had to wait for a drain.
    pub stalls: usize,
}

pub struct FrameWriter<W> {
    inner: W,
    stats: FrameStats,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            stats: FrameStats::default(),
        }
    }

    /// Write one whole frame, waiting on backpressure as needed.
    pub async fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        let mut written = 0;
        while written < frame.len() {
            let inner = &mut self.inner;
            let stalls = &mut self.stats.stalls;
            let n = poll_fn(|cx| match Pin::new(&mut *inner).poll_write(cx, &frame[written..]) {
                Poll::Pending => {
                    *stalls += 1;
                    Poll::Pending
                }
                ready => ready,
            })
            .await?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "graph engine stopped reading its input",
                ));
            }
            written += n;
        }
        self.stats.frames += 1;
        self.stats.bytes += frame.len();
        Ok(())
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Flush, shut down and drop the underlying stream so the reader sees EOF.
    pub async fn close(mut self) -> io::Result<FrameStats> {
        self.inner.flush().await?;
        self.inner.shutdown().await?;
        Ok(self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_waits_for_drain_and_preserves_order() {
        let (writer_end, mut reader_end) = tokio::io::duplex(64);
        let reader = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let mut received = Vec::new();
            reader_end.read_to_end(&mut received).await.unwrap();
            received
        });

        let first: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        let second = b"COMPLETE\n".to_vec();
        let mut writer = FrameWriter::new(writer_end);
        writer.send(&first).await.unwrap();
        writer.send(&second).await.unwrap();
        let stats = writer.close().await.unwrap();

        assert_eq!(stats.frames, 2);
        assert_eq!(stats.bytes, first.len() + second.len());
        assert!(stats.stalls > 0);

        let received = reader.await.unwrap();
        let mut expected = first;
        expected.extend_from_slice(&second);
        assert_eq!(received, expected);
    }

    #[tokio::test]
    async fn test_no_stall_when_buffer_has_room() {
        let mut sink = Vec::new();
        let mut writer = FrameWriter::new(&mut sink);
        writer.send(b"{\"type\":\"complete\"}\n").await.unwrap();
        assert_eq!(writer.stats().stalls, 0);
        writer.close().await.unwrap();
        assert_eq!(sink, b"{\"type\":\"complete\"}\n");
    }
}
