//! Pre-read byte replay in front of a duplex stream.
//!
//! # Responsibilities
//! - Serve bytes that were consumed ahead of a protocol switch (request
//!   heads, upgrade "head" bytes) before any fresh reads from the socket
//! - Delegate writes untouched
//!
//! # Design Decisions
//! - Replay happens in userspace; nothing is pushed back into the kernel
//! - Ordering guarantee: the prefix is always drained before the first
//!   byte read off the inner stream is surfaced

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Buf, Bytes};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// A duplex stream that first replays a byte prefix, then reads from the
/// wrapped stream.
#[derive(Debug)]
pub struct ReplayStream<S> {
    prefix: Bytes,
    inner: S,
}

impl<S> ReplayStream<S> {
    /// Wrap `inner`, replaying `prefix` before any fresh bytes.
    pub fn new(prefix: Bytes, inner: S) -> Self {
        Self { prefix, inner }
    }

    /// Bytes of the prefix not yet surfaced to a reader.
    pub fn remaining_prefix(&self) -> usize {
        self.prefix.len()
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for ReplayStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if !this.prefix.is_empty() {
            let n = this.prefix.len().min(buf.remaining());
            buf.put_slice(&this.prefix[..n]);
            this.prefix.advance(n);
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for ReplayStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, data)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn prefix_is_read_before_inner() {
        let (mut remote, local) = tokio::io::duplex(64);
        remote.write_all(b" world").await.unwrap();
        drop(remote);

        let mut stream = ReplayStream::new(Bytes::from_static(b"hello"), local);
        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();

        assert_eq!(out, b"hello world");
    }

    #[tokio::test]
    async fn prefix_survives_small_reads() {
        let (remote, local) = tokio::io::duplex(64);
        drop(remote);

        let mut stream = ReplayStream::new(Bytes::from_static(b"abcdef"), local);
        let mut chunk = [0u8; 4];
        stream.read_exact(&mut chunk).await.unwrap();
        assert_eq!(&chunk, b"abcd");
        assert_eq!(stream.remaining_prefix(), 2);

        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest, b"ef");
    }

    #[tokio::test]
    async fn writes_bypass_the_prefix() {
        let (mut remote, local) = tokio::io::duplex(64);

        let mut stream = ReplayStream::new(Bytes::from_static(b"queued"), local);
        stream.write_all(b"sent").await.unwrap();

        let mut received = [0u8; 4];
        remote.read_exact(&mut received).await.unwrap();
        assert_eq!(&received, b"sent");
        assert_eq!(stream.remaining_prefix(), 6);
    }

    #[tokio::test]
    async fn empty_prefix_reads_straight_through() {
        let (mut remote, local) = tokio::io::duplex(64);
        remote.write_all(b"direct").await.unwrap();
        drop(remote);

        let mut stream = ReplayStream::new(Bytes::new(), local);
        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"direct");
    }
}
