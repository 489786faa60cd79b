//! Streaming reader that appends the hex digest of its content.
//!
//! Everything read from the source is fed to the hasher unchanged and passed
//! through. Once the source reports end of stream, the lowercase hex digest
//! is served as trailing bytes, and only then does the reader report end of
//! stream itself. B2 accepts uploads in this shape when the request carries
//! `X-Bz-Content-Sha1: hex_digits_at_end`.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use digest::Digest;
use tokio::io::{AsyncRead, ReadBuf};

/// Reader yielding `source bytes ++ hex(hash(source bytes))`
///
/// Single pass and single consumer. Dropping the reader drops the source.
pub struct HashedPostfixedReader<R, D> {
    inner: R,
    hasher: Option<D>,
    appendix: Vec<u8>,
    served: usize,
}

impl<R, D: Digest> HashedPostfixedReader<R, D> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Some(D::new()),
            appendix: Vec::new(),
            served: 0,
        }
    }

    /// Total output length for a source of `len` bytes
    pub fn postfixed_len(len: u64) -> u64 {
        len + Self::digest_hex_len()
    }

    /// Number of hex characters appended after the payload
    pub fn digest_hex_len() -> u64 {
        2 * <D as Digest>::output_size() as u64
    }

    /// True once the source is exhausted and the digest computed
    pub fn is_finished(&self) -> bool {
        self.hasher.is_none()
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn update(&mut self, data: &[u8]) {
        if let Some(hasher) = self.hasher.as_mut() {
            hasher.update(data);
        }
    }

    fn finish(&mut self) {
        if let Some(hasher) = self.hasher.take() {
            self.appendix = hex::encode(hasher.finalize()).into_bytes();
            self.served = 0;
        }
    }

    /// Copy pending digest bytes into `out`, returning how many were written
    fn drain_appendix(&mut self, out: &mut [u8]) -> usize {
        let pending = &self.appendix[self.served..];
        let n = pending.len().min(out.len());
        out[..n].copy_from_slice(&pending[..n]);
        self.served += n;
        n
    }
}

impl<R: io::Read, D: Digest> io::Read for HashedPostfixedReader<R, D> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if !self.is_finished() {
            let n = self.inner.read(buf)?;
            if n > 0 {
                self.update(&buf[..n]);
                return Ok(n);
            }
            self.finish();
        }
        Ok(self.drain_appendix(buf))
    }
}

impl<R, D> AsyncRead for HashedPostfixedReader<R, D>
where
    R: AsyncRead + Unpin,
    D: Digest + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        if !this.is_finished() {
            let before = buf.filled().len();
            ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;
            let filled = buf.filled().len();
            if filled > before {
                this.update(&buf.filled()[before..filled]);
                return Poll::Ready(Ok(()));
            }
            this.finish();
        }

        let n = this.drain_appendix(buf.initialize_unfilled());
        buf.advance(n);
        Poll::Ready(Ok(()))
    }
}
