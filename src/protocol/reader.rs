//! Buffered reads over an inbound stream.
//!
//! Frames and atoms straddle transport read boundaries arbitrarily, so every
//! length-prefixed read goes through [`StreamReader::peek_exact`] and
//! [`StreamReader::read_exact`], which buffer until enough bytes arrived.

use crate::{Error, Result};
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Minimum spare capacity reserved before each read.
const READ_RESERVE: usize = 8 * 1024;

pub struct StreamReader<R> {
    inner: R,
    buffer: BytesMut,
}

impl<R: AsyncRead + Unpin> StreamReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buffer: BytesMut::new(),
        }
    }

    /// Read more bytes into the buffer. Returns `false` at end of stream.
    async fn fill(&mut self) -> Result<bool> {
        self.buffer.reserve(READ_RESERVE);
        let n = self.inner.read_buf(&mut self.buffer).await?;
        Ok(n > 0)
    }

    /// Whether the stream has ended with nothing left buffered.
    ///
    /// Waits for at least one byte or the end of the stream.
    pub async fn done(&mut self) -> Result<bool> {
        if !self.buffer.is_empty() {
            return Ok(false);
        }
        Ok(!self.fill().await?)
    }

    /// Wait until `n` bytes are buffered and return them without consuming.
    pub async fn peek_exact(&mut self, n: usize) -> Result<&[u8]> {
        while self.buffer.len() < n {
            if !self.fill().await? {
                return Err(Error::framing(format!(
                    "stream ended after {} of {} bytes",
                    self.buffer.len(),
                    n
                )));
            }
        }
        Ok(&self.buffer[..n])
    }

    /// Consume exactly `n` bytes.
    pub async fn read_exact(&mut self, n: usize) -> Result<Bytes> {
        self.peek_exact(n).await?;
        Ok(self.buffer.split_to(n).freeze())
    }

    /// Consume a big-endian u32.
    pub async fn read_u32(&mut self) -> Result<u32> {
        let b = self.peek_exact(4).await?;
        let value = u32::from_be_bytes([b[0], b[1], b[2], b[3]]);
        let _ = self.buffer.split_to(4);
        Ok(value)
    }

    /// Consume whatever is available, up to `max` bytes, or `None` at end of
    /// stream.
    pub async fn read_chunk(&mut self, max: usize) -> Result<Option<Bytes>> {
        if self.buffer.is_empty() && !self.fill().await? {
            return Ok(None);
        }
        let n = self.buffer.len().min(max.max(1));
        Ok(Some(self.buffer.split_to(n).freeze()))
    }

    /// Consume one top-level MP4 atom, header included.
    ///
    /// The size is peeked first so an atom split across reads is only
    /// consumed once it is complete.
    pub async fn read_atom(&mut self, max_size: usize) -> Result<Bytes> {
        let header = self.peek_exact(4).await?;
        let size = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as u64;

        let size = match size {
            0 => return Err(Error::framing("atom with open-ended size")),
            1 => {
                let header = self.peek_exact(16).await?;
                let mut large = [0u8; 8];
                large.copy_from_slice(&header[8..16]);
                u64::from_be_bytes(large)
            }
            size => size,
        };

        if size < 8 {
            return Err(Error::framing(format!("atom size {} is too small", size)));
        }
        if size > max_size as u64 {
            return Err(Error::framing(format!(
                "atom size {} exceeds limit of {}",
                size, max_size
            )));
        }

        self.read_exact(size as usize).await
    }

    /// Bytes currently buffered but not consumed.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}
