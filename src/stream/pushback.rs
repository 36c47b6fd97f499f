//! Read side of the socket that can take back bytes it has already handed out.

use std::io;
use std::io::Read;

use crate::buffer::ReadBuffer;
use crate::util::Eof;

const PUSHBACK_INITIAL_CAPACITY: usize = 1024;

/// Wraps a reader and lets a consumer that read ahead (such as the handshake parser, which
/// reads in bulk) return the bytes it does not own. Returned bytes are served before anything
/// else is read from the inner stream.
pub struct PushbackStream<S> {
    inner: S,
    overage: ReadBuffer<1, PUSHBACK_INITIAL_CAPACITY>,
}

impl<S> PushbackStream<S> {
    pub fn new(inner: S) -> PushbackStream<S> {
        Self {
            inner,
            overage: ReadBuffer::new(),
        }
    }

    /// Returns `bytes` to the front of the stream.
    pub fn push_back(&mut self, bytes: &[u8]) {
        self.overage.push_back(bytes)
    }

    /// Number of pushed back bytes that have not been read again yet.
    pub fn pushed_back(&self) -> usize {
        self.overage.available()
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }
}

impl<S: Read> PushbackStream<S> {
    /// Reads exactly one byte, end of stream is an error.
    pub fn read_byte(&mut self) -> io::Result<u8> {
        if let Some(b) = self.overage.consume_next_byte() {
            return Ok(b);
        }
        let mut byte = [0u8; 1];
        self.inner.read(&mut byte).eof_as_error()?;
        Ok(byte[0])
    }
}

impl<S: Read> Read for PushbackStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let available = self.overage.available();
        if available > 0 {
            let len = available.min(buf.len());
            buf[..len].copy_from_slice(self.overage.consume_next(len));
            return Ok(len);
        }
        self.inner.read(buf)
    }
}
