//! Growable read buffer with support for returning unread bytes.

use std::io;
use std::io::Read;

use crate::util::Eof;

const DEFAULT_INITIAL_CAPACITY: usize = 32768;

/// Byte buffer filled from a [`Read`] source in chunks of `CHUNK_SIZE` bytes. Consumed bytes
/// advance `head`, new data is appended at `tail`. The storage is compacted before each read
/// and doubles whenever a chunk would not fit.
#[derive(Debug)]
pub struct ReadBuffer<const CHUNK_SIZE: usize, const INITIAL_CAPACITY: usize = DEFAULT_INITIAL_CAPACITY> {
    inner: Vec<u8>,
    head: usize,
    tail: usize,
}

impl<const CHUNK_SIZE: usize, const INITIAL_CAPACITY: usize> Default for ReadBuffer<CHUNK_SIZE, INITIAL_CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const CHUNK_SIZE: usize, const INITIAL_CAPACITY: usize> ReadBuffer<CHUNK_SIZE, INITIAL_CAPACITY> {
    pub fn new() -> ReadBuffer<CHUNK_SIZE, INITIAL_CAPACITY> {
        assert!(CHUNK_SIZE > 0, "CHUNK_SIZE must be greater than zero");
        assert!(INITIAL_CAPACITY > 0, "INITIAL_CAPACITY must be greater than zero");
        Self {
            inner: vec![0u8; INITIAL_CAPACITY],
            head: 0,
            tail: 0,
        }
    }

    #[inline]
    pub const fn available(&self) -> usize {
        self.tail - self.head
    }

    /// Performs a single read of at most `CHUNK_SIZE` bytes from the `stream`. End of stream is
    /// reported as [`io::ErrorKind::UnexpectedEof`].
    pub fn read_from<S: Read>(&mut self, stream: &mut S) -> io::Result<usize> {
        self.compact();
        self.ensure_capacity(CHUNK_SIZE);
        let read = stream.read(&mut self.inner[self.tail..self.tail + CHUNK_SIZE]).eof_as_error()?;
        self.tail += read;
        Ok(read)
    }

    /// Returns `bytes` to the front of the buffer so that they are consumed before anything
    /// that is already buffered.
    pub fn push_back(&mut self, bytes: &[u8]) {
        let len = bytes.len();
        if len == 0 {
            return;
        }
        if self.head < len {
            let available = self.available();
            self.ensure_capacity(len);
            // after compaction head is zero, shift the remaining data to make room at the front
            self.inner.copy_within(self.head..self.tail, len);
            self.head = len;
            self.tail = len + available;
        }
        self.head -= len;
        self.inner[self.head..self.head + len].copy_from_slice(bytes);
    }

    /// Consumes the next `len` bytes and returns them. The slice is mutable so that callers can
    /// transform it in place (for example to unmask a payload).
    #[inline]
    pub fn consume_next(&mut self, len: usize) -> &mut [u8] {
        self.check_bounds(len);
        let start = self.head;
        self.head += len;
        &mut self.inner[start..start + len]
    }

    #[inline]
    pub fn consume_next_byte(&mut self) -> Option<u8> {
        if self.available() == 0 {
            return None;
        }
        let b = self.inner[self.head];
        self.head += 1;
        Some(b)
    }

    #[inline]
    pub fn view(&self) -> &[u8] {
        &self.inner[self.head..self.tail]
    }

    #[inline]
    pub fn consume(&mut self, len: usize) {
        self.check_bounds(len);
        self.head += len;
    }

    #[inline]
    fn check_bounds(&self, len: usize) {
        #[cold]
        fn bounds_violation(head: usize, tail: usize) -> ! {
            panic!("bounds violation: head[{}] > tail[{}]", head, tail)
        }

        if self.head + len > self.tail {
            bounds_violation(self.head + len, self.tail);
        }
    }

    fn compact(&mut self) {
        if self.head == self.tail {
            self.head = 0;
            self.tail = 0;
            // drained, release the storage grown for a large message
            let capacity = INITIAL_CAPACITY.max(CHUNK_SIZE);
            if self.inner.len() > capacity {
                self.inner.truncate(capacity);
                self.inner.shrink_to_fit();
            }
            return;
        }
        if self.head == 0 {
            return;
        }
        if self.available() > 0 {
            self.inner.copy_within(self.head..self.tail, 0);
        }
        self.tail -= self.head;
        self.head = 0;
    }

    /// Compacts and grows the storage until `additional` bytes fit after `tail`.
    fn ensure_capacity(&mut self, additional: usize) {
        #[cold]
        fn grow(buf: &mut Vec<u8>, required: usize) {
            let mut len = buf.len();
            while len < required {
                len *= 2;
            }
            buf.resize(len, 0u8);
        }

        self.compact();
        if self.tail + additional > self.inner.len() {
            grow(&mut self.inner, self.tail + additional);
        }
    }
}
