//! Stream that batches written data into MTU sized writes.

use std::io;
use std::io::{Read, Write};
use std::net::SocketAddr;

/// MTU assumed for loopback connections. The real loopback MTU is huge, since the value also
/// sizes the write buffer it is kept small.
pub const LOOPBACK_MTU: usize = 8192;
/// Typical Ethernet MTU of 1500 minus the largest IPv4 header.
pub const IPV4_MTU: usize = 1500 - 60;
/// Minimum IPv6 MTU minus the IPv6 header.
pub const IPV6_MTU: usize = 1280 - 40;

/// Guesses the path MTU to the peer from its address alone.
pub fn guess_mtu(addr: &SocketAddr) -> usize {
    if addr.ip().is_loopback() {
        return LOOPBACK_MTU;
    }
    match addr {
        SocketAddr::V4(_) => IPV4_MTU,
        SocketAddr::V6(_) => IPV6_MTU,
    }
}

/// Buffers data written to it and hands it to the inner stream in chunks of at most `mtu`
/// bytes. With Nagle's algorithm disabled every write to the socket becomes a packet, so the
/// frame header and payload are coalesced here instead. Data is handed over when the buffer is
/// full or on [`Write::flush`].
///
/// ## Examples
///
/// ```
/// use std::io::Write;
/// use framelink::stream::mtu::MtuStream;
///
/// let mut stream = MtuStream::new(Vec::new(), 1440);
/// stream.write_all(&[0x81, 0x05]).unwrap();
/// stream.write_all(b"hello").unwrap();
/// assert!(stream.get_ref().is_empty());
///
/// stream.flush().unwrap();
/// assert_eq!(7, stream.get_ref().len());
/// ```
#[derive(Debug)]
pub struct MtuStream<S> {
    inner: S,
    buffer: Vec<u8>,
    mtu: usize,
}

impl<S> MtuStream<S> {
    pub fn new(inner: S, mtu: usize) -> MtuStream<S> {
        assert!(mtu > 0, "mtu must be greater than zero");
        Self {
            inner,
            buffer: Vec::with_capacity(mtu),
            mtu,
        }
    }

    #[inline]
    pub const fn mtu(&self) -> usize {
        self.mtu
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }
}

impl<S: Write> MtuStream<S> {
    fn drain(&mut self) -> io::Result<()> {
        if !self.buffer.is_empty() {
            let result = self.inner.write_all(&self.buffer);
            self.buffer.clear();
            result?;
        }
        Ok(())
    }
}

impl<S: Write> Write for MtuStream<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        if self.buffer.len() == self.mtu {
            self.drain()?;
        }

        // nothing to coalesce with, pass a whole chunk straight through
        if self.buffer.is_empty() && buf.len() >= self.mtu {
            return self.inner.write(&buf[..self.mtu]);
        }

        let len = buf.len().min(self.mtu - self.buffer.len());
        self.buffer.extend_from_slice(&buf[..len]);
        Ok(len)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.drain()?;
        self.inner.flush()
    }
}

impl<S: Read> Read for MtuStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}
