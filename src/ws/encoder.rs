use std::io;
use std::io::Write;

use crate::stream::mtu::MtuStream;
use crate::ws::protocol;
use crate::ws::protocol::{OpCode, MAX_HEADER_LENGTH};

// multiple of the key length so every chunk starts at key offset zero
const MASK_CHUNK_SIZE: usize = 4096;

/// Serializes a frame header into a single stack buffer, returns the buffer and the number of
/// bytes used. The mask bit is set when a masking `key` is given.
pub fn encode_header(
    fin: bool,
    op_code: OpCode,
    payload_length: usize,
    key: Option<[u8; 4]>,
) -> ([u8; MAX_HEADER_LENGTH], usize) {
    let mut header = [0u8; MAX_HEADER_LENGTH];
    header[0] = op_code.as_u8();
    if fin {
        header[0] |= protocol::FIN_MASK;
    }
    let mask_bit = if key.is_some() { protocol::MASK_MASK } else { 0 };
    let mut len = 2;
    if payload_length <= protocol::MAX_LITERAL_LENGTH {
        header[1] = mask_bit | payload_length as u8;
    } else if payload_length <= u16::MAX as usize {
        header[1] = mask_bit | protocol::EXTENDED_LENGTH_16;
        header[2..4].copy_from_slice(&(payload_length as u16).to_be_bytes());
        len += 2;
    } else {
        header[1] = mask_bit | protocol::EXTENDED_LENGTH_64;
        header[2..10].copy_from_slice(&(payload_length as u64).to_be_bytes());
        len += 8;
    }
    if let Some(key) = key {
        header[len..len + 4].copy_from_slice(&key);
        len += 4;
    }
    (header, len)
}

/// Writes frames through an mtu batching stream. Callers serialize access so that frames of
/// different messages never interleave.
///
/// Masked frames get a fresh random key each.
#[derive(Debug)]
pub struct FrameWriter<W> {
    stream: MtuStream<W>,
    masked: bool,
}

impl<W: Write> FrameWriter<W> {
    pub fn new(stream: MtuStream<W>, masked: bool) -> Self {
        Self { stream, masked }
    }

    #[inline]
    pub const fn mtu(&self) -> usize {
        self.stream.mtu()
    }

    pub fn get_ref(&self) -> &W {
        self.stream.get_ref()
    }

    /// Writes a single frame and flushes it.
    pub fn send_frame(&mut self, fin: bool, op_code: OpCode, payload: &[u8]) -> io::Result<()> {
        let key = self.masked.then(rand::random::<[u8; 4]>);
        let (header, len) = encode_header(fin, op_code, payload.len(), key);
        self.stream.write_all(&header[..len])?;
        match key {
            Some(key) => self.write_masked(payload, key)?,
            None => self.stream.write_all(payload)?,
        }
        self.stream.flush()
    }

    fn write_masked(&mut self, payload: &[u8], key: [u8; 4]) -> io::Result<()> {
        let mut scratch = [0u8; MASK_CHUNK_SIZE];
        for chunk in payload.chunks(MASK_CHUNK_SIZE) {
            let masked = &mut scratch[..chunk.len()];
            masked.copy_from_slice(chunk);
            protocol::apply_mask(masked, key);
            self.stream.write_all(masked)?;
        }
        Ok(())
    }

    /// Sends the `payload` as one frame when it fits the mtu together with the largest header,
    /// otherwise as a sequence of fragments no larger than the mtu.
    pub fn send_or_fragment(&mut self, op_code: OpCode, payload: &[u8]) -> io::Result<()> {
        self.send_or_fragment_while(op_code, payload, || true)
    }

    /// Same as [`send_or_fragment`](FrameWriter::send_or_fragment) but checks `proceed` before
    /// every fragment after the first and abandons the message once it returns `false`.
    pub fn send_or_fragment_while<F: Fn() -> bool>(
        &mut self,
        op_code: OpCode,
        payload: &[u8],
        proceed: F,
    ) -> io::Result<()> {
        let mtu = self.mtu();
        if MAX_HEADER_LENGTH + payload.len() <= mtu {
            return self.send_frame(true, op_code, payload);
        }

        let chunk_size = mtu.saturating_sub(MAX_HEADER_LENGTH).max(1);
        let mut chunks = payload.chunks(chunk_size).peekable();
        let mut frame_op_code = op_code;
        while let Some(chunk) = chunks.next() {
            if frame_op_code == OpCode::Continuation && !proceed() {
                return Ok(());
            }
            let fin = chunks.peek().is_none();
            self.send_frame(fin, frame_op_code, chunk)?;
            frame_op_code = OpCode::Continuation;
        }
        Ok(())
    }
}
