use std::io;
use std::io::Read;

use crate::ws::protocol::{apply_mask, OpCode};
use crate::ws::{protocol, Error, ReadBuffer};

/// Single decoded frame, the payload is already unmasked and borrows the decoder buffer.
#[derive(Debug, PartialEq, Eq)]
pub struct Frame<'a> {
    pub fin: bool,
    pub op_code: OpCode,
    pub payload: &'a [u8],
}

/// Incremental frame decoder. Bytes are pulled from the stream into an internal buffer and
/// frames are decoded from it; a state that cannot complete with the buffered bytes is resumed
/// after the next read.
#[derive(Debug)]
pub struct Decoder {
    buffer: ReadBuffer,
    decode_state: DecodeState,
    fin: bool,
    op_code: OpCode,
    masking_key: Option<[u8; 4]>,
    payload_length: usize,
    max_payload_length: usize,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum DecodeState {
    ReadingHeader1,
    ReadingHeader2,
    ReadingExtendedLength16,
    ReadingExtendedLength64,
    ReadingMaskKey,
    ReadingPayload,
}

impl Decoder {
    pub fn new(max_payload_length: usize) -> Self {
        Self {
            buffer: ReadBuffer::new(),
            decode_state: DecodeState::ReadingHeader1,
            fin: false,
            op_code: OpCode::Continuation,
            masking_key: None,
            payload_length: 0,
            max_payload_length,
        }
    }

    /// Blocks until more data has been read from the `stream`.
    #[inline]
    pub fn read<S: Read>(&mut self, stream: &mut S) -> io::Result<()> {
        self.buffer.read_from(stream)?;
        Ok(())
    }

    /// Decodes the next frame from the buffered data or returns `None` if more data is needed.
    pub fn decode_next(&mut self) -> Result<Option<Frame<'_>>, Error> {
        loop {
            let available = self.buffer.available();
            match self.decode_state {
                DecodeState::ReadingHeader1 => {
                    let Some(b) = self.buffer.consume_next_byte() else {
                        return Ok(None);
                    };
                    if b & protocol::RSV_MASK != 0 {
                        return Err(Error::Protocol("non zero RSV value received"));
                    }
                    self.fin = b & protocol::FIN_MASK != 0;
                    self.op_code = OpCode::from(b & protocol::OP_CODE_MASK);
                    self.decode_state = DecodeState::ReadingHeader2;
                }
                DecodeState::ReadingHeader2 => {
                    let Some(b) = self.buffer.consume_next_byte() else {
                        return Ok(None);
                    };
                    let masked = b & protocol::MASK_MASK != 0;
                    self.masking_key = None;
                    if self.op_code.is_control() && !self.fin {
                        return Err(Error::Protocol("fragmented control frame received"));
                    }
                    match b & protocol::PAYLOAD_LENGTH_MASK {
                        protocol::EXTENDED_LENGTH_16 => self.decode_state = DecodeState::ReadingExtendedLength16,
                        protocol::EXTENDED_LENGTH_64 => self.decode_state = DecodeState::ReadingExtendedLength64,
                        length => {
                            self.set_payload_length(length as u64)?;
                            self.decode_state = Self::after_length(masked);
                        }
                    }
                    if masked {
                        // marks that the key still has to be read
                        self.masking_key = Some([0u8; 4]);
                    }
                }
                DecodeState::ReadingExtendedLength16 => {
                    if available < 2 {
                        return Ok(None);
                    }
                    let bytes = self.buffer.consume_next(2);
                    let length = u16::from_be_bytes([bytes[0], bytes[1]]);
                    self.set_payload_length(length as u64)?;
                    self.decode_state = Self::after_length(self.masking_key.is_some());
                }
                DecodeState::ReadingExtendedLength64 => {
                    if available < 8 {
                        return Ok(None);
                    }
                    let mut length = [0u8; 8];
                    length.copy_from_slice(self.buffer.consume_next(8));
                    self.set_payload_length(u64::from_be_bytes(length))?;
                    self.decode_state = Self::after_length(self.masking_key.is_some());
                }
                DecodeState::ReadingMaskKey => {
                    if available < 4 {
                        return Ok(None);
                    }
                    let mut key = [0u8; 4];
                    key.copy_from_slice(self.buffer.consume_next(4));
                    self.masking_key = Some(key);
                    self.decode_state = DecodeState::ReadingPayload;
                }
                DecodeState::ReadingPayload => {
                    let payload_length = self.payload_length;
                    if available < payload_length {
                        return Ok(None);
                    }
                    self.decode_state = DecodeState::ReadingHeader1;
                    let payload = self.buffer.consume_next(payload_length);
                    if let Some(key) = self.masking_key {
                        apply_mask(payload, key);
                    }
                    return Ok(Some(Frame {
                        fin: self.fin,
                        op_code: self.op_code,
                        payload,
                    }));
                }
            }
        }
    }

    #[inline]
    const fn after_length(masked: bool) -> DecodeState {
        if masked {
            DecodeState::ReadingMaskKey
        } else {
            DecodeState::ReadingPayload
        }
    }

    fn set_payload_length(&mut self, length: u64) -> Result<(), Error> {
        if self.op_code.is_control() && length > protocol::MAX_CONTROL_PAYLOAD_LENGTH as u64 {
            return Err(Error::Protocol("control frame payload exceeds 125 bytes"));
        }
        if length > self.max_payload_length as u64 {
            return Err(Error::PayloadTooLarge {
                max: self.max_payload_length,
                actual: length,
            });
        }
        self.payload_length = length as usize;
        Ok(())
    }
}
