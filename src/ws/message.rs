use std::borrow::Cow;

use smallvec::SmallVec;

use crate::ws::decoder::Frame;
use crate::ws::protocol::OpCode;
use crate::ws::Error;

/// Complete message produced from one or more frames.
#[derive(Debug, PartialEq, Eq)]
pub enum Message<'a> {
    /// Raw text payload, utf-8 validation happens on dispatch.
    Text(Cow<'a, [u8]>),
    Binary(Cow<'a, [u8]>),
    Close(&'a [u8]),
    Ping(&'a [u8]),
    Pong(&'a [u8]),
}

/// Collects the frames of a fragmented message.
///
/// A Text or Binary frame without FIN starts a message, Continuation frames append to it and
/// the Continuation frame with FIN completes it. Control frames may arrive between fragments
/// and pass straight through.
#[derive(Debug)]
pub struct FragmentAccumulator {
    op_code: Option<OpCode>,
    length: usize,
    chunks: SmallVec<[Vec<u8>; 8]>,
    max_payload_length: usize,
}

impl FragmentAccumulator {
    pub fn new(max_payload_length: usize) -> Self {
        Self {
            op_code: None,
            length: 0,
            chunks: SmallVec::new(),
            max_payload_length,
        }
    }

    /// Whether a fragmented message is in progress.
    #[inline]
    pub fn in_progress(&self) -> bool {
        self.op_code.is_some()
    }

    /// Accepts the next frame, returns a message once one is complete.
    pub fn accept<'a>(&mut self, frame: Frame<'a>) -> Result<Option<Message<'a>>, Error> {
        match frame.op_code {
            OpCode::Close => Ok(Some(Message::Close(frame.payload))),
            OpCode::Ping => Ok(Some(Message::Ping(frame.payload))),
            OpCode::Pong => Ok(Some(Message::Pong(frame.payload))),
            OpCode::Reserved(_) => Ok(None),
            op_code @ (OpCode::Text | OpCode::Binary) => {
                if self.in_progress() {
                    return Err(Error::Protocol("new data frame received before fragmented message completed"));
                }
                if frame.fin {
                    return Ok(Some(Self::data(op_code, Cow::Borrowed(frame.payload))));
                }
                self.op_code = Some(op_code);
                self.append(frame.payload)?;
                Ok(None)
            }
            OpCode::Continuation => {
                let Some(op_code) = self.op_code else {
                    return Err(Error::Protocol("continuation frame received without fragmented message"));
                };
                self.append(frame.payload)?;
                if !frame.fin {
                    return Ok(None);
                }
                let payload = self.take();
                Ok(Some(Self::data(op_code, Cow::Owned(payload))))
            }
        }
    }

    fn append(&mut self, payload: &[u8]) -> Result<(), Error> {
        self.length += payload.len();
        if self.length > self.max_payload_length {
            let actual = self.length as u64;
            self.reset();
            return Err(Error::PayloadTooLarge {
                max: self.max_payload_length,
                actual,
            });
        }
        if !payload.is_empty() {
            self.chunks.push(payload.to_vec());
        }
        Ok(())
    }

    /// Concatenates the chunks and clears the accumulator.
    fn take(&mut self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(self.length);
        for chunk in self.chunks.drain(..) {
            payload.extend_from_slice(&chunk);
        }
        self.reset();
        payload
    }

    fn reset(&mut self) {
        self.op_code = None;
        self.length = 0;
        self.chunks.clear();
    }

    fn data(op_code: OpCode, payload: Cow<'_, [u8]>) -> Message<'_> {
        match op_code {
            OpCode::Text => Message::Text(payload),
            _ => Message::Binary(payload),
        }
    }
}
