pub const FIN_MASK: u8 = 0b1000_0000;
pub const RSV1_MASK: u8 = 0b0100_0000;
pub const RSV2_MASK: u8 = 0b0010_0000;
pub const RSV3_MASK: u8 = 0b0001_0000;
pub const RSV_MASK: u8 = RSV1_MASK | RSV2_MASK | RSV3_MASK;
pub const OP_CODE_MASK: u8 = 0b0000_1111;
pub const MASK_MASK: u8 = 0b1000_0000;
pub const PAYLOAD_LENGTH_MASK: u8 = 0b0111_1111;

/// Largest payload length encoded directly in the 7 bit length field.
pub const MAX_LITERAL_LENGTH: usize = 125;
/// Length field value announcing a 16 bit extended length.
pub const EXTENDED_LENGTH_16: u8 = 126;
/// Length field value announcing a 64 bit extended length.
pub const EXTENDED_LENGTH_64: u8 = 127;
/// Control frames must fit the 7 bit length field.
pub const MAX_CONTROL_PAYLOAD_LENGTH: usize = MAX_LITERAL_LENGTH;
/// Two header bytes, 64 bit extended length and the masking key.
pub const MAX_HEADER_LENGTH: usize = 2 + 8 + 4;

pub mod op {
    pub const CONTINUATION_FRAME: u8 = 0x0;
    pub const TEXT_FRAME: u8 = 0x1;
    pub const BINARY_FRAME: u8 = 0x2;
    pub const CONNECTION_CLOSE: u8 = 0x8;
    pub const PING: u8 = 0x9;
    pub const PONG: u8 = 0xA;
}

/// Frame opcode. Values 0x3-0x7 and 0xB-0xF are reserved and kept as [`OpCode::Reserved`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum OpCode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
    Reserved(u8),
}

impl OpCode {
    #[inline]
    pub const fn as_u8(self) -> u8 {
        match self {
            OpCode::Continuation => op::CONTINUATION_FRAME,
            OpCode::Text => op::TEXT_FRAME,
            OpCode::Binary => op::BINARY_FRAME,
            OpCode::Close => op::CONNECTION_CLOSE,
            OpCode::Ping => op::PING,
            OpCode::Pong => op::PONG,
            OpCode::Reserved(value) => value & OP_CODE_MASK,
        }
    }

    /// Close, Ping and Pong. These are never fragmented.
    #[inline]
    pub const fn is_control(self) -> bool {
        matches!(self, OpCode::Close | OpCode::Ping | OpCode::Pong)
    }
}

impl From<u8> for OpCode {
    #[inline]
    fn from(value: u8) -> Self {
        match value & OP_CODE_MASK {
            op::CONTINUATION_FRAME => OpCode::Continuation,
            op::TEXT_FRAME => OpCode::Text,
            op::BINARY_FRAME => OpCode::Binary,
            op::CONNECTION_CLOSE => OpCode::Close,
            op::PING => OpCode::Ping,
            op::PONG => OpCode::Pong,
            reserved => OpCode::Reserved(reserved),
        }
    }
}

/// XORs `payload` in place with the masking `key`; applying it twice restores the payload.
#[inline]
pub fn apply_mask(payload: &mut [u8], key: [u8; 4]) {
    if key == [0u8; 4] {
        return;
    }
    for (i, b) in payload.iter_mut().enumerate() {
        *b ^= key[i & 3];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_map_op_codes() {
        assert_eq!(OpCode::Continuation, OpCode::from(0x0));
        assert_eq!(OpCode::Text, OpCode::from(0x1));
        assert_eq!(OpCode::Binary, OpCode::from(0x2));
        assert_eq!(OpCode::Close, OpCode::from(0x8));
        assert_eq!(OpCode::Ping, OpCode::from(0x9));
        assert_eq!(OpCode::Pong, OpCode::from(0xA));
        for reserved in (0x3..=0x7).chain(0xB..=0xF) {
            assert_eq!(OpCode::Reserved(reserved), OpCode::from(reserved));
            assert_eq!(reserved, OpCode::from(reserved).as_u8());
            assert!(!OpCode::from(reserved).is_control());
        }
    }

    #[test]
    fn should_identify_control_frames() {
        assert!(OpCode::Close.is_control());
        assert!(OpCode::Ping.is_control());
        assert!(OpCode::Pong.is_control());
        assert!(!OpCode::Text.is_control());
        assert!(!OpCode::Binary.is_control());
        assert!(!OpCode::Continuation.is_control());
    }

    #[test]
    fn should_restore_payload_when_mask_applied_twice() {
        let original = b"the quick brown fox jumps over the lazy dog".to_vec();
        let key = [0x37, 0xfa, 0x21, 0x3d];

        let mut payload = original.clone();
        apply_mask(&mut payload, key);
        assert_ne!(original, payload);
        apply_mask(&mut payload, key);
        assert_eq!(original, payload);
    }

    #[test]
    fn should_unmask_rfc_example() {
        // RFC 6455 section 5.7, masked "Hello"
        let mut payload = [0x7f, 0x9f, 0x4d, 0x51, 0x58];
        apply_mask(&mut payload, [0x37, 0xfa, 0x21, 0x3d]);
        assert_eq!(b"Hello", &payload);
    }
}
