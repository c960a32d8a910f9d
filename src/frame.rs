//! RFC 6455 frame codec. Stateless: encode and decode are pure functions of
//! bytes, with no I/O of their own.

use crate::error::Error;
use rand::RngCore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Continue,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl OpCode {
    pub fn from_byte(byte: u8) -> Result<Self, Error> {
        match byte {
            0x0 => Ok(OpCode::Continue),
            0x1 => Ok(OpCode::Text),
            0x2 => Ok(OpCode::Binary),
            0x8 => Ok(OpCode::Close),
            0x9 => Ok(OpCode::Ping),
            0xA => Ok(OpCode::Pong),
            other => Err(Error::InvalidOpcode(other)),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            OpCode::Continue => 0x0,
            OpCode::Text => 0x1,
            OpCode::Binary => 0x2,
            OpCode::Close => 0x8,
            OpCode::Ping => 0x9,
            OpCode::Pong => 0xA,
        }
    }

    pub fn is_control(self) -> bool {
        matches!(self, OpCode::Close | OpCode::Ping | OpCode::Pong)
    }
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub fin: bool,
    pub opcode: OpCode,
    pub masked: bool,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(fin: bool, opcode: OpCode, payload: Vec<u8>) -> Self {
        Frame {
            fin,
            opcode,
            masked: false,
            payload,
        }
    }
}

/// Outcome of decoding a prefix of bytes. Decoding is total: exactly one of
/// these three is returned for any input, and `decode` never reads past the
/// supplied slice.
#[derive(Debug)]
pub enum Decode {
    /// The buffer doesn't yet contain a whole frame. `min_bytes` is a lower
    /// bound on how many more bytes are needed before retrying.
    NeedMore(usize),
    /// A full frame was parsed, consuming `consumed` bytes from the front of
    /// the buffer.
    Frame { frame: Frame, consumed: usize },
    ProtocolError(Error),
}

/// Encode one frame, masking the payload with a fresh random key when
/// `mask_output` is true. The server-side caller always passes `false`.
pub fn encode(opcode: OpCode, payload: &[u8], mask_output: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 14);
    out.push(0b1000_0000 | opcode.as_u8());

    let len = payload.len();
    let mask_bit = if mask_output { 0x80 } else { 0x00 };
    if len <= 125 {
        out.push(mask_bit | len as u8);
    } else if len <= 0xFFFF {
        out.push(mask_bit | 126);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        out.push(mask_bit | 127);
        out.extend_from_slice(&(len as u64).to_be_bytes());
    }

    if mask_output {
        let mut key = [0u8; 4];
        rand::thread_rng().fill_bytes(&mut key);
        out.extend_from_slice(&key);
        out.extend(payload.iter().enumerate().map(|(i, b)| b ^ key[i % 4]));
    } else {
        out.extend_from_slice(payload);
    }

    out
}

/// Decode one frame from the front of `buf`. Never panics, never reads past
/// `buf.len()`.
pub fn decode(buf: &[u8], max_frame_size: u64) -> Decode {
    if buf.len() < 2 {
        return Decode::NeedMore(2 - buf.len());
    }

    let b0 = buf[0];
    let b1 = buf[1];

    let fin = b0 & 0b1000_0000 != 0;
    let rsv = b0 & 0b0111_0000;
    let opcode = match OpCode::from_byte(b0 & 0x0F) {
        Ok(op) => op,
        Err(e) => return Decode::ProtocolError(e),
    };

    if rsv != 0 {
        return Decode::ProtocolError(Error::RsvNotZero);
    }

    if !fin && opcode.is_control() {
        return Decode::ProtocolError(Error::ControlFrameFragmented);
    }

    let masked = b1 & 0b1000_0000 != 0;
    let len_marker = b1 & 0b0111_1111;

    let mut cursor = 2usize;
    let payload_len: u64 = match len_marker {
        0..=125 => len_marker as u64,
        126 => {
            if buf.len() < cursor + 2 {
                return Decode::NeedMore(cursor + 2 - buf.len());
            }
            let n = u16::from_be_bytes([buf[cursor], buf[cursor + 1]]);
            cursor += 2;
            if n < 126 {
                return Decode::ProtocolError(Error::NonMinimalLength16);
            }
            n as u64
        }
        127 => {
            if buf.len() < cursor + 8 {
                return Decode::NeedMore(cursor + 8 - buf.len());
            }
            let mut arr = [0u8; 8];
            arr.copy_from_slice(&buf[cursor..cursor + 8]);
            let n = u64::from_be_bytes(arr);
            cursor += 8;
            if n & (1 << 63) != 0 {
                return Decode::ProtocolError(Error::NonMinimalLength64);
            }
            n
        }
        _ => unreachable!("7-bit field"),
    };

    if opcode.is_control() && payload_len > 125 {
        return Decode::ProtocolError(Error::ControlFramePayloadTooLarge);
    }

    if opcode == OpCode::Close && payload_len == 1 {
        return Decode::ProtocolError(Error::InvalidCloseLength);
    }

    if payload_len > max_frame_size {
        return Decode::ProtocolError(Error::FrameTooLarge(payload_len, max_frame_size));
    }

    let mask_key = if masked {
        if buf.len() < cursor + 4 {
            return Decode::NeedMore(cursor + 4 - buf.len());
        }
        let key = [buf[cursor], buf[cursor + 1], buf[cursor + 2], buf[cursor + 3]];
        cursor += 4;
        Some(key)
    } else {
        None
    };

    let payload_len = payload_len as usize;
    if buf.len() < cursor + payload_len {
        return Decode::NeedMore(cursor + payload_len - buf.len());
    }

    let mut payload = buf[cursor..cursor + payload_len].to_vec();
    if let Some(key) = mask_key {
        for (i, byte) in payload.iter_mut().enumerate() {
            *byte ^= key[i % 4];
        }
    }
    cursor += payload_len;

    Decode::Frame {
        frame: Frame {
            fin,
            opcode,
            masked,
            payload,
        },
        consumed: cursor,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_masked_hello() {
        let input = [0x81, 0x85, 0x37, 0xFA, 0x21, 0x3D, 0x7F, 0x9F, 0x4D, 0x51, 0x58];
        match decode(&input, u64::MAX) {
            Decode::Frame { frame, consumed } => {
                assert_eq!(consumed, 11);
                assert!(frame.fin);
                assert_eq!(frame.opcode, OpCode::Text);
                assert_eq!(frame.payload, b"Hello");
            }
            other => panic!("expected Frame, got {other:?}"),
        }
    }

    #[test]
    fn encode_hello_unmasked() {
        let out = encode(OpCode::Text, b"Hello", false);
        assert_eq!(out, vec![0x81, 0x05, 0x48, 0x65, 0x6C, 0x6C, 0x6F]);
    }

    #[test]
    fn round_trip_any_payload() {
        for len in [0usize, 1, 125, 126, 1000, 70000] {
            let payload = vec![0x42u8; len];
            let encoded = encode(OpCode::Binary, &payload, false);
            match decode(&encoded, u64::MAX) {
                Decode::Frame { frame, consumed } => {
                    assert_eq!(consumed, encoded.len());
                    assert_eq!(frame.payload, payload);
                    assert_eq!(frame.opcode, OpCode::Binary);
                }
                other => panic!("len {len}: expected Frame, got {other:?}"),
            }
        }
    }

    #[test]
    fn need_more_on_truncated_prefix() {
        let full = encode(OpCode::Text, b"Hello, world!", false);
        for cut in 1..full.len() {
            match decode(&full[..cut], u64::MAX) {
                Decode::NeedMore(k) => assert!(k > 0 && k <= full.len() - cut),
                other => panic!("cut {cut}: expected NeedMore, got {other:?}"),
            }
        }
    }

    #[test]
    fn extended_16_bit_length() {
        let payload = vec![0u8; 260];
        let encoded = encode(OpCode::Binary, &payload, false);
        assert_eq!(&encoded[0..4], &[0x82, 0x7E, 0x01, 0x04]);
        match decode(&encoded, u64::MAX) {
            Decode::Frame { consumed, .. } => assert_eq!(consumed, 4 + 260),
            other => panic!("expected Frame, got {other:?}"),
        }
    }

    #[test]
    fn rsv_bits_rejected() {
        let input = [0xC1, 0x00];
        assert!(matches!(decode(&input, u64::MAX), Decode::ProtocolError(Error::RsvNotZero)));
    }

    #[test]
    fn control_frame_fragmented_rejected() {
        let input = [0x09, 0x00]; // PING, FIN=0
        assert!(matches!(
            decode(&input, u64::MAX),
            Decode::ProtocolError(Error::ControlFrameFragmented)
        ));
    }

    #[test]
    fn control_frame_oversized_payload_rejected() {
        let mut input = vec![0x89, 126, 0, 200];
        input.extend(vec![0u8; 200]);
        assert!(matches!(
            decode(&input, u64::MAX),
            Decode::ProtocolError(Error::ControlFramePayloadTooLarge)
        ));
    }

    #[test]
    fn close_with_one_byte_payload_rejected() {
        let input = [0x88, 0x01, 0xAB];
        assert!(matches!(
            decode(&input, u64::MAX),
            Decode::ProtocolError(Error::InvalidCloseLength)
        ));
    }

    #[test]
    fn non_minimal_length16_rejected() {
        let input = [0x82, 126, 0, 10]; // declares 126-marker for actual len 10
        assert!(matches!(
            decode(&input, u64::MAX),
            Decode::ProtocolError(Error::NonMinimalLength16)
        ));
    }

    #[test]
    fn oversized_frame_rejected_by_cap() {
        let encoded = encode(OpCode::Binary, &vec![0u8; 1000], false);
        assert!(matches!(
            decode(&encoded, 10),
            Decode::ProtocolError(Error::FrameTooLarge(1000, 10))
        ));
    }
}
