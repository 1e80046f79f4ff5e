//! Wire format encoding and decoding.
//!
//! Every frame is a 9-byte head, a variable body and a 4-byte foot:
//! ```text
//! ┌───────┬─────┬──────┬──────────┬────────┬─────────┬──────┬──────────┬───────┬───────┐
//! │ 0xA5  │ src │ dest │ frame id │ length │ command │ body │ need_ack │ crc16 │ 0x5A  │
//! │ 1     │ 1   │ 1    │ u16 LE   │ u16 LE │ u16 LE  │ N    │ 1        │ u16 LE│ 1     │
//! └───────┴─────┴──────┴──────────┴────────┴─────────┴──────┴──────────┴───────┴───────┘
//! ```
//!
//! `length` counts the body plus the foot minus one. The CRC covers every
//! byte from `src` through `need_ack`.

use crc::{Crc, CRC_16_MODBUS};

/// Head size in bytes (fixed, exactly 9).
pub const HEAD_SIZE: usize = 9;

/// Foot size in bytes (fixed, exactly 4).
pub const FOOT_SIZE: usize = 4;

/// First byte of every frame.
pub const MAGIC_HEAD: u8 = 0xA5;

/// Last byte of every frame.
pub const MAGIC_END: u8 = 0x5A;

/// Smallest valid `length` field (empty body).
pub const MIN_LENGTH: u16 = (FOOT_SIZE - 1) as u16;

/// `length` must stay strictly below this value.
pub const LENGTH_LIMIT: u16 = u16::MAX - 4;

/// Largest body that still produces a valid `length` field.
pub const MAX_BODY_SIZE: usize = (LENGTH_LIMIT - 1 - MIN_LENGTH) as usize;

/// CRC-16 with the reflected 0x8005 table and 0xFFFF seed.
pub static CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// Bus addresses.
pub mod address {
    /// The host CPU.
    pub const HOST: u8 = 0x01;
    /// Broadcast to every host CPU.
    pub const HOST_BROADCAST: u8 = 0x80;
    /// The PMU.
    pub const PMU: u8 = 0x81;
    /// Broadcast to every PMU.
    pub const PMU_BROADCAST: u8 = 0xFE;
    /// Broadcast to everyone.
    pub const ALL: u8 = 0xFF;
}

/// Decoded frame head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Sender address.
    pub source: u8,
    /// Receiver address.
    pub dest: u8,
    /// Correlation id, echoed by the responder.
    pub frame_id: u16,
    /// Body length plus foot size minus one.
    pub length: u16,
    /// Command code.
    pub command: u16,
}

impl Header {
    /// Create a header for a body of `body_len` bytes.
    ///
    /// The caller must ensure `body_len <= MAX_BODY_SIZE`.
    pub fn new(source: u8, dest: u8, frame_id: u16, command: u16, body_len: usize) -> Self {
        debug_assert!(body_len <= MAX_BODY_SIZE);
        Self {
            source,
            dest,
            frame_id,
            length: (body_len + FOOT_SIZE - 1) as u16,
            command,
        }
    }

    /// Encode the head, magic byte included.
    ///
    /// # Example
    ///
    /// ```
    /// use pcat_pmu::protocol::{address, Header, HEAD_SIZE};
    ///
    /// let header = Header::new(address::HOST, address::PMU, 0x0102, 0x01, 0);
    /// let bytes = header.encode();
    /// assert_eq!(bytes.len(), HEAD_SIZE);
    /// assert_eq!(bytes, [0xA5, 0x01, 0x81, 0x02, 0x01, 0x03, 0x00, 0x01, 0x00]);
    /// ```
    pub fn encode(&self) -> [u8; HEAD_SIZE] {
        let mut buf = [0u8; HEAD_SIZE];
        buf[0] = MAGIC_HEAD;
        buf[1] = self.source;
        buf[2] = self.dest;
        buf[3..5].copy_from_slice(&self.frame_id.to_le_bytes());
        buf[5..7].copy_from_slice(&self.length.to_le_bytes());
        buf[7..9].copy_from_slice(&self.command.to_le_bytes());
        buf
    }

    /// Decode the head fields, ignoring the magic byte.
    ///
    /// Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEAD_SIZE {
            return None;
        }
        Some(Self {
            source: buf[1],
            dest: buf[2],
            frame_id: u16::from_le_bytes([buf[3], buf[4]]),
            length: u16::from_le_bytes([buf[5], buf[6]]),
            command: u16::from_le_bytes([buf[7], buf[8]]),
        })
    }

    /// Whether `length` is inside the accepted range.
    #[inline]
    pub fn has_valid_length(&self) -> bool {
        self.length >= MIN_LENGTH && self.length < LENGTH_LIMIT
    }

    /// Body size implied by `length`.
    #[inline]
    pub fn body_len(&self) -> usize {
        self.length as usize + 1 - FOOT_SIZE
    }

    /// Size of the whole frame implied by `length`.
    #[inline]
    pub fn frame_len(&self) -> usize {
        HEAD_SIZE + self.length as usize + 1
    }
}

/// Decoded frame foot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Footer {
    /// Receiver must answer even without semantic interest.
    pub need_ack: bool,
    /// Checksum as carried on the wire.
    pub crc16: u16,
}

impl Footer {
    /// Encode the foot, magic byte included.
    pub fn encode(&self) -> [u8; FOOT_SIZE] {
        let crc = self.crc16.to_le_bytes();
        [self.need_ack as u8, crc[0], crc[1], MAGIC_END]
    }

    /// Decode the foot fields, ignoring the magic byte.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < FOOT_SIZE {
            return None;
        }
        Some(Self {
            need_ack: buf[0] != 0,
            crc16: u16::from_le_bytes([buf[1], buf[2]]),
        })
    }
}

/// Compute the frame checksum from its encoded head, body and ack byte.
pub fn checksum(head: &[u8; HEAD_SIZE], body: &[u8], need_ack: bool) -> u16 {
    let mut digest = CRC16.digest();
    digest.update(&head[1..]);
    digest.update(body);
    digest.update(&[need_ack as u8]);
    digest.finalize()
}

/// Encode head and foot for a body (standalone function).
///
/// Returns `None` if the body is larger than [`MAX_BODY_SIZE`].
pub fn encode_parts(
    source: u8,
    dest: u8,
    frame_id: u16,
    command: u16,
    body: &[u8],
    need_ack: bool,
) -> Option<([u8; HEAD_SIZE], [u8; FOOT_SIZE])> {
    if body.len() > MAX_BODY_SIZE {
        return None;
    }
    let head = Header::new(source, dest, frame_id, command, body.len()).encode();
    let foot = Footer {
        need_ack,
        crc16: checksum(&head, body, need_ack),
    }
    .encode();
    Some((head, foot))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_encode_decode_roundtrip() {
        let original = Header::new(address::PMU, address::HOST, 0xBEEF, 0x07, 27);
        let encoded = original.encode();
        assert_eq!(encoded[0], MAGIC_HEAD);
        let decoded = Header::decode(&encoded).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_header_little_endian_byte_order() {
        let header = Header {
            source: 0x11,
            dest: 0x22,
            frame_id: 0x0304,
            length: 0x0506,
            command: 0x0708,
        };
        let bytes = header.encode();
        assert_eq!(bytes, [0xA5, 0x11, 0x22, 0x04, 0x03, 0x06, 0x05, 0x08, 0x07]);
    }

    #[test]
    fn test_length_accounts_for_foot() {
        let header = Header::new(address::HOST, address::PMU, 1, 1, 0);
        assert_eq!(header.length, 3);
        assert_eq!(header.body_len(), 0);
        assert_eq!(header.frame_len(), HEAD_SIZE + FOOT_SIZE);

        let header = Header::new(address::HOST, address::PMU, 1, 1, 10);
        assert_eq!(header.length, 13);
        assert_eq!(header.body_len(), 10);
        assert_eq!(header.frame_len(), HEAD_SIZE + 10 + FOOT_SIZE);
    }

    #[test]
    fn test_length_bounds() {
        let mut header = Header::new(address::HOST, address::PMU, 1, 1, 0);
        assert!(header.has_valid_length());

        header.length = MIN_LENGTH - 1;
        assert!(!header.has_valid_length());

        header.length = LENGTH_LIMIT;
        assert!(!header.has_valid_length());

        header.length = LENGTH_LIMIT - 1;
        assert!(header.has_valid_length());
        assert_eq!(header.body_len(), MAX_BODY_SIZE);
    }

    #[test]
    fn test_decode_too_short_buffer() {
        assert!(Header::decode(&[0u8; HEAD_SIZE - 1]).is_none());
        assert!(Footer::decode(&[0u8; FOOT_SIZE - 1]).is_none());
    }

    #[test]
    fn test_footer_layout() {
        let foot = Footer {
            need_ack: true,
            crc16: 0xABCD,
        };
        assert_eq!(foot.encode(), [0x01, 0xCD, 0xAB, MAGIC_END]);
        assert_eq!(Footer::decode(&foot.encode()), Some(foot));
    }

    #[test]
    fn test_crc_matches_reference_check_value() {
        // CRC-16/MODBUS check value over "123456789".
        assert_eq!(CRC16.checksum(b"123456789"), 0x4B37);
    }

    #[test]
    fn test_checksum_skips_magic_and_covers_ack_byte() {
        let head = Header::new(address::HOST, address::PMU, 7, 0x13, 3).encode();
        let body = [60, 60, 0];

        let mut span = head[1..].to_vec();
        span.extend_from_slice(&body);
        span.push(1);
        assert_eq!(checksum(&head, &body, true), CRC16.checksum(&span));
        assert_ne!(checksum(&head, &body, true), checksum(&head, &body, false));
    }

    #[test]
    fn test_encode_parts_rejects_oversized_body() {
        let body = vec![0u8; MAX_BODY_SIZE + 1];
        assert!(encode_parts(address::HOST, address::PMU, 1, 1, &body, false).is_none());

        let body = vec![0u8; MAX_BODY_SIZE];
        assert!(encode_parts(address::HOST, address::PMU, 1, 1, &body, false).is_some());
    }
}
