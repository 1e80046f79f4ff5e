//! Frame struct with typed accessors, plus the pure encode/decode pair.
//!
//! Uses `bytes::Bytes` for zero-copy payload sharing between the receive
//! path, the pending request and subscribers.
//!
//! # Example
//!
//! ```
//! use pcat_pmu::protocol::{address, decode_frame, encode_frame, Decoded};
//!
//! let bytes = encode_frame(address::HOST, address::PMU, 42, 0x13, &[60, 60, 0], true).unwrap();
//!
//! match decode_frame(&bytes) {
//!     Decoded::Frame(frame) => {
//!         assert_eq!(frame.command(), 0x13);
//!         assert_eq!(frame.payload(), &[60, 60, 0]);
//!         assert!(frame.need_ack());
//!     }
//!     other => panic!("unexpected {other:?}"),
//! }
//! ```

use std::fmt;

use bytes::Bytes;

use super::wire_format::{
    checksum, encode_parts, Footer, Header, CRC16, FOOT_SIZE, HEAD_SIZE, MAGIC_END, MAGIC_HEAD,
    MAX_BODY_SIZE,
};
use crate::error::{PmuError, Result};

/// A complete, validated protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Decoded head.
    pub header: Header,
    /// Decoded foot.
    pub footer: Footer,
    /// Body bytes.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame from its parts.
    pub fn new(header: Header, footer: Footer, payload: Bytes) -> Self {
        Self {
            header,
            footer,
            payload,
        }
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get the payload length.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Get the command code.
    #[inline]
    pub fn command(&self) -> u16 {
        self.header.command
    }

    /// Get the frame id.
    #[inline]
    pub fn frame_id(&self) -> u16 {
        self.header.frame_id
    }

    /// Get the sender address.
    #[inline]
    pub fn source(&self) -> u8 {
        self.header.source
    }

    /// Get the receiver address.
    #[inline]
    pub fn dest(&self) -> u8 {
        self.header.dest
    }

    /// Check if the sender expects a reply.
    #[inline]
    pub fn need_ack(&self) -> bool {
        self.footer.need_ack
    }

    /// Size of this frame on the wire.
    #[inline]
    pub fn wire_len(&self) -> usize {
        HEAD_SIZE + self.payload.len() + FOOT_SIZE
    }
}

/// Why a buffer was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Malformed {
    /// First byte is not `0xA5`.
    BadMagicHead(u8),
    /// `length` outside `[3, 65531)`.
    InvalidLength(u16),
    /// Last byte is not `0x5A`.
    BadMagicEnd(u8),
    /// Carried checksum differs from the recomputed one.
    CrcMismatch {
        /// Value found in the foot.
        carried: u16,
        /// Value recomputed over the frame.
        computed: u16,
    },
}

impl fmt::Display for Malformed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Malformed::BadMagicHead(b) => write!(f, "bad head magic {b:02X}"),
            Malformed::InvalidLength(len) => write!(f, "invalid length {len}"),
            Malformed::BadMagicEnd(b) => write!(f, "bad foot magic {b:02X}"),
            Malformed::CrcMismatch { carried, computed } => {
                write!(f, "crc16 mismatch {carried:04X} != {computed:04X}")
            }
        }
    }
}

/// Result of a single decode attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A full frame sits at the start of the buffer.
    Frame(Frame),
    /// The buffer holds a prefix of a frame; wait for more bytes.
    NeedMoreBytes,
    /// The buffer can never become a valid frame.
    Malformed(Malformed),
}

/// Encode a frame into a contiguous byte vector.
///
/// # Errors
///
/// Returns [`PmuError::PayloadTooLarge`] if `body` does not fit the length
/// field.
pub fn encode_frame(
    source: u8,
    dest: u8,
    frame_id: u16,
    command: u16,
    body: &[u8],
    need_ack: bool,
) -> Result<Vec<u8>> {
    let (head, foot) = encode_parts(source, dest, frame_id, command, body, need_ack).ok_or(
        PmuError::PayloadTooLarge {
            size: body.len(),
            max: MAX_BODY_SIZE,
        },
    )?;
    let mut buf = Vec::with_capacity(HEAD_SIZE + body.len() + FOOT_SIZE);
    buf.extend_from_slice(&head);
    buf.extend_from_slice(body);
    buf.extend_from_slice(&foot);
    Ok(buf)
}

/// Decode and validate the frame at the start of `buf`.
///
/// Bytes after the frame are ignored; use [`Frame::wire_len`] to find
/// where the next frame starts. Addresses are not checked here.
pub fn decode_frame(buf: &[u8]) -> Decoded {
    let header = match Header::decode(buf) {
        Some(h) => h,
        None => return Decoded::NeedMoreBytes,
    };

    if buf[0] != MAGIC_HEAD {
        return Decoded::Malformed(Malformed::BadMagicHead(buf[0]));
    }

    if !header.has_valid_length() {
        return Decoded::Malformed(Malformed::InvalidLength(header.length));
    }

    let total = header.frame_len();
    if buf.len() < total {
        return Decoded::NeedMoreBytes;
    }

    let magic_end = buf[total - 1];
    if magic_end != MAGIC_END {
        return Decoded::Malformed(Malformed::BadMagicEnd(magic_end));
    }

    let body_end = HEAD_SIZE + header.body_len();
    let footer = match Footer::decode(&buf[body_end..total]) {
        Some(f) => f,
        None => return Decoded::NeedMoreBytes,
    };

    // Covers src..=need_ack; the raw ack byte is used so a non-0/1 flag
    // still checks against what was actually sent.
    let computed = CRC16.checksum(&buf[1..=body_end]);
    if footer.crc16 != computed {
        return Decoded::Malformed(Malformed::CrcMismatch {
            carried: footer.crc16,
            computed,
        });
    }

    Decoded::Frame(Frame::new(
        header,
        footer,
        Bytes::copy_from_slice(&buf[HEAD_SIZE..body_end]),
    ))
}

/// Recompute the checksum of an already decoded frame.
pub fn frame_checksum(frame: &Frame) -> u16 {
    checksum(&frame.header.encode(), &frame.payload, frame.footer.need_ack)
}
