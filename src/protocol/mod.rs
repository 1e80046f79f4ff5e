//! Protocol module - wire format, framing, and frame types.
//!
//! This module implements the serial framing used by the PMU:
//! - 9-byte head / 4-byte foot encoding with CRC-16
//! - Pure frame encode and decode-with-validation
//! - Bounded reassembly buffer for the receive path
//! - Command code table

mod command;
mod frame;
mod frame_buffer;
mod wire_format;

pub use command::{reply_code, Command};
pub use frame::{decode_frame, encode_frame, frame_checksum, Decoded, Frame, Malformed};
pub use frame_buffer::{
    Event, Feed, FrameBuffer, RecoveryPolicy, DEFAULT_BUFFER_CAPACITY, MIN_BUFFER_CAPACITY,
};
pub use wire_format::{
    address, checksum, encode_parts, Footer, Header, CRC16, FOOT_SIZE, HEAD_SIZE, LENGTH_LIMIT,
    MAGIC_END, MAGIC_HEAD, MAX_BODY_SIZE, MIN_LENGTH,
};
