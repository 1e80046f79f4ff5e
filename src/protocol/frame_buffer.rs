//! Bounded reassembly buffer for the serial receive path.
//!
//! Uses `bytes::BytesMut` for the accumulator. Bytes are appended until the
//! buffer reaches its capacity; each push then attempts a decode:
//! - `NeedMoreBytes`: keep everything for the next push
//! - a frame or a malformed buffer: discard according to the
//!   [`RecoveryPolicy`]
//!
//! # Example
//!
//! ```
//! use pcat_pmu::protocol::{address, encode_frame, FrameBuffer};
//!
//! let bytes = encode_frame(address::PMU, address::HOST, 1, 0x07, b"hi", false).unwrap();
//! let mut buffer = FrameBuffer::new();
//!
//! let first = buffer.push(&bytes[..4]);
//! assert_eq!(first.consumed, 4);
//! assert!(first.events.is_empty());
//!
//! let second = buffer.push(&bytes[4..]);
//! assert_eq!(second.frames().count(), 1);
//! ```

use bytes::BytesMut;
use serde::{Deserialize, Serialize};

use super::frame::{decode_frame, Decoded, Frame, Malformed};
use super::wire_format::{FOOT_SIZE, HEAD_SIZE, MAGIC_HEAD};

/// Default accumulator capacity (8 KiB).
pub const DEFAULT_BUFFER_CAPACITY: usize = 8 * 1024;

/// Smallest capacity that still fits an empty-body frame.
pub const MIN_BUFFER_CAPACITY: usize = HEAD_SIZE + FOOT_SIZE;

/// What to throw away once a decode attempt settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryPolicy {
    /// Drop the whole accumulator after every frame or malformed buffer.
    ///
    /// Bytes of a following frame that arrived in the same chunk are lost.
    #[default]
    DiscardAll,
    /// Drop only the decoded frame; on malformed input skip to the next
    /// `0xA5` byte and keep decoding.
    Resync,
}

/// Something the buffer produced while consuming input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A validated frame.
    Frame(Frame),
    /// The buffered bytes were rejected.
    Malformed(Malformed),
    /// The accumulator filled up without completing a frame.
    Overflow {
        /// Bytes thrown away.
        discarded: usize,
    },
}

/// Result of one [`FrameBuffer::push`].
#[derive(Debug, Default)]
pub struct Feed {
    /// How many input bytes were taken into the accumulator.
    pub consumed: usize,
    /// Events in order of occurrence; empty while waiting for more bytes.
    pub events: Vec<Event>,
}

impl Feed {
    /// Iterate over the decoded frames only.
    pub fn frames(&self) -> impl Iterator<Item = &Frame> {
        self.events.iter().filter_map(|e| match e {
            Event::Frame(frame) => Some(frame),
            _ => None,
        })
    }
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
pub struct FrameBuffer {
    /// Accumulated bytes not yet consumed into a frame.
    buffer: BytesMut,
    /// Hard upper bound on `buffer.len()`.
    capacity: usize,
    /// Discard behaviour after a decode settles.
    policy: RecoveryPolicy,
}

impl FrameBuffer {
    /// Create a buffer with the default capacity and policy.
    pub fn new() -> Self {
        Self::with_policy(DEFAULT_BUFFER_CAPACITY, RecoveryPolicy::default())
    }

    /// Create a buffer with a custom capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_policy(capacity, RecoveryPolicy::default())
    }

    /// Create a buffer with a custom capacity and recovery policy.
    ///
    /// Capacities below [`MIN_BUFFER_CAPACITY`] are raised to it.
    pub fn with_policy(capacity: usize, policy: RecoveryPolicy) -> Self {
        let capacity = capacity.max(MIN_BUFFER_CAPACITY);
        Self {
            buffer: BytesMut::with_capacity(capacity),
            capacity,
            policy,
        }
    }

    /// Append as much of `data` as fits, then decode.
    ///
    /// Input beyond the free space is not consumed; push the remainder
    /// again (`&data[feed.consumed..]`). The accumulator never stays full,
    /// so the next push always makes progress.
    pub fn push(&mut self, data: &[u8]) -> Feed {
        let room = self.capacity - self.buffer.len();
        let consumed = data.len().min(room);
        self.buffer.extend_from_slice(&data[..consumed]);

        let mut events = Vec::new();
        loop {
            match decode_frame(&self.buffer) {
                Decoded::NeedMoreBytes => {
                    if self.buffer.len() >= self.capacity {
                        let discarded = self.buffer.len();
                        self.buffer.clear();
                        events.push(Event::Overflow { discarded });
                    }
                    break;
                }
                Decoded::Frame(frame) => {
                    self.discard_frame(frame.wire_len());
                    events.push(Event::Frame(frame));
                }
                Decoded::Malformed(reason) => {
                    self.discard_malformed();
                    events.push(Event::Malformed(reason));
                }
            }
        }

        Feed { consumed, events }
    }

    fn discard_frame(&mut self, len: usize) {
        match self.policy {
            RecoveryPolicy::DiscardAll => self.buffer.clear(),
            RecoveryPolicy::Resync => {
                let _ = self.buffer.split_to(len);
            }
        }
    }

    fn discard_malformed(&mut self) {
        match self.policy {
            RecoveryPolicy::DiscardAll => self.buffer.clear(),
            RecoveryPolicy::Resync => {
                match self.buffer[1..].iter().position(|&b| b == MAGIC_HEAD) {
                    Some(pos) => {
                        let _ = self.buffer.split_to(pos + 1);
                    }
                    None => self.buffer.clear(),
                }
            }
        }
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Get the accumulator capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get the recovery policy.
    pub fn policy(&self) -> RecoveryPolicy {
        self.policy
    }

    /// Drop all buffered bytes.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{address, encode_frame};

    fn make_frame_bytes(frame_id: u16, command: u16, payload: &[u8]) -> Vec<u8> {
        encode_frame(address::PMU, address::HOST, frame_id, command, payload, false).unwrap()
    }

    #[test]
    fn test_single_complete_frame() {
        let mut buffer = FrameBuffer::new();
        let bytes = make_frame_bytes(42, 0x04, b"hello");

        let feed = buffer.push(&bytes);

        assert_eq!(feed.consumed, bytes.len());
        let frames: Vec<_> = feed.frames().collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].frame_id(), 42);
        assert_eq!(frames[0].payload(), b"hello");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut buffer = FrameBuffer::new();
        let bytes = make_frame_bytes(7, 0x06, b"v1.2");

        for (i, byte) in bytes.iter().enumerate() {
            let feed = buffer.push(&[*byte]);
            assert_eq!(feed.consumed, 1);
            if i + 1 < bytes.len() {
                assert!(feed.events.is_empty(), "prefix of {} bytes decoded", i + 1);
                assert_eq!(buffer.len(), i + 1);
            } else {
                assert_eq!(feed.frames().count(), 1);
                assert_eq!(feed.frames().next().unwrap().payload(), b"v1.2");
            }
        }
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_malformed_discards_everything() {
        let mut buffer = FrameBuffer::new();
        let mut bytes = make_frame_bytes(1, 0x08, b"abc");
        bytes[HEAD_SIZE] ^= 0xFF;

        let feed = buffer.push(&bytes);

        assert!(matches!(
            feed.events.as_slice(),
            [Event::Malformed(Malformed::CrcMismatch { .. })]
        ));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_discard_all_drops_following_frame() {
        let mut buffer = FrameBuffer::new();
        let mut data = make_frame_bytes(1, 0x08, b"first");
        data.extend_from_slice(&make_frame_bytes(2, 0x08, b"second"));

        let feed = buffer.push(&data);

        assert_eq!(feed.consumed, data.len());
        assert_eq!(feed.frames().count(), 1);
        assert_eq!(feed.frames().next().unwrap().frame_id(), 1);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_resync_keeps_following_frames() {
        let mut buffer = FrameBuffer::with_policy(DEFAULT_BUFFER_CAPACITY, RecoveryPolicy::Resync);
        let mut data = make_frame_bytes(1, 0x08, b"first");
        data.extend_from_slice(&make_frame_bytes(2, 0x08, b"second"));
        let third = make_frame_bytes(3, 0x08, b"third");
        data.extend_from_slice(&third[..5]);

        let feed = buffer.push(&data);
        let ids: Vec<_> = feed.frames().map(|f| f.frame_id()).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(buffer.len(), 5);

        let feed = buffer.push(&third[5..]);
        assert_eq!(feed.frames().next().unwrap().frame_id(), 3);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_resync_skips_garbage_to_next_magic() {
        let mut buffer = FrameBuffer::with_policy(DEFAULT_BUFFER_CAPACITY, RecoveryPolicy::Resync);
        let mut data = vec![0x00, 0x13, 0x37];
        data.extend_from_slice(&make_frame_bytes(9, 0x02, b""));

        let feed = buffer.push(&data);

        assert!(matches!(
            feed.events.first(),
            Some(Event::Malformed(Malformed::BadMagicHead(0x00)))
        ));
        assert_eq!(feed.frames().next().unwrap().frame_id(), 9);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_capacity_caps_consumption() {
        let mut buffer = FrameBuffer::with_capacity(32);
        let payload = [0x55u8; 40];
        let bytes = make_frame_bytes(1, 0x08, &payload);

        let feed = buffer.push(&bytes);

        assert_eq!(feed.consumed, 32);
        assert!(matches!(
            feed.events.as_slice(),
            [Event::Overflow { discarded: 32 }]
        ));
        assert!(buffer.is_empty());

        // The accumulator is usable again.
        let next = make_frame_bytes(2, 0x08, b"ok");
        assert_eq!(buffer.push(&next).frames().count(), 1);
    }

    #[test]
    fn test_partial_then_rest_across_capacity_boundary() {
        let mut buffer = FrameBuffer::with_capacity(MIN_BUFFER_CAPACITY);
        let bytes = make_frame_bytes(3, 0x02, b"");
        let mut data = bytes.clone();
        data.extend_from_slice(&bytes);

        let feed = buffer.push(&data);
        assert_eq!(feed.consumed, bytes.len());
        assert_eq!(feed.frames().count(), 1);

        let feed = buffer.push(&data[feed.consumed..]);
        assert_eq!(feed.consumed, bytes.len());
        assert_eq!(feed.frames().count(), 1);
    }

    #[test]
    fn test_capacity_floor() {
        let buffer = FrameBuffer::with_capacity(1);
        assert_eq!(buffer.capacity(), MIN_BUFFER_CAPACITY);
        assert_eq!(buffer.policy(), RecoveryPolicy::DiscardAll);
    }

    #[test]
    fn test_clear() {
        let mut buffer = FrameBuffer::new();
        let bytes = make_frame_bytes(1, 0x02, b"");
        buffer.push(&bytes[..5]);
        assert_eq!(buffer.len(), 5);

        buffer.clear();
        assert!(buffer.is_empty());
    }
}
