//! Codec module - typed payloads carried in frame bodies.
//!
//! The PMU firmware exchanges packed little-endian structs. Each struct
//! implements [`Payload`]; [`PayloadCodec`] is the entry point used by the
//! device helpers.
//!
//! # Design
//!
//! Codecs are marker structs with static methods rather than trait objects,
//! so the payload type is chosen at compile time.
//!
//! # Example
//!
//! ```
//! use pcat_pmu::codec::{PayloadCodec, WatchdogTimeouts};
//!
//! let body = PayloadCodec::encode(&WatchdogTimeouts::new(60, 60, 30));
//! assert_eq!(body, vec![60, 60, 30]);
//!
//! let decoded: WatchdogTimeouts = PayloadCodec::decode(&body).unwrap();
//! assert_eq!(decoded.running, 30);
//! ```

mod payload;

pub use payload::{
    BootReason, DateTime, LedSetup, Payload, ShutdownReason, StartupMatch, StartupTime,
    StatusReport, WatchdogTimeouts,
};

use crate::error::Result;

/// Codec for packed little-endian payload structs.
pub struct PayloadCodec;

impl PayloadCodec {
    /// Encode a payload to body bytes.
    #[inline]
    pub fn encode<T: Payload>(value: &T) -> Vec<u8> {
        let mut buf = Vec::with_capacity(T::SIZE);
        value.encode_into(&mut buf);
        buf
    }

    /// Decode a payload from body bytes.
    ///
    /// Bytes past `T::SIZE` are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`PmuError::InvalidPayload`](crate::PmuError::InvalidPayload)
    /// if the body is too short or holds out-of-range values.
    #[inline]
    pub fn decode<T: Payload>(bytes: &[u8]) -> Result<T> {
        T::decode(bytes)
    }
}
