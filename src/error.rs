//! Error types for pcat-pmu.

use thiserror::Error;

/// Main error type for all PMU link operations.
#[derive(Debug, Error)]
pub enum PmuError {
    /// Writing to the serial transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// No correlated reply arrived within the retry budget.
    #[error("frame 0x{frame_id:04X} command 0x{command:02X} timed out after {attempts} attempts")]
    Timeout {
        /// Frame id used for every attempt.
        frame_id: u16,
        /// Request command.
        command: u16,
        /// Number of writes issued.
        attempts: u32,
    },

    /// The read loop or writer task is gone.
    #[error("connection closed")]
    ConnectionClosed,

    /// Body does not fit in the 16-bit length field.
    #[error("payload of {size} bytes exceeds maximum {max}")]
    PayloadTooLarge {
        /// Requested body size.
        size: usize,
        /// Largest encodable body.
        max: usize,
    },

    /// A typed payload could not be decoded from a frame body.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Link configuration could not be parsed.
    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),
}

/// Result type alias using PmuError.
pub type Result<T> = std::result::Result<T, PmuError>;
