//! Error types for mpos-core

/// Result type alias for mpos-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core protocol errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Parameter cannot be described by a 3-digit length prefix
    #[error("Parameter too long: {len} bytes (max: {max} bytes)")]
    ParameterTooLong {
        len: usize,
        max: usize,
    },

    /// Command or response code is not exactly three ASCII bytes
    #[error("Invalid command code: {0:?}")]
    InvalidCommandCode(String),

    /// Frame failed the minimal shape checks
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Checksum trailer does not match the frame contents
    #[error("Checksum mismatch: expected 0x{expected:04X}, received 0x{received:04X}")]
    ChecksumMismatch {
        expected: u16,
        received: u16,
    },
}

