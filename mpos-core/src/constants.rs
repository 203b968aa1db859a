//! Protocol constants

/// Link control bytes
pub mod control {
    /// Positive acknowledgment; also resynchronises the receive stream
    pub const ACK: u8 = 0x06;

    /// Negative acknowledgment (sent alone, no payload)
    pub const NAK: u8 = 0x15;

    /// Start of a frame
    pub const STX: u8 = 0x16;

    /// End of a frame's payload region, followed by the 2-byte checksum
    pub const ETX: u8 = 0x17;
}

/// Length of the checksum trailer after the end marker
pub const CHECKSUM_LEN: usize = 2;

/// Width of the decimal parameter length prefix
pub const LENGTH_PREFIX_LEN: usize = 3;

/// Width of command and response codes
pub const CODE_LEN: usize = 3;

/// Default command timeout (seconds)
pub const DEFAULT_TIMEOUT: u64 = 60;

/// Default connection timeout (seconds)
pub const DEFAULT_CONNECT_TIMEOUT: u64 = 15;

/// Receive buffer cap before the reassembler gives up on a frame
pub const MAX_FRAME_SIZE: usize = 64 * 1024;
