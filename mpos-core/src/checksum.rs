//! Frame checksum algorithm
//!
//! CRC-16 with polynomial 0x1021, seed 0x0000 and no final XOR, shifted
//! most-significant bit first (the CRC-16/XMODEM parameter set):
//! 1. Coverage starts at the command code and ends at the end marker (inclusive)
//! 2. The leading start marker is not covered
//! 3. The result is appended big-endian

use tracing::trace;

/// Generator polynomial
pub const POLYNOMIAL: u16 = 0x1021;

/// Calculate the checksum over `data`
///
/// # Examples
///
/// ```
/// use mpos_core::checksum;
///
/// assert_eq!(checksum::calculate(b"123456789"), 0x31C3);
/// ```
pub fn calculate(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;

    for &byte in data {
        crc ^= (byte as u16) << 8;

        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ POLYNOMIAL;
            } else {
                crc <<= 1;
            }
        }
    }

    trace!(
        len = data.len(),
        checksum = format!("0x{:04X}", crc),
        "Calculated checksum"
    );

    crc
}

/// Verify checksum
pub fn verify(data: &[u8], expected: u16) -> bool {
    calculate(data) == expected
}
