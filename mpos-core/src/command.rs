//! Command and response code definitions

use std::fmt;
use std::str::FromStr;

use crate::constants::CODE_LEN;
use crate::error::{Error, Result};

/// Three-character ASCII command code
///
/// Codes are raw wire bytes; no text decoding happens on the hot path.
///
/// # Examples
///
/// ```
/// use mpos_core::CommandCode;
///
/// let code: CommandCode = "GTS".parse().unwrap();
/// assert_eq!(code, CommandCode::GET_TIMESTAMP);
/// assert!("GT".parse::<CommandCode>().is_err());
/// ```
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct CommandCode([u8; CODE_LEN]);

impl CommandCode {
    /// Open a session on the terminal
    pub const OPEN: Self = Self(*b"OPN");

    /// Close the session, showing a message
    pub const CLOSE: Self = Self(*b"CLO");

    /// Show a message on the terminal display
    pub const DISPLAY: Self = Self(*b"DSP");

    /// Read the terminal's table timestamp
    pub const GET_TIMESTAMP: Self = Self(*b"GTS");

    /// Read a card (swipe, dip or tap)
    pub const GET_CARD: Self = Self(*b"GCR");

    /// Read terminal information for an acquirer
    pub const GET_INFO: Self = Self(*b"GIN");

    /// Read the DUKPT encryption context
    pub const GET_DUKPT: Self = Self(*b"GDU");

    /// Encrypt a buffer with the terminal's keys
    pub const ENCRYPT_BUFFER: Self = Self(*b"ENB");

    /// Unsolicited notification pushed by the terminal
    pub const NOTIFICATION: Self = Self(*b"NTM");

    /// Build a code from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let code: [u8; CODE_LEN] = bytes
            .try_into()
            .map_err(|_| Error::InvalidCommandCode(String::from_utf8_lossy(bytes).into_owned()))?;

        if !code.iter().all(u8::is_ascii) {
            return Err(Error::InvalidCommandCode(
                String::from_utf8_lossy(bytes).into_owned(),
            ));
        }

        Ok(Self(code))
    }

    /// Raw wire bytes
    pub fn as_bytes(&self) -> &[u8; CODE_LEN] {
        &self.0
    }

    /// Code as text
    pub fn as_str(&self) -> &str {
        // Construction guarantees ASCII
        std::str::from_utf8(&self.0).unwrap_or("???")
    }

    /// Check if this code marks a notification frame
    pub fn is_notification(&self) -> bool {
        *self == Self::NOTIFICATION
    }
}

impl FromStr for CommandCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_bytes(s.as_bytes())
    }
}

impl fmt::Debug for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommandCode({})", self.as_str())
    }
}

impl fmt::Display for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Three-character application response code
///
/// Only `"000"` means success; other values are command-specific.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct ResponseCode([u8; CODE_LEN]);

impl ResponseCode {
    /// Success convention
    pub const SUCCESS: Self = Self(*b"000");

    /// Build a response code from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        CommandCode::from_bytes(bytes).map(|code| Self(code.0))
    }

    /// Raw wire bytes
    pub fn as_bytes(&self) -> &[u8; CODE_LEN] {
        &self.0
    }

    /// Code as text
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("???")
    }

    /// Check if this is the success value
    pub fn is_success(&self) -> bool {
        *self == Self::SUCCESS
    }
}

impl FromStr for ResponseCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_bytes(s.as_bytes())
    }
}

impl fmt::Debug for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResponseCode({})", self.as_str())
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_parse() {
        assert_eq!("OPN".parse::<CommandCode>().unwrap(), CommandCode::OPEN);
        assert_eq!(CommandCode::OPEN.as_bytes(), b"OPN");
        assert_eq!(CommandCode::OPEN.to_string(), "OPN");
    }

    #[test]
    fn test_command_wrong_length() {
        assert!(matches!(
            "OP".parse::<CommandCode>(),
            Err(Error::InvalidCommandCode(_))
        ));
        assert!("OPEN".parse::<CommandCode>().is_err());
    }

    #[test]
    fn test_command_non_ascii() {
        assert!(CommandCode::from_bytes(&[b'O', 0xC3, 0xA9]).is_err());
    }

    #[test]
    fn test_command_is_notification() {
        assert!(CommandCode::NOTIFICATION.is_notification());
        assert!(!CommandCode::GET_CARD.is_notification());
    }

    #[test]
    fn test_response_code_success() {
        assert!(ResponseCode::SUCCESS.is_success());
        assert!(!"001".parse::<ResponseCode>().unwrap().is_success());
    }
}
