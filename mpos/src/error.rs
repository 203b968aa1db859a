//! High-level error types

use mpos_core::{CommandCode, ResponseCode};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Core protocol error: {0}")]
    Core(#[from] mpos_core::Error),
    
    #[error("Transport error: {0}")]
    Transport(#[from] mpos_transport::Error),
    
    #[error("Type error: {0}")]
    Types(#[from] mpos_types::Error),
    
    #[error("Device not connected")]
    NotConnected,

    #[error("Connection closed while waiting for a reply")]
    ConnectionClosed,

    #[error("Timeout waiting for response after {seconds}s")]
    Timeout {
        seconds: u64,
    },

    #[error("Device rejected {command} with a negative acknowledgment")]
    NegativeAcknowledgment {
        command: CommandCode,
    },

    #[error("Device answered {command} with response code {code}")]
    Application {
        command: CommandCode,
        code: ResponseCode,
    },
    
    #[error("Invalid response from device: {0}")]
    InvalidResponse(String),

    #[error("Payment gateway error: {0}")]
    Gateway(String),
}

impl Error {
    /// Check if error is recoverable (retry might succeed)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::NegativeAcknowledgment { .. }
                | Self::Application { .. }
        )
    }

    /// Check if error requires reconnection
    pub fn requires_reconnect(&self) -> bool {
        matches!(
            self,
            Self::NotConnected | Self::ConnectionClosed | Self::Transport(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(Error::Timeout { seconds: 60 }.is_recoverable());
        assert!(Error::NegativeAcknowledgment { command: CommandCode::OPEN }.is_recoverable());
        assert!(!Error::ConnectionClosed.is_recoverable());

        assert!(Error::ConnectionClosed.requires_reconnect());
        assert!(Error::from(mpos_transport::Error::NotConnected).requires_reconnect());
        assert!(!Error::Gateway("down".into()).requires_reconnect());
    }

    #[test]
    fn test_error_display() {
        let error = Error::Application {
            command: CommandCode::DISPLAY,
            code: "012".parse().unwrap(),
        };
        assert_eq!(error.to_string(), "Device answered DSP with response code 012");
    }
}
