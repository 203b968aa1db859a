//! Stream reassembly of link data into frames
//!
//! The link delivers bytes in whatever groupings it likes. The reassembler
//! consumes them strictly in arrival order and cuts frames at three
//! boundaries:
//!
//! ```text
//! NAK          → emit buffer as a negative acknowledgment, reset
//! ACK          → drop buffer (resynchronise on preamble), reset
//! ETX + 2 more → emit buffer as a complete frame, reset
//! ```
//!
//! A start marker that arrives while the buffer holds bytes not beginning
//! with a start marker discards those bytes first.
//!
//! A stream that never carries any of ACK, NAK or ETX never resynchronises;
//! the buffer is only reset once it exceeds [`MAX_FRAME_SIZE`].

use bytes::{Bytes, BytesMut};
use tracing::{trace, warn};

use crate::constants::{control, CHECKSUM_LEN, MAX_FRAME_SIZE};

/// Control mode of the reassembler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Accumulating frame bytes
    Normal,

    /// End marker seen; this many checksum bytes still belong to the frame
    AwaitingTrailer(usize),
}

/// A frame cut from the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawFrame {
    /// Bytes up to and including the checksum trailer
    Complete(Bytes),

    /// Bytes up to and including a NAK
    NegativeAck(Bytes),
}

impl RawFrame {
    /// Frame bytes
    pub fn bytes(&self) -> &Bytes {
        match self {
            Self::Complete(b) | Self::NegativeAck(b) => b,
        }
    }
}

/// Sequential frame reassembler
///
/// # Examples
///
/// ```
/// use mpos_core::{RawFrame, StreamReassembler};
///
/// let mut reassembler = StreamReassembler::new();
///
/// assert!(reassembler.feed(&[0x06, 0x16, b'O', b'P']).is_empty());
/// assert!(reassembler.feed(&[b'N', b'0', b'0', b'0', 0x17, 0x12]).is_empty());
///
/// let frames = reassembler.feed(&[0x34]);
/// assert_eq!(frames.len(), 1);
/// assert!(matches!(frames[0], RawFrame::Complete(_)));
/// ```
#[derive(Debug)]
pub struct StreamReassembler {
    buffer: BytesMut,
    state: StreamState,
}

impl StreamReassembler {
    /// Create an empty reassembler
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(1024),
            state: StreamState::Normal,
        }
    }

    /// Current control mode
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Bytes accumulated since the last boundary
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    /// Feed a chunk, returning every frame it completes in arrival order
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<RawFrame> {
        trace!("Reassembling {} bytes: {}", chunk.len(), hex::encode(chunk));

        chunk.iter().filter_map(|&b| self.push(b)).collect()
    }

    /// Feed a single byte
    pub fn push(&mut self, byte: u8) -> Option<RawFrame> {
        if let StreamState::AwaitingTrailer(remaining) = self.state {
            self.buffer.extend_from_slice(&[byte]);

            let remaining = remaining - 1;
            if remaining == 0 {
                self.state = StreamState::Normal;
                return Some(RawFrame::Complete(self.take()));
            }

            self.state = StreamState::AwaitingTrailer(remaining);
            return None;
        }

        if byte == control::STX
            && self.buffer.first().is_some_and(|&first| first != control::STX)
        {
            warn!(
                "Discarding {} bytes outside a frame: {}",
                self.buffer.len(),
                hex::encode(&self.buffer)
            );
            self.buffer.clear();
        }

        self.buffer.extend_from_slice(&[byte]);

        match byte {
            control::NAK => Some(RawFrame::NegativeAck(self.take())),
            control::ACK => {
                if self.buffer.len() > 1 {
                    trace!("ACK resynchronised, dropped {} bytes", self.buffer.len() - 1);
                }
                self.buffer.clear();
                None
            }
            control::ETX => {
                self.state = StreamState::AwaitingTrailer(CHECKSUM_LEN);
                None
            }
            _ => {
                if self.buffer.len() > MAX_FRAME_SIZE {
                    warn!(
                        "No frame boundary within {} bytes, resetting",
                        MAX_FRAME_SIZE
                    );
                    self.buffer.clear();
                }
                None
            }
        }
    }

    /// Drop any partial frame
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.state = StreamState::Normal;
    }

    fn take(&mut self) -> Bytes {
        self.buffer.split().freeze()
    }
}

impl Default for StreamReassembler {
    fn default() -> Self {
        Self::new()
    }
}
