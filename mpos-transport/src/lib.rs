//! Transport layer for the mPOS protocol
//!
//! The peripheral's wireless link is a pair of characteristics: one written
//! with request frames, one delivering raw notification chunks. A transport
//! exposes exactly that: `write` and a single raw-data subscription.

pub mod error;
pub mod memory;
pub mod tcp;

pub use error::{Error, Result};
pub use memory::{MemoryPeer, MemoryTransport};
pub use tcp::TcpTransport;

use async_trait::async_trait;
use bytes::Bytes;

/// Callback receiving raw link chunks in arrival order
///
/// Chunks carry no alignment to frame boundaries. The handler must not
/// block.
pub type RawHandler = Box<dyn Fn(Bytes) + Send + Sync + 'static>;

/// Transport trait for different link implementations
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to the peripheral
    async fn connect(&mut self) -> Result<()>;

    /// Disconnect from the peripheral
    async fn disconnect(&mut self) -> Result<()>;

    /// Check if connected
    fn is_connected(&self) -> bool;

    /// Write raw bytes to the peripheral
    async fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Register the raw-data handler
    ///
    /// At most once per connection; a second call fails with
    /// [`Error::AlreadySubscribed`].
    fn subscribe(&mut self, handler: RawHandler) -> Result<()>;

    /// Get remote address
    fn remote_addr(&self) -> String;
}
