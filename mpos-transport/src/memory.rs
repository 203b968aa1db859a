//! In-process transport
//!
//! Pairs a [`MemoryTransport`] with a [`MemoryPeer`] standing in for the
//! peripheral: the peer sees every write and delivers raw chunks, split
//! however the caller likes.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::{error::*, RawHandler, Transport};

#[derive(Default)]
struct Shared {
    handler: Mutex<Option<RawHandler>>,
    pending: Mutex<Vec<Bytes>>,
}

/// Transport half handed to the session
pub struct MemoryTransport {
    shared: Arc<Shared>,
    writes: mpsc::UnboundedSender<Bytes>,
    connected: bool,
    subscribed: bool,
}

/// Peripheral half
pub struct MemoryPeer {
    shared: Arc<Shared>,
    writes: mpsc::UnboundedReceiver<Bytes>,
}

impl MemoryTransport {
    /// Create a connected transport/peer pair
    pub fn pair() -> (Self, MemoryPeer) {
        let shared = Arc::new(Shared::default());
        let (tx, rx) = mpsc::unbounded_channel();

        let transport = Self {
            shared: shared.clone(),
            writes: tx,
            connected: false,
            subscribed: false,
        };

        let peer = MemoryPeer { shared, writes: rx };

        (transport, peer)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&mut self) -> Result<()> {
        if self.connected {
            return Err(Error::AlreadyConnected);
        }

        self.connected = true;
        self.subscribed = false;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.connected = false;
        self.shared.handler.lock().take();
        debug!("Memory transport disconnected");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        if !self.connected {
            return Err(Error::NotConnected);
        }

        trace!("Sending {} bytes: {}", data.len(), hex::encode(data));

        self.writes
            .send(Bytes::copy_from_slice(data))
            .map_err(|_| Error::ConnectionClosed)
    }

    fn subscribe(&mut self, handler: RawHandler) -> Result<()> {
        if !self.connected {
            return Err(Error::NotConnected);
        }

        if self.subscribed {
            return Err(Error::AlreadySubscribed);
        }

        let mut slot = self.shared.handler.lock();
        for chunk in self.shared.pending.lock().drain(..) {
            handler(chunk);
        }
        *slot = Some(handler);

        self.subscribed = true;
        Ok(())
    }

    fn remote_addr(&self) -> String {
        "memory".to_string()
    }
}

impl MemoryPeer {
    /// Deliver a raw chunk to the transport's subscriber
    ///
    /// Chunks delivered before anyone subscribed are held and flushed, in
    /// order, on subscription.
    pub fn deliver(&self, chunk: impl Into<Bytes>) {
        let chunk = chunk.into();
        let slot = self.shared.handler.lock();

        match slot.as_ref() {
            Some(handler) => handler(chunk),
            None => self.shared.pending.lock().push(chunk),
        }
    }

    /// Wait for the next write from the transport
    ///
    /// Returns `None` once the transport is dropped.
    pub async fn next_write(&mut self) -> Option<Bytes> {
        self.writes.recv().await
    }

    /// Take the next write if one is queued
    pub fn try_next_write(&mut self) -> Option<Bytes> {
        self.writes.try_recv().ok()
    }

    /// Drop the subscriber, as if the link went down
    pub fn close(&self) {
        self.shared.handler.lock().take();
    }
}
