//! TCP bridge transport
//!
//! Talks to a peripheral through a BLE-to-TCP bridge that forwards the raw
//! characteristic traffic verbatim in both directions.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use mpos_core::constants::DEFAULT_CONNECT_TIMEOUT;

use crate::{error::*, RawHandler, Transport};

/// TCP transport for bridged peripherals
pub struct TcpTransport {
    addr: String,
    port: u16,
    socket_addr: Option<SocketAddr>,
    reader: Option<OwnedReadHalf>,
    writer: Option<OwnedWriteHalf>,
    reader_task: Option<JoinHandle<()>>,
    connect_timeout: Duration,
}

impl TcpTransport {
    /// Create new TCP transport
    pub fn new(addr: impl Into<String>, port: u16) -> Self {
        Self {
            addr: addr.into(),
            port,
            socket_addr: None,
            reader: None,
            writer: None,
            reader_task: None,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT),
        }
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Resolve address to SocketAddr
    async fn resolve_addr(&mut self) -> Result<SocketAddr> {
        if let Some(addr) = self.socket_addr {
            return Ok(addr);
        }

        let addr_str = format!("{}:{}", self.addr, self.port);

        let addrs: Vec<SocketAddr> = tokio::net::lookup_host(&addr_str)
            .await
            .map_err(|e| Error::InvalidAddress(format!("{}: {}", addr_str, e)))?
            .collect();

        let addr = addrs
            .first()
            .ok_or_else(|| Error::InvalidAddress(format!("No addresses found for {}", addr_str)))?;

        self.socket_addr = Some(*addr);
        Ok(*addr)
    }

    /// Forward everything read from the bridge to the handler
    async fn read_loop(mut reader: OwnedReadHalf, handler: RawHandler, remote: String) {
        let mut buf = BytesMut::with_capacity(1024);

        loop {
            buf.reserve(1024);

            match reader.read_buf(&mut buf).await {
                Ok(0) => {
                    debug!("Bridge {} closed the connection", remote);
                    break;
                }
                Ok(n) => {
                    trace!("Received {} bytes: {}", n, hex::encode(&buf[..n.min(32)]));
                    handler(buf.split().freeze());
                }
                Err(e) => {
                    warn!("Read error from {}: {}", remote, e);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Err(Error::AlreadyConnected);
        }

        let addr = self.resolve_addr().await?;

        debug!("Connecting to {}...", addr);

        let stream = timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::ConnectionTimeout)?
            .map_err(Error::Io)?;

        // Frames are small and latency-bound
        stream.set_nodelay(true)?;

        debug!("Connected to {}", addr);

        let (reader, writer) = stream.into_split();
        self.reader = Some(reader);
        self.writer = Some(writer);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
        self.reader = None;

        if let Some(mut writer) = self.writer.take() {
            debug!("Disconnecting from {}...", self.remote_addr());

            // Graceful shutdown
            let _ = writer.shutdown().await;
        }

        self.socket_addr = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.writer.is_some()
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(Error::NotConnected)?;

        trace!("Sending {} bytes: {}", data.len(), hex::encode(&data[..data.len().min(32)]));

        writer.write_all(data).await?;
        writer.flush().await?;

        Ok(())
    }

    fn subscribe(&mut self, handler: RawHandler) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }

        let reader = self.reader.take().ok_or(Error::AlreadySubscribed)?;
        let remote = self.remote_addr();

        self.reader_task = Some(tokio::spawn(Self::read_loop(reader, handler, remote)));
        Ok(())
    }

    fn remote_addr(&self) -> String {
        self.socket_addr
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| format!("{}:{}", self.addr, self.port))
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }

        if self.is_connected() {
            warn!("TCP transport dropped while still connected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_tcp_transport_create() {
        let transport = TcpTransport::new("127.0.0.1", 7000);
        assert!(!transport.is_connected());
        assert_eq!(transport.remote_addr(), "127.0.0.1:7000");
    }

    #[tokio::test]
    async fn test_tcp_transport_invalid_address() {
        let mut transport = TcpTransport::new("invalid..address", 7000)
            .with_connect_timeout(Duration::from_millis(100));

        let result = transport.connect().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_tcp_transport_not_connected() {
        let mut transport = TcpTransport::new("127.0.0.1", 7000);

        assert!(matches!(transport.write(b"x").await, Err(Error::NotConnected)));
        assert!(matches!(
            transport.subscribe(Box::new(|_: Bytes| {})),
            Err(Error::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_tcp_transport_roundtrip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let bridge = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 3];
            socket.read_exact(&mut request).await.unwrap();
            socket.write_all(b"ack:").await.unwrap();
            socket.write_all(&request).await.unwrap();
            request
        });

        let mut transport = TcpTransport::new("127.0.0.1", port);
        transport.connect().await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        transport
            .subscribe(Box::new(move |chunk: Bytes| {
                let _ = tx.send(chunk);
            }))
            .unwrap();

        assert!(matches!(
            transport.subscribe(Box::new(|_: Bytes| {})),
            Err(Error::AlreadySubscribed)
        ));

        transport.write(b"OPN").await.unwrap();
        assert_eq!(&bridge.await.unwrap(), b"OPN");

        // The bridge may deliver the reply in any number of chunks
        let mut received = Vec::new();
        while received.len() < 7 {
            received.extend_from_slice(&rx.recv().await.unwrap());
        }
        assert_eq!(received.as_slice(), b"ack:OPN");

        transport.disconnect().await.unwrap();
        assert!(!transport.is_connected());
    }
}
