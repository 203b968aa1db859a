//! Session with a connected peripheral

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, trace, warn};

use mpos_core::{
    constants::DEFAULT_TIMEOUT,
    frame,
    ChecksumPolicy, CommandCode, CommandFrame, RawFrame, ResponseRecord, StreamReassembler,
};
use mpos_transport::{TcpTransport, Transport};

use crate::dispatcher::{self, Subscribers};
use crate::error::{Error, Result};

/// mPOS peripheral session
///
/// Owns the transport, the reply queue and the subscriber list for one
/// connection. At most one command is in flight: [`Device::invoke`] holds the
/// call lock from encode through the reply.
///
/// # Examples
///
/// ```no_run
/// use mpos::{CommandCode, Device};
///
/// #[tokio::main]
/// async fn main() -> mpos::Result<()> {
///     let device = Device::new("192.168.1.50", 7000);
///
///     device.connect().await?;
///
///     let reply = device.invoke(CommandCode::OPEN, Vec::new()).await?;
///     println!("{}", reply);
///
///     device.disconnect().await?;
///     Ok(())
/// }
/// ```
pub struct Device {
    call: Mutex<Link>,
    subscribers: Subscribers,
    /// Liveness flag of the current connection, cleared when its raw stream ends
    alive: parking_lot::Mutex<Arc<AtomicBool>>,
    timeout: Duration,
    checksum_policy: ChecksumPolicy,
    workers: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

/// State guarded by the call lock
struct Link {
    transport: Box<dyn Transport>,
    raw: Option<mpsc::WeakUnboundedSender<RawEvent>>,
    responses: Option<mpsc::UnboundedReceiver<ResponseRecord>>,
}

/// Input of the receive loop
enum RawEvent {
    Chunk(Bytes),
    /// Acknowledged once every earlier chunk has been routed
    Flush(oneshot::Sender<()>),
}

impl Device {
    /// Create a new device instance reached through a TCP bridge
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self::with_transport(Box::new(TcpTransport::new(ip, port)))
    }

    /// Create a new device instance over any transport
    pub fn with_transport(transport: Box<dyn Transport>) -> Self {
        Self {
            call: Mutex::new(Link {
                transport,
                raw: None,
                responses: None,
            }),
            subscribers: Subscribers::new(),
            alive: parking_lot::Mutex::new(Arc::new(AtomicBool::new(false))),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT),
            checksum_policy: ChecksumPolicy::default(),
            workers: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Set command timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set how received checksums are treated
    pub fn with_checksum_policy(mut self, policy: ChecksumPolicy) -> Self {
        self.checksum_policy = policy;
        self
    }

    /// Check if connected
    ///
    /// Never waits for an in-flight command.
    pub fn is_connected(&self) -> bool {
        self.alive.lock().load(Ordering::Acquire)
    }

    /// Connect to device
    ///
    /// Opens the transport, subscribes to its raw data and starts the
    /// reassembler and notification workers.
    pub async fn connect(&self) -> Result<()> {
        let mut guard = self.call.lock().await;
        let link = &mut *guard;

        info!("Connecting to {}...", link.transport.remote_addr());

        link.transport.connect().await?;

        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let (response_tx, response_rx) = mpsc::unbounded_channel();
        let (notification_tx, notification_rx) = mpsc::unbounded_channel();

        // The transport handler holds the only strong sender, so the receive
        // loop ends when the transport lets go of it
        let flush = raw_tx.downgrade();
        link.transport.subscribe(Box::new(move |chunk: Bytes| {
            // Receiver gone means the session is shutting down
            let _ = raw_tx.send(RawEvent::Chunk(chunk));
        }))?;

        link.raw = Some(flush);
        link.responses = Some(response_rx);

        let alive = Arc::new(AtomicBool::new(true));
        *self.alive.lock() = alive.clone();

        let mut workers = self.workers.lock();
        workers.push(tokio::spawn(receive_loop(
            raw_rx,
            response_tx,
            notification_tx,
            self.checksum_policy,
            alive,
        )));
        workers.push(dispatcher::spawn(self.subscribers.clone(), notification_rx));

        info!("Connected to {}", link.transport.remote_addr());
        Ok(())
    }

    /// Disconnect from device
    ///
    /// Waits for an in-flight command to finish first. Calling it on a
    /// disconnected session does nothing.
    pub async fn disconnect(&self) -> Result<()> {
        let mut guard = self.call.lock().await;
        let link = &mut *guard;

        if link.responses.take().is_none() {
            return Ok(());
        }
        link.raw = None;
        self.alive.lock().store(false, Ordering::Release);

        info!("Disconnecting from {}...", link.transport.remote_addr());

        let result = link.transport.disconnect().await;

        for worker in self.workers.lock().drain(..) {
            worker.abort();
        }

        result?;
        info!("Disconnected");
        Ok(())
    }

    /// Register a notification subscriber
    ///
    /// May be called at any time, including while notifications are being
    /// dispatched. Subscribers are called in registration order.
    pub fn subscribe<F>(&self, handler: F)
    where
        F: Fn(&ResponseRecord) + Send + Sync + 'static,
    {
        let count = self.subscribers.subscribe(handler);
        debug!("Notification subscriber registered ({} total)", count);
    }

    /// Send a command and wait for its reply
    ///
    /// Replies that reached the session before the command is written belong
    /// to earlier calls and are discarded.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] if no reply arrives before the deadline
    /// - [`Error::NegativeAcknowledgment`] if the device answers with NAK
    /// - [`Error::ConnectionClosed`] if the receive path ends first
    /// - [`Error::Core`] with `ParameterTooLong` before anything is sent
    pub async fn invoke(&self, command: CommandCode, parameters: Vec<Bytes>) -> Result<ResponseRecord> {
        let encoded = CommandFrame::with_parameters(command, parameters).encode()?;

        let mut guard = self.call.lock().await;
        let link = &mut *guard;
        let responses = link.responses.as_mut().ok_or(Error::NotConnected)?;

        // Route whatever the transport already delivered before draining
        if let Some(raw) = link.raw.as_ref().and_then(|weak| weak.upgrade()) {
            let (done_tx, done_rx) = oneshot::channel();
            if raw.send(RawEvent::Flush(done_tx)).is_ok() {
                let _ = done_rx.await;
            }
        }

        while let Ok(stale) = responses.try_recv() {
            warn!("Discarding stale reply {} before {}", stale, command);
        }

        debug!("Invoking {} ({} bytes)", command, encoded.len());
        trace!("Sending: {}", hex::encode(&encoded));

        link.transport.write(&encoded).await?;

        let deadline = Instant::now() + self.timeout;

        loop {
            let record = match timeout_at(deadline, responses.recv()).await {
                Ok(Some(record)) => record,
                Ok(None) => return Err(Error::ConnectionClosed),
                Err(_) => {
                    warn!("{} timed out after {:?}", command, self.timeout);
                    return Err(Error::Timeout {
                        seconds: self.timeout.as_secs(),
                    });
                }
            };

            if !record.acknowledged {
                return Err(Error::NegativeAcknowledgment { command });
            }

            if record.command != Some(command) {
                warn!("Discarding reply {} while waiting for {}", record, command);
                continue;
            }

            debug!("Received: {}", record);
            return Ok(record);
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        for worker in self.workers.get_mut().drain(..) {
            worker.abort();
        }
    }
}

/// Reassemble raw chunks and route the frames
///
/// Sole owner of the reassembler state. Ends when the transport drops its
/// handler, which closes the reply queue.
async fn receive_loop(
    mut raw: mpsc::UnboundedReceiver<RawEvent>,
    responses: mpsc::UnboundedSender<ResponseRecord>,
    notifications: mpsc::UnboundedSender<ResponseRecord>,
    checksum_policy: ChecksumPolicy,
    alive: Arc<AtomicBool>,
) {
    let mut reassembler = StreamReassembler::new();

    'events: while let Some(event) = raw.recv().await {
        let chunk = match event {
            RawEvent::Chunk(chunk) => chunk,
            RawEvent::Flush(done) => {
                let _ = done.send(());
                continue;
            }
        };

        for raw_frame in reassembler.feed(&chunk) {
            let Some(record) = route(raw_frame, checksum_policy) else {
                continue;
            };

            let queue = if record.is_notification() {
                &notifications
            } else {
                &responses
            };

            if queue.send(record).is_err() {
                debug!("Session gone, stopping receive loop");
                break 'events;
            }
        }
    }

    alive.store(false, Ordering::Release);
    debug!("Raw stream ended");
}

/// Decode a reassembled frame, applying the checksum policy
fn route(raw_frame: RawFrame, checksum_policy: ChecksumPolicy) -> Option<ResponseRecord> {
    let bytes = match raw_frame {
        RawFrame::NegativeAck(bytes) => {
            trace!("Received NAK: {}", hex::encode(&bytes));
            return Some(ResponseRecord::negative());
        }
        RawFrame::Complete(bytes) => bytes,
    };

    trace!("Received: {}", hex::encode(&bytes));

    let record = match ResponseRecord::try_decode(&bytes) {
        Ok(record) => record,
        Err(e) => {
            warn!("Dropping malformed frame: {}", e);
            return None;
        }
    };

    if checksum_policy != ChecksumPolicy::Ignore {
        if let Err(e) = frame::verify_trailer(&bytes) {
            warn!("{} failed verification: {}", record, e);

            if checksum_policy == ChecksumPolicy::Enforce {
                return None;
            }
        }
    }

    Some(record)
}
