//! Notification fan-out
//!
//! Notifications are delivered by one sequential worker, in arrival order,
//! to every subscriber in registration order. Subscribers run on the blocking
//! pool one notification at a time, so a slow one delays later notifications
//! but never the receive path or command replies.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use mpos_core::ResponseRecord;

/// Notification callback
pub type Subscriber = Arc<dyn Fn(&ResponseRecord) + Send + Sync + 'static>;

/// Ordered subscriber list shared by the session and its dispatcher
#[derive(Clone, Default)]
pub struct Subscribers {
    inner: Arc<RwLock<Vec<Subscriber>>>,
}

impl Subscribers {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber, returning how many are now registered
    pub fn subscribe<F>(&self, handler: F) -> usize
    where
        F: Fn(&ResponseRecord) + Send + Sync + 'static,
    {
        let mut list = self.inner.write();
        list.push(Arc::new(handler));
        list.len()
    }

    /// Number of registered subscribers
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Check if nobody is subscribed
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Deliver one notification to every subscriber
    ///
    /// Iterates a snapshot so subscribers may register others while being
    /// called; those only see later notifications.
    pub fn notify(&self, notification: &ResponseRecord) {
        let snapshot: Vec<Subscriber> = self.inner.read().clone();

        trace!("Dispatching {} to {} subscribers", notification, snapshot.len());

        for subscriber in &snapshot {
            subscriber(notification);
        }
    }
}

/// Spawn the dispatcher worker
///
/// Runs until every sender of `notifications` is dropped. A panicking
/// subscriber loses the rest of that notification's fan-out only.
pub fn spawn(
    subscribers: Subscribers,
    mut notifications: mpsc::UnboundedReceiver<ResponseRecord>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(notification) = notifications.recv().await {
            let subscribers = subscribers.clone();
            let delivery =
                tokio::task::spawn_blocking(move || subscribers.notify(&notification)).await;

            if let Err(e) = delivery {
                warn!("Notification subscriber failed: {}", e);
            }
        }

        debug!("Notification dispatcher stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use mpos_core::{CommandCode, ResponseCode};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    fn notification(text: &'static str) -> ResponseRecord {
        ResponseRecord {
            acknowledged: true,
            command: Some(CommandCode::NOTIFICATION),
            response_code: Some(ResponseCode::SUCCESS),
            parameters: vec![Bytes::from_static(text.as_bytes())],
        }
    }

    #[test]
    fn test_registration_order() {
        let subscribers = Subscribers::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for id in 0..3 {
            let log = log.clone();
            subscribers.subscribe(move |n: &ResponseRecord| {
                log.lock().push((id, n.parameter_str(0).unwrap()));
            });
        }

        subscribers.notify(&notification("SELECTED"));

        assert_eq!(
            log.lock().clone(),
            vec![
                (0, "SELECTED".to_string()),
                (1, "SELECTED".to_string()),
                (2, "SELECTED".to_string()),
            ]
        );
    }

    #[test]
    fn test_subscribe_during_dispatch() {
        let subscribers = Subscribers::new();
        let calls = Arc::new(Mutex::new(0));

        let registry = subscribers.clone();
        let counter = calls.clone();
        subscribers.subscribe(move |_: &ResponseRecord| {
            let counter = counter.clone();
            registry.subscribe(move |_: &ResponseRecord| *counter.lock() += 1);
        });

        subscribers.notify(&notification("first"));
        assert_eq!(*calls.lock(), 0);
        assert_eq!(subscribers.len(), 2);

        subscribers.notify(&notification("second"));
        assert_eq!(*calls.lock(), 1);
    }

    #[tokio::test]
    async fn test_worker_preserves_order() {
        let subscribers = Subscribers::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        subscribers.subscribe(move |n: &ResponseRecord| sink.lock().push(n.parameter_str(0).unwrap()));

        let worker = spawn(subscribers, rx);
        for text in ["one", "two", "three"] {
            tx.send(notification(text)).unwrap();
        }
        drop(tx);
        worker.await.unwrap();

        assert_eq!(seen.lock().clone(), vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_worker_survives_panicking_subscriber() {
        let subscribers = Subscribers::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let seen = Arc::new(Mutex::new(Vec::new()));

        subscribers.subscribe(|n: &ResponseRecord| {
            if n.parameter_str(0).as_deref() == Some("bad") {
                panic!("subscriber failure");
            }
        });
        let sink = seen.clone();
        subscribers.subscribe(move |n: &ResponseRecord| sink.lock().push(n.parameter_str(0).unwrap()));

        let worker = spawn(subscribers, rx);
        for text in ["bad", "good"] {
            tx.send(notification(text)).unwrap();
        }
        drop(tx);
        worker.await.unwrap();

        assert_eq!(seen.lock().clone(), vec!["good"]);
    }
}
