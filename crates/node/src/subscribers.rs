//! Notification fan-out.

use lottery_core::Notification;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

/// Registered notification subscribers.
///
/// Every subscriber owns an unbounded queue, so a slow reader only delays
/// itself and never loses a notification. Queues whose receiver was dropped
/// are pruned on the next publish.
#[derive(Clone)]
pub(crate) struct Subscribers {
    /// `None` once closed.
    queues: Arc<Mutex<Option<Vec<mpsc::UnboundedSender<Notification>>>>>,
}

impl Subscribers {
    pub(crate) fn new() -> Self {
        Self {
            queues: Arc::new(Mutex::new(Some(Vec::new()))),
        }
    }

    /// Register a subscriber for notifications published from now on.
    ///
    /// After [`close`](Self::close) the returned stream is already ended.
    pub(crate) fn subscribe(&self) -> mpsc::UnboundedReceiver<Notification> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(queues) = self.queues.lock().as_mut() {
            queues.push(tx);
        }
        rx
    }

    /// End every subscriber's stream.
    pub(crate) fn close(&self) {
        self.queues.lock().take();
    }

    /// Queue `notification` for every live subscriber.
    pub(crate) fn publish(&self, notification: &Notification) {
        let mut guard = self.queues.lock();
        let Some(queues) = guard.as_mut() else {
            return;
        };
        queues.retain(|queue| queue.send(notification.clone()).is_ok());
        trace!(
            notification = notification.type_name(),
            subscribers = queues.len(),
            "Published notification"
        );
    }
}
