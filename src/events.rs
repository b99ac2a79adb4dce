//! Best-effort event fan-out with RAII subscriptions
//!
//! Producers never block: a subscriber that falls behind loses the oldest
//! events, and emitting with no subscribers is a no-op. Dropping a
//! [`Subscription`] unsubscribes it.

use std::time::Duration;

use tokio::sync::broadcast;
use tracing::trace;

/// Default number of buffered events per subscriber
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Broadcast channel for one family of events
#[derive(Debug)]
pub struct EventBus<E: Clone> {
    tx: broadcast::Sender<E>,
}

impl<E: Clone + Send + 'static> EventBus<E> {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event. Returns the number of subscribers it reached.
    pub fn emit(&self, event: E) -> usize {
        match self.tx.send(event) {
            Ok(n) => n,
            Err(_) => {
                trace!("event dropped: no subscribers");
                0
            }
        }
    }

    /// Open a new subscription; it sees events emitted after this call
    pub fn subscribe(&self) -> Subscription<E> {
        Subscription {
            rx: self.tx.subscribe(),
            lagged: 0,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl<E: Clone + Send + 'static> Default for EventBus<E> {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

/// Handle returned by [`EventBus::subscribe`]
#[derive(Debug)]
pub struct Subscription<E: Clone> {
    rx: broadcast::Receiver<E>,
    lagged: u64,
}

impl<E: Clone + Send + 'static> Subscription<E> {
    /// Wait for the next event. `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<E> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    self.lagged += n;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Wait for the next event for at most `timeout`
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Option<E> {
        tokio::time::timeout(timeout, self.recv()).await.ok().flatten()
    }

    /// Non-blocking poll
    pub fn try_recv(&mut self) -> Option<E> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    self.lagged += n;
                }
                Err(_) => return None,
            }
        }
    }

    /// Events this subscriber missed because it fell behind
    pub fn lagged(&self) -> u64 {
        self.lagged
    }
}
