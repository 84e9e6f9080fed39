//! Typed publish/subscribe channel for pipeline events
//!
//! A thin wrapper over [`tokio::sync::broadcast`]. Publishing with no
//! subscribers is a silent drop, and a subscription only sees events sent
//! after it was created.

use crate::types::PipelineEvent;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

/// Fan-out of [`PipelineEvent`]s to any number of subscribers
pub struct EventBus<M> {
    tx: broadcast::Sender<PipelineEvent<M>>,
}

impl<M> EventBus<M> {
    /// Create a bus buffering up to `capacity` events per slow subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Start receiving events published from now on
    pub fn subscribe(&self) -> Subscription<M> {
        Subscription {
            rx: self.tx.subscribe(),
        }
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub(crate) fn emit(&self, event: PipelineEvent<M>) {
        // Err only means nobody is listening
        self.tx.send(event).ok();
    }
}

impl<M> Clone for EventBus<M> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

/// One subscriber's view of the bus
pub struct Subscription<M> {
    rx: broadcast::Receiver<PipelineEvent<M>>,
}

impl<M> Subscription<M> {
    /// Wait for the next event; `None` once the bus is gone
    ///
    /// A subscriber that falls more than the bus capacity behind skips the
    /// oldest events and carries on with the rest.
    pub async fn recv(&mut self) -> Option<PipelineEvent<M>> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event subscriber lagged; oldest events dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// The next already-published event, without waiting
    pub fn try_recv(&mut self) -> Option<PipelineEvent<M>> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event subscriber lagged; oldest events dropped");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    /// Stop receiving events
    pub fn unsubscribe(self) {
        drop(self);
    }
}
