//! Fan-out of committed events to in-process subscribers.

use std::sync::Arc;

use event_store::EventEnvelope;
use tokio::sync::{RwLock, mpsc};

/// Delivers committed envelopes to every live subscriber.
///
/// Each subscriber owns an unbounded channel, so a slow consumer never
/// causes events to be dropped and never blocks the publishing command.
/// Subscribers whose receiver was dropped are pruned on the next publish.
#[derive(Clone, Default)]
pub struct EventPublisher {
    subscribers: Arc<RwLock<Vec<mpsc::UnboundedSender<EventEnvelope>>>>,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new subscriber.
    ///
    /// The receiver only sees events published after this call.
    pub async fn subscribe(&self) -> mpsc::UnboundedReceiver<EventEnvelope> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.write().await.push(tx);
        rx
    }

    /// Sends `envelopes`, in order, to every subscriber.
    ///
    /// Returns the number of subscribers that received them.
    pub async fn publish(&self, envelopes: &[EventEnvelope]) -> usize {
        if envelopes.is_empty() {
            return 0;
        }

        let mut subscribers = self.subscribers.write().await;
        subscribers.retain(|tx| {
            envelopes
                .iter()
                .all(|envelope| tx.send(envelope.clone()).is_ok())
        });

        metrics::counter!("events_published_total").increment(envelopes.len() as u64);
        tracing::debug!(
            events = envelopes.len(),
            subscribers = subscribers.len(),
            "events published"
        );
        subscribers.len()
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }
}
