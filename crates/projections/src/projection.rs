//! The contract between the processor and a read model.

use async_trait::async_trait;
use event_store::EventEnvelope;

use crate::Result;

/// Number of events, counted across all streams, a projection has seen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProjectionPosition {
    pub events_processed: u64,
}

impl ProjectionPosition {
    pub fn zero() -> Self {
        Self {
            events_processed: 0,
        }
    }

    /// Advances the position by one event.
    pub fn advance(&self) -> Self {
        Self {
            events_processed: self.events_processed + 1,
        }
    }

    /// Returns true if the event at 1-based `index` in the global log has
    /// not been seen yet.
    pub fn is_behind(&self, index: u64) -> bool {
        self.events_processed < index
    }
}

impl std::fmt::Display for ProjectionPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "position({})", self.events_processed)
    }
}

/// Folds stored events into one read model.
///
/// The processor offers every event in the global log to every projection,
/// so `position` must advance even for events a projection ignores.
/// `handle` may see an event again after a retry and has to tolerate it.
#[async_trait]
pub trait Projection: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, event: &EventEnvelope) -> Result<()>;

    async fn position(&self) -> ProjectionPosition;

    /// Drops all derived state so the projection can be rebuilt.
    async fn reset(&self) -> Result<()>;
}
