//! Read-side failures.

use event_store::{EventId, EventStoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("failed to read events: {0}")]
    EventStore(#[from] EventStoreError),

    /// A payload did not decode as the event its envelope names.
    #[error("malformed event payload: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// A projection rejected a single event.
    #[error("{projection} failed: {reason}")]
    Handler {
        projection: &'static str,
        reason: String,
    },

    /// Projections that still failed after every retry.
    #[error("event {event_id} not applied by {}", .projections.join(", "))]
    Undelivered {
        event_id: EventId,
        projections: Vec<&'static str>,
    },
}

pub type Result<T> = std::result::Result<T, ProjectionError>;
