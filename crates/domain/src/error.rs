//! Domain error types.

use common::AggregateId;
use event_store::{EventStoreError, Version};
use thiserror::Error;

use crate::food_cart::FoodCartError;

/// Typed failures of command handling.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The event store failed; carries `ConcurrencyConflict` once the
    /// dispatcher has run out of retries.
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    /// The food cart rejected the command.
    #[error("Food cart error: {0}")]
    FoodCart(FoodCartError),

    /// A non-creating command targeted an identity with no events.
    #[error("Aggregate not found: {aggregate_type} with id {aggregate_id}")]
    AggregateNotFound {
        aggregate_type: &'static str,
        aggregate_id: AggregateId,
    },

    /// A creating command targeted an identity that already has events.
    #[error("Aggregate already exists: {aggregate_type} with id {aggregate_id}")]
    DuplicateCreation {
        aggregate_type: &'static str,
        aggregate_id: AggregateId,
    },

    /// Replaying stored history violated an aggregate invariant.
    #[error("Corrupted event stream for {aggregate_id} at version {version}: {reason}")]
    CorruptedStream {
        aggregate_id: AggregateId,
        version: Version,
        reason: String,
    },

    /// The command did not finish within the configured timeout.
    #[error("Command against {aggregate_id} timed out after {timeout_ms}ms")]
    Timeout {
        aggregate_id: AggregateId,
        timeout_ms: u128,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, DomainError::EventStore(e) if e.is_concurrency_conflict())
    }

    /// Returns true for business-rule rejections of a deselection.
    pub fn is_deselection_error(&self) -> bool {
        matches!(self, DomainError::FoodCart(e) if e.is_deselection_error())
    }
}
