//! Command contract and command outcome.

use common::AggregateId;
use event_store::{EventEnvelope, Version};

use crate::aggregate::Aggregate;

/// An intention to change one aggregate.
///
/// Commands may be rejected if the aggregate's current state doesn't allow
/// the action.
pub trait Command: std::fmt::Debug + Send + Sync {
    /// Identity of the aggregate this command targets.
    fn aggregate_id(&self) -> &AggregateId;

    /// Command name used in logs and metrics.
    fn command_type(&self) -> &'static str;
}

/// Outcome of a successfully handled command.
#[derive(Debug)]
pub struct CommandResult<A: Aggregate> {
    /// The aggregate after applying the new events.
    pub aggregate: A,

    /// Domain events produced by the command. Empty for no-op commands.
    pub events: Vec<A::Event>,

    /// The committed envelopes, in stream order.
    pub envelopes: Vec<EventEnvelope>,

    /// Stream version after the commit.
    pub new_version: Version,
}

impl<A: Aggregate> CommandResult<A> {
    /// Returns true when the command was accepted without emitting events.
    pub fn is_noop(&self) -> bool {
        self.events.is_empty()
    }
}
