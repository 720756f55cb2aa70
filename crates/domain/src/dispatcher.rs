//! Command dispatch: per-identity serialization, retries and timeouts.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use common::AggregateId;
use event_store::EventStore;
use tokio::sync::OwnedMutexGuard;

use crate::aggregate::Aggregate;
use crate::command::{Command, CommandResult};
use crate::error::DomainError;
use crate::publisher::EventPublisher;
use crate::repository::AggregateRepository;

/// Tuning knobs for [`CommandDispatcher`].
#[derive(Debug, Clone, Copy)]
pub struct DispatcherConfig {
    /// Extra attempts after a concurrency conflict.
    pub max_retries: u32,

    /// Deadline for acquiring the identity lock and deciding the command.
    /// The append itself is not bounded by it.
    pub command_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            command_timeout: Duration::from_secs(5),
        }
    }
}

impl DispatcherConfig {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_command_timeout(mut self, command_timeout: Duration) -> Self {
        self.command_timeout = command_timeout;
        self
    }
}

type LockTable = Arc<Mutex<HashMap<AggregateId, Arc<tokio::sync::Mutex<()>>>>>;

/// Exclusive access to one aggregate identity.
///
/// Dropping the guard releases the identity and removes its table entry
/// once nobody else is waiting on it.
struct IdentityGuard {
    guard: Option<OwnedMutexGuard<()>>,
    table: LockTable,
    aggregate_id: AggregateId,
}

impl Drop for IdentityGuard {
    fn drop(&mut self) {
        self.guard.take();

        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        if table
            .get(&self.aggregate_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            table.remove(&self.aggregate_id);
        }
    }
}

/// Routes commands to their aggregate.
///
/// For each command the dispatcher:
/// 1. Takes the lock of the target identity, so commands against the same
///    cart run one at a time while different carts proceed in parallel
/// 2. Loads, handles and commits through the [`AggregateRepository`],
///    reloading and retrying up to `max_retries` times on a version conflict
/// 3. Publishes the committed envelopes before releasing the lock, so
///    subscribers observe each stream in commit order
///
/// `command_timeout` bounds waiting for the lock plus loading and handling.
/// An append that has started is never cut short, so a command that times
/// out has stored nothing.
pub struct CommandDispatcher<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    repository: AggregateRepository<S, A>,
    publisher: EventPublisher,
    config: DispatcherConfig,
    locks: LockTable,
}

impl<S, A> CommandDispatcher<S, A>
where
    S: EventStore,
    A: Aggregate,
    DomainError: From<A::Error>,
{
    pub fn new(store: S, publisher: EventPublisher) -> Self {
        Self::with_config(store, publisher, DispatcherConfig::default())
    }

    pub fn with_config(store: S, publisher: EventPublisher, config: DispatcherConfig) -> Self {
        Self {
            repository: AggregateRepository::new(store),
            publisher,
            config,
            locks: LockTable::default(),
        }
    }

    pub fn repository(&self) -> &AggregateRepository<S, A> {
        &self.repository
    }

    pub fn publisher(&self) -> &EventPublisher {
        &self.publisher
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Number of identities currently locked or awaited.
    pub fn active_locks(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Handles a command against its aggregate and publishes the outcome.
    ///
    /// On success every produced event is durably stored and has been
    /// handed to the publisher. On failure nothing was stored.
    #[tracing::instrument(
        skip(self, command),
        fields(command = command.command_type(), aggregate_id = %command.aggregate_id())
    )]
    pub async fn dispatch(&self, command: A::Command) -> Result<CommandResult<A>, DomainError> {
        let command_type = command.command_type();
        let aggregate_id = command.aggregate_id().clone();
        let started = Instant::now();
        metrics::counter!("commands_dispatched_total", "command" => command_type).increment(1);

        let deadline = tokio::time::Instant::now() + self.config.command_timeout;
        let result = match tokio::time::timeout_at(deadline, self.lock(&aggregate_id)).await {
            Ok(_guard) => {
                let result = self.execute_with_retry(&command, deadline).await;
                if let Ok(outcome) = &result {
                    self.publisher.publish(&outcome.envelopes).await;
                }
                result
            }
            Err(_) => Err(self.timeout_error(&aggregate_id)),
        };

        metrics::histogram!("command_duration_seconds", "command" => command_type)
            .record(started.elapsed().as_secs_f64());

        match &result {
            Ok(outcome) => tracing::info!(
                events = outcome.events.len(),
                version = %outcome.new_version,
                "command handled"
            ),
            Err(e) => {
                metrics::counter!("commands_rejected_total", "command" => command_type)
                    .increment(1);
                tracing::warn!(error = %e, "command rejected");
            }
        }

        result
    }

    /// Runs the command until it commits, is rejected, or runs out of
    /// retries.
    ///
    /// Only loading and handling race the deadline. Once an append has
    /// been issued it runs to completion, so a durable commit is always
    /// reported and published.
    async fn execute_with_retry(
        &self,
        command: &A::Command,
        deadline: tokio::time::Instant,
    ) -> Result<CommandResult<A>, DomainError> {
        let mut retries = 0;
        loop {
            let decision = tokio::time::timeout_at(deadline, self.repository.decide(command))
                .await
                .map_err(|_| self.timeout_error(command.aggregate_id()))??;

            match self.repository.complete(decision).await {
                Err(e) if e.is_concurrency_conflict() && retries < self.config.max_retries => {
                    retries += 1;
                    metrics::counter!("command_conflicts_total").increment(1);
                    tracing::debug!(retries, "concurrency conflict, reloading aggregate");
                }
                result => return result,
            }
        }
    }

    fn timeout_error(&self, aggregate_id: &AggregateId) -> DomainError {
        DomainError::Timeout {
            aggregate_id: aggregate_id.clone(),
            timeout_ms: self.config.command_timeout.as_millis(),
        }
    }

    async fn lock(&self, aggregate_id: &AggregateId) -> IdentityGuard {
        let lock = self
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(aggregate_id.clone())
            .or_default()
            .clone();

        IdentityGuard {
            guard: Some(lock.lock_owned().await),
            table: Arc::clone(&self.locks),
            aggregate_id: aggregate_id.clone(),
        }
    }
}
