//! Keyed storage for query-side views.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::AggregateId;
use tokio::sync::RwLock;

/// A denormalized row stored in a [`ReadModelStore`].
pub trait View: Clone + Send + Sync + 'static {
    /// Identity the row is keyed by.
    fn view_id(&self) -> &AggregateId;
}

/// Storage for one kind of view, keyed by aggregate identity.
///
/// Each operation is a single logical step; readers never observe a
/// half-applied update.
#[async_trait]
pub trait ReadModelStore<V: View>: Send + Sync {
    async fn get(&self, id: &AggregateId) -> Option<V>;

    /// Inserts or replaces the row keyed by `view.view_id()`.
    async fn put(&self, view: V);

    /// Mutates the row in place.
    ///
    /// Returns false, without calling `mutator`, when no row exists.
    async fn update<F>(&self, id: &AggregateId, mutator: F) -> bool
    where
        F: FnOnce(&mut V) + Send + 'static;

    /// Returns the number of rows.
    async fn count(&self) -> usize;

    /// Removes every row.
    async fn clear(&self);
}

/// In-memory [`ReadModelStore`].
///
/// Clones share the same rows, so the projector and the query handler can
/// each hold one.
#[derive(Clone)]
pub struct InMemoryReadModelStore<V> {
    rows: Arc<RwLock<HashMap<AggregateId, V>>>,
}

impl<V> InMemoryReadModelStore<V> {
    pub fn new() -> Self {
        Self {
            rows: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<V> Default for InMemoryReadModelStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<V: View> ReadModelStore<V> for InMemoryReadModelStore<V> {
    async fn get(&self, id: &AggregateId) -> Option<V> {
        self.rows.read().await.get(id).cloned()
    }

    async fn put(&self, view: V) {
        self.rows
            .write()
            .await
            .insert(view.view_id().clone(), view);
    }

    async fn update<F>(&self, id: &AggregateId, mutator: F) -> bool
    where
        F: FnOnce(&mut V) + Send + 'static,
    {
        match self.rows.write().await.get_mut(id) {
            Some(view) => {
                mutator(view);
                true
            }
            None => false,
        }
    }

    async fn count(&self) -> usize {
        self.rows.read().await.len()
    }

    async fn clear(&self) {
        self.rows.write().await.clear();
    }
}
