//! Food cart view: selected quantity per product, keyed by cart.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use common::AggregateId;
use domain::{FoodCart, FoodCartEvent, ProductId};
use event_store::{EventEnvelope, Version};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::Result;
use crate::projection::{Projection, ProjectionPosition};
use crate::read_model::{ReadModelStore, View};

/// Query-side row for one food cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoodCartView {
    pub food_cart_id: AggregateId,

    pub products: BTreeMap<ProductId, u32>,

    /// Stream version of the last event folded into this row.
    pub version: Version,
}

impl FoodCartView {
    pub fn new(food_cart_id: AggregateId) -> Self {
        Self {
            food_cart_id,
            products: BTreeMap::new(),
            version: Version::first(),
        }
    }

    pub fn quantity(&self, product_id: &ProductId) -> Option<u32> {
        self.products.get(product_id).copied()
    }
}

impl View for FoodCartView {
    fn view_id(&self) -> &AggregateId {
        &self.food_cart_id
    }
}

/// Projects food cart events into [`FoodCartView`] rows.
///
/// Events for a cart whose row doesn't exist are dropped; a rebuild from
/// the event store reconciles them. Events at or below the row's version
/// were already applied and are skipped, so redelivery is harmless.
#[derive(Clone)]
pub struct FoodCartProjector<R> {
    store: R,
    position: Arc<RwLock<ProjectionPosition>>,
    gaps: Arc<AtomicU64>,
}

impl<R> FoodCartProjector<R>
where
    R: ReadModelStore<FoodCartView>,
{
    pub fn new(store: R) -> Self {
        Self {
            store,
            position: Arc::new(RwLock::new(ProjectionPosition::zero())),
            gaps: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn store(&self) -> &R {
        &self.store
    }

    /// Number of events folded into a row whose previous version was
    /// missing. Non-zero means the view needs a rebuild.
    pub fn gaps_detected(&self) -> u64 {
        self.gaps.load(Ordering::Relaxed)
    }

    async fn project(&self, event: FoodCartEvent, version: Version) {
        let gaps = Arc::clone(&self.gaps);
        match event {
            FoodCartEvent::FoodCartCreated(data) => {
                if self.store.get(&data.food_cart_id).await.is_some() {
                    tracing::debug!(food_cart_id = %data.food_cart_id, "view already exists, skipping");
                    return;
                }
                self.store.put(FoodCartView::new(data.food_cart_id)).await;
            }
            FoodCartEvent::ProductSelected(data) => {
                let food_cart_id = data.food_cart_id.clone();
                let found = self
                    .store
                    .update(&food_cart_id, move |view| {
                        if version <= view.version {
                            return;
                        }
                        note_gap(view, version, &gaps);
                        let selected = view.products.entry(data.product_id).or_insert(0);
                        *selected = selected.saturating_add(data.quantity);
                        view.version = version;
                    })
                    .await;
                if !found {
                    tracing::debug!(%food_cart_id, %version, "no view for ProductSelected, dropping");
                }
            }
            FoodCartEvent::ProductDeselected(data) => {
                let food_cart_id = data.food_cart_id.clone();
                let found = self
                    .store
                    .update(&food_cart_id, move |view| {
                        if version <= view.version {
                            return;
                        }
                        note_gap(view, version, &gaps);
                        if let Some(selected) = view.products.get_mut(&data.product_id) {
                            if *selected < data.quantity {
                                tracing::warn!(
                                    food_cart_id = %data.food_cart_id,
                                    product_id = %data.product_id,
                                    selected = *selected,
                                    requested = data.quantity,
                                    "deselection exceeds projected quantity, clamping to zero"
                                );
                            }
                            *selected = selected.saturating_sub(data.quantity);
                        }
                        view.version = version;
                    })
                    .await;
                if !found {
                    tracing::debug!(%food_cart_id, %version, "no view for ProductDeselected, dropping");
                }
            }
            FoodCartEvent::OrderConfirmed(data) => {
                self.store
                    .update(&data.food_cart_id, move |view| {
                        if version > view.version {
                            note_gap(view, version, &gaps);
                            view.version = version;
                        }
                    })
                    .await;
            }
        }
    }
}

/// Counts and reports an event that doesn't directly follow the row.
fn note_gap(view: &FoodCartView, version: Version, gaps: &AtomicU64) {
    let expected = view.version.next();
    if version != expected {
        gaps.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("projection_version_gaps_total").increment(1);
        tracing::warn!(
            food_cart_id = %view.food_cart_id,
            %expected,
            %version,
            "food cart view missed an event, rebuild to reconcile"
        );
    }
}

#[async_trait]
impl<R> Projection for FoodCartProjector<R>
where
    R: ReadModelStore<FoodCartView>,
{
    fn name(&self) -> &'static str {
        "FoodCartProjector"
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        if event.aggregate_type == FoodCart::AGGREGATE_TYPE {
            let food_cart_event: FoodCartEvent = event.decode()?;
            self.project(food_cart_event, event.version).await;
        }

        let mut pos = self.position.write().await;
        *pos = pos.advance();
        Ok(())
    }

    async fn position(&self) -> ProjectionPosition {
        *self.position.read().await
    }

    async fn reset(&self) -> Result<()> {
        self.store.clear().await;
        *self.position.write().await = ProjectionPosition::zero();
        self.gaps.store(0, Ordering::Relaxed);
        Ok(())
    }
}
