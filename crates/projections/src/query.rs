//! Read-only queries against the food cart view.

use common::AggregateId;

use crate::read_model::ReadModelStore;
use crate::views::FoodCartView;

/// Looks up the view of one cart.
#[derive(Debug, Clone)]
pub struct FindFoodCart {
    pub food_cart_id: AggregateId,
}

impl FindFoodCart {
    pub fn new(food_cart_id: impl Into<AggregateId>) -> Self {
        Self {
            food_cart_id: food_cart_id.into(),
        }
    }
}

/// Answers food cart queries from the read model alone.
///
/// Never consults the event store, so a cart committed moments ago may
/// not be visible yet.
#[derive(Clone)]
pub struct FoodCartQueryHandler<R> {
    store: R,
}

impl<R> FoodCartQueryHandler<R>
where
    R: ReadModelStore<FoodCartView>,
{
    pub fn new(store: R) -> Self {
        Self { store }
    }

    /// Returns the cart's view, or None if it hasn't been projected.
    #[tracing::instrument(skip(self))]
    pub async fn find(&self, query: &FindFoodCart) -> Option<FoodCartView> {
        self.store.get(&query.food_cart_id).await
    }
}
