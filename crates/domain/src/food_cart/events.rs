//! Food cart domain events.

use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

use super::ProductId;

/// Events that can occur on a food cart.
///
/// Serialized as `{"type": ..., "data": ...}`; every payload carries the
/// cart identity so projections can route it without the envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum FoodCartEvent {
    FoodCartCreated(FoodCartCreatedData),
    ProductSelected(ProductSelectedData),
    ProductDeselected(ProductDeselectedData),
    OrderConfirmed(OrderConfirmedData),
}

impl DomainEvent for FoodCartEvent {
    fn event_type(&self) -> &'static str {
        match self {
            FoodCartEvent::FoodCartCreated(_) => "FoodCartCreated",
            FoodCartEvent::ProductSelected(_) => "ProductSelected",
            FoodCartEvent::ProductDeselected(_) => "ProductDeselected",
            FoodCartEvent::OrderConfirmed(_) => "OrderConfirmed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoodCartCreatedData {
    pub food_cart_id: AggregateId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSelectedData {
    pub food_cart_id: AggregateId,
    pub product_id: ProductId,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDeselectedData {
    pub food_cart_id: AggregateId,
    pub product_id: ProductId,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderConfirmedData {
    pub food_cart_id: AggregateId,
}

// Constructors
impl FoodCartEvent {
    pub fn food_cart_created(food_cart_id: AggregateId) -> Self {
        FoodCartEvent::FoodCartCreated(FoodCartCreatedData { food_cart_id })
    }

    pub fn product_selected(food_cart_id: AggregateId, product_id: ProductId, quantity: u32) -> Self {
        FoodCartEvent::ProductSelected(ProductSelectedData {
            food_cart_id,
            product_id,
            quantity,
        })
    }

    pub fn product_deselected(
        food_cart_id: AggregateId,
        product_id: ProductId,
        quantity: u32,
    ) -> Self {
        FoodCartEvent::ProductDeselected(ProductDeselectedData {
            food_cart_id,
            product_id,
            quantity,
        })
    }

    pub fn order_confirmed(food_cart_id: AggregateId) -> Self {
        FoodCartEvent::OrderConfirmed(OrderConfirmedData { food_cart_id })
    }

    /// Returns the cart this event belongs to.
    pub fn food_cart_id(&self) -> &AggregateId {
        match self {
            FoodCartEvent::FoodCartCreated(data) => &data.food_cart_id,
            FoodCartEvent::ProductSelected(data) => &data.food_cart_id,
            FoodCartEvent::ProductDeselected(data) => &data.food_cart_id,
            FoodCartEvent::OrderConfirmed(data) => &data.food_cart_id,
        }
    }
}
