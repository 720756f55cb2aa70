//! Food cart aggregate and related types.

mod aggregate;
mod commands;
mod events;
mod value_objects;

pub use aggregate::FoodCart;
pub use commands::{
    ConfirmOrder, CreateFoodCart, DeselectProduct, FoodCartCommand, SelectProduct,
};
pub use events::{
    FoodCartCreatedData, FoodCartEvent, OrderConfirmedData, ProductDeselectedData,
    ProductSelectedData,
};
pub use value_objects::ProductId;

use common::AggregateId;
use thiserror::Error;

use crate::error::DomainError;

/// Business-rule violations of the food cart.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FoodCartError {
    #[error("Food cart {food_cart_id} already exists")]
    AlreadyCreated { food_cart_id: AggregateId },

    #[error("Food cart {food_cart_id} does not exist")]
    NotCreated { food_cart_id: AggregateId },

    /// Deselecting a product that was never selected.
    #[error("Cannot deselect {product_id}: product was not selected")]
    ProductNotSelected { product_id: ProductId },

    /// Deselecting more than is currently selected.
    #[error("Cannot deselect {requested} of {product_id}: only {selected} selected")]
    InsufficientQuantity {
        product_id: ProductId,
        selected: u32,
        requested: u32,
    },

    #[error("Selecting {requested} more of {product_id} overflows the selected quantity {selected}")]
    QuantityOverflow {
        product_id: ProductId,
        selected: u32,
        requested: u32,
    },
}

impl FoodCartError {
    pub fn is_deselection_error(&self) -> bool {
        matches!(
            self,
            FoodCartError::ProductNotSelected { .. } | FoodCartError::InsufficientQuantity { .. }
        )
    }
}

impl From<FoodCartError> for DomainError {
    fn from(e: FoodCartError) -> Self {
        match e {
            FoodCartError::AlreadyCreated { food_cart_id } => DomainError::DuplicateCreation {
                aggregate_type: FoodCart::AGGREGATE_TYPE,
                aggregate_id: food_cart_id,
            },
            FoodCartError::NotCreated { food_cart_id } => DomainError::AggregateNotFound {
                aggregate_type: FoodCart::AGGREGATE_TYPE,
                aggregate_id: food_cart_id,
            },
            other => DomainError::FoodCart(other),
        }
    }
}
