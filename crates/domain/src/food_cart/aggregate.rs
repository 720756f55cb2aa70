//! Food cart aggregate implementation.

use std::collections::HashMap;

use common::AggregateId;
use event_store::Version;

use crate::aggregate::Aggregate;

use super::{
    ConfirmOrder, CreateFoodCart, DeselectProduct, FoodCartCommand, FoodCartError, FoodCartEvent,
    ProductId, SelectProduct,
    events::{FoodCartCreatedData, ProductDeselectedData, ProductSelectedData},
};

/// Food cart aggregate root.
///
/// Tracks the quantity selected per product and whether the order has
/// been confirmed. Quantities never go below zero; a product deselected
/// down to zero keeps its entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FoodCart {
    id: Option<AggregateId>,
    version: Version,
    selected_products: HashMap<ProductId, u32>,
    confirmed: bool,
}

impl FoodCart {
    pub const AGGREGATE_TYPE: &'static str = "FoodCart";
}

impl Aggregate for FoodCart {
    type Event = FoodCartEvent;
    type Command = FoodCartCommand;
    type Error = FoodCartError;

    fn aggregate_type() -> &'static str {
        Self::AGGREGATE_TYPE
    }

    fn id(&self) -> Option<&AggregateId> {
        self.id.as_ref()
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn handle(&self, command: &FoodCartCommand) -> Result<Vec<FoodCartEvent>, FoodCartError> {
        match command {
            FoodCartCommand::Create(cmd) => self.create(cmd),
            FoodCartCommand::SelectProduct(cmd) => self.select_product(cmd),
            FoodCartCommand::DeselectProduct(cmd) => self.deselect_product(cmd),
            FoodCartCommand::ConfirmOrder(cmd) => self.confirm_order(cmd),
        }
    }

    fn apply(&mut self, event: FoodCartEvent) -> Result<(), FoodCartError> {
        if self.id.is_none() && !matches!(event, FoodCartEvent::FoodCartCreated(_)) {
            return Err(FoodCartError::NotCreated {
                food_cart_id: event.food_cart_id().clone(),
            });
        }

        match event {
            FoodCartEvent::FoodCartCreated(data) => self.apply_food_cart_created(data),
            FoodCartEvent::ProductSelected(data) => self.apply_product_selected(data),
            FoodCartEvent::ProductDeselected(data) => self.apply_product_deselected(data),
            FoodCartEvent::OrderConfirmed(_) => {
                self.confirmed = true;
                Ok(())
            }
        }
    }
}

// Query methods
impl FoodCart {
    /// Returns the selected quantity of a product, if it was ever selected.
    pub fn selected_quantity(&self, product_id: &ProductId) -> Option<u32> {
        self.selected_products.get(product_id).copied()
    }

    pub fn selected_products(&self) -> &HashMap<ProductId, u32> {
        &self.selected_products
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed
    }
}

// Command methods (return events)
impl FoodCart {
    fn require_id(&self, food_cart_id: &AggregateId) -> Result<&AggregateId, FoodCartError> {
        self.id.as_ref().ok_or_else(|| FoodCartError::NotCreated {
            food_cart_id: food_cart_id.clone(),
        })
    }

    fn create(&self, cmd: &CreateFoodCart) -> Result<Vec<FoodCartEvent>, FoodCartError> {
        if self.id.is_some() {
            return Err(FoodCartError::AlreadyCreated {
                food_cart_id: cmd.food_cart_id.clone(),
            });
        }

        Ok(vec![FoodCartEvent::food_cart_created(
            cmd.food_cart_id.clone(),
        )])
    }

    fn select_product(&self, cmd: &SelectProduct) -> Result<Vec<FoodCartEvent>, FoodCartError> {
        let id = self.require_id(&cmd.food_cart_id)?;

        let selected = self.selected_quantity(&cmd.product_id).unwrap_or(0);
        if selected.checked_add(cmd.quantity).is_none() {
            return Err(FoodCartError::QuantityOverflow {
                product_id: cmd.product_id.clone(),
                selected,
                requested: cmd.quantity,
            });
        }

        Ok(vec![FoodCartEvent::product_selected(
            id.clone(),
            cmd.product_id.clone(),
            cmd.quantity,
        )])
    }

    fn deselect_product(&self, cmd: &DeselectProduct) -> Result<Vec<FoodCartEvent>, FoodCartError> {
        let id = self.require_id(&cmd.food_cart_id)?;

        let selected = self.selected_quantity(&cmd.product_id).ok_or_else(|| {
            FoodCartError::ProductNotSelected {
                product_id: cmd.product_id.clone(),
            }
        })?;

        if selected < cmd.quantity {
            return Err(FoodCartError::InsufficientQuantity {
                product_id: cmd.product_id.clone(),
                selected,
                requested: cmd.quantity,
            });
        }

        Ok(vec![FoodCartEvent::product_deselected(
            id.clone(),
            cmd.product_id.clone(),
            cmd.quantity,
        )])
    }

    fn confirm_order(&self, cmd: &ConfirmOrder) -> Result<Vec<FoodCartEvent>, FoodCartError> {
        let id = self.require_id(&cmd.food_cart_id)?;

        if self.confirmed {
            tracing::warn!(food_cart_id = %id, "order already confirmed, ignoring");
            return Ok(vec![]);
        }

        Ok(vec![FoodCartEvent::order_confirmed(id.clone())])
    }
}

// Apply event helpers
impl FoodCart {
    fn apply_food_cart_created(&mut self, data: FoodCartCreatedData) -> Result<(), FoodCartError> {
        if let Some(food_cart_id) = &self.id {
            return Err(FoodCartError::AlreadyCreated {
                food_cart_id: food_cart_id.clone(),
            });
        }
        self.id = Some(data.food_cart_id);
        self.selected_products.clear();
        self.confirmed = false;
        Ok(())
    }

    fn apply_product_selected(&mut self, data: ProductSelectedData) -> Result<(), FoodCartError> {
        let selected = self
            .selected_products
            .entry(data.product_id.clone())
            .or_insert(0);

        *selected = selected
            .checked_add(data.quantity)
            .ok_or(FoodCartError::QuantityOverflow {
                product_id: data.product_id,
                selected: *selected,
                requested: data.quantity,
            })?;
        Ok(())
    }

    fn apply_product_deselected(
        &mut self,
        data: ProductDeselectedData,
    ) -> Result<(), FoodCartError> {
        let Some(selected) = self.selected_products.get_mut(&data.product_id) else {
            return Err(FoodCartError::ProductNotSelected {
                product_id: data.product_id,
            });
        };

        *selected = selected
            .checked_sub(data.quantity)
            .ok_or(FoodCartError::InsufficientQuantity {
                product_id: data.product_id,
                selected: *selected,
                requested: data.quantity,
            })?;
        Ok(())
    }
}
