//! Food cart commands.

use common::AggregateId;

use crate::command::Command;

use super::ProductId;

/// Command to open a new food cart.
#[derive(Debug, Clone)]
pub struct CreateFoodCart {
    pub food_cart_id: AggregateId,
}

impl CreateFoodCart {
    pub fn new(food_cart_id: impl Into<AggregateId>) -> Self {
        Self {
            food_cart_id: food_cart_id.into(),
        }
    }

    /// Creates the command with a freshly generated cart identity.
    pub fn generate() -> Self {
        Self {
            food_cart_id: AggregateId::new(),
        }
    }
}

/// Command to add a quantity of a product to a cart.
#[derive(Debug, Clone)]
pub struct SelectProduct {
    pub food_cart_id: AggregateId,
    pub product_id: ProductId,
    pub quantity: u32,
}

impl SelectProduct {
    pub fn new(
        food_cart_id: impl Into<AggregateId>,
        product_id: impl Into<ProductId>,
        quantity: u32,
    ) -> Self {
        Self {
            food_cart_id: food_cart_id.into(),
            product_id: product_id.into(),
            quantity,
        }
    }
}

/// Command to remove a quantity of a product from a cart.
#[derive(Debug, Clone)]
pub struct DeselectProduct {
    pub food_cart_id: AggregateId,
    pub product_id: ProductId,
    pub quantity: u32,
}

impl DeselectProduct {
    pub fn new(
        food_cart_id: impl Into<AggregateId>,
        product_id: impl Into<ProductId>,
        quantity: u32,
    ) -> Self {
        Self {
            food_cart_id: food_cart_id.into(),
            product_id: product_id.into(),
            quantity,
        }
    }
}

/// Command to confirm the order of a cart.
#[derive(Debug, Clone)]
pub struct ConfirmOrder {
    pub food_cart_id: AggregateId,
}

impl ConfirmOrder {
    pub fn new(food_cart_id: impl Into<AggregateId>) -> Self {
        Self {
            food_cart_id: food_cart_id.into(),
        }
    }
}

/// Every command the food cart accepts.
#[derive(Debug, Clone)]
pub enum FoodCartCommand {
    Create(CreateFoodCart),
    SelectProduct(SelectProduct),
    DeselectProduct(DeselectProduct),
    ConfirmOrder(ConfirmOrder),
}

impl Command for FoodCartCommand {
    fn aggregate_id(&self) -> &AggregateId {
        match self {
            FoodCartCommand::Create(cmd) => &cmd.food_cart_id,
            FoodCartCommand::SelectProduct(cmd) => &cmd.food_cart_id,
            FoodCartCommand::DeselectProduct(cmd) => &cmd.food_cart_id,
            FoodCartCommand::ConfirmOrder(cmd) => &cmd.food_cart_id,
        }
    }

    fn command_type(&self) -> &'static str {
        match self {
            FoodCartCommand::Create(_) => "CreateFoodCart",
            FoodCartCommand::SelectProduct(_) => "SelectProduct",
            FoodCartCommand::DeselectProduct(_) => "DeselectProduct",
            FoodCartCommand::ConfirmOrder(_) => "ConfirmOrder",
        }
    }
}

impl From<CreateFoodCart> for FoodCartCommand {
    fn from(cmd: CreateFoodCart) -> Self {
        FoodCartCommand::Create(cmd)
    }
}

impl From<SelectProduct> for FoodCartCommand {
    fn from(cmd: SelectProduct) -> Self {
        FoodCartCommand::SelectProduct(cmd)
    }
}

impl From<DeselectProduct> for FoodCartCommand {
    fn from(cmd: DeselectProduct) -> Self {
        FoodCartCommand::DeselectProduct(cmd)
    }
}

impl From<ConfirmOrder> for FoodCartCommand {
    fn from(cmd: ConfirmOrder) -> Self {
        FoodCartCommand::ConfirmOrder(cmd)
    }
}
