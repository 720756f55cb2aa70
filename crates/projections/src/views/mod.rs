//! Read model views.

mod food_cart;

pub use food_cart::{FoodCartProjector, FoodCartView};
