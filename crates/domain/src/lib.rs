//! Write side of the food cart system.
//!
//! This crate provides:
//! - [`Aggregate`], [`DomainEvent`] and [`Command`] traits for event-sourced entities
//! - [`AggregateRepository`] for replaying and committing event streams
//! - [`CommandDispatcher`] serializing commands per aggregate identity
//! - [`EventPublisher`] fanning committed events out to subscribers
//! - The [`FoodCart`] aggregate

pub mod aggregate;
pub mod command;
pub mod dispatcher;
pub mod error;
pub mod food_cart;
pub mod publisher;
pub mod repository;

pub use aggregate::{Aggregate, DomainEvent};
pub use command::{Command, CommandResult};
pub use dispatcher::{CommandDispatcher, DispatcherConfig};
pub use error::DomainError;
pub use food_cart::{
    ConfirmOrder, CreateFoodCart, DeselectProduct, FoodCart, FoodCartCommand, FoodCartError,
    FoodCartEvent, ProductId, SelectProduct,
};
pub use publisher::EventPublisher;
pub use repository::{AggregateRepository, Decision};
