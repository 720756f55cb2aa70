//! Read side of the food cart system.
//!
//! This crate provides the query side of the CQRS pattern:
//! - [`Projection`] trait for processing events into read models
//! - [`ReadModelStore`] for keyed access to denormalized views
//! - [`ProjectionProcessor`] for feeding stored and live events to projections
//! - [`FoodCartProjector`] and [`FoodCartQueryHandler`] for the cart view

pub mod error;
pub mod processor;
pub mod projection;
pub mod query;
pub mod read_model;
pub mod views;

pub use error::{ProjectionError, Result};
pub use processor::ProjectionProcessor;
pub use projection::{Projection, ProjectionPosition};
pub use query::{FindFoodCart, FoodCartQueryHandler};
pub use read_model::{InMemoryReadModelStore, ReadModelStore, View};
pub use views::{FoodCartProjector, FoodCartView};
