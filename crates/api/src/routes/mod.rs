//! HTTP route handlers.

pub mod foodcarts;
pub mod health;
pub mod metrics;
pub mod projections;
