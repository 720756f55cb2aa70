//! Types shared by the write and read sides.

mod types;

pub use types::AggregateId;
