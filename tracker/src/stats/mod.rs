//! Delivery statistics: packed open-state bits and per-post aggregates.

pub mod bitindex;
pub mod delivery;

pub use bitindex::{BitIndex, BitIndexError};
pub use delivery::DeliveryStats;
