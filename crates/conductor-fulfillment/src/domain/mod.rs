//! Aggregates, commands and events of the fulfillment domain.

pub mod aggregates;
pub mod commands;
pub mod events;
