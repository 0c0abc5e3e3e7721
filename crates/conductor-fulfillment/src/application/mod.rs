//! Application services of the fulfillment domain.

pub mod command_handlers;
