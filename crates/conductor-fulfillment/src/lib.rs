//! Conductor runtime — order fulfillment reference domain.
//!
//! Three aggregates (order, inventory reservation, payment) coordinated by
//! the `OrderFulfillmentSaga`: reserve stock for a placed order, charge the
//! payment, and release the stock again when the charge is declined or the
//! order is cancelled.

pub mod application;
pub mod domain;
pub mod saga;
