//! Commands for the fulfillment context.

use conductor_core::command::Command;
use serde::{Deserialize, Serialize};

/// Command type of `PlaceOrder`.
pub const PLACE_ORDER_COMMAND_TYPE: &str = "order.place";
/// Command type of `CancelOrder`.
pub const CANCEL_ORDER_COMMAND_TYPE: &str = "order.cancel";
/// Command type of `ReserveInventory`.
pub const RESERVE_INVENTORY_COMMAND_TYPE: &str = "inventory.reserve";
/// Command type of `ReleaseInventory`.
pub const RELEASE_INVENTORY_COMMAND_TYPE: &str = "inventory.release";
/// Command type of `ChargePayment`.
pub const CHARGE_PAYMENT_COMMAND_TYPE: &str = "payment.charge";
/// Command type of `RefundPayment`.
pub const REFUND_PAYMENT_COMMAND_TYPE: &str = "payment.refund";

/// Place a new order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    /// The order identifier.
    pub order_id: String,
    /// The ordered stock keeping unit.
    pub sku: String,
    /// Units ordered.
    pub quantity: u32,
    /// Order total in cents.
    pub amount_cents: u64,
    /// Logical timestamp.
    pub timestamp: i64,
}

impl Command for PlaceOrder {
    const COMMAND_TYPE: &'static str = PLACE_ORDER_COMMAND_TYPE;

    fn aggregate_id(&self) -> &str {
        &self.order_id
    }

    fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

/// Cancel an order that has not been fulfilled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrder {
    /// The order identifier.
    pub order_id: String,
    /// Why the order is cancelled.
    pub reason: String,
    /// Logical timestamp.
    pub timestamp: i64,
}

impl Command for CancelOrder {
    const COMMAND_TYPE: &'static str = CANCEL_ORDER_COMMAND_TYPE;

    fn aggregate_id(&self) -> &str {
        &self.order_id
    }

    fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

/// Set stock aside for an order. The reservation is keyed by order id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveInventory {
    /// The order the stock is for.
    pub order_id: String,
    /// The stock keeping unit.
    pub sku: String,
    /// Units to reserve.
    pub quantity: u32,
    /// Logical timestamp.
    pub timestamp: i64,
}

impl Command for ReserveInventory {
    const COMMAND_TYPE: &'static str = RESERVE_INVENTORY_COMMAND_TYPE;

    fn aggregate_id(&self) -> &str {
        &self.order_id
    }

    fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

/// Return the stock reserved for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseInventory {
    /// The order the stock was reserved for.
    pub order_id: String,
    /// Logical timestamp.
    pub timestamp: i64,
}

impl Command for ReleaseInventory {
    const COMMAND_TYPE: &'static str = RELEASE_INVENTORY_COMMAND_TYPE;

    fn aggregate_id(&self) -> &str {
        &self.order_id
    }

    fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

/// Charge the customer for an order. The payment is keyed by order id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargePayment {
    /// The order to charge for.
    pub order_id: String,
    /// Amount in cents.
    pub amount_cents: u64,
    /// Logical timestamp.
    pub timestamp: i64,
}

impl Command for ChargePayment {
    const COMMAND_TYPE: &'static str = CHARGE_PAYMENT_COMMAND_TYPE;

    fn aggregate_id(&self) -> &str {
        &self.order_id
    }

    fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

/// Pay back whatever was charged for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundPayment {
    /// The order to refund.
    pub order_id: String,
    /// Logical timestamp.
    pub timestamp: i64,
}

impl Command for RefundPayment {
    const COMMAND_TYPE: &'static str = REFUND_PAYMENT_COMMAND_TYPE;

    fn aggregate_id(&self) -> &str {
        &self.order_id
    }

    fn timestamp(&self) -> i64 {
        self.timestamp
    }
}
