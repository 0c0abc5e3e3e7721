//! Domain events for the fulfillment context.

use conductor_core::error::DomainError;
use conductor_core::event::{DomainEvent, EventPayload, decode_payload, encode_payload};
use serde::{Deserialize, Serialize};

/// Event type of `OrderPlaced`.
pub const ORDER_PLACED_EVENT_TYPE: &str = "order.placed";
/// Event type of `OrderCancelled`.
pub const ORDER_CANCELLED_EVENT_TYPE: &str = "order.cancelled";
/// Event type of `InventoryReserved`.
pub const INVENTORY_RESERVED_EVENT_TYPE: &str = "inventory.reserved";
/// Event type of `InventoryReleased`.
pub const INVENTORY_RELEASED_EVENT_TYPE: &str = "inventory.released";
/// Event type of `PaymentCharged`.
pub const PAYMENT_CHARGED_EVENT_TYPE: &str = "payment.charged";
/// Event type of `PaymentDeclined`.
pub const PAYMENT_DECLINED_EVENT_TYPE: &str = "payment.declined";
/// Event type of `PaymentRefunded`.
pub const PAYMENT_REFUNDED_EVENT_TYPE: &str = "payment.refunded";

/// Emitted when a customer places an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlaced {
    /// The order identifier.
    pub order_id: String,
    /// The ordered stock keeping unit.
    pub sku: String,
    /// Units ordered.
    pub quantity: u32,
    /// Order total in cents.
    pub amount_cents: u64,
}

impl EventPayload for OrderPlaced {
    const EVENT_TYPE: &'static str = ORDER_PLACED_EVENT_TYPE;
}

/// Emitted when an order is cancelled before fulfillment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancelled {
    /// The order identifier.
    pub order_id: String,
    /// Why the order was cancelled.
    pub reason: String,
}

impl EventPayload for OrderCancelled {
    const EVENT_TYPE: &'static str = ORDER_CANCELLED_EVENT_TYPE;
}

/// Emitted when stock is set aside for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryReserved {
    /// The order the stock is reserved for.
    pub order_id: String,
    /// The reserved stock keeping unit.
    pub sku: String,
    /// Units reserved.
    pub quantity: u32,
}

impl EventPayload for InventoryReserved {
    const EVENT_TYPE: &'static str = INVENTORY_RESERVED_EVENT_TYPE;
}

/// Emitted when reserved stock is returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryReleased {
    /// The order the stock was reserved for.
    pub order_id: String,
    /// The released stock keeping unit.
    pub sku: String,
    /// Units released.
    pub quantity: u32,
}

impl EventPayload for InventoryReleased {
    const EVENT_TYPE: &'static str = INVENTORY_RELEASED_EVENT_TYPE;
}

/// Emitted when an order's payment succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCharged {
    /// The order paid for.
    pub order_id: String,
    /// Amount charged in cents.
    pub amount_cents: u64,
}

impl EventPayload for PaymentCharged {
    const EVENT_TYPE: &'static str = PAYMENT_CHARGED_EVENT_TYPE;
}

/// Emitted when an order's payment is refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentDeclined {
    /// The order that could not be paid.
    pub order_id: String,
    /// Amount attempted in cents.
    pub amount_cents: u64,
    /// Why the charge was refused.
    pub reason: String,
}

impl EventPayload for PaymentDeclined {
    const EVENT_TYPE: &'static str = PAYMENT_DECLINED_EVENT_TYPE;
}

/// Emitted when a charged amount is paid back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRefunded {
    /// The order refunded.
    pub order_id: String,
    /// Amount refunded in cents.
    pub amount_cents: u64,
}

impl EventPayload for PaymentRefunded {
    const EVENT_TYPE: &'static str = PAYMENT_REFUNDED_EVENT_TYPE;
}

/// Events of the `Order` aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderEvent {
    /// The order was placed.
    Placed(OrderPlaced),
    /// The order was cancelled.
    Cancelled(OrderCancelled),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::Placed(_) => ORDER_PLACED_EVENT_TYPE,
            Self::Cancelled(_) => ORDER_CANCELLED_EVENT_TYPE,
        }
    }

    fn to_payload(&self) -> serde_json::Value {
        match self {
            Self::Placed(payload) => encode_payload(payload),
            Self::Cancelled(payload) => encode_payload(payload),
        }
    }

    fn from_payload(event_type: &str, payload: &serde_json::Value) -> Result<Self, DomainError> {
        match event_type {
            ORDER_PLACED_EVENT_TYPE => decode_payload(payload).map(Self::Placed),
            ORDER_CANCELLED_EVENT_TYPE => decode_payload(payload).map(Self::Cancelled),
            other => Err(unknown("order", other)),
        }
    }
}

/// Events of the `InventoryReservation` aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InventoryEvent {
    /// Stock was reserved.
    Reserved(InventoryReserved),
    /// Stock was released.
    Released(InventoryReleased),
}

impl DomainEvent for InventoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::Reserved(_) => INVENTORY_RESERVED_EVENT_TYPE,
            Self::Released(_) => INVENTORY_RELEASED_EVENT_TYPE,
        }
    }

    fn to_payload(&self) -> serde_json::Value {
        match self {
            Self::Reserved(payload) => encode_payload(payload),
            Self::Released(payload) => encode_payload(payload),
        }
    }

    fn from_payload(event_type: &str, payload: &serde_json::Value) -> Result<Self, DomainError> {
        match event_type {
            INVENTORY_RESERVED_EVENT_TYPE => decode_payload(payload).map(Self::Reserved),
            INVENTORY_RELEASED_EVENT_TYPE => decode_payload(payload).map(Self::Released),
            other => Err(unknown("inventory", other)),
        }
    }
}

/// Events of the `Payment` aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEvent {
    /// The charge succeeded.
    Charged(PaymentCharged),
    /// The charge was refused.
    Declined(PaymentDeclined),
    /// The charge was paid back.
    Refunded(PaymentRefunded),
}

impl DomainEvent for PaymentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::Charged(_) => PAYMENT_CHARGED_EVENT_TYPE,
            Self::Declined(_) => PAYMENT_DECLINED_EVENT_TYPE,
            Self::Refunded(_) => PAYMENT_REFUNDED_EVENT_TYPE,
        }
    }

    fn to_payload(&self) -> serde_json::Value {
        match self {
            Self::Charged(payload) => encode_payload(payload),
            Self::Declined(payload) => encode_payload(payload),
            Self::Refunded(payload) => encode_payload(payload),
        }
    }

    fn from_payload(event_type: &str, payload: &serde_json::Value) -> Result<Self, DomainError> {
        match event_type {
            PAYMENT_CHARGED_EVENT_TYPE => decode_payload(payload).map(Self::Charged),
            PAYMENT_DECLINED_EVENT_TYPE => decode_payload(payload).map(Self::Declined),
            PAYMENT_REFUNDED_EVENT_TYPE => decode_payload(payload).map(Self::Refunded),
            other => Err(unknown("payment", other)),
        }
    }
}

fn unknown(aggregate_type: &str, event_type: &str) -> DomainError {
    DomainError::Serialization(format!(
        "unknown {aggregate_type} event type {event_type}"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_event_round_trips_through_payload() {
        let event = OrderEvent::Placed(OrderPlaced {
            order_id: "O1".into(),
            sku: "SKU-1".into(),
            quantity: 2,
            amount_cents: 4_200,
        });

        let decoded = OrderEvent::from_payload(event.event_type(), &event.to_payload()).unwrap();

        assert_eq!(decoded, event);
    }

    #[test]
    fn test_from_payload_rejects_foreign_event_type() {
        let result = PaymentEvent::from_payload(ORDER_PLACED_EVENT_TYPE, &serde_json::json!({}));

        match result {
            Err(DomainError::Serialization(msg)) => assert!(msg.contains("order.placed")),
            other => panic!("expected Serialization, got {other:?}"),
        }
    }
}
