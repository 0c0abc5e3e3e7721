//! Shared fixtures: stored fulfillment events.

#![allow(dead_code)]

use conductor_core::repository::StoredEvent;
use conductor_fulfillment::domain::events::{
    INVENTORY_RELEASED_EVENT_TYPE, INVENTORY_RESERVED_EVENT_TYPE, ORDER_CANCELLED_EVENT_TYPE,
    ORDER_PLACED_EVENT_TYPE, PAYMENT_CHARGED_EVENT_TYPE, PAYMENT_DECLINED_EVENT_TYPE,
};
use conductor_test_support::stored_event;
use serde_json::json;

pub fn placed(order_id: &str, seq: i64, amount_cents: u64) -> StoredEvent {
    stored_event(
        "order",
        order_id,
        seq,
        ORDER_PLACED_EVENT_TYPE,
        json!({ "order_id": order_id, "sku": "SKU-1", "quantity": 2, "amount_cents": amount_cents }),
    )
}

pub fn cancelled(order_id: &str, seq: i64) -> StoredEvent {
    stored_event(
        "order",
        order_id,
        seq,
        ORDER_CANCELLED_EVENT_TYPE,
        json!({ "order_id": order_id, "reason": "customer request" }),
    )
}

pub fn reserved(order_id: &str, seq: i64) -> StoredEvent {
    stored_event(
        "inventory",
        order_id,
        seq,
        INVENTORY_RESERVED_EVENT_TYPE,
        json!({ "order_id": order_id, "sku": "SKU-1", "quantity": 2 }),
    )
}

pub fn released(order_id: &str, seq: i64) -> StoredEvent {
    stored_event(
        "inventory",
        order_id,
        seq,
        INVENTORY_RELEASED_EVENT_TYPE,
        json!({ "order_id": order_id, "sku": "SKU-1", "quantity": 2 }),
    )
}

pub fn charged(order_id: &str, seq: i64, amount_cents: u64) -> StoredEvent {
    stored_event(
        "payment",
        order_id,
        seq,
        PAYMENT_CHARGED_EVENT_TYPE,
        json!({ "order_id": order_id, "amount_cents": amount_cents }),
    )
}

pub fn declined(order_id: &str, seq: i64, amount_cents: u64) -> StoredEvent {
    stored_event(
        "payment",
        order_id,
        seq,
        PAYMENT_DECLINED_EVENT_TYPE,
        json!({ "order_id": order_id, "amount_cents": amount_cents, "reason": "limit" }),
    )
}
