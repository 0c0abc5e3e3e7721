//! The order fulfillment saga.

use conductor_core::error::DomainError;
use conductor_saga::{Saga, SagaDefinition};
use serde::{Deserialize, Serialize};

use crate::domain::commands::{ChargePayment, RefundPayment, ReleaseInventory, ReserveInventory};
use crate::domain::events::{
    InventoryReleased, InventoryReserved, OrderCancelled, OrderPlaced, PaymentCharged,
    PaymentDeclined,
};

/// Saga type name of `OrderFulfillmentSaga`.
pub const ORDER_FULFILLMENT_SAGA_TYPE: &str = "OrderFulfillmentSaga";

/// How far an order has come.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentStage {
    /// Nothing seen yet.
    #[default]
    Pending,
    /// Waiting for the stock reservation.
    Reserving,
    /// Stock held, waiting for the payment.
    Charging,
    /// Paid. Terminal.
    Fulfilled,
    /// Payment declined and stock released. Terminal.
    Compensated,
    /// Cancelled while the charge was in flight. Stock is released; waiting
    /// for the payment outcome to refund it if it went through.
    Cancelling,
    /// Cancelled by the customer. Terminal.
    Cancelled,
}

/// Coordinates one order: reserve stock, charge, and release the stock again
/// when the charge is declined or the order is cancelled. A charge that lands
/// after the cancellation is refunded. The saga id is the order id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFulfillmentSaga {
    /// Current stage.
    pub stage: FulfillmentStage,
    /// Ordered SKU, from `OrderPlaced`.
    pub sku: String,
    /// Ordered units, from `OrderPlaced`.
    pub quantity: u32,
    /// Order total, from `OrderPlaced`.
    pub amount_cents: u64,
}

impl Saga for OrderFulfillmentSaga {
    const SAGA_TYPE: &'static str = ORDER_FULFILLMENT_SAGA_TYPE;

    fn define(definition: &mut SagaDefinition<Self>) {
        definition
            .on(
                |e: &OrderPlaced| e.order_id.clone(),
                |ctx, e: &OrderPlaced| {
                    if ctx.state().stage != FulfillmentStage::Pending {
                        return Err(DomainError::Validation(format!(
                            "order {} placed twice",
                            e.order_id
                        )));
                    }
                    let state = ctx.state_mut();
                    state.stage = FulfillmentStage::Reserving;
                    state.sku.clone_from(&e.sku);
                    state.quantity = e.quantity;
                    state.amount_cents = e.amount_cents;
                    let timestamp = ctx.event().timestamp;
                    ctx.send_command(&ReserveInventory {
                        order_id: e.order_id.clone(),
                        sku: e.sku.clone(),
                        quantity: e.quantity,
                        timestamp,
                    });
                    Ok(())
                },
            )
            .on(
                |e: &InventoryReserved| e.order_id.clone(),
                |ctx, e: &InventoryReserved| {
                    let timestamp = ctx.event().timestamp;
                    let stage = ctx.state().stage;
                    match stage {
                        FulfillmentStage::Reserving => {}
                        // Cancelled before the stock arrived: hand it back.
                        FulfillmentStage::Cancelled => {
                            ctx.send_command(&ReleaseInventory {
                                order_id: e.order_id.clone(),
                                timestamp,
                            });
                            ctx.complete();
                            return Ok(());
                        }
                        _ => return Ok(()),
                    }
                    ctx.state_mut().stage = FulfillmentStage::Charging;
                    let amount_cents = ctx.state().amount_cents;
                    ctx.send_command(&ChargePayment {
                        order_id: e.order_id.clone(),
                        amount_cents,
                        timestamp,
                    });
                    Ok(())
                },
            )
            .on(
                |e: &PaymentCharged| e.order_id.clone(),
                |ctx, e: &PaymentCharged| {
                    if ctx.state().stage == FulfillmentStage::Cancelling {
                        ctx.state_mut().stage = FulfillmentStage::Cancelled;
                        let timestamp = ctx.event().timestamp;
                        ctx.send_command(&RefundPayment {
                            order_id: e.order_id.clone(),
                            timestamp,
                        });
                    } else {
                        ctx.state_mut().stage = FulfillmentStage::Fulfilled;
                    }
                    ctx.complete();
                    Ok(())
                },
            )
            .on(
                |e: &PaymentDeclined| e.order_id.clone(),
                |ctx, e: &PaymentDeclined| {
                    // Stock went back when the order was cancelled.
                    if ctx.state().stage == FulfillmentStage::Cancelling {
                        ctx.state_mut().stage = FulfillmentStage::Cancelled;
                        ctx.complete();
                        return Ok(());
                    }
                    ctx.state_mut().stage = FulfillmentStage::Compensated;
                    let timestamp = ctx.event().timestamp;
                    ctx.send_command(&ReleaseInventory {
                        order_id: e.order_id.clone(),
                        timestamp,
                    });
                    ctx.complete();
                    Ok(())
                },
            )
            .on(
                |e: &OrderCancelled| e.order_id.clone(),
                |ctx, e: &OrderCancelled| {
                    let stage = ctx.state().stage;
                    match stage {
                        // Still waiting for stock; released once it arrives.
                        FulfillmentStage::Reserving => {
                            ctx.state_mut().stage = FulfillmentStage::Cancelled;
                        }
                        FulfillmentStage::Charging => {
                            ctx.state_mut().stage = FulfillmentStage::Cancelling;
                            let timestamp = ctx.event().timestamp;
                            ctx.send_command(&ReleaseInventory {
                                order_id: e.order_id.clone(),
                                timestamp,
                            });
                        }
                        FulfillmentStage::Cancelling => {}
                        _ => {
                            ctx.state_mut().stage = FulfillmentStage::Cancelled;
                            ctx.complete();
                        }
                    }
                    Ok(())
                },
            )
            .observe(|e: &InventoryReleased| e.order_id.clone());
    }
}
