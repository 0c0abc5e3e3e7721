//! Command handlers for the fulfillment context.
//!
//! Wires each fulfillment command to the aggregate that decides it. Loading,
//! idempotency and persistence are the registry's job.

use conductor_commands::{CommandHandlerRegistryBuilder, CommandOptions};
use conductor_core::error::ConfigurationError;
use tracing::debug;

use crate::domain::aggregates::{InventoryReservation, Order, Payment};
use crate::domain::commands::{
    CancelOrder, ChargePayment, PlaceOrder, RefundPayment, ReleaseInventory, ReserveInventory,
};

/// Registers the fulfillment command handlers on `builder`.
///
/// Saga-issued commands (reserve, release, charge, refund) are idempotent, so a
/// redelivered command returns the events of its first application.
/// `CancelOrder` needs an existing order stream.
///
/// # Errors
///
/// Returns `ConfigurationError::DuplicateHandler` if `builder` already owns
/// one of the command types.
pub fn register(
    builder: CommandHandlerRegistryBuilder,
) -> Result<CommandHandlerRegistryBuilder, ConfigurationError> {
    let builder = builder
        .register::<PlaceOrder, Order, _>(CommandOptions::default(), |order, command, _clock| {
            order.place(&command.sku, command.quantity, command.amount_cents)
        })?
        .register::<CancelOrder, Order, _>(
            CommandOptions::default().requires_existing(),
            |order, command, _clock| order.cancel(&command.reason),
        )?
        .register::<ReserveInventory, InventoryReservation, _>(
            CommandOptions::default().idempotent(),
            |reservation, command, _clock| reservation.reserve(&command.sku, command.quantity),
        )?
        .register::<ReleaseInventory, InventoryReservation, _>(
            CommandOptions::default().idempotent(),
            |reservation, _command, _clock| {
                reservation.release();
                Ok(())
            },
        )?
        .register::<ChargePayment, Payment, _>(
            CommandOptions::default().idempotent(),
            |payment, command, _clock| payment.charge(command.amount_cents),
        )?
        .register::<RefundPayment, Payment, _>(
            CommandOptions::default().idempotent(),
            |payment, _command, _clock| {
                payment.refund();
                Ok(())
            },
        )?;
    debug!("fulfillment command handlers registered");
    Ok(builder)
}
