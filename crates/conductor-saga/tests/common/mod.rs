//! Shared fixtures: a small funds-transfer saga.

#![allow(dead_code)]

use conductor_core::command::Command;
use conductor_core::error::DomainError;
use conductor_core::event::EventPayload;
use conductor_core::repository::StoredEvent;
use conductor_saga::{Saga, SagaDefinition};
use conductor_test_support::stored_event;
use serde::{Deserialize, Serialize};

pub const TRANSFER: &str = "transfer";
pub const LEDGER: &str = "ledger";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequested {
    pub transfer_id: String,
    pub amount_cents: i64,
}

impl EventPayload for TransferRequested {
    const EVENT_TYPE: &'static str = "transfer.requested";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundsDebited {
    pub transfer_id: String,
}

impl EventPayload for FundsDebited {
    const EVENT_TYPE: &'static str = "ledger.funds_debited";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundsCredited {
    pub transfer_id: String,
}

impl EventPayload for FundsCredited {
    const EVENT_TYPE: &'static str = "ledger.funds_credited";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferAudited {
    pub transfer_id: String,
}

impl EventPayload for TransferAudited {
    const EVENT_TYPE: &'static str = "transfer.audited";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebitAccount {
    pub transfer_id: String,
    pub amount_cents: i64,
    pub timestamp: i64,
}

impl Command for DebitAccount {
    const COMMAND_TYPE: &'static str = "ledger.debit";

    fn aggregate_id(&self) -> &str {
        &self.transfer_id
    }

    fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditAccount {
    pub transfer_id: String,
    pub amount_cents: i64,
    pub timestamp: i64,
}

impl Command for CreditAccount {
    const COMMAND_TYPE: &'static str = "ledger.credit";

    fn aggregate_id(&self) -> &str {
        &self.transfer_id
    }

    fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyCustomer {
    pub transfer_id: String,
    pub timestamp: i64,
}

impl Command for NotifyCustomer {
    const COMMAND_TYPE: &'static str = "customer.notify";

    fn aggregate_id(&self) -> &str {
        &self.transfer_id
    }

    fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

/// Debits on request, then credits and notifies once the debit landed,
/// completing on the credit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransferSaga {
    pub amount_cents: i64,
    pub debited: bool,
    pub credited: bool,
}

impl Saga for TransferSaga {
    const SAGA_TYPE: &'static str = "TransferSaga";

    fn define(definition: &mut SagaDefinition<Self>) {
        definition
            .on(
                |e: &TransferRequested| e.transfer_id.clone(),
                |ctx, e: &TransferRequested| {
                    ctx.state_mut().amount_cents = e.amount_cents;
                    ctx.send_command(&DebitAccount {
                        transfer_id: e.transfer_id.clone(),
                        amount_cents: e.amount_cents,
                        timestamp: ctx.event().timestamp,
                    });
                    if e.amount_cents <= 0 {
                        return Err(DomainError::Validation("amount must be positive".into()));
                    }
                    Ok(())
                },
            )
            .on(
                |e: &FundsDebited| e.transfer_id.clone(),
                |ctx, e: &FundsDebited| {
                    ctx.state_mut().debited = true;
                    let amount_cents = ctx.state().amount_cents;
                    let timestamp = ctx.event().timestamp;
                    ctx.send_command(&CreditAccount {
                        transfer_id: e.transfer_id.clone(),
                        amount_cents,
                        timestamp,
                    });
                    ctx.send_command(&NotifyCustomer {
                        transfer_id: e.transfer_id.clone(),
                        timestamp,
                    });
                    Ok(())
                },
            )
            .on(
                |e: &FundsCredited| e.transfer_id.clone(),
                |ctx, _e: &FundsCredited| {
                    ctx.state_mut().credited = true;
                    ctx.complete();
                    Ok(())
                },
            )
            .observe(|e: &TransferAudited| e.transfer_id.clone());
    }
}

pub fn requested(transfer_id: &str, seq: i64, amount_cents: i64) -> StoredEvent {
    stored_event(
        TRANSFER,
        transfer_id,
        seq,
        TransferRequested::EVENT_TYPE,
        serde_json::json!({ "transfer_id": transfer_id, "amount_cents": amount_cents }),
    )
}

pub fn debited(transfer_id: &str, seq: i64) -> StoredEvent {
    stored_event(
        LEDGER,
        transfer_id,
        seq,
        FundsDebited::EVENT_TYPE,
        serde_json::json!({ "transfer_id": transfer_id }),
    )
}

pub fn credited(transfer_id: &str, seq: i64) -> StoredEvent {
    stored_event(
        LEDGER,
        transfer_id,
        seq,
        FundsCredited::EVENT_TYPE,
        serde_json::json!({ "transfer_id": transfer_id }),
    )
}

pub fn audited(transfer_id: &str, seq: i64) -> StoredEvent {
    stored_event(
        TRANSFER,
        transfer_id,
        seq,
        TransferAudited::EVENT_TYPE,
        serde_json::json!({ "transfer_id": transfer_id }),
    )
}
