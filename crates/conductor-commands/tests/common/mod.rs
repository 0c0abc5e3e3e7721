//! Shared fixtures: a minimal bank account aggregate.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use conductor_commands::{CommandHandlerRegistry, CommandOptions, DispatchConfig};
use conductor_core::aggregate::AggregateRoot;
use conductor_core::command::Command;
use conductor_core::error::DomainError;
use conductor_core::event::{DomainEvent, EventPayload, decode_payload, encode_payload};
use conductor_core::repository::EventRepository;
use conductor_test_support::FixedClock;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountOpened {
    pub owner: String,
}

impl EventPayload for AccountOpened {
    const EVENT_TYPE: &'static str = "account.opened";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundsDeposited {
    pub amount_cents: i64,
}

impl EventPayload for FundsDeposited {
    const EVENT_TYPE: &'static str = "account.funds_deposited";
}

#[derive(Debug, Clone, PartialEq)]
pub enum AccountEvent {
    Opened(AccountOpened),
    Deposited(FundsDeposited),
}

impl DomainEvent for AccountEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::Opened(_) => AccountOpened::EVENT_TYPE,
            Self::Deposited(_) => FundsDeposited::EVENT_TYPE,
        }
    }

    fn to_payload(&self) -> serde_json::Value {
        match self {
            Self::Opened(payload) => encode_payload(payload),
            Self::Deposited(payload) => encode_payload(payload),
        }
    }

    fn from_payload(event_type: &str, payload: &serde_json::Value) -> Result<Self, DomainError> {
        match event_type {
            AccountOpened::EVENT_TYPE => decode_payload(payload).map(Self::Opened),
            FundsDeposited::EVENT_TYPE => decode_payload(payload).map(Self::Deposited),
            other => Err(DomainError::Serialization(format!(
                "unknown account event {other}"
            ))),
        }
    }
}

#[derive(Debug)]
pub struct Account {
    id: String,
    version: i64,
    pub open: bool,
    pub balance_cents: i64,
    uncommitted: Vec<AccountEvent>,
}

impl Account {
    pub fn open(&mut self, owner: &str) -> Result<(), DomainError> {
        if self.open {
            return Err(DomainError::Validation("account already open".into()));
        }
        self.uncommitted.push(AccountEvent::Opened(AccountOpened {
            owner: owner.to_owned(),
        }));
        Ok(())
    }

    pub fn deposit(&mut self, amount_cents: i64) -> Result<(), DomainError> {
        if amount_cents <= 0 {
            return Err(DomainError::Validation("deposit must be positive".into()));
        }
        self.uncommitted
            .push(AccountEvent::Deposited(FundsDeposited { amount_cents }));
        Ok(())
    }
}

impl AggregateRoot for Account {
    type Event = AccountEvent;
    const AGGREGATE_TYPE: &'static str = "account";

    fn new(id: &str) -> Self {
        Self {
            id: id.to_owned(),
            version: 0,
            open: false,
            balance_cents: 0,
            uncommitted: Vec::new(),
        }
    }

    fn aggregate_id(&self) -> &str {
        &self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn apply(&mut self, event: &AccountEvent) {
        match event {
            AccountEvent::Opened(_) => self.open = true,
            AccountEvent::Deposited(e) => self.balance_cents += e.amount_cents,
        }
        self.version += 1;
    }

    fn uncommitted_events(&self) -> &[AccountEvent] {
        &self.uncommitted
    }

    fn clear_uncommitted_events(&mut self) {
        self.uncommitted.clear();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAccount {
    pub account_id: String,
    pub owner: String,
    pub timestamp: i64,
}

impl Command for OpenAccount {
    const COMMAND_TYPE: &'static str = "account.open";

    fn aggregate_id(&self) -> &str {
        &self.account_id
    }

    fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deposit {
    pub account_id: String,
    pub amount_cents: i64,
    pub timestamp: i64,
}

impl Command for Deposit {
    const COMMAND_TYPE: &'static str = "account.deposit";

    fn aggregate_id(&self) -> &str {
        &self.account_id
    }

    fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

pub fn open(account_id: &str) -> OpenAccount {
    OpenAccount {
        account_id: account_id.to_owned(),
        owner: "ada".to_owned(),
        timestamp: 1,
    }
}

pub fn deposit(account_id: &str, amount_cents: i64, timestamp: i64) -> Deposit {
    Deposit {
        account_id: account_id.to_owned(),
        amount_cents,
        timestamp,
    }
}

/// Fast retries so failure paths finish quickly.
pub fn fast_config() -> DispatchConfig {
    DispatchConfig {
        store_timeout: Duration::from_millis(50),
        max_conflict_retries: 3,
        max_store_retries: 2,
        min_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
    }
}

/// Opening is not idempotent; deposits are idempotent and need an open
/// account.
pub fn registry(repository: Arc<dyn EventRepository>, config: DispatchConfig) -> CommandHandlerRegistry {
    CommandHandlerRegistry::builder()
        .register::<OpenAccount, Account, _>(CommandOptions::default(), |account, command, _clock| {
            account.open(&command.owner)
        })
        .unwrap()
        .register::<Deposit, Account, _>(
            CommandOptions::default().idempotent().requires_existing(),
            |account, command, _clock| account.deposit(command.amount_cents),
        )
        .unwrap()
        .clock(Arc::new(FixedClock::default()))
        .config(config)
        .build(repository)
}
