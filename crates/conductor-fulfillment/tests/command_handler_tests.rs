use std::sync::Arc;
use std::time::Duration;

use conductor_commands::{CommandHandlerRegistry, DispatchConfig};
use conductor_core::error::CommandError;
use conductor_core::repository::{EventRepository, StreamId};
use conductor_event_store::in_memory::InMemoryEventRepository;
use conductor_fulfillment::application::command_handlers;
use conductor_fulfillment::domain::aggregates::MAX_CHARGE_CENTS;
use conductor_fulfillment::domain::commands::{
    CancelOrder, ChargePayment, PlaceOrder, RefundPayment, ReleaseInventory, ReserveInventory,
};
use conductor_fulfillment::domain::events::{
    INVENTORY_RELEASED_EVENT_TYPE, PAYMENT_CHARGED_EVENT_TYPE, PAYMENT_DECLINED_EVENT_TYPE,
    PAYMENT_REFUNDED_EVENT_TYPE,
};
use conductor_test_support::{FixedClock, FlakyEventRepository};
use uuid::Uuid;

fn config() -> DispatchConfig {
    DispatchConfig {
        store_timeout: Duration::from_millis(50),
        max_conflict_retries: 3,
        max_store_retries: 2,
        min_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
    }
}

fn registry(repository: Arc<dyn EventRepository>) -> CommandHandlerRegistry {
    command_handlers::register(CommandHandlerRegistry::builder())
        .unwrap()
        .clock(Arc::new(FixedClock::default()))
        .config(config())
        .build(repository)
}

fn place(order_id: &str) -> PlaceOrder {
    PlaceOrder {
        order_id: order_id.into(),
        sku: "SKU-1".into(),
        quantity: 2,
        amount_cents: 4_200,
        timestamp: 1,
    }
}

fn charge(order_id: &str, amount_cents: u64) -> ChargePayment {
    ChargePayment {
        order_id: order_id.into(),
        amount_cents,
        timestamp: 3,
    }
}

#[tokio::test]
async fn test_register_rejects_double_registration() {
    // Arrange
    let builder = command_handlers::register(CommandHandlerRegistry::builder()).unwrap();

    // Act
    let result = command_handlers::register(builder);

    // Assert
    assert!(result.is_err());
}

#[tokio::test]
async fn test_idempotent_charge_delivered_twice_charges_once() {
    // Arrange
    let repo = Arc::new(InMemoryEventRepository::new());
    let registry = registry(repo.clone());

    // Act
    let first = registry.execute(&charge("O1", 4_200), Uuid::new_v4()).await.unwrap();
    let second = registry.execute(&charge("O1", 4_200), Uuid::new_v4()).await.unwrap();

    // Assert
    assert!(!first.replayed);
    assert!(second.replayed);
    assert_eq!(first.events, second.events);
    let stream = repo
        .load_events(&StreamId::new("payment", "O1"))
        .await
        .unwrap();
    assert_eq!(stream.len(), 1);
    assert_eq!(stream[0].event_type, PAYMENT_CHARGED_EVENT_TYPE);
}

#[tokio::test]
async fn test_refund_after_charge_pays_back_once() {
    // Arrange
    let repo = Arc::new(InMemoryEventRepository::new());
    let registry = registry(repo.clone());
    registry.execute(&charge("O1", 4_200), Uuid::new_v4()).await.unwrap();
    let refund = RefundPayment {
        order_id: "O1".into(),
        timestamp: 4,
    };

    // Act
    let first = registry.execute(&refund, Uuid::new_v4()).await.unwrap();
    let second = registry.execute(&refund, Uuid::new_v4()).await.unwrap();

    // Assert
    assert_eq!(first.events.len(), 1);
    assert_eq!(first.events[0].event_type, PAYMENT_REFUNDED_EVENT_TYPE);
    assert_eq!(first.events[0].payload["amount_cents"], 4_200);
    assert!(second.replayed);
    let stream = repo
        .load_events(&StreamId::new("payment", "O1"))
        .await
        .unwrap();
    assert_eq!(stream.len(), 2);
}

#[tokio::test]
async fn test_charge_above_limit_records_a_decline() {
    // Arrange
    let repo = Arc::new(InMemoryEventRepository::new());
    let registry = registry(repo);

    // Act
    let outcome = registry
        .execute(&charge("O1", MAX_CHARGE_CENTS + 1), Uuid::new_v4())
        .await
        .unwrap();

    // Assert
    assert_eq!(outcome.events[0].event_type, PAYMENT_DECLINED_EVENT_TYPE);
}

#[tokio::test]
async fn test_place_order_retries_a_transient_conflict() {
    // Arrange
    let repo = Arc::new(FlakyEventRepository::new(1));
    let registry = registry(repo.clone());

    // Act
    let outcome = registry.execute(&place("O1"), Uuid::new_v4()).await.unwrap();

    // Assert
    assert_eq!(repo.append_attempts(), 2);
    assert_eq!(outcome.events.len(), 1);
    assert_eq!(outcome.events[0].sequence_number, 1);
    assert_eq!(repo.events(&StreamId::new("order", "O1")).len(), 1);
}

#[tokio::test]
async fn test_placing_an_order_twice_fails_the_handler() {
    // Arrange
    let registry = registry(Arc::new(InMemoryEventRepository::new()));
    registry.execute(&place("O1"), Uuid::new_v4()).await.unwrap();

    // Act
    let result = registry.execute(&place("O1"), Uuid::new_v4()).await;

    // Assert
    match result {
        Err(CommandError::HandlerFailed { .. }) => {}
        other => panic!("expected HandlerFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_cancel_unknown_order_is_not_found() {
    // Arrange
    let registry = registry(Arc::new(InMemoryEventRepository::new()));
    let cancel = CancelOrder {
        order_id: "O404".into(),
        reason: "typo".into(),
        timestamp: 1,
    };

    // Act
    let result = registry.execute(&cancel, Uuid::new_v4()).await;

    // Assert
    match result {
        Err(CommandError::AggregateNotFound(_)) => {}
        other => panic!("expected AggregateNotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn test_reserve_then_release_returns_stock() {
    // Arrange
    let repo = Arc::new(InMemoryEventRepository::new());
    let registry = registry(repo.clone());
    let reserve = ReserveInventory {
        order_id: "O1".into(),
        sku: "SKU-1".into(),
        quantity: 2,
        timestamp: 2,
    };
    let release = ReleaseInventory {
        order_id: "O1".into(),
        timestamp: 4,
    };

    // Act
    registry.execute(&reserve, Uuid::new_v4()).await.unwrap();
    let outcome = registry.execute(&release, Uuid::new_v4()).await.unwrap();

    // Assert
    assert_eq!(outcome.events.len(), 1);
    assert_eq!(outcome.events[0].event_type, INVENTORY_RELEASED_EVENT_TYPE);
    assert_eq!(outcome.events[0].sequence_number, 2);
}

#[tokio::test]
async fn test_release_without_reservation_appends_nothing() {
    // Arrange
    let repo = Arc::new(InMemoryEventRepository::new());
    let registry = registry(repo.clone());
    let release = ReleaseInventory {
        order_id: "O1".into(),
        timestamp: 4,
    };

    // Act
    let outcome = registry.execute(&release, Uuid::new_v4()).await.unwrap();

    // Assert
    assert!(outcome.events.is_empty());
    assert!(repo.stream_ids().is_empty());
}
