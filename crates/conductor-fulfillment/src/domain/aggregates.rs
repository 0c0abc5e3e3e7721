//! Aggregate roots for the fulfillment context.

use conductor_core::aggregate::AggregateRoot;
use conductor_core::error::DomainError;

use super::events::{
    InventoryEvent, InventoryReleased, InventoryReserved, OrderCancelled, OrderEvent, OrderPlaced,
    PaymentCharged, PaymentDeclined, PaymentEvent, PaymentRefunded,
};

/// Charges above this amount are declined.
pub const MAX_CHARGE_CENTS: u64 = 100_000;

/// Lifecycle of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderStatus {
    /// No `OrderPlaced` yet.
    #[default]
    New,
    /// Placed and open.
    Placed,
    /// Cancelled.
    Cancelled,
}

/// The aggregate root for a customer order.
#[derive(Debug)]
pub struct Order {
    /// Aggregate identifier.
    pub id: String,
    /// Current version (event count).
    pub(crate) version: i64,
    /// Where the order is in its lifecycle.
    pub status: OrderStatus,
    /// Order total in cents.
    pub amount_cents: u64,
    /// Uncommitted events pending persistence.
    uncommitted_events: Vec<OrderEvent>,
}

impl Order {
    /// Places the order, producing an `OrderPlaced` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the order was already placed, or
    /// quantity or amount is zero.
    pub fn place(&mut self, sku: &str, quantity: u32, amount_cents: u64) -> Result<(), DomainError> {
        if self.status != OrderStatus::New {
            return Err(DomainError::Validation(format!(
                "order {} already placed",
                self.id
            )));
        }
        if quantity == 0 || amount_cents == 0 {
            return Err(DomainError::Validation(
                "quantity and amount must be positive".into(),
            ));
        }
        self.uncommitted_events.push(OrderEvent::Placed(OrderPlaced {
            order_id: self.id.clone(),
            sku: sku.to_owned(),
            quantity,
            amount_cents,
        }));
        Ok(())
    }

    /// Cancels the order, producing an `OrderCancelled` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` unless the order is placed and not
    /// yet cancelled.
    pub fn cancel(&mut self, reason: &str) -> Result<(), DomainError> {
        if self.status != OrderStatus::Placed {
            return Err(DomainError::Validation(format!(
                "order {} cannot be cancelled while {:?}",
                self.id, self.status
            )));
        }
        self.uncommitted_events
            .push(OrderEvent::Cancelled(OrderCancelled {
                order_id: self.id.clone(),
                reason: reason.to_owned(),
            }));
        Ok(())
    }
}

impl AggregateRoot for Order {
    type Event = OrderEvent;
    const AGGREGATE_TYPE: &'static str = "order";

    fn new(id: &str) -> Self {
        Self {
            id: id.to_owned(),
            version: 0,
            status: OrderStatus::New,
            amount_cents: 0,
            uncommitted_events: Vec::new(),
        }
    }

    fn aggregate_id(&self) -> &str {
        &self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn apply(&mut self, event: &OrderEvent) {
        match event {
            OrderEvent::Placed(placed) => {
                self.status = OrderStatus::Placed;
                self.amount_cents = placed.amount_cents;
            }
            OrderEvent::Cancelled(_) => self.status = OrderStatus::Cancelled,
        }
        self.version += 1;
    }

    fn uncommitted_events(&self) -> &[OrderEvent] {
        &self.uncommitted_events
    }

    fn clear_uncommitted_events(&mut self) {
        self.uncommitted_events.clear();
    }
}

/// The aggregate root for the stock held against one order.
#[derive(Debug)]
pub struct InventoryReservation {
    /// Aggregate identifier (the order id).
    pub id: String,
    pub(crate) version: i64,
    /// The reserved SKU and units, while the reservation holds.
    pub held: Option<(String, u32)>,
    uncommitted_events: Vec<InventoryEvent>,
}

impl InventoryReservation {
    /// Reserves stock, producing an `InventoryReserved` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if stock is already held or the
    /// quantity is zero.
    pub fn reserve(&mut self, sku: &str, quantity: u32) -> Result<(), DomainError> {
        if self.held.is_some() {
            return Err(DomainError::Validation(format!(
                "stock already reserved for order {}",
                self.id
            )));
        }
        if quantity == 0 {
            return Err(DomainError::Validation("quantity must be positive".into()));
        }
        self.uncommitted_events
            .push(InventoryEvent::Reserved(InventoryReserved {
                order_id: self.id.clone(),
                sku: sku.to_owned(),
                quantity,
            }));
        Ok(())
    }

    /// Releases held stock, producing an `InventoryReleased` event. Releasing
    /// a reservation that holds nothing produces no event.
    pub fn release(&mut self) {
        let Some((sku, quantity)) = self.held.clone() else {
            return;
        };
        self.uncommitted_events
            .push(InventoryEvent::Released(InventoryReleased {
                order_id: self.id.clone(),
                sku,
                quantity,
            }));
    }
}

impl AggregateRoot for InventoryReservation {
    type Event = InventoryEvent;
    const AGGREGATE_TYPE: &'static str = "inventory";

    fn new(id: &str) -> Self {
        Self {
            id: id.to_owned(),
            version: 0,
            held: None,
            uncommitted_events: Vec::new(),
        }
    }

    fn aggregate_id(&self) -> &str {
        &self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn apply(&mut self, event: &InventoryEvent) {
        match event {
            InventoryEvent::Reserved(reserved) => {
                self.held = Some((reserved.sku.clone(), reserved.quantity));
            }
            InventoryEvent::Released(_) => self.held = None,
        }
        self.version += 1;
    }

    fn uncommitted_events(&self) -> &[InventoryEvent] {
        &self.uncommitted_events
    }

    fn clear_uncommitted_events(&mut self) {
        self.uncommitted_events.clear();
    }
}

/// Outcome of the charge against one order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaymentStatus {
    /// Not attempted.
    #[default]
    Pending,
    /// Charged.
    Charged,
    /// Declined.
    Declined,
    /// Charged, then paid back.
    Refunded,
}

/// The aggregate root for the payment of one order.
#[derive(Debug)]
pub struct Payment {
    /// Aggregate identifier (the order id).
    pub id: String,
    pub(crate) version: i64,
    /// Charge outcome.
    pub status: PaymentStatus,
    /// Amount currently held from the customer.
    pub charged_cents: u64,
    uncommitted_events: Vec<PaymentEvent>,
}

impl Payment {
    /// Charges the order. Amounts above `MAX_CHARGE_CENTS` produce
    /// `PaymentDeclined`, everything else `PaymentCharged`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the payment was already
    /// attempted.
    pub fn charge(&mut self, amount_cents: u64) -> Result<(), DomainError> {
        if self.status != PaymentStatus::Pending {
            return Err(DomainError::Validation(format!(
                "payment for order {} already {:?}",
                self.id, self.status
            )));
        }
        let event = if amount_cents > MAX_CHARGE_CENTS {
            PaymentEvent::Declined(PaymentDeclined {
                order_id: self.id.clone(),
                amount_cents,
                reason: format!("amount exceeds limit of {MAX_CHARGE_CENTS} cents"),
            })
        } else {
            PaymentEvent::Charged(PaymentCharged {
                order_id: self.id.clone(),
                amount_cents,
            })
        };
        self.uncommitted_events.push(event);
        Ok(())
    }

    /// Pays back the charged amount. Does nothing when nothing is charged,
    /// so a refund after a decline or a second refund is harmless.
    pub fn refund(&mut self) {
        if self.status != PaymentStatus::Charged {
            return;
        }
        self.uncommitted_events
            .push(PaymentEvent::Refunded(PaymentRefunded {
                order_id: self.id.clone(),
                amount_cents: self.charged_cents,
            }));
    }
}

impl AggregateRoot for Payment {
    type Event = PaymentEvent;
    const AGGREGATE_TYPE: &'static str = "payment";

    fn new(id: &str) -> Self {
        Self {
            id: id.to_owned(),
            version: 0,
            status: PaymentStatus::Pending,
            charged_cents: 0,
            uncommitted_events: Vec::new(),
        }
    }

    fn aggregate_id(&self) -> &str {
        &self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn apply(&mut self, event: &PaymentEvent) {
        match event {
            PaymentEvent::Charged(charged) => {
                self.status = PaymentStatus::Charged;
                self.charged_cents = charged.amount_cents;
            }
            PaymentEvent::Declined(_) => self.status = PaymentStatus::Declined,
            PaymentEvent::Refunded(_) => {
                self.status = PaymentStatus::Refunded;
                self.charged_cents = 0;
            }
        }
        self.version += 1;
    }

    fn uncommitted_events(&self) -> &[PaymentEvent] {
        &self.uncommitted_events
    }

    fn clear_uncommitted_events(&mut self) {
        self.uncommitted_events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placed_order(id: &str) -> Order {
        let mut order = Order::new(id);
        order.apply(&OrderEvent::Placed(OrderPlaced {
            order_id: id.into(),
            sku: "SKU-1".into(),
            quantity: 1,
            amount_cents: 500,
        }));
        order
    }

    #[test]
    fn test_place_order_produces_order_placed_event() {
        // Arrange
        let mut order = Order::new("O1");

        // Act
        order.place("SKU-1", 2, 4_200).unwrap();

        // Assert
        assert_eq!(order.uncommitted_events().len(), 1);
        match &order.uncommitted_events()[0] {
            OrderEvent::Placed(placed) => {
                assert_eq!(placed.order_id, "O1");
                assert_eq!(placed.quantity, 2);
                assert_eq!(placed.amount_cents, 4_200);
            }
            other => panic!("expected Placed, got {other:?}"),
        }
    }

    #[test]
    fn test_place_order_twice_is_rejected() {
        // Arrange
        let mut order = placed_order("O1");

        // Act
        let result = order.place("SKU-1", 1, 500);

        // Assert
        assert!(matches!(result, Err(DomainError::Validation(_))));
        assert!(order.uncommitted_events().is_empty());
    }

    #[test]
    fn test_place_order_rejects_zero_quantity() {
        let mut order = Order::new("O1");

        let result = order.place("SKU-1", 0, 500);

        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn test_cancel_requires_placed_order() {
        // Arrange
        let mut fresh = Order::new("O1");
        let mut placed = placed_order("O2");

        // Act
        let fresh_result = fresh.cancel("changed mind");
        placed.cancel("changed mind").unwrap();

        // Assert
        assert!(matches!(fresh_result, Err(DomainError::Validation(_))));
        match &placed.uncommitted_events()[0] {
            OrderEvent::Cancelled(cancelled) => assert_eq!(cancelled.reason, "changed mind"),
            other => panic!("expected Cancelled, got {other:?}"),
        }
    }

    #[test]
    fn test_reconstitute_folds_history_into_status() {
        // Arrange
        let mut order = placed_order("O1");
        order.apply(&OrderEvent::Cancelled(OrderCancelled {
            order_id: "O1".into(),
            reason: "fraud".into(),
        }));

        // Assert
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.version(), 2);
        assert_eq!(order.amount_cents, 500);
    }

    #[test]
    fn test_reserve_twice_is_rejected() {
        // Arrange
        let mut reservation = InventoryReservation::new("O1");
        reservation.apply(&InventoryEvent::Reserved(InventoryReserved {
            order_id: "O1".into(),
            sku: "SKU-1".into(),
            quantity: 2,
        }));

        // Act
        let result = reservation.reserve("SKU-1", 2);

        // Assert
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn test_release_returns_held_stock() {
        // Arrange
        let mut reservation = InventoryReservation::new("O1");
        reservation.apply(&InventoryEvent::Reserved(InventoryReserved {
            order_id: "O1".into(),
            sku: "SKU-1".into(),
            quantity: 2,
        }));

        // Act
        reservation.release();

        // Assert
        match &reservation.uncommitted_events()[0] {
            InventoryEvent::Released(released) => {
                assert_eq!(released.sku, "SKU-1");
                assert_eq!(released.quantity, 2);
            }
            other => panic!("expected Released, got {other:?}"),
        }
    }

    #[test]
    fn test_release_without_reservation_is_a_no_op() {
        let mut reservation = InventoryReservation::new("O1");

        reservation.release();

        assert!(reservation.uncommitted_events().is_empty());
    }

    #[test]
    fn test_charge_within_limit_succeeds() {
        let mut payment = Payment::new("O1");

        payment.charge(MAX_CHARGE_CENTS).unwrap();

        assert!(matches!(
            payment.uncommitted_events()[0],
            PaymentEvent::Charged(PaymentCharged { amount_cents: MAX_CHARGE_CENTS, .. })
        ));
    }

    #[test]
    fn test_charge_above_limit_is_declined() {
        let mut payment = Payment::new("O1");

        payment.charge(MAX_CHARGE_CENTS + 1).unwrap();

        match &payment.uncommitted_events()[0] {
            PaymentEvent::Declined(declined) => assert!(declined.reason.contains("limit")),
            other => panic!("expected Declined, got {other:?}"),
        }
    }

    #[test]
    fn test_second_charge_is_rejected() {
        // Arrange
        let mut payment = Payment::new("O1");
        payment.apply(&PaymentEvent::Charged(PaymentCharged {
            order_id: "O1".into(),
            amount_cents: 500,
        }));

        // Act
        let result = payment.charge(500);

        // Assert
        assert!(matches!(result, Err(DomainError::Validation(_))));
        assert_eq!(payment.status, PaymentStatus::Charged);
    }

    #[test]
    fn test_refund_pays_back_the_charged_amount() {
        // Arrange
        let mut payment = Payment::new("O1");
        payment.apply(&PaymentEvent::Charged(PaymentCharged {
            order_id: "O1".into(),
            amount_cents: 4_200,
        }));

        // Act
        payment.refund();

        // Assert
        match &payment.uncommitted_events()[0] {
            PaymentEvent::Refunded(refunded) => assert_eq!(refunded.amount_cents, 4_200),
            other => panic!("expected Refunded, got {other:?}"),
        }
    }

    #[test]
    fn test_refund_without_charge_is_a_no_op() {
        let mut payment = Payment::new("O1");
        payment.apply(&PaymentEvent::Declined(PaymentDeclined {
            order_id: "O1".into(),
            amount_cents: 500_000,
            reason: "limit".into(),
        }));

        payment.refund();

        assert!(payment.uncommitted_events().is_empty());
        assert_eq!(payment.status, PaymentStatus::Declined);
    }
}
