// service/src/services/store.rs

//! Persistence port for orders, enrollments and payment confirmations.

use crate::errors::{AppError, Result as AppResult};
use crate::models::{Enrollment, NewConfirmation, NewOrder, Order, OrderStatus, PaymentConfirmation};
use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

pub const SUPERSEDED_REASON: &str = "superseded by a new checkout";

/// Result of applying a captured payment.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeOutcome {
  pub order: Order,
  pub enrollment: Enrollment,
  /// The same payment had already been applied; nothing changed.
  pub already_applied: bool,
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
  async fn find_enrollment(&self, student_id: Uuid, program_id: Uuid) -> AppResult<Option<Enrollment>>;

  /// The in-flight order for a (student, program) pair, if any.
  async fn find_pending_order(&self, student_id: Uuid, program_id: Uuid) -> AppResult<Option<Order>>;

  /// Inserts a `pending` order. A second pending order for the same pair is
  /// `AppError::Conflict`.
  async fn insert_order(&self, new_order: NewOrder) -> AppResult<Order>;

  async fn find_order_by_gateway_id(&self, gateway_order_id: &str) -> AppResult<Option<Order>>;

  /// Upserts the gateway's view of a payment. `received_at` and `applied_at`
  /// of an existing record are preserved.
  async fn record_confirmation(&self, confirmation: NewConfirmation) -> AppResult<PaymentConfirmation>;

  /// Atomically marks the order paid, creates the enrollment and marks the
  /// confirmation applied. Either all three happen or none do.
  ///
  /// Re-applying the payment that already paid the order is a no-op with
  /// `already_applied = true`. An order paid by another payment, or in
  /// failed/cancelled/refunded, is `AppError::Consistency`.
  async fn finalize_capture(
    &self,
    gateway_order_id: &str,
    gateway_payment_id: &str,
    captured_amount: i64,
  ) -> AppResult<FinalizeOutcome>;

  /// pending -> failed. Any other current status is `AppError::InvalidTransition`.
  async fn mark_order_failed(&self, gateway_order_id: &str, reason: &str) -> AppResult<Order>;

  async fn note_confirmation_error(&self, gateway_payment_id: &str, error: &str) -> AppResult<()>;

  /// Takes a confirmation out of reconciliation for good, keeping `reason`
  /// as its last error.
  async fn park_confirmation(&self, gateway_payment_id: &str, reason: &str) -> AppResult<()>;

  /// Neither applied nor parked, oldest first.
  async fn unapplied_confirmations(&self, limit: i64) -> AppResult<Vec<PaymentConfirmation>>;
}

/// Decides whether `gateway_payment_id` may be applied to `order`.
/// `Ok(true)` means it already was.
pub fn check_capture_applicable(order: &Order, gateway_payment_id: &str) -> AppResult<bool> {
  match order.status {
    OrderStatus::Pending => Ok(false),
    OrderStatus::Paid if order.gateway_transaction_id.as_deref() == Some(gateway_payment_id) => Ok(true),
    OrderStatus::Paid => Err(AppError::Consistency(format!(
      "order {} is already paid by payment {}, refusing {}",
      order.gateway_order_id,
      order.gateway_transaction_id.as_deref().unwrap_or("unknown"),
      gateway_payment_id
    ))),
    other => Err(AppError::Consistency(format!(
      "payment {} was captured but order {} is {}",
      gateway_payment_id, order.gateway_order_id, other
    ))),
  }
}

/// Checks that `order` may move to `failed`.
pub fn check_failable(order: &Order) -> AppResult<()> {
  if order.status.can_transition_to(OrderStatus::Failed) {
    Ok(())
  } else {
    Err(AppError::InvalidTransition {
      from: order.status,
      to: OrderStatus::Failed,
    })
  }
}
