// service/src/services/store_memory.rs

//! `PaymentStore` kept in process memory, behind one mutex so every
//! operation is atomic. Used for tests and `PAYMENT_STORE=memory`.

use crate::errors::{AppError, Result as AppResult};
use crate::models::{
  enrollment::ENROLLMENT_ACTIVE, Enrollment, NewConfirmation, NewOrder, Order, OrderStatus, PaymentConfirmation,
};
use crate::services::store::{check_capture_applicable, check_failable, FinalizeOutcome, PaymentStore};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Default)]
struct MemoryState {
  orders: HashMap<String, Order>,
  enrollments: HashMap<(Uuid, Uuid), Enrollment>,
  confirmations: HashMap<String, PaymentConfirmation>,
  fail_next_order_insert: bool,
  fail_next_finalize: bool,
}

#[derive(Clone, Default)]
pub struct InMemoryPaymentStore {
  state: Arc<Mutex<MemoryState>>,
}

impl InMemoryPaymentStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// The next `insert_order` fails as if the database were unreachable.
  pub fn fail_next_order_insert(&self) {
    self.state.lock().fail_next_order_insert = true;
  }

  /// The next `finalize_capture` fails after its checks, leaving nothing changed.
  pub fn fail_next_finalize(&self) {
    self.state.lock().fail_next_finalize = true;
  }

  /// Seeds an enrollment directly.
  pub fn enroll(&self, student_id: Uuid, program_id: Uuid) -> Enrollment {
    let enrollment = Enrollment {
      id: Uuid::new_v4(),
      student_id,
      program_id,
      order_id: None,
      status: ENROLLMENT_ACTIVE.to_string(),
      enrolled_at: Utc::now(),
    };
    self.state.lock().enrollments.insert((student_id, program_id), enrollment.clone());
    enrollment
  }

  pub fn orders_for(&self, student_id: Uuid, program_id: Uuid) -> Vec<Order> {
    let mut orders: Vec<Order> = self
      .state
      .lock()
      .orders
      .values()
      .filter(|o| o.student_id == student_id && o.program_id == program_id)
      .cloned()
      .collect();
    orders.sort_by_key(|o| o.created_at);
    orders
  }

  pub fn enrollment_count(&self) -> usize {
    self.state.lock().enrollments.len()
  }

  pub fn confirmation(&self, gateway_payment_id: &str) -> Option<PaymentConfirmation> {
    self.state.lock().confirmations.get(gateway_payment_id).cloned()
  }
}

fn injected_failure(what: &str) -> AppError {
  AppError::Sqlx(sqlx::Error::Protocol(format!("injected {} failure", what)))
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
  async fn find_enrollment(&self, student_id: Uuid, program_id: Uuid) -> AppResult<Option<Enrollment>> {
    Ok(self.state.lock().enrollments.get(&(student_id, program_id)).cloned())
  }

  async fn find_pending_order(&self, student_id: Uuid, program_id: Uuid) -> AppResult<Option<Order>> {
    Ok(
      self
        .state
        .lock()
        .orders
        .values()
        .filter(|o| o.student_id == student_id && o.program_id == program_id && o.status == OrderStatus::Pending)
        .max_by_key(|o| o.created_at)
        .cloned(),
    )
  }

  async fn insert_order(&self, new_order: NewOrder) -> AppResult<Order> {
    let mut state = self.state.lock();
    if std::mem::take(&mut state.fail_next_order_insert) {
      return Err(injected_failure("order insert"));
    }
    if state.orders.contains_key(&new_order.gateway_order_id) {
      return Err(AppError::Conflict(format!("Order {} already exists", new_order.gateway_order_id)));
    }
    let has_pending = state.orders.values().any(|o| {
      o.student_id == new_order.student_id && o.program_id == new_order.program_id && o.status == OrderStatus::Pending
    });
    if has_pending {
      return Err(AppError::Conflict(
        "Another checkout for this program is already in progress".to_string(),
      ));
    }

    let now = Utc::now();
    let order = Order {
      id: Uuid::new_v4(),
      order_number: new_order.order_number,
      student_id: new_order.student_id,
      program_id: new_order.program_id,
      base_amount: new_order.amount,
      final_amount: new_order.amount,
      currency: new_order.currency,
      status: OrderStatus::Pending,
      gateway: new_order.gateway,
      gateway_order_id: new_order.gateway_order_id,
      gateway_transaction_id: None,
      failure_reason: None,
      created_at: now,
      updated_at: now,
    };
    state.orders.insert(order.gateway_order_id.clone(), order.clone());
    Ok(order)
  }

  async fn find_order_by_gateway_id(&self, gateway_order_id: &str) -> AppResult<Option<Order>> {
    Ok(self.state.lock().orders.get(gateway_order_id).cloned())
  }

  async fn record_confirmation(&self, confirmation: NewConfirmation) -> AppResult<PaymentConfirmation> {
    let mut state = self.state.lock();
    let record = state
      .confirmations
      .entry(confirmation.gateway_payment_id.clone())
      .and_modify(|existing| {
        existing.amount = confirmation.amount;
        existing.currency = confirmation.currency.clone();
        existing.gateway_status = confirmation.gateway_status.clone();
        existing.payload = confirmation.payload.clone();
      })
      .or_insert_with(|| PaymentConfirmation {
        gateway_payment_id: confirmation.gateway_payment_id.clone(),
        gateway_order_id: confirmation.gateway_order_id.clone(),
        amount: confirmation.amount,
        currency: confirmation.currency.clone(),
        gateway_status: confirmation.gateway_status.clone(),
        payload: confirmation.payload.clone(),
        received_at: Utc::now(),
        applied_at: None,
        last_error: None,
        parked_at: None,
      });
    Ok(record.clone())
  }

  async fn finalize_capture(
    &self,
    gateway_order_id: &str,
    gateway_payment_id: &str,
    captured_amount: i64,
  ) -> AppResult<FinalizeOutcome> {
    let mut state = self.state.lock();
    let order = state
      .orders
      .get(gateway_order_id)
      .cloned()
      .ok_or_else(|| AppError::NotFound(format!("Order {} not found", gateway_order_id)))?;
    let already_applied = check_capture_applicable(&order, gateway_payment_id)?;
    if std::mem::take(&mut state.fail_next_finalize) {
      return Err(injected_failure("finalize"));
    }

    // Every change below is applied under the same lock.
    let now = Utc::now();
    let order = if already_applied {
      order
    } else {
      let mut paid = order;
      paid.status = OrderStatus::Paid;
      paid.gateway_transaction_id = Some(gateway_payment_id.to_string());
      paid.final_amount = captured_amount;
      paid.updated_at = now;
      state.orders.insert(paid.gateway_order_id.clone(), paid.clone());
      paid
    };

    let enrollment = state
      .enrollments
      .entry((order.student_id, order.program_id))
      .or_insert_with(|| Enrollment {
        id: Uuid::new_v4(),
        student_id: order.student_id,
        program_id: order.program_id,
        order_id: Some(order.id),
        status: ENROLLMENT_ACTIVE.to_string(),
        enrolled_at: now,
      })
      .clone();

    if let Some(confirmation) = state.confirmations.get_mut(gateway_payment_id) {
      confirmation.applied_at.get_or_insert(now);
      confirmation.last_error = None;
    }

    Ok(FinalizeOutcome {
      order,
      enrollment,
      already_applied,
    })
  }

  async fn mark_order_failed(&self, gateway_order_id: &str, reason: &str) -> AppResult<Order> {
    let mut state = self.state.lock();
    let order = state
      .orders
      .get_mut(gateway_order_id)
      .ok_or_else(|| AppError::NotFound(format!("Order {} not found", gateway_order_id)))?;
    check_failable(order)?;
    order.status = OrderStatus::Failed;
    order.failure_reason = Some(reason.to_string());
    order.updated_at = Utc::now();
    Ok(order.clone())
  }

  async fn note_confirmation_error(&self, gateway_payment_id: &str, error: &str) -> AppResult<()> {
    if let Some(confirmation) = self.state.lock().confirmations.get_mut(gateway_payment_id) {
      confirmation.last_error = Some(error.to_string());
    }
    Ok(())
  }

  async fn park_confirmation(&self, gateway_payment_id: &str, reason: &str) -> AppResult<()> {
    if let Some(confirmation) = self.state.lock().confirmations.get_mut(gateway_payment_id) {
      confirmation.parked_at.get_or_insert_with(Utc::now);
      confirmation.last_error = Some(reason.to_string());
    }
    Ok(())
  }

  async fn unapplied_confirmations(&self, limit: i64) -> AppResult<Vec<PaymentConfirmation>> {
    let mut pending: Vec<PaymentConfirmation> = self
      .state
      .lock()
      .confirmations
      .values()
      .filter(|c| c.applied_at.is_none() && c.parked_at.is_none())
      .cloned()
      .collect();
    pending.sort_by(|a, b| {
      a.received_at
        .cmp(&b.received_at)
        .then_with(|| a.gateway_payment_id.cmp(&b.gateway_payment_id))
    });
    pending.truncate(usize::try_from(limit).unwrap_or(0));
    Ok(pending)
  }
}
