// service/src/services/alerts.rs

//! Operator-facing alerts for states a human has to look at, such as a
//! captured payment that could not be applied locally.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
  /// Gateway order exists but the local pending order was not saved.
  OrderPersistFailed,
  /// Captured payment recorded but the order/enrollment update failed.
  FinalizeFailed,
  /// Captured payment for a gateway order with no local row.
  OrderMissingForPayment,
  /// Captured amount differs from the amount the order was created with.
  AmountMismatch,
  /// A reconciliation pass could not apply a recorded payment.
  ReconcileFailed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorAlert {
  pub kind: AlertKind,
  pub gateway_order_id: Option<String>,
  pub gateway_payment_id: Option<String>,
  pub detail: String,
}

impl OperatorAlert {
  pub fn new(kind: AlertKind, detail: impl Into<String>) -> Self {
    Self {
      kind,
      gateway_order_id: None,
      gateway_payment_id: None,
      detail: detail.into(),
    }
  }

  pub fn order(mut self, gateway_order_id: impl Into<String>) -> Self {
    self.gateway_order_id = Some(gateway_order_id.into());
    self
  }

  pub fn payment(mut self, gateway_payment_id: impl Into<String>) -> Self {
    self.gateway_payment_id = Some(gateway_payment_id.into());
    self
  }
}

pub trait OperatorAlerts: Send + Sync {
  fn raise(&self, alert: OperatorAlert);
}

fn log_alert(alert: &OperatorAlert) {
  error!(
    target: "operator_alert",
    kind = ?alert.kind,
    gateway_order_id = alert.gateway_order_id.as_deref().unwrap_or("-"),
    gateway_payment_id = alert.gateway_payment_id.as_deref().unwrap_or("-"),
    detail = %alert.detail,
    "Operator attention required."
  );
}

/// Emits alerts as `operator_alert` error events for log-based paging.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAlerts;

impl OperatorAlerts for TracingAlerts {
  fn raise(&self, alert: OperatorAlert) {
    log_alert(&alert);
  }
}

/// Logs and keeps every alert so tests can assert on them.
#[derive(Debug, Default, Clone)]
pub struct RecordingAlerts {
  raised: Arc<Mutex<Vec<OperatorAlert>>>,
}

impl RecordingAlerts {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn raised(&self) -> Vec<OperatorAlert> {
    self.raised.lock().clone()
  }

  pub fn count_of(&self, kind: AlertKind) -> usize {
    self.raised.lock().iter().filter(|a| a.kind == kind).count()
  }
}

impl OperatorAlerts for RecordingAlerts {
  fn raise(&self, alert: OperatorAlert) {
    log_alert(&alert);
    self.raised.lock().push(alert);
  }
}
