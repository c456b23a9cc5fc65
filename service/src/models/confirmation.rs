// service/src/models/confirmation.rs

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use sqlx::FromRow;

/// Durable record of what the gateway reported for a payment.
///
/// Written before any local state change; `applied_at` is set in the same
/// transaction that marks the order paid and creates the enrollment.
/// `parked_at` marks a row the reconciler has given up on; it stays for
/// operators but is no longer retried.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PaymentConfirmation {
  pub gateway_payment_id: String,
  pub gateway_order_id: String,
  pub amount: i64,
  pub currency: String,
  pub gateway_status: String,
  pub payload: JsonValue,
  pub received_at: DateTime<Utc>,
  pub applied_at: Option<DateTime<Utc>>,
  pub last_error: Option<String>,
  pub parked_at: Option<DateTime<Utc>>,
}

impl PaymentConfirmation {
  pub fn is_captured(&self) -> bool {
    self.gateway_status == crate::services::gateway::STATUS_CAPTURED
  }
}

#[derive(Debug, Clone)]
pub struct NewConfirmation {
  pub gateway_payment_id: String,
  pub gateway_order_id: String,
  pub amount: i64,
  pub currency: String,
  pub gateway_status: String,
  pub payload: JsonValue,
}
