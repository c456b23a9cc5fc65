// service/src/models/order.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type as SqlxType};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, SqlxType)]
#[sqlx(type_name = "order_status_enum", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
  Pending,
  Paid,
  Failed,
  Refunded,
  Cancelled,
}

impl OrderStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      OrderStatus::Pending => "pending",
      OrderStatus::Paid => "paid",
      OrderStatus::Failed => "failed",
      OrderStatus::Refunded => "refunded",
      OrderStatus::Cancelled => "cancelled",
    }
  }

  /// `pending -> paid`, `pending -> failed` and `paid -> refunded`; nothing else.
  pub fn can_transition_to(self, next: OrderStatus) -> bool {
    matches!(
      (self, next),
      (OrderStatus::Pending, OrderStatus::Paid)
        | (OrderStatus::Pending, OrderStatus::Failed)
        | (OrderStatus::Paid, OrderStatus::Refunded)
    )
  }
}

impl fmt::Display for OrderStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// One checkout attempt for a program enrollment.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Order {
  pub id: Uuid,
  pub order_number: String,
  pub student_id: Uuid,
  pub program_id: Uuid,
  // Amounts are in minor units (paise for INR).
  pub base_amount: i64,
  pub final_amount: i64,
  pub currency: String,
  pub status: OrderStatus,
  pub gateway: String,
  pub gateway_order_id: String,
  pub gateway_transaction_id: Option<String>,
  pub failure_reason: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Order {
  /// Human-scannable order number: `ORD-{unix millis}-{first 8 hex of student id}`.
  ///
  /// Collisions need the same student checking out twice within one
  /// millisecond; it is not a uniqueness guarantee.
  pub fn generate_number(student_id: Uuid, at: DateTime<Utc>) -> String {
    let fragment: String = student_id.simple().to_string().chars().take(8).collect();
    format!("ORD-{}-{}", at.timestamp_millis(), fragment.to_uppercase())
  }
}

#[derive(Debug, Clone)]
pub struct NewOrder {
  pub order_number: String,
  pub student_id: Uuid,
  pub program_id: Uuid,
  pub amount: i64,
  pub currency: String,
  pub gateway: String,
  pub gateway_order_id: String,
}

/// What the status endpoint reports for an order.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSnapshot {
  pub order_id: String,
  pub order_number: String,
  pub status: OrderStatus,
  pub amount: i64,
  pub currency: String,
  pub student_id: Uuid,
  pub program_id: Uuid,
  pub gateway_transaction_id: Option<String>,
  pub failure_reason: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl From<&Order> for OrderSnapshot {
  fn from(order: &Order) -> Self {
    Self {
      order_id: order.gateway_order_id.clone(),
      order_number: order.order_number.clone(),
      status: order.status,
      amount: order.final_amount,
      currency: order.currency.clone(),
      student_id: order.student_id,
      program_id: order.program_id,
      gateway_transaction_id: order.gateway_transaction_id.clone(),
      failure_reason: order.failure_reason.clone(),
      created_at: order.created_at,
      updated_at: order.updated_at,
    }
  }
}
