// service/src/pipelines/contexts.rs

//! Data carried through each pipeline run. Handlers receive these wrapped
//! in `enroll_flow::ContextData`.

use crate::errors::{AppError, Result as AppResult};
use crate::models::{Enrollment, Order, OrderStatus};
use crate::services::gateway::{GatewayOrder, GatewayPayment};
use crate::services::store::FinalizeOutcome;
use crate::state::AppState;
use serde::Serialize;
use uuid::Uuid;

/// What the client needs to open the gateway checkout.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutOrder {
  pub order_id: String,
  pub order_number: String,
  pub amount: i64,
  pub currency: String,
  pub status: OrderStatus,
  pub reused: bool,
}

impl CheckoutOrder {
  pub fn from_order(order: &Order, reused: bool) -> Self {
    Self {
      order_id: order.gateway_order_id.clone(),
      order_number: order.order_number.clone(),
      amount: order.base_amount,
      currency: order.currency.clone(),
      status: order.status,
      reused,
    }
  }
}

#[derive(Clone)]
pub struct InitiatePaymentCtxData {
  pub app_state: AppState,
  // Raw request fields.
  pub program_id: Option<String>,
  pub student_id: Option<String>,
  pub amount: Option<i64>,
  pub email: Option<String>,
  pub display_name: Option<String>,
  // Filled by `validate_initiate_input`.
  pub student: Option<Uuid>,
  pub program: Option<Uuid>,
  pub amount_minor: i64,
  pub currency: String,
  // Filled by later steps.
  pub order_number: Option<String>,
  pub reused_order: Option<Order>,
  pub superseded_order: Option<Order>,
  pub gateway_order: Option<GatewayOrder>,
  pub persisted_order: Option<Order>,
  pub persistence_failed: bool,
  pub checkout: Option<CheckoutOrder>,
}

impl InitiatePaymentCtxData {
  pub fn new(
    app_state: AppState,
    program_id: Option<String>,
    student_id: Option<String>,
    amount: Option<i64>,
    email: Option<String>,
    display_name: Option<String>,
  ) -> Self {
    Self {
      app_state,
      program_id,
      student_id,
      amount,
      email,
      display_name,
      student: None,
      program: None,
      amount_minor: 0,
      currency: String::new(),
      order_number: None,
      reused_order: None,
      superseded_order: None,
      gateway_order: None,
      persisted_order: None,
      persistence_failed: false,
      checkout: None,
    }
  }
}

#[derive(Clone)]
pub struct VerifyPaymentCtxData {
  pub app_state: AppState,
  pub gateway_order_id: Option<String>,
  pub gateway_payment_id: Option<String>,
  pub signature: Option<String>,
  pub student_id: Option<String>,
  pub program_id: Option<String>,
  pub student: Option<Uuid>,
  pub program: Option<Uuid>,
  pub order: Option<Order>,
  pub payment: Option<GatewayPayment>,
  pub outcome: Option<FinalizeOutcome>,
}

impl VerifyPaymentCtxData {
  pub fn new(
    app_state: AppState,
    gateway_order_id: Option<String>,
    gateway_payment_id: Option<String>,
    signature: Option<String>,
    student_id: Option<String>,
    program_id: Option<String>,
  ) -> Self {
    Self {
      app_state,
      gateway_order_id,
      gateway_payment_id,
      signature,
      student_id,
      program_id,
      student: None,
      program: None,
      order: None,
      payment: None,
      outcome: None,
    }
  }

  /// Ids after `validate_verify_input` has checked they are present.
  pub fn ids(&self) -> (String, String) {
    (
      self.gateway_order_id.clone().unwrap_or_default(),
      self.gateway_payment_id.clone().unwrap_or_default(),
    )
  }

  pub fn enrollment(&self) -> Option<&Enrollment> {
    self.outcome.as_ref().map(|o| &o.enrollment)
  }
}

#[derive(Clone)]
pub struct ReportFailureCtxData {
  pub app_state: AppState,
  pub gateway_order_id: Option<String>,
  pub reason: Option<String>,
  pub failed_order: Option<Order>,
}

impl std::fmt::Debug for ReportFailureCtxData {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ReportFailureCtxData")
      .field("gateway_order_id", &self.gateway_order_id)
      .field("reason", &self.reason)
      .field("failed_order", &self.failed_order)
      .finish_non_exhaustive()
  }
}

impl ReportFailureCtxData {
  pub fn new(app_state: AppState, gateway_order_id: Option<String>, reason: Option<String>) -> Self {
    Self {
      app_state,
      gateway_order_id,
      reason,
      failed_order: None,
    }
  }
}

/// Parses a required UUID field, naming it in the validation message.
pub fn parse_uuid_field(value: Option<&str>, field: &str) -> AppResult<Uuid> {
  let raw = value
    .map(str::trim)
    .filter(|v| !v.is_empty())
    .ok_or_else(|| AppError::Validation(format!("{} is required.", field)))?;
  Uuid::parse_str(raw).map_err(|_| AppError::Validation(format!("{} must be a valid UUID.", field)))
}

/// A required, non-blank string field.
pub fn required_field(value: Option<&str>, field: &str) -> AppResult<String> {
  value
    .map(str::trim)
    .filter(|v| !v.is_empty())
    .map(str::to_string)
    .ok_or_else(|| AppError::Validation(format!("{} is required.", field)))
}
