// service/src/web/handlers/payment_handlers.rs

use actix_web::{web, HttpResponse};
use enroll_flow::{ContextData, FlowOutcome};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::errors::AppError;
use crate::models::OrderSnapshot;
use crate::pipelines::contexts::{InitiatePaymentCtxData, ReportFailureCtxData, VerifyPaymentCtxData};
use crate::services::reconciler::{reconcile_once, DEFAULT_BATCH_SIZE};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiatePaymentRequest {
  pub program_id: Option<String>,
  pub student_id: Option<String>,
  pub amount: Option<i64>,
  pub email: Option<String>,
  #[serde(alias = "displayName")]
  pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentRequest {
  #[serde(alias = "razorpay_order_id")]
  pub order_id: Option<String>,
  #[serde(alias = "razorpay_payment_id")]
  pub payment_id: Option<String>,
  #[serde(alias = "razorpay_signature")]
  pub signature: Option<String>,
  pub program_id: Option<String>,
  pub student_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportFailureRequest {
  #[serde(alias = "razorpay_order_id")]
  pub order_id: Option<String>,
  pub reason: Option<String>,
}

fn stopped(flow: &str) -> AppError {
  warn!(flow, "Pipeline stopped without completing.");
  AppError::Internal(format!("{} flow was halted unexpectedly.", flow))
}

#[instrument(name = "handler::initiate_payment", skip(app_state, body))]
pub async fn initiate_payment_handler(
  app_state: web::Data<AppState>,
  body: web::Json<InitiatePaymentRequest>,
) -> Result<HttpResponse, AppError> {
  let body = body.into_inner();
  let ctx_data = ContextData::new(InitiatePaymentCtxData::new(
    app_state.get_ref().clone(),
    body.program_id,
    body.student_id,
    body.amount,
    body.email,
    body.name,
  ));

  match app_state.flows.run(ctx_data.clone()).await? {
    FlowOutcome::Completed => {
      let guard = ctx_data.read();
      let checkout = guard
        .checkout
        .clone()
        .ok_or_else(|| AppError::Internal("Checkout completed without an order.".to_string()))?;
      info!(gateway_order_id = %checkout.order_id, reused = checkout.reused, "Checkout initiated.");
      Ok(HttpResponse::Created().json(json!({
        "orderId": checkout.order_id,
        "orderNumber": checkout.order_number,
        "amount": checkout.amount,
        "currency": checkout.currency,
        "status": checkout.status,
        "reused": checkout.reused,
        "gatewayKey": app_state.gateway.public_key(),
      })))
    }
    FlowOutcome::Stopped => Err(stopped("initiate")),
  }
}

#[instrument(name = "handler::verify_payment", skip(app_state, body))]
pub async fn verify_payment_handler(
  app_state: web::Data<AppState>,
  body: web::Json<VerifyPaymentRequest>,
) -> Result<HttpResponse, AppError> {
  let body = body.into_inner();
  let ctx_data = ContextData::new(VerifyPaymentCtxData::new(
    app_state.get_ref().clone(),
    body.order_id,
    body.payment_id,
    body.signature,
    body.student_id,
    body.program_id,
  ));

  match app_state.flows.run(ctx_data.clone()).await? {
    FlowOutcome::Completed => {
      let guard = ctx_data.read();
      let outcome = guard
        .outcome
        .as_ref()
        .ok_or_else(|| AppError::Internal("Verification completed without an outcome.".to_string()))?;
      Ok(HttpResponse::Ok().json(json!({
        "verified": true,
        "alreadyProcessed": outcome.already_applied,
        "order": OrderSnapshot::from(&outcome.order),
        "enrollment": guard.enrollment(),
      })))
    }
    FlowOutcome::Stopped => Err(stopped("verify")),
  }
}

#[instrument(name = "handler::report_failure", skip(app_state, body))]
pub async fn report_failure_handler(
  app_state: web::Data<AppState>,
  body: web::Json<ReportFailureRequest>,
) -> Result<HttpResponse, AppError> {
  let body = body.into_inner();
  let ctx_data = ContextData::new(ReportFailureCtxData::new(
    app_state.get_ref().clone(),
    body.order_id,
    body.reason,
  ));

  match app_state.flows.run(ctx_data.clone()).await? {
    FlowOutcome::Completed => {
      let guard = ctx_data.read();
      let order = guard
        .failed_order
        .as_ref()
        .ok_or_else(|| AppError::Internal("Failure report completed without an order.".to_string()))?;
      Ok(HttpResponse::Ok().json(json!({
        "acknowledged": true,
        "orderId": order.gateway_order_id,
        "status": order.status,
      })))
    }
    FlowOutcome::Stopped => Err(stopped("failure")),
  }
}

/// Runs one reconciliation pass on demand.
#[instrument(name = "handler::reconcile", skip(app_state))]
pub async fn reconcile_handler(app_state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
  let report = reconcile_once(app_state.get_ref(), DEFAULT_BATCH_SIZE).await?;
  Ok(HttpResponse::Ok().json(report))
}
