// service/src/errors.rs

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use enroll_flow::FlowError;
use serde_json::json;
use thiserror::Error;

use crate::models::OrderStatus;

#[derive(Debug, Error)]
pub enum AppError {
  #[error("Validation Error: {0}")]
  Validation(String),

  /// Forged or mismatched gateway signature.
  #[error("Signature Verification Failed: {0}")]
  Signature(String),

  #[error("Resource Not Found: {0}")]
  NotFound(String),

  #[error("Conflict: {0}")]
  Conflict(String),

  #[error("Payment not yet captured (gateway status: {status})")]
  NotCaptured { status: String },

  #[error("Invalid order transition from {from} to {to}")]
  InvalidTransition { from: OrderStatus, to: OrderStatus },

  /// Network, 5xx or decode failure talking to the gateway. Retryable.
  #[error("Payment Gateway Error: {0}")]
  Gateway(String),

  #[error("Payment gateway did not answer within {0:?}")]
  GatewayTimeout(std::time::Duration),

  /// The gateway confirmed money moved but local state could not follow.
  #[error("Data Consistency Error: {0}")]
  Consistency(String),

  #[error("Configuration Error: {0}")]
  Config(String),

  #[error("Database Error: {0}")]
  Sqlx(#[from] sqlx::Error),

  #[error("Workflow Error: {source}")]
  Workflow {
    #[from]
    source: FlowError,
  },

  #[error("Internal Server Error: {0}")]
  Internal(String),
}

impl AppError {
  /// Whether the caller may retry the same request later.
  pub fn is_retryable(&self) -> bool {
    matches!(self, AppError::Gateway(_) | AppError::GatewayTimeout(_))
  }
}

impl From<anyhow::Error> for AppError {
  fn from(err: anyhow::Error) -> Self {
    match err.downcast::<sqlx::Error>() {
      Ok(sqlx_err) => AppError::Sqlx(sqlx_err),
      Err(other) => AppError::Internal(other.to_string()),
    }
  }
}

impl ResponseError for AppError {
  fn status_code(&self) -> StatusCode {
    match self {
      AppError::Validation(_) => StatusCode::BAD_REQUEST,
      AppError::Signature(_) => StatusCode::BAD_REQUEST,
      AppError::NotFound(_) => StatusCode::NOT_FOUND,
      AppError::Conflict(_) | AppError::NotCaptured { .. } | AppError::InvalidTransition { .. } => StatusCode::CONFLICT,
      AppError::Gateway(_) => StatusCode::BAD_GATEWAY,
      AppError::GatewayTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
      // The user has paid; this is accepted and handed to operators.
      AppError::Consistency(_) => StatusCode::ACCEPTED,
      AppError::Config(_) | AppError::Sqlx(_) | AppError::Workflow { .. } | AppError::Internal(_) => {
        StatusCode::INTERNAL_SERVER_ERROR
      }
    }
  }

  fn error_response(&self) -> HttpResponse {
    let status = self.status_code();
    if status.is_server_error() {
      tracing::error!(application_error = %self, "Responding with error");
    } else {
      tracing::warn!(application_error = %self, "Responding with error");
    }

    let body = match self {
      AppError::Validation(m) | AppError::NotFound(m) | AppError::Conflict(m) => json!({ "error": m }),
      AppError::Signature(m) => json!({ "verified": false, "error": m }),
      AppError::NotCaptured { status } => json!({
        "verified": true,
        "captured": false,
        "gatewayStatus": status,
        "error": "Payment has not been captured yet. Retry verification shortly."
      }),
      AppError::InvalidTransition { from, to } => json!({
        "error": self.to_string(),
        "currentStatus": from,
        "requestedStatus": to
      }),
      AppError::Gateway(m) => json!({ "error": "Payment gateway error", "detail": m, "retryable": true }),
      AppError::GatewayTimeout(_) => json!({ "error": self.to_string(), "retryable": true }),
      AppError::Consistency(_) => json!({
        "verified": true,
        "status": "payment_received",
        "enrollment": null,
        "message": "Your payment was received. Enrollment is being completed and will appear shortly."
      }),
      AppError::Config(_) => json!({ "error": "Configuration issue" }),
      AppError::Sqlx(_) => json!({ "error": "Database operation failed" }),
      AppError::Workflow { source } => json!({ "error": "Workflow processing error", "detail": source.to_string() }),
      AppError::Internal(_) => json!({ "error": "An internal error occurred" }),
    };
    HttpResponse::build(status).json(body)
  }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;
