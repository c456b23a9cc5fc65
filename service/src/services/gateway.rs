// service/src/services/gateway.rs

//! Contract with the external payment gateway. Flows depend on
//! `Arc<dyn PaymentGateway>` so the production client and test doubles are
//! interchangeable.

use crate::errors::{AppError, Result as AppResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Gateway status for settled funds, as opposed to merely authorized.
pub const STATUS_CAPTURED: &str = "captured";

#[derive(Debug, Clone, Serialize)]
pub struct CreateOrderRequest {
  /// Minor units.
  pub amount: i64,
  pub currency: String,
  pub receipt: String,
  pub notes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayOrder {
  pub id: String,
  pub amount: i64,
  pub currency: String,
  #[serde(default)]
  pub status: String,
}

/// Authoritative payment details as reported by the gateway.
#[derive(Debug, Clone)]
pub struct GatewayPayment {
  pub id: String,
  pub order_id: Option<String>,
  pub amount: i64,
  pub currency: String,
  pub status: String,
  pub raw: JsonValue,
}

impl GatewayPayment {
  pub fn is_captured(&self) -> bool {
    self.status == STATUS_CAPTURED
  }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
  /// Stored on each order as the gateway name.
  fn name(&self) -> &'static str;

  /// Publishable key handed to the checkout client.
  fn public_key(&self) -> String;

  async fn create_order(&self, request: CreateOrderRequest) -> AppResult<GatewayOrder>;

  async fn fetch_payment(&self, payment_id: &str) -> AppResult<GatewayPayment>;

  fn verify_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool;
}

/// Bounds a gateway call. An elapsed limit becomes a retryable
/// `AppError::GatewayTimeout` instead of a hung request.
pub async fn with_gateway_timeout<T>(
  limit: Duration,
  operation: &'static str,
  call: impl Future<Output = AppResult<T>>,
) -> AppResult<T> {
  match tokio::time::timeout(limit, call).await {
    Ok(result) => result,
    Err(_) => {
      warn!(operation, ?limit, "Gateway call timed out.");
      Err(AppError::GatewayTimeout(limit))
    }
  }
}
