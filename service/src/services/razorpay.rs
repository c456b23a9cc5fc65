// service/src/services/razorpay.rs

use crate::config::GatewayConfig;
use crate::errors::{AppError, Result as AppResult};
use crate::services::gateway::{CreateOrderRequest, GatewayOrder, GatewayPayment, PaymentGateway};
use crate::services::signature::SignatureVerifier;
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::Value as JsonValue;
use tracing::{info, instrument, warn};

/// Razorpay REST client (`/orders`, `/payments/{id}`) with basic auth.
pub struct RazorpayGateway {
  http: Client,
  config: GatewayConfig,
  verifier: SignatureVerifier,
}

impl RazorpayGateway {
  pub fn new(config: GatewayConfig) -> AppResult<Self> {
    let http = Client::builder()
      .timeout(config.timeout)
      .build()
      .map_err(|e| AppError::Config(format!("Failed to build gateway HTTP client: {}", e)))?;
    let verifier = SignatureVerifier::new(config.key_secret.clone());
    Ok(Self { http, config, verifier })
  }

  fn map_transport_error(&self, err: reqwest::Error) -> AppError {
    if err.is_timeout() {
      AppError::GatewayTimeout(self.config.timeout)
    } else {
      AppError::Gateway(err.to_string())
    }
  }

  async fn read_json(&self, response: Response, operation: &str) -> AppResult<JsonValue> {
    let status = response.status();
    if status.is_success() {
      return response.json().await.map_err(|e| self.map_transport_error(e));
    }
    // Rejections can come from a proxy in front of the API, with no JSON body.
    let body = response.bytes().await.unwrap_or_default();
    Err(rejection_error(status, &body, operation))
  }
}

fn rejection_error(status: StatusCode, body: &[u8], operation: &str) -> AppError {
  let description = serde_json::from_slice::<JsonValue>(body)
    .ok()
    .and_then(|v| v.pointer("/error/description").and_then(JsonValue::as_str).map(str::to_string))
    .unwrap_or_else(|| "no description".to_string());
  warn!(operation, %status, %description, "Gateway rejected request.");
  if status.is_client_error() {
    AppError::Validation(format!("Payment gateway rejected {}: {}", operation, description))
  } else {
    AppError::Gateway(format!("{} failed with {}: {}", operation, status, description))
  }
}

fn payment_from_json(raw: JsonValue) -> AppResult<GatewayPayment> {
  let text = |key: &str| raw.get(key).and_then(JsonValue::as_str).map(str::to_string);
  let id = text("id").ok_or_else(|| AppError::Gateway("payment response has no id".to_string()))?;
  let status = text("status").ok_or_else(|| AppError::Gateway("payment response has no status".to_string()))?;
  let amount = raw
    .get("amount")
    .and_then(JsonValue::as_i64)
    .ok_or_else(|| AppError::Gateway("payment response has no amount".to_string()))?;
  Ok(GatewayPayment {
    id,
    order_id: text("order_id"),
    amount,
    currency: text("currency").unwrap_or_default(),
    status,
    raw,
  })
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
  fn name(&self) -> &'static str {
    "razorpay"
  }

  fn public_key(&self) -> String {
    self.config.key_id.clone()
  }

  #[instrument(name = "razorpay::create_order", skip(self, request), fields(receipt = %request.receipt, amount = request.amount), err(Display))]
  async fn create_order(&self, request: CreateOrderRequest) -> AppResult<GatewayOrder> {
    let response = self
      .http
      .post(format!("{}/orders", self.config.api_base))
      .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
      .json(&request)
      .send()
      .await
      .map_err(|e| self.map_transport_error(e))?;
    let body = self.read_json(response, "order creation").await?;
    let order: GatewayOrder =
      serde_json::from_value(body).map_err(|e| AppError::Gateway(format!("Unexpected order payload: {}", e)))?;
    info!(gateway_order_id = %order.id, "Gateway order created.");
    Ok(order)
  }

  #[instrument(name = "razorpay::fetch_payment", skip(self), err(Display))]
  async fn fetch_payment(&self, payment_id: &str) -> AppResult<GatewayPayment> {
    let response = self
      .http
      .get(format!("{}/payments/{}", self.config.api_base, payment_id))
      .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
      .send()
      .await
      .map_err(|e| self.map_transport_error(e))?;
    let body = self.read_json(response, "payment lookup").await?;
    payment_from_json(body)
  }

  fn verify_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
    self.verifier.verify(order_id, payment_id, signature)
  }
}
