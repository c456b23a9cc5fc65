// service/src/services/gateway_mock.rs

//! In-process gateway used by tests and `PAYMENT_GATEWAY=mock`.
//!
//! It signs callbacks with the real HMAC scheme, so a flow exercised against
//! it goes through the same verification as production.

use crate::errors::{AppError, Result as AppResult};
use crate::services::gateway::{CreateOrderRequest, GatewayOrder, GatewayPayment, PaymentGateway, STATUS_CAPTURED};
use crate::services::signature::SignatureVerifier;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Default)]
struct MockState {
  orders: HashMap<String, GatewayOrder>,
  payments: HashMap<String, GatewayPayment>,
  create_order_calls: usize,
  fetch_payment_calls: usize,
  fail_next: Option<String>,
  delay: Option<Duration>,
}

pub struct MockGateway {
  key_id: String,
  verifier: SignatureVerifier,
  state: Mutex<MockState>,
}

fn short_id(prefix: &str) -> String {
  let raw = Uuid::new_v4().simple().to_string();
  format!("{}_{}", prefix, &raw[..14])
}

impl MockGateway {
  pub fn new(key_id: impl Into<String>, key_secret: impl Into<String>) -> Self {
    Self {
      key_id: key_id.into(),
      verifier: SignatureVerifier::new(key_secret),
      state: Mutex::new(MockState::default()),
    }
  }

  /// Simulates the customer completing checkout with the given gateway status.
  /// Returns the payment id and the signature the client would post back.
  pub fn complete_checkout(&self, gateway_order_id: &str, status: &str) -> (String, String) {
    let mut state = self.state.lock();
    let (amount, currency) = state
      .orders
      .get(gateway_order_id)
      .map(|o| (o.amount, o.currency.clone()))
      .unwrap_or((0, "INR".to_string()));
    let payment_id = short_id("pay");
    let payment = GatewayPayment {
      id: payment_id.clone(),
      order_id: Some(gateway_order_id.to_string()),
      amount,
      currency: currency.clone(),
      status: status.to_string(),
      raw: json!({
        "id": payment_id,
        "entity": "payment",
        "amount": amount,
        "currency": currency,
        "status": status,
        "order_id": gateway_order_id,
      }),
    };
    state.payments.insert(payment_id.clone(), payment);
    let signature = self.verifier.sign(gateway_order_id, &payment_id);
    (payment_id, signature)
  }

  pub fn capture_checkout(&self, gateway_order_id: &str) -> (String, String) {
    self.complete_checkout(gateway_order_id, STATUS_CAPTURED)
  }

  /// Moves a payment along, e.g. from `authorized` to `captured`.
  pub fn set_payment_status(&self, payment_id: &str, status: &str) {
    if let Some(payment) = self.state.lock().payments.get_mut(payment_id) {
      payment.status = status.to_string();
      payment.raw["status"] = json!(status);
    }
  }

  /// Overrides the captured amount, e.g. to simulate a partial capture.
  pub fn set_payment_amount(&self, payment_id: &str, amount: i64) {
    if let Some(payment) = self.state.lock().payments.get_mut(payment_id) {
      payment.amount = amount;
      payment.raw["amount"] = json!(amount);
    }
  }

  pub fn sign(&self, order_id: &str, payment_id: &str) -> String {
    self.verifier.sign(order_id, payment_id)
  }

  /// The next gateway call fails with `AppError::Gateway(message)`.
  pub fn fail_next_call(&self, message: impl Into<String>) {
    self.state.lock().fail_next = Some(message.into());
  }

  /// Every subsequent call sleeps this long before answering.
  pub fn set_delay(&self, delay: Option<Duration>) {
    self.state.lock().delay = delay;
  }

  pub fn create_order_calls(&self) -> usize {
    self.state.lock().create_order_calls
  }

  pub fn fetch_payment_calls(&self) -> usize {
    self.state.lock().fetch_payment_calls
  }

  // Lock is released before any await.
  async fn simulate_network(&self) -> AppResult<()> {
    let (delay, failure) = {
      let mut state = self.state.lock();
      (state.delay, state.fail_next.take())
    };
    if let Some(delay) = delay {
      tokio::time::sleep(delay).await;
    }
    match failure {
      Some(message) => Err(AppError::Gateway(message)),
      None => Ok(()),
    }
  }
}

#[async_trait]
impl PaymentGateway for MockGateway {
  fn name(&self) -> &'static str {
    "mock"
  }

  fn public_key(&self) -> String {
    self.key_id.clone()
  }

  #[instrument(name = "mock_gateway::create_order", skip(self, request), fields(receipt = %request.receipt))]
  async fn create_order(&self, request: CreateOrderRequest) -> AppResult<GatewayOrder> {
    self.state.lock().create_order_calls += 1;
    self.simulate_network().await?;
    if request.amount <= 0 {
      return Err(AppError::Validation("Amount must be greater than zero".to_string()));
    }

    let order = GatewayOrder {
      id: short_id("order"),
      amount: request.amount,
      currency: request.currency,
      status: "created".to_string(),
    };
    info!(gateway_order_id = %order.id, amount = order.amount, "Simulated gateway order.");
    self.state.lock().orders.insert(order.id.clone(), order.clone());
    Ok(order)
  }

  #[instrument(name = "mock_gateway::fetch_payment", skip(self))]
  async fn fetch_payment(&self, payment_id: &str) -> AppResult<GatewayPayment> {
    self.state.lock().fetch_payment_calls += 1;
    self.simulate_network().await?;
    self
      .state
      .lock()
      .payments
      .get(payment_id)
      .cloned()
      .ok_or_else(|| AppError::Validation(format!("Payment gateway rejected payment lookup: {} does not exist", payment_id)))
  }

  fn verify_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
    self.verifier.verify(order_id, payment_id, signature)
  }
}
