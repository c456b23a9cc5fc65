// tests/common/mod.rs
#![allow(dead_code)]

use enroll_flow::{ContextData, FlowOutcome};
use enrollment_payments::config::AppConfig;
use enrollment_payments::errors::AppError;
use enrollment_payments::pipelines::contexts::{CheckoutOrder, InitiatePaymentCtxData, VerifyPaymentCtxData};
use enrollment_payments::services::alerts::RecordingAlerts;
use enrollment_payments::services::gateway_mock::MockGateway;
use enrollment_payments::services::store_memory::InMemoryPaymentStore;
use enrollment_payments::state::AppState;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::Level;
use uuid::Uuid;

pub const TEST_KEY_ID: &str = "rzp_test_key";
pub const TEST_SECRET: &str = "test_webhook_secret";

static TRACING: Lazy<()> = Lazy::new(|| {
  let _ = tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING);
}

/// Application state over the in-memory store and mock gateway, plus handles
/// to both for arranging and asserting.
pub struct TestApp {
  pub state: AppState,
  pub store: InMemoryPaymentStore,
  pub gateway: Arc<MockGateway>,
  pub alerts: RecordingAlerts,
}

pub fn test_app() -> TestApp {
  test_app_with(&[])
}

pub fn test_app_with(overrides: &[(&str, &str)]) -> TestApp {
  setup_tracing();
  let mut env: HashMap<String, String> = [
    ("PAYMENT_STORE", "memory"),
    ("PAYMENT_GATEWAY", "mock"),
    ("RAZORPAY_KEY_ID", TEST_KEY_ID),
    ("RAZORPAY_KEY_SECRET", TEST_SECRET),
    ("RECONCILE_INTERVAL_SECS", "0"),
  ]
  .iter()
  .map(|(k, v)| (k.to_string(), v.to_string()))
  .collect();
  for (k, v) in overrides {
    env.insert(k.to_string(), v.to_string());
  }
  let config = AppConfig::from_lookup(|key| env.get(key).cloned()).expect("test config");

  let store = InMemoryPaymentStore::new();
  let gateway = Arc::new(MockGateway::new(TEST_KEY_ID, TEST_SECRET));
  let alerts = RecordingAlerts::new();
  let state = AppState::new(
    Arc::new(config),
    Arc::new(store.clone()),
    gateway.clone(),
    Arc::new(alerts.clone()),
  );
  TestApp {
    state,
    store,
    gateway,
    alerts,
  }
}

pub fn ids() -> (Uuid, Uuid) {
  (Uuid::new_v4(), Uuid::new_v4())
}

impl TestApp {
  pub fn initiate_ctx(&self, student: Uuid, program: Uuid, amount: i64) -> ContextData<InitiatePaymentCtxData> {
    ContextData::new(InitiatePaymentCtxData::new(
      self.state.clone(),
      Some(program.to_string()),
      Some(student.to_string()),
      Some(amount),
      Some("student@example.com".to_string()),
      Some("Asha Rao".to_string()),
    ))
  }

  /// Runs the initiate flow and returns what the client would be sent.
  pub async fn initiate(&self, student: Uuid, program: Uuid, amount: i64) -> Result<CheckoutOrder, AppError> {
    let ctx = self.initiate_ctx(student, program, amount);
    match self.state.flows.run(ctx.clone()).await? {
      FlowOutcome::Completed => ctx
        .read()
        .checkout
        .clone()
        .ok_or_else(|| AppError::Internal("no checkout".to_string())),
      FlowOutcome::Stopped => Err(AppError::Internal("initiate stopped".to_string())),
    }
  }

  pub fn verify_ctx(
    &self,
    order_id: &str,
    payment_id: &str,
    signature: &str,
    student: Uuid,
    program: Uuid,
  ) -> ContextData<VerifyPaymentCtxData> {
    ContextData::new(VerifyPaymentCtxData::new(
      self.state.clone(),
      Some(order_id.to_string()),
      Some(payment_id.to_string()),
      Some(signature.to_string()),
      Some(student.to_string()),
      Some(program.to_string()),
    ))
  }

  pub async fn verify(
    &self,
    order_id: &str,
    payment_id: &str,
    signature: &str,
    student: Uuid,
    program: Uuid,
  ) -> (ContextData<VerifyPaymentCtxData>, Result<FlowOutcome, AppError>) {
    let ctx = self.verify_ctx(order_id, payment_id, signature, student, program);
    let result = self.state.flows.run(ctx.clone()).await;
    (ctx, result)
  }
}
