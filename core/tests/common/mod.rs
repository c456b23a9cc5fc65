// tests/common/mod.rs
#![allow(dead_code)]

use enroll_flow::{ContextData, FlowError, Handler, StepControl};
use once_cell::sync::Lazy;
use tracing::Level;

#[derive(Clone, Debug, Default)]
pub struct CheckoutTrace {
  pub attempts: i32,
  pub steps_executed: Vec<String>,
  pub stop_at: Option<String>,
  pub reuse_existing: bool,
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum TestError {
  #[error("flow error: {0}")]
  Flow(String),

  #[error("step failed: {0}")]
  Step(String),
}

impl From<FlowError> for TestError {
  fn from(e: FlowError) -> Self {
    TestError::Flow(format!("{:?}", e))
  }
}

pub fn recording_handler(step_name: &'static str) -> Handler<CheckoutTrace, TestError> {
  Box::new(move |ctx: ContextData<CheckoutTrace>| {
    Box::pin(async move {
      let mut guard = ctx.write();
      guard.attempts += 1;
      guard.steps_executed.push(step_name.to_string());
      if guard.stop_at.as_deref() == Some(step_name) {
        return Ok(StepControl::Stop);
      }
      Ok(StepControl::Continue)
    })
  })
}

pub fn failing_handler(step_name: &'static str, message: &'static str) -> Handler<CheckoutTrace, TestError> {
  Box::new(move |ctx: ContextData<CheckoutTrace>| {
    Box::pin(async move {
      ctx.write().steps_executed.push(step_name.to_string());
      Err(TestError::Step(message.to_string()))
    })
  })
}

static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init()
    .ok();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}
