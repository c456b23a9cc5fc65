// tests/initiate_tests.rs
mod common;

use common::*;
use enrollment_payments::errors::AppError;
use enrollment_payments::models::OrderStatus;
use enrollment_payments::services::alerts::AlertKind;
use enrollment_payments::services::store::SUPERSEDED_REASON;
use serial_test::serial;
use std::time::Duration;

#[tokio::test]
#[serial]
async fn creates_pending_order_in_minor_units() {
  let app = test_app();
  let (student, program) = ids();

  let checkout = app.initiate(student, program, 1).await.unwrap();

  assert_eq!(checkout.amount, 100);
  assert_eq!(checkout.currency, "INR");
  assert_eq!(checkout.status, OrderStatus::Pending);
  assert!(!checkout.reused);
  assert!(checkout.order_number.starts_with("ORD-"));

  let orders = app.store.orders_for(student, program);
  assert_eq!(orders.len(), 1);
  assert_eq!(orders[0].gateway_order_id, checkout.order_id);
  assert_eq!(orders[0].status, OrderStatus::Pending);
  assert_eq!(orders[0].base_amount, 100);
  assert_eq!(orders[0].gateway, "mock");
  assert_eq!(app.gateway.create_order_calls(), 1);
}

#[tokio::test]
#[serial]
async fn non_positive_amount_never_reaches_gateway() {
  let app = test_app();
  let (student, program) = ids();

  for amount in [0, -1, -500] {
    let err = app.initiate(student, program, amount).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)), "amount {} gave {:?}", amount, err);
  }
  assert_eq!(app.gateway.create_order_calls(), 0);
  assert!(app.store.orders_for(student, program).is_empty());
}

#[tokio::test]
#[serial]
async fn missing_or_malformed_fields_are_validation_errors() {
  let app = test_app();
  let (student, program) = ids();

  let ctx = app.initiate_ctx(student, program, 10);
  ctx.write().email = None;
  let err = app.state.flows.run(ctx).await.unwrap_err();
  assert!(matches!(err, AppError::Validation(m) if m.contains("email")));

  let ctx = app.initiate_ctx(student, program, 10);
  ctx.write().student_id = Some("not-a-uuid".to_string());
  let err = app.state.flows.run(ctx).await.unwrap_err();
  assert!(matches!(err, AppError::Validation(m) if m.contains("studentId")));

  let ctx = app.initiate_ctx(student, program, 10);
  ctx.write().amount = None;
  let err = app.state.flows.run(ctx).await.unwrap_err();
  assert!(matches!(err, AppError::Validation(_)));

  assert_eq!(app.gateway.create_order_calls(), 0);
}

#[tokio::test]
#[serial]
async fn repeated_checkout_with_same_amount_reuses_order() {
  let app = test_app();
  let (student, program) = ids();

  let first = app.initiate(student, program, 499).await.unwrap();
  let second = app.initiate(student, program, 499).await.unwrap();

  assert!(second.reused);
  assert_eq!(second.order_id, first.order_id);
  assert_eq!(second.order_number, first.order_number);
  assert_eq!(app.gateway.create_order_calls(), 1);
  assert_eq!(app.store.orders_for(student, program).len(), 1);
}

#[tokio::test]
#[serial]
async fn checkout_with_new_amount_supersedes_pending_order() {
  let app = test_app();
  let (student, program) = ids();

  let first = app.initiate(student, program, 499).await.unwrap();
  let second = app.initiate(student, program, 299).await.unwrap();

  assert!(!second.reused);
  assert_ne!(second.order_id, first.order_id);
  let orders = app.store.orders_for(student, program);
  let old = orders.iter().find(|o| o.gateway_order_id == first.order_id).unwrap();
  assert_eq!(old.status, OrderStatus::Failed);
  assert_eq!(old.failure_reason.as_deref(), Some(SUPERSEDED_REASON));
  let pending: Vec<_> = orders.iter().filter(|o| o.status == OrderStatus::Pending).collect();
  assert_eq!(pending.len(), 1);
  assert_eq!(pending[0].gateway_order_id, second.order_id);
}

#[tokio::test]
#[serial]
async fn enrolled_student_cannot_check_out_again() {
  let app = test_app();
  let (student, program) = ids();
  app.store.enroll(student, program);

  let err = app.initiate(student, program, 499).await.unwrap_err();

  assert!(matches!(err, AppError::Conflict(_)));
  assert_eq!(app.gateway.create_order_calls(), 0);
}

#[tokio::test]
#[serial]
async fn gateway_failure_surfaces_without_local_order() {
  let app = test_app();
  let (student, program) = ids();
  app.gateway.fail_next_call("503 from upstream");

  let err = app.initiate(student, program, 499).await.unwrap_err();

  assert!(matches!(err, AppError::Gateway(_)));
  assert!(err.is_retryable());
  assert!(app.store.orders_for(student, program).is_empty());
}

#[tokio::test]
#[serial]
async fn slow_gateway_times_out() {
  let app = test_app_with(&[("GATEWAY_TIMEOUT_SECS", "1")]);
  let (student, program) = ids();
  app.gateway.set_delay(Some(Duration::from_millis(1500)));

  let err = app.initiate(student, program, 499).await.unwrap_err();

  assert!(matches!(err, AppError::GatewayTimeout(d) if d == Duration::from_secs(1)));
  assert!(app.store.orders_for(student, program).is_empty());
}

#[tokio::test]
#[serial]
async fn persistence_failure_still_returns_gateway_order_and_alerts() {
  let app = test_app();
  let (student, program) = ids();
  app.store.fail_next_order_insert();

  let ctx = app.initiate_ctx(student, program, 499);
  app.state.flows.run(ctx.clone()).await.unwrap();

  let guard = ctx.read();
  assert!(guard.persistence_failed);
  let checkout = guard.checkout.clone().unwrap();
  assert_eq!(checkout.amount, 49_900);
  assert!(app.store.orders_for(student, program).is_empty());
  assert_eq!(app.alerts.count_of(AlertKind::OrderPersistFailed), 1);
  assert_eq!(app.alerts.raised()[0].gateway_order_id.as_deref(), Some(checkout.order_id.as_str()));
}
