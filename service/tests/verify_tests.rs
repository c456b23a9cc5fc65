// tests/verify_tests.rs
mod common;

use common::*;
use enroll_flow::FlowOutcome;
use enrollment_payments::errors::AppError;
use enrollment_payments::models::{NewConfirmation, OrderStatus};
use enrollment_payments::services::alerts::AlertKind;
use enrollment_payments::services::reconciler::reconcile_once;
use enrollment_payments::services::store::PaymentStore;
use serde_json::json;
use serial_test::serial;

#[tokio::test]
#[serial]
async fn captured_payment_marks_order_paid_and_enrolls_once() {
  let app = test_app();
  let (student, program) = ids();
  let checkout = app.initiate(student, program, 1).await.unwrap();
  let (payment_id, signature) = app.gateway.capture_checkout(&checkout.order_id);

  let (ctx, result) = app.verify(&checkout.order_id, &payment_id, &signature, student, program).await;

  assert_eq!(result.unwrap(), FlowOutcome::Completed);
  let guard = ctx.read();
  let outcome = guard.outcome.as_ref().unwrap();
  assert!(!outcome.already_applied);
  assert_eq!(outcome.order.status, OrderStatus::Paid);
  assert_eq!(outcome.order.gateway_transaction_id.as_deref(), Some(payment_id.as_str()));
  assert_eq!(outcome.order.final_amount, 100);
  assert_eq!(outcome.enrollment.student_id, student);
  assert_eq!(outcome.enrollment.program_id, program);
  assert_eq!(outcome.enrollment.order_id, Some(outcome.order.id));
  assert_eq!(app.store.enrollment_count(), 1);

  let confirmation = app.store.confirmation(&payment_id).unwrap();
  assert!(confirmation.applied_at.is_some());
  assert_eq!(confirmation.payload["status"], "captured");
}

#[tokio::test]
#[serial]
async fn tampered_signature_changes_nothing() {
  let app = test_app();
  let (student, program) = ids();
  let checkout = app.initiate(student, program, 1).await.unwrap();
  let (payment_id, signature) = app.gateway.capture_checkout(&checkout.order_id);
  let mut tampered: Vec<char> = signature.chars().collect();
  tampered[10] = if tampered[10] == 'a' { 'b' } else { 'a' };
  let tampered: String = tampered.into_iter().collect();

  let (_, result) = app.verify(&checkout.order_id, &payment_id, &tampered, student, program).await;

  assert!(matches!(result, Err(AppError::Signature(_))));
  assert_eq!(app.gateway.fetch_payment_calls(), 0);
  let order = app.store.orders_for(student, program).remove(0);
  assert_eq!(order.status, OrderStatus::Pending);
  assert_eq!(app.store.enrollment_count(), 0);
  assert!(app.store.confirmation(&payment_id).is_none());
}

#[tokio::test]
#[serial]
async fn signature_for_another_order_is_rejected() {
  let app = test_app();
  let (student, program) = ids();
  let checkout = app.initiate(student, program, 1).await.unwrap();
  let (payment_id, _) = app.gateway.capture_checkout(&checkout.order_id);
  let foreign = app.gateway.sign("order_someoneelse", &payment_id);

  let (_, result) = app.verify(&checkout.order_id, &payment_id, &foreign, student, program).await;

  assert!(matches!(result, Err(AppError::Signature(_))));
  assert_eq!(app.store.enrollment_count(), 0);
}

#[tokio::test]
#[serial]
async fn authorized_but_not_captured_is_reported_not_failed() {
  let app = test_app();
  let (student, program) = ids();
  let checkout = app.initiate(student, program, 1).await.unwrap();
  let (payment_id, signature) = app.gateway.complete_checkout(&checkout.order_id, "authorized");

  let (_, result) = app.verify(&checkout.order_id, &payment_id, &signature, student, program).await;

  assert!(matches!(result, Err(AppError::NotCaptured { ref status }) if status == "authorized"));
  let order = app.store.orders_for(student, program).remove(0);
  assert_eq!(order.status, OrderStatus::Pending);
  assert_eq!(app.store.enrollment_count(), 0);
  assert!(app.store.confirmation(&payment_id).is_none());

  // Once the gateway settles, the same callback goes through.
  app.gateway.set_payment_status(&payment_id, "captured");
  let (_, result) = app.verify(&checkout.order_id, &payment_id, &signature, student, program).await;
  assert_eq!(result.unwrap(), FlowOutcome::Completed);
  assert_eq!(app.store.enrollment_count(), 1);
}

#[tokio::test]
#[serial]
async fn verifying_twice_is_idempotent() {
  let app = test_app();
  let (student, program) = ids();
  let checkout = app.initiate(student, program, 1).await.unwrap();
  let (payment_id, signature) = app.gateway.capture_checkout(&checkout.order_id);

  let (first, _) = app.verify(&checkout.order_id, &payment_id, &signature, student, program).await;
  let (second, result) = app.verify(&checkout.order_id, &payment_id, &signature, student, program).await;

  assert_eq!(result.unwrap(), FlowOutcome::Completed);
  let first_enrollment = first.read().outcome.as_ref().unwrap().enrollment.id;
  let guard = second.read();
  let outcome = guard.outcome.as_ref().unwrap();
  assert!(outcome.already_applied);
  assert_eq!(outcome.enrollment.id, first_enrollment);
  assert_eq!(app.store.enrollment_count(), 1);
}

#[tokio::test]
#[serial]
async fn second_payment_for_paid_order_is_a_consistency_error() {
  let app = test_app();
  let (student, program) = ids();
  let checkout = app.initiate(student, program, 1).await.unwrap();
  let (first_payment, first_sig) = app.gateway.capture_checkout(&checkout.order_id);
  let (second_payment, second_sig) = app.gateway.capture_checkout(&checkout.order_id);

  app.verify(&checkout.order_id, &first_payment, &first_sig, student, program).await.1.unwrap();
  let (_, result) = app.verify(&checkout.order_id, &second_payment, &second_sig, student, program).await;

  assert!(matches!(result, Err(AppError::Consistency(_))));
  assert_eq!(app.alerts.count_of(AlertKind::FinalizeFailed), 1);
  let stranded = app.store.confirmation(&second_payment).unwrap();
  assert!(stranded.applied_at.is_none());
  assert!(stranded.last_error.is_some());
  assert_eq!(app.store.enrollment_count(), 1);
}

#[tokio::test]
#[serial]
async fn mismatched_student_is_rejected_before_gateway_lookup() {
  let app = test_app();
  let (student, program) = ids();
  let checkout = app.initiate(student, program, 1).await.unwrap();
  let (payment_id, signature) = app.gateway.capture_checkout(&checkout.order_id);
  let (intruder, _) = ids();

  let (_, result) = app.verify(&checkout.order_id, &payment_id, &signature, intruder, program).await;

  assert!(matches!(result, Err(AppError::Validation(_))));
  assert_eq!(app.gateway.fetch_payment_calls(), 0);
  assert_eq!(app.store.enrollment_count(), 0);
}

#[tokio::test]
#[serial]
async fn failed_finalize_rolls_back_and_reconciler_completes_it() {
  let app = test_app();
  let (student, program) = ids();
  let checkout = app.initiate(student, program, 1).await.unwrap();
  let (payment_id, signature) = app.gateway.capture_checkout(&checkout.order_id);
  app.store.fail_next_finalize();

  let (_, result) = app.verify(&checkout.order_id, &payment_id, &signature, student, program).await;

  assert!(matches!(result, Err(AppError::Consistency(_))));
  let order = app.store.orders_for(student, program).remove(0);
  assert_eq!(order.status, OrderStatus::Pending);
  assert_eq!(app.store.enrollment_count(), 0);
  assert_eq!(app.alerts.count_of(AlertKind::FinalizeFailed), 1);
  assert!(app.store.confirmation(&payment_id).unwrap().last_error.is_some());

  let report = reconcile_once(&app.state, 10).await.unwrap();

  assert_eq!(report.examined, 1);
  assert_eq!(report.applied, 1);
  assert_eq!(report.failed, 0);
  let order = app.store.orders_for(student, program).remove(0);
  assert_eq!(order.status, OrderStatus::Paid);
  assert_eq!(app.store.enrollment_count(), 1);
  let confirmation = app.store.confirmation(&payment_id).unwrap();
  assert!(confirmation.applied_at.is_some());
  assert!(confirmation.last_error.is_none());

  let again = reconcile_once(&app.state, 10).await.unwrap();
  assert_eq!(again.examined, 0);
}

#[tokio::test]
#[serial]
async fn payment_for_unsaved_order_is_recorded_for_operators() {
  let app = test_app();
  let (student, program) = ids();
  app.store.fail_next_order_insert();
  let checkout = app.initiate(student, program, 1).await.unwrap();
  let (payment_id, signature) = app.gateway.capture_checkout(&checkout.order_id);

  let (_, result) = app.verify(&checkout.order_id, &payment_id, &signature, student, program).await;

  assert!(matches!(result, Err(AppError::Consistency(_))));
  assert_eq!(app.alerts.count_of(AlertKind::OrderMissingForPayment), 1);
  let confirmation = app.store.confirmation(&payment_id).unwrap();
  assert!(confirmation.applied_at.is_none());

  let report = reconcile_once(&app.state, 10).await.unwrap();
  assert_eq!(report.parked, 1);
  assert_eq!(report.failed, 0);
  assert_eq!(app.alerts.count_of(AlertKind::ReconcileFailed), 1);
  assert!(app.store.confirmation(&payment_id).unwrap().parked_at.is_some());

  let again = reconcile_once(&app.state, 10).await.unwrap();
  assert_eq!(again.examined, 0);
  assert_eq!(app.alerts.count_of(AlertKind::ReconcileFailed), 1);
}

fn orphan_confirmation(payment_id: &str, order_id: &str) -> NewConfirmation {
  NewConfirmation {
    gateway_payment_id: payment_id.to_string(),
    gateway_order_id: order_id.to_string(),
    amount: 100,
    currency: "INR".to_string(),
    gateway_status: "captured".to_string(),
    payload: json!({ "id": payment_id, "status": "captured" }),
  }
}

#[tokio::test]
#[serial]
async fn unappliable_confirmations_do_not_starve_newer_ones() {
  let app = test_app();
  for n in 0..3 {
    app
      .store
      .record_confirmation(orphan_confirmation(&format!("pay_orphan_{}", n), &format!("order_gone_{}", n)))
      .await
      .unwrap();
  }
  let (student, program) = ids();
  let checkout = app.initiate(student, program, 1).await.unwrap();
  let (payment_id, signature) = app.gateway.capture_checkout(&checkout.order_id);
  app.store.fail_next_finalize();
  let (_, result) = app.verify(&checkout.order_id, &payment_id, &signature, student, program).await;
  assert!(matches!(result, Err(AppError::Consistency(_))));

  let mut parked = 0;
  for _ in 0..3 {
    let report = reconcile_once(&app.state, 2).await.unwrap();
    assert_eq!(report.failed, 0);
    parked += report.parked;
  }

  assert_eq!(parked, 3);
  let order = app.store.orders_for(student, program).remove(0);
  assert_eq!(order.status, OrderStatus::Paid);
  assert_eq!(app.store.enrollment_count(), 1);
  assert_eq!(app.alerts.count_of(AlertKind::ReconcileFailed), 3);
  assert_eq!(reconcile_once(&app.state, 2).await.unwrap().examined, 0);
}

#[tokio::test]
#[serial]
async fn transient_reconcile_failure_is_retried_not_parked() {
  let app = test_app();
  let (student, program) = ids();
  let checkout = app.initiate(student, program, 1).await.unwrap();
  let (payment_id, signature) = app.gateway.capture_checkout(&checkout.order_id);
  app.store.fail_next_finalize();
  app.verify(&checkout.order_id, &payment_id, &signature, student, program).await.1.unwrap_err();

  app.store.fail_next_finalize();
  let first = reconcile_once(&app.state, 10).await.unwrap();
  assert_eq!(first.failed, 1);
  assert_eq!(first.parked, 0);
  assert!(app.store.confirmation(&payment_id).unwrap().parked_at.is_none());

  let second = reconcile_once(&app.state, 10).await.unwrap();
  assert_eq!(second.applied, 1);
  assert_eq!(app.store.enrollment_count(), 1);
}

#[tokio::test]
#[serial]
async fn missing_callback_fields_are_validation_errors() {
  let app = test_app();
  let (student, program) = ids();

  let ctx = app.verify_ctx("order_1", "pay_1", "sig", student, program);
  ctx.write().signature = Some("   ".to_string());
  let err = app.state.flows.run(ctx).await.unwrap_err();

  assert!(matches!(err, AppError::Validation(m) if m.contains("signature")));
}

#[tokio::test]
#[serial]
async fn captured_amount_mismatch_is_applied_and_alerted() {
  let app = test_app();
  let (student, program) = ids();
  let checkout = app.initiate(student, program, 10).await.unwrap();
  let (payment_id, signature) = app.gateway.capture_checkout(&checkout.order_id);
  app.gateway.set_payment_amount(&payment_id, 900);

  let (ctx, result) = app.verify(&checkout.order_id, &payment_id, &signature, student, program).await;

  assert_eq!(result.unwrap(), FlowOutcome::Completed);
  assert_eq!(ctx.read().outcome.as_ref().unwrap().order.final_amount, 900);
  assert_eq!(app.alerts.count_of(AlertKind::AmountMismatch), 1);
}
