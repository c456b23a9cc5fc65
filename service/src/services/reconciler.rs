// service/src/services/reconciler.rs

//! Applies captured payments that were recorded but never applied, e.g.
//! because the database failed between recording and finalizing.

use crate::errors::{AppError, Result as AppResult};
use crate::services::alerts::{AlertKind, OperatorAlert};
use crate::state::AppState;
use serde::Serialize;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

pub const DEFAULT_BATCH_SIZE: i64 = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
  pub examined: usize,
  pub applied: usize,
  /// Failed this pass and will be retried on the next one.
  pub failed: usize,
  /// Can never be applied and is no longer retried.
  pub parked: usize,
}

/// No retry can succeed: the order is gone, or its state rules the payment out.
fn is_permanent(err: &AppError) -> bool {
  matches!(
    err,
    AppError::NotFound(_) | AppError::Consistency(_) | AppError::InvalidTransition { .. }
  )
}

/// One pass over up to `batch_size` unapplied confirmations, oldest first.
#[instrument(name = "reconciler::pass", skip(state))]
pub async fn reconcile_once(state: &AppState, batch_size: i64) -> AppResult<ReconcileReport> {
  let pending = state.store.unapplied_confirmations(batch_size).await?;
  let mut report = ReconcileReport::default();

  for confirmation in pending {
    report.examined += 1;
    if !confirmation.is_captured() {
      let reason = format!("gateway status is {}, not captured", confirmation.gateway_status);
      state.store.park_confirmation(&confirmation.gateway_payment_id, &reason).await?;
      report.parked += 1;
      continue;
    }

    match state
      .store
      .finalize_capture(
        &confirmation.gateway_order_id,
        &confirmation.gateway_payment_id,
        confirmation.amount,
      )
      .await
    {
      Ok(outcome) => {
        report.applied += 1;
        info!(
          gateway_order_id = %confirmation.gateway_order_id,
          gateway_payment_id = %confirmation.gateway_payment_id,
          enrollment_id = %outcome.enrollment.id,
          "Reconciled captured payment."
        );
      }
      Err(e) if is_permanent(&e) => {
        report.parked += 1;
        warn!(gateway_payment_id = %confirmation.gateway_payment_id, error = %e, "Parking unappliable payment confirmation.");
        state
          .store
          .park_confirmation(&confirmation.gateway_payment_id, &e.to_string())
          .await?;
        state.alerts.raise(
          OperatorAlert::new(AlertKind::ReconcileFailed, format!("parked: {}", e))
            .order(confirmation.gateway_order_id.clone())
            .payment(confirmation.gateway_payment_id.clone()),
        );
      }
      Err(e) => {
        report.failed += 1;
        warn!(gateway_payment_id = %confirmation.gateway_payment_id, error = %e, "Reconciliation attempt failed.");
        if let Err(note_err) = state
          .store
          .note_confirmation_error(&confirmation.gateway_payment_id, &e.to_string())
          .await
        {
          warn!(error = %note_err, "Could not annotate payment confirmation.");
        }
        state.alerts.raise(
          OperatorAlert::new(AlertKind::ReconcileFailed, e.to_string())
            .order(confirmation.gateway_order_id.clone())
            .payment(confirmation.gateway_payment_id.clone()),
        );
      }
    }
  }

  if report.examined > 0 {
    info!(?report, "Reconciliation pass finished.");
  }
  Ok(report)
}

/// Runs `reconcile_once` every `interval` until the runtime shuts down.
pub fn spawn_reconciler(state: AppState, interval: Duration) -> JoinHandle<()> {
  tokio::spawn(async move {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
      ticker.tick().await;
      if let Err(e) = reconcile_once(&state, DEFAULT_BATCH_SIZE).await {
        error!(error = %e, "Reconciliation pass failed.");
      }
    }
  })
}
