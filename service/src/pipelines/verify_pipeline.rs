// service/src/pipelines/verify_pipeline.rs

use crate::errors::AppError;
use crate::models::NewConfirmation;
use crate::pipelines::contexts::{parse_uuid_field, required_field, VerifyPaymentCtxData};
use crate::services::alerts::{AlertKind, OperatorAlert};
use crate::services::gateway::with_gateway_timeout;
use enroll_flow::{ContextData, FlowRegistry, Pipeline, StepControl};
use tracing::{error, event, info, warn, Level};

pub fn register_verify_pipeline(flows: &FlowRegistry<AppError>) {
  let mut verify_p = Pipeline::<VerifyPaymentCtxData, AppError>::new(&[
    ("validate_verify_input", false, None),
    ("verify_payment_signature", false, None),
    ("load_order_for_verification", false, None),
    ("fetch_authoritative_payment", false, None),
    ("record_payment_confirmation", false, None),
    ("finalize_enrollment", false, None),
  ]);

  verify_p.on_root("validate_verify_input", |ctx_data: ContextData<VerifyPaymentCtxData>| {
    Box::pin(async move {
      let mut guard = ctx_data.write();
      let order_id = required_field(guard.gateway_order_id.as_deref(), "orderId")?;
      let payment_id = required_field(guard.gateway_payment_id.as_deref(), "paymentId")?;
      let signature = required_field(guard.signature.as_deref(), "signature")?;
      guard.student = Some(parse_uuid_field(guard.student_id.as_deref(), "studentId")?);
      guard.program = Some(parse_uuid_field(guard.program_id.as_deref(), "programId")?);
      guard.gateway_order_id = Some(order_id);
      guard.gateway_payment_id = Some(payment_id);
      guard.signature = Some(signature);
      Ok::<_, AppError>(StepControl::Continue)
    })
  });

  // Nothing the client claims is trusted until this passes.
  verify_p.on_root("verify_payment_signature", |ctx_data: ContextData<VerifyPaymentCtxData>| {
    Box::pin(async move {
      let valid = {
        let guard = ctx_data.read();
        let (order_id, payment_id) = guard.ids();
        let signature = guard.signature.clone().unwrap_or_default();
        guard.app_state.gateway.verify_signature(&order_id, &payment_id, &signature)
      };
      if !valid {
        let (order_id, payment_id) = ctx_data.read().ids();
        warn!(gateway_order_id = %order_id, gateway_payment_id = %payment_id, "Payment signature rejected.");
        return Err(AppError::Signature("Payment signature does not match.".to_string()));
      }
      Ok::<_, AppError>(StepControl::Continue)
    })
  });

  // A missing order is not fatal yet: the payment may still have been
  // captured and has to be recorded before anything is reported.
  verify_p.on_root("load_order_for_verification", |ctx_data: ContextData<VerifyPaymentCtxData>| {
    Box::pin(async move {
      let (store, order_id, student, program) = {
        let guard = ctx_data.read();
        (guard.app_state.store.clone(), guard.ids().0, guard.student, guard.program)
      };

      match store.find_order_by_gateway_id(&order_id).await? {
        Some(order) => {
          if Some(order.student_id) != student || Some(order.program_id) != program {
            warn!(gateway_order_id = %order_id, "Verification ids do not match the order.");
            return Err(AppError::Validation(
              "Student or program does not match this order.".to_string(),
            ));
          }
          event!(Level::DEBUG, gateway_order_id = %order_id, status = %order.status, "Order loaded for verification.");
          ctx_data.write().order = Some(order);
        }
        None => {
          warn!(gateway_order_id = %order_id, "No local order for verified payment.");
        }
      }
      Ok::<_, AppError>(StepControl::Continue)
    })
  });

  verify_p.on_root("fetch_authoritative_payment", |ctx_data: ContextData<VerifyPaymentCtxData>| {
    Box::pin(async move {
      let (gateway, timeout, (order_id, payment_id)) = {
        let guard = ctx_data.read();
        (
          guard.app_state.gateway.clone(),
          guard.app_state.config.gateway.timeout,
          guard.ids(),
        )
      };

      let payment = with_gateway_timeout(timeout, "fetch_payment", gateway.fetch_payment(&payment_id)).await?;
      if payment.order_id.as_deref() != Some(order_id.as_str()) {
        warn!(
          gateway_order_id = %order_id,
          payment_order_id = ?payment.order_id,
          "Gateway reports the payment under a different order."
        );
        return Err(AppError::Validation("Payment does not belong to this order.".to_string()));
      }
      event!(Level::INFO, gateway_payment_id = %payment.id, status = %payment.status, "Gateway payment fetched.");
      ctx_data.write().payment = Some(payment);
      Ok::<_, AppError>(StepControl::Continue)
    })
  });

  // Only settled funds count; `authorized` and the like are reported back.
  verify_p.after_root("fetch_authoritative_payment", |ctx_data: ContextData<VerifyPaymentCtxData>| {
    Box::pin(async move {
      let status = ctx_data.read().payment.as_ref().map(|p| (p.is_captured(), p.status.clone()));
      match status {
        Some((true, _)) => Ok::<_, AppError>(StepControl::Continue),
        Some((false, status)) => {
          info!(%status, "Payment not captured yet.");
          Err(AppError::NotCaptured { status })
        }
        None => Err(AppError::Internal("Payment missing after gateway lookup.".to_string())),
      }
    })
  });

  verify_p.on_root("record_payment_confirmation", |ctx_data: ContextData<VerifyPaymentCtxData>| {
    Box::pin(async move {
      let (store, alerts, payment, order_id) = {
        let guard = ctx_data.read();
        (
          guard.app_state.store.clone(),
          guard.app_state.alerts.clone(),
          guard.payment.clone(),
          guard.ids().0,
        )
      };
      let payment = payment.ok_or_else(|| AppError::Internal("Payment missing before recording.".to_string()))?;

      let confirmation = NewConfirmation {
        gateway_payment_id: payment.id.clone(),
        gateway_order_id: order_id.clone(),
        amount: payment.amount,
        currency: payment.currency.clone(),
        gateway_status: payment.status.clone(),
        payload: payment.raw.clone(),
      };
      if let Err(e) = store.record_confirmation(confirmation).await {
        error!(gateway_payment_id = %payment.id, error = %e, "Captured payment could not be recorded.");
        alerts.raise(
          OperatorAlert::new(AlertKind::FinalizeFailed, format!("recording confirmation failed: {}", e))
            .order(order_id)
            .payment(payment.id.clone()),
        );
        return Err(AppError::Consistency(
          "Payment received; enrollment is being processed.".to_string(),
        ));
      }
      Ok::<_, AppError>(StepControl::Continue)
    })
  });

  verify_p.on_root("finalize_enrollment", |ctx_data: ContextData<VerifyPaymentCtxData>| {
    Box::pin(async move {
      let (store, alerts, order, payment) = {
        let guard = ctx_data.read();
        (
          guard.app_state.store.clone(),
          guard.app_state.alerts.clone(),
          guard.order.clone(),
          guard.payment.clone(),
        )
      };
      let payment = payment.ok_or_else(|| AppError::Internal("Payment missing before finalizing.".to_string()))?;
      let order_id = ctx_data.read().ids().0;

      let order = match order {
        Some(order) => order,
        None => {
          let detail = format!("captured payment {} has no local order {}", payment.id, order_id);
          if let Err(note_err) = store.note_confirmation_error(&payment.id, &detail).await {
            warn!(error = %note_err, "Could not annotate payment confirmation.");
          }
          alerts.raise(
            OperatorAlert::new(AlertKind::OrderMissingForPayment, detail)
              .order(order_id)
              .payment(payment.id.clone()),
          );
          return Err(AppError::Consistency(
            "Payment received; enrollment is being processed.".to_string(),
          ));
        }
      };

      if payment.amount != order.base_amount {
        alerts.raise(
          OperatorAlert::new(
            AlertKind::AmountMismatch,
            format!("order amount {} but captured {}", order.base_amount, payment.amount),
          )
          .order(order.gateway_order_id.clone())
          .payment(payment.id.clone()),
        );
      }

      match store
        .finalize_capture(&order.gateway_order_id, &payment.id, payment.amount)
        .await
      {
        Ok(outcome) => {
          info!(
            gateway_order_id = %outcome.order.gateway_order_id,
            enrollment_id = %outcome.enrollment.id,
            already_applied = outcome.already_applied,
            "Payment applied."
          );
          ctx_data.write().outcome = Some(outcome);
          Ok::<_, AppError>(StepControl::Continue)
        }
        Err(e) => {
          error!(gateway_order_id = %order.gateway_order_id, error = %e, "Captured payment could not be applied.");
          if let Err(note_err) = store.note_confirmation_error(&payment.id, &e.to_string()).await {
            warn!(error = %note_err, "Could not annotate payment confirmation.");
          }
          alerts.raise(
            OperatorAlert::new(AlertKind::FinalizeFailed, e.to_string())
              .order(order.gateway_order_id.clone())
              .payment(payment.id.clone()),
          );
          Err(AppError::Consistency(
            "Payment received; enrollment is being processed.".to_string(),
          ))
        }
      }
    })
  });

  flows.register_pipeline(verify_p);
  tracing::info!("Verify payment pipeline registered.");
}
