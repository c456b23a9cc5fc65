// service/src/pipelines/initiate_pipeline.rs

use crate::errors::AppError;
use crate::models::{NewOrder, Order, OrderStatus};
use crate::pipelines::contexts::{parse_uuid_field, required_field, CheckoutOrder, InitiatePaymentCtxData};
use crate::services::alerts::{AlertKind, OperatorAlert};
use crate::services::gateway::{with_gateway_timeout, CreateOrderRequest};
use crate::services::store::SUPERSEDED_REASON;
use chrono::Utc;
use enroll_flow::{ContextData, FlowRegistry, Pipeline, SkipCondition, StepControl};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{event, info, warn, Level};

/// Minor units per major unit for the supported currencies (INR paise).
const MINOR_UNITS: i64 = 100;

pub fn register_initiate_pipeline(flows: &FlowRegistry<AppError>) {
  let reusing_order: SkipCondition<InitiatePaymentCtxData> =
    Arc::new(|ctx_data: ContextData<InitiatePaymentCtxData>| ctx_data.read().reused_order.is_some());

  let mut initiate_p = Pipeline::<InitiatePaymentCtxData, AppError>::new(&[
    ("validate_initiate_input", false, None),
    ("check_enrollment_and_inflight_orders", false, None),
    ("create_gateway_order", false, Some(reusing_order.clone())),
    ("persist_pending_order", false, Some(reusing_order)),
  ]);

  // Step 1: reject bad input before anything leaves the process.
  initiate_p.on_root("validate_initiate_input", |ctx_data: ContextData<InitiatePaymentCtxData>| {
    Box::pin(async move {
      let (program_id, student_id, amount, email, currency) = {
        let guard = ctx_data.read();
        (
          guard.program_id.clone(),
          guard.student_id.clone(),
          guard.amount,
          guard.email.clone(),
          guard.app_state.config.gateway.currency.clone(),
        )
      };

      let program = parse_uuid_field(program_id.as_deref(), "programId")?;
      let student = parse_uuid_field(student_id.as_deref(), "studentId")?;
      let amount = amount.ok_or_else(|| AppError::Validation("amount is required.".to_string()))?;
      if amount <= 0 {
        warn!(amount, "Rejected non-positive checkout amount.");
        return Err(AppError::Validation("Amount must be greater than zero.".to_string()));
      }
      let amount_minor = amount
        .checked_mul(MINOR_UNITS)
        .ok_or_else(|| AppError::Validation("Amount is too large.".to_string()))?;
      let email = required_field(email.as_deref(), "email")?;
      if !email.contains('@') {
        return Err(AppError::Validation("A valid email is required.".to_string()));
      }

      {
        let mut guard = ctx_data.write();
        guard.program = Some(program);
        guard.student = Some(student);
        guard.amount_minor = amount_minor;
        guard.currency = currency;
        guard.email = Some(email);
      }
      event!(Level::DEBUG, %student, %program, amount_minor, "Checkout input validated.");
      Ok::<_, AppError>(StepControl::Continue)
    })
  });

  // Step 2: one in-flight order per (student, program).
  initiate_p.on_root(
    "check_enrollment_and_inflight_orders",
    |ctx_data: ContextData<InitiatePaymentCtxData>| {
      Box::pin(async move {
        let (store, student, program, amount_minor) = {
          let guard = ctx_data.read();
          (guard.app_state.store.clone(), guard.student, guard.program, guard.amount_minor)
        };
        let (student, program) = match (student, program) {
          (Some(s), Some(p)) => (s, p),
          _ => return Err(AppError::Internal("Checkout ids missing after validation.".to_string())),
        };

        if store.find_enrollment(student, program).await?.is_some() {
          info!(%student, %program, "Student already enrolled; refusing new checkout.");
          return Err(AppError::Conflict("Student is already enrolled in this program.".to_string()));
        }

        if let Some(pending) = store.find_pending_order(student, program).await? {
          if pending.base_amount == amount_minor {
            info!(gateway_order_id = %pending.gateway_order_id, "Reusing in-flight order.");
            let checkout = CheckoutOrder::from_order(&pending, true);
            let mut guard = ctx_data.write();
            guard.order_number = Some(pending.order_number.clone());
            guard.checkout = Some(checkout);
            guard.reused_order = Some(pending);
          } else {
            info!(
              gateway_order_id = %pending.gateway_order_id,
              old_amount = pending.base_amount,
              new_amount = amount_minor,
              "Superseding in-flight order with a different amount."
            );
            let superseded = store.mark_order_failed(&pending.gateway_order_id, SUPERSEDED_REASON).await?;
            ctx_data.write().superseded_order = Some(superseded);
          }
        }
        Ok::<_, AppError>(StepControl::Continue)
      })
    },
  );

  // Step 3: create the order on the gateway side.
  initiate_p.on_root("create_gateway_order", |ctx_data: ContextData<InitiatePaymentCtxData>| {
    Box::pin(async move {
      let (gateway, timeout, student, program, amount_minor, currency, email, display_name) = {
        let guard = ctx_data.read();
        (
          guard.app_state.gateway.clone(),
          guard.app_state.config.gateway.timeout,
          guard.student,
          guard.program,
          guard.amount_minor,
          guard.currency.clone(),
          guard.email.clone().unwrap_or_default(),
          guard.display_name.clone(),
        )
      };
      let (student, program) = match (student, program) {
        (Some(s), Some(p)) => (s, p),
        _ => return Err(AppError::Internal("Checkout ids missing after validation.".to_string())),
      };

      let order_number = Order::generate_number(student, Utc::now());
      let mut notes = BTreeMap::new();
      notes.insert("student_id".to_string(), student.to_string());
      notes.insert("program_id".to_string(), program.to_string());
      notes.insert("email".to_string(), email);
      if let Some(name) = display_name.filter(|n| !n.trim().is_empty()) {
        notes.insert("name".to_string(), name);
      }
      let request = CreateOrderRequest {
        amount: amount_minor,
        currency,
        receipt: order_number.clone(),
        notes,
      };

      let gateway_order = with_gateway_timeout(timeout, "create_order", gateway.create_order(request)).await?;
      event!(Level::INFO, gateway_order_id = %gateway_order.id, %order_number, "Gateway order created.");

      let mut guard = ctx_data.write();
      guard.checkout = Some(CheckoutOrder {
        order_id: gateway_order.id.clone(),
        order_number: order_number.clone(),
        amount: gateway_order.amount,
        currency: gateway_order.currency.clone(),
        status: OrderStatus::Pending,
        reused: false,
      });
      guard.order_number = Some(order_number);
      guard.gateway_order = Some(gateway_order);
      Ok::<_, AppError>(StepControl::Continue)
    })
  });

  // Step 4: save the pending order. The gateway order already exists, so a
  // failure here is alerted and the checkout still proceeds.
  initiate_p.on_root("persist_pending_order", |ctx_data: ContextData<InitiatePaymentCtxData>| {
    Box::pin(async move {
      let (store, alerts, gateway_name, student, program, amount_minor, currency, order_number, gateway_order) = {
        let guard = ctx_data.read();
        (
          guard.app_state.store.clone(),
          guard.app_state.alerts.clone(),
          guard.app_state.gateway.name(),
          guard.student,
          guard.program,
          guard.amount_minor,
          guard.currency.clone(),
          guard.order_number.clone(),
          guard.gateway_order.clone(),
        )
      };
      let (student, program, order_number, gateway_order) = match (student, program, order_number, gateway_order) {
        (Some(s), Some(p), Some(n), Some(g)) => (s, p, n, g),
        _ => return Err(AppError::Internal("Gateway order missing before persistence.".to_string())),
      };

      let new_order = NewOrder {
        order_number,
        student_id: student,
        program_id: program,
        amount: amount_minor,
        currency,
        gateway: gateway_name.to_string(),
        gateway_order_id: gateway_order.id.clone(),
      };
      match store.insert_order(new_order).await {
        Ok(order) => {
          info!(order_id = %order.id, gateway_order_id = %order.gateway_order_id, "Pending order saved.");
          ctx_data.write().persisted_order = Some(order);
        }
        Err(e) => {
          warn!(gateway_order_id = %gateway_order.id, error = %e, "Pending order was not saved.");
          alerts.raise(
            OperatorAlert::new(AlertKind::OrderPersistFailed, e.to_string()).order(gateway_order.id.clone()),
          );
          ctx_data.write().persistence_failed = true;
        }
      }
      Ok::<_, AppError>(StepControl::Continue)
    })
  });

  flows.register_pipeline(initiate_p);
  tracing::info!("Initiate payment pipeline registered.");
}
