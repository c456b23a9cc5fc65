// service/src/pipelines/failure_pipeline.rs

use crate::errors::AppError;
use crate::pipelines::contexts::{required_field, ReportFailureCtxData};
use enroll_flow::{ContextData, FlowRegistry, Pipeline, StepControl};
use tracing::info;

const DEFAULT_FAILURE_REASON: &str = "payment failed at gateway";

pub fn register_failure_pipeline(flows: &FlowRegistry<AppError>) {
  let mut failure_p = Pipeline::<ReportFailureCtxData, AppError>::new(&[
    ("validate_failure_input", false, None),
    ("mark_order_failed", false, None),
  ]);

  failure_p.on_root("validate_failure_input", |ctx_data: ContextData<ReportFailureCtxData>| {
    Box::pin(async move {
      let mut guard = ctx_data.write();
      let order_id = required_field(guard.gateway_order_id.as_deref(), "orderId")?;
      let reason = guard
        .reason
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(DEFAULT_FAILURE_REASON)
        .to_string();
      guard.gateway_order_id = Some(order_id);
      guard.reason = Some(reason);
      Ok::<_, AppError>(StepControl::Continue)
    })
  });

  failure_p.on_root("mark_order_failed", |ctx_data: ContextData<ReportFailureCtxData>| {
    Box::pin(async move {
      let (store, order_id, reason) = {
        let guard = ctx_data.read();
        (
          guard.app_state.store.clone(),
          guard.gateway_order_id.clone().unwrap_or_default(),
          guard.reason.clone().unwrap_or_default(),
        )
      };
      let order = store.mark_order_failed(&order_id, &reason).await?;
      info!(gateway_order_id = %order.gateway_order_id, %reason, "Order marked failed.");
      ctx_data.write().failed_order = Some(order);
      Ok::<_, AppError>(StepControl::Continue)
    })
  });

  flows.register_pipeline(failure_p);
  tracing::info!("Payment failure pipeline registered.");
}
