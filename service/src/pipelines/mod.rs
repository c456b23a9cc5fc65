// service/src/pipelines/mod.rs

//! Pipelines behind the payment endpoints. Each is keyed by its context type
//! in the shared `FlowRegistry`.

use crate::errors::AppError;
use enroll_flow::FlowRegistry;

pub mod contexts;
pub mod failure_pipeline;
pub mod initiate_pipeline;
pub mod verify_pipeline;

pub fn register_all_pipelines(flows: &FlowRegistry<AppError>) {
  tracing::info!("Registering payment pipelines...");

  initiate_pipeline::register_initiate_pipeline(flows);
  verify_pipeline::register_verify_pipeline(flows);
  failure_pipeline::register_failure_pipeline(flows);

  tracing::info!("All payment pipelines registered.");
}
