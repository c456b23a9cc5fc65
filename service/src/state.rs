// service/src/state.rs

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::pipelines;
use crate::services::alerts::OperatorAlerts;
use crate::services::gateway::PaymentGateway;
use crate::services::store::PaymentStore;
use enroll_flow::FlowRegistry;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
  pub config: Arc<AppConfig>,
  pub store: Arc<dyn PaymentStore>,
  pub gateway: Arc<dyn PaymentGateway>,
  pub alerts: Arc<dyn OperatorAlerts>,
  pub flows: Arc<FlowRegistry<AppError>>,
}

impl AppState {
  /// Wires the collaborators together and registers every pipeline.
  pub fn new(
    config: Arc<AppConfig>,
    store: Arc<dyn PaymentStore>,
    gateway: Arc<dyn PaymentGateway>,
    alerts: Arc<dyn OperatorAlerts>,
  ) -> Self {
    let flows = Arc::new(FlowRegistry::<AppError>::new());
    pipelines::register_all_pipelines(&flows);
    Self {
      config,
      store,
      gateway,
      alerts,
      flows,
    }
  }
}
