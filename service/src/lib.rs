// service/src/lib.rs

//! Payment and enrollment reconciliation service.
//!
//! A checkout creates a gateway order and a local `pending` order. The client
//! posts the gateway's signed callback back to `/payment/verify`; once the
//! signature checks out and the gateway confirms capture, the order is marked
//! paid and the student enrolled in one transaction. Captured payments that
//! could not be applied stay in the confirmation outbox until the reconciler
//! applies them.

pub mod config;
pub mod errors;
pub mod models;
pub mod pipelines;
pub mod services;
pub mod state;
pub mod telemetry;
pub mod web;

use crate::config::{AppConfig, GatewayKind, StoreBackend};
use crate::errors::{AppError, Result as AppResult};
use crate::services::alerts::TracingAlerts;
use crate::services::gateway::PaymentGateway;
use crate::services::gateway_mock::MockGateway;
use crate::services::razorpay::RazorpayGateway;
use crate::services::store::PaymentStore;
use crate::services::store_memory::InMemoryPaymentStore;
use crate::services::store_pg::PgPaymentStore;
use crate::state::AppState;
use std::sync::Arc;

/// Builds the store, gateway and pipelines the configuration asks for.
pub async fn build_state(config: AppConfig) -> AppResult<AppState> {
  let store: Arc<dyn PaymentStore> = match config.store_backend {
    StoreBackend::Postgres => {
      let url = config
        .database_url
        .as_deref()
        .ok_or_else(|| AppError::Config("DATABASE_URL is required for the postgres store".to_string()))?;
      let store = PgPaymentStore::connect(url).await?;
      if config.run_migrations {
        store.run_migrations().await?;
      }
      Arc::new(store)
    }
    StoreBackend::Memory => {
      tracing::warn!("Using the in-memory store; nothing survives a restart.");
      Arc::new(InMemoryPaymentStore::new())
    }
  };

  let gateway: Arc<dyn PaymentGateway> = match config.gateway.kind {
    GatewayKind::Razorpay => Arc::new(RazorpayGateway::new(config.gateway.clone())?),
    GatewayKind::Mock => {
      tracing::warn!("Using the mock payment gateway.");
      Arc::new(MockGateway::new(
        config.gateway.key_id.clone(),
        config.gateway.key_secret.clone(),
      ))
    }
  };

  Ok(AppState::new(Arc::new(config), store, gateway, Arc::new(TracingAlerts)))
}
