// service/src/main.rs

use actix_web::{web as actix_data, App, HttpServer};
use enrollment_payments::config::AppConfig;
use enrollment_payments::services::reconciler::spawn_reconciler;
use enrollment_payments::{build_state, telemetry, web};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
  let app_config = match AppConfig::from_env() {
    Ok(cfg) => cfg,
    Err(e) => {
      eprintln!("Configuration error: {}", e);
      std::process::exit(1);
    }
  };
  telemetry::init_tracing(app_config.log_format);
  tracing::info!(
    store = ?app_config.store_backend,
    gateway = ?app_config.gateway.kind,
    "Starting enrollment payments server..."
  );

  let server_address = format!("{}:{}", app_config.server_host, app_config.server_port);
  let reconcile_interval = app_config.reconcile_interval;

  let app_state = match build_state(app_config).await {
    Ok(state) => state,
    Err(e) => {
      tracing::error!(error = %e, "Failed to initialise application state.");
      std::process::exit(1);
    }
  };

  if let Some(interval) = reconcile_interval {
    spawn_reconciler(app_state.clone(), interval);
    tracing::info!(?interval, "Background reconciliation enabled.");
  }

  tracing::info!("Attempting to bind server to {}...", server_address);
  HttpServer::new(move || {
    App::new()
      .app_data(actix_data::Data::new(app_state.clone()))
      .wrap(tracing_actix_web::TracingLogger::default())
      .configure(web::routes::configure_app_routes)
  })
  .bind(&server_address)?
  .run()
  .await
}
