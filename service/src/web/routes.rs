// service/src/web/routes.rs

use crate::errors::AppError;
use crate::web::handlers::{payment_handlers, status_handlers};
use actix_web::web;

async fn health_check_handler() -> actix_web::HttpResponse {
  actix_web::HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

/// Malformed JSON bodies get the same error shape as every other validation failure.
fn json_config() -> web::JsonConfig {
  web::JsonConfig::default()
    .limit(16 * 1024)
    .error_handler(|err, _req| AppError::Validation(format!("Invalid request body: {}", err)).into())
}

pub fn configure_app_routes(cfg: &mut web::ServiceConfig) {
  cfg.service(
    web::scope("/api/v1")
      .app_data(json_config())
      .route("/health", web::get().to(health_check_handler))
      .service(
        web::scope("/payment")
          .route("/initiate", web::post().to(payment_handlers::initiate_payment_handler))
          .route("/verify", web::post().to(payment_handlers::verify_payment_handler))
          .route("/failure", web::post().to(payment_handlers::report_failure_handler))
          .route("/reconcile", web::post().to(payment_handlers::reconcile_handler))
          .route("/status/{order_id}", web::get().to(status_handlers::payment_status_handler)),
      ),
  );
}
