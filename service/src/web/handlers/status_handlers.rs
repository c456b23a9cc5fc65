// service/src/web/handlers/status_handlers.rs

use actix_web::{web, HttpResponse};
use tracing::{info, instrument, warn};

use crate::errors::AppError;
use crate::models::OrderSnapshot;
use crate::state::AppState;

/// Read-only view of one order, looked up by gateway order id.
#[instrument(name = "handler::payment_status", skip(app_state, path), fields(gateway_order_id = %path.as_str()))]
pub async fn payment_status_handler(
  app_state: web::Data<AppState>,
  path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
  let gateway_order_id = path.into_inner();

  match app_state.store.find_order_by_gateway_id(&gateway_order_id).await? {
    Some(order) => {
      info!(status = %order.status, "Order status fetched.");
      Ok(HttpResponse::Ok().json(OrderSnapshot::from(&order)))
    }
    None => {
      warn!("Order not found for status lookup.");
      Err(AppError::NotFound(format!("Order {} not found.", gateway_order_id)))
    }
  }
}
