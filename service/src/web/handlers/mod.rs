// service/src/web/handlers/mod.rs

pub mod payment_handlers;
pub mod status_handlers;
