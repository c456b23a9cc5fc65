// service/src/services/mod.rs

pub mod alerts;
pub mod gateway;
pub mod gateway_mock;
pub mod razorpay;
pub mod reconciler;
pub mod signature;
pub mod store;
pub mod store_memory;
pub mod store_pg;
