// service/src/models/mod.rs

//! Records owned by the payment subsystem (orders, confirmations) and the
//! enrollment written as a side effect of a captured payment.

pub mod confirmation;
pub mod enrollment;
pub mod order;

pub use confirmation::{NewConfirmation, PaymentConfirmation};
pub use enrollment::Enrollment;
pub use order::{NewOrder, Order, OrderSnapshot, OrderStatus};
