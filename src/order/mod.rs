//! Order aggregate: cart model, status machine, per-session operations

pub mod manager;
pub mod models;

pub use manager::OrderManager;
pub use models::{Order, OrderErrorKind, OrderLine, OrderResult, OrderStatus, OrderSummary};
