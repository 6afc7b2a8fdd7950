//! Application services over the stores and the gateway channel.

pub mod discount;
pub mod orders;
pub mod payments;
pub mod reconcile;
pub mod stock;

pub use discount::DiscountEngine;
pub use orders::{AssembledOrder, DiscountPreview, OrderError, OrderService};
pub use payments::{
    CheckoutError, CheckoutRequest, CheckoutSession, PaymentError, PaymentService, RawCartLine,
};
pub use reconcile::{NotificationReconciler, NotifyOutcome, Rejection};
pub use stock::{StockError, StockLedger};
