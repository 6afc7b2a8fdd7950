//! HTTP surface: state, router, and the per-resource handlers.

mod customers;
mod orders;
mod payfast;
mod payments;
mod products;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::CredentialAuthority;
use crate::services::{NotificationReconciler, OrderService, PaymentService};
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub auth: Arc<dyn CredentialAuthority>,
    pub orders: OrderService,
    pub payments: PaymentService,
    pub reconciler: NotificationReconciler,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(json!({ "status": "ok" })) }))
        .route(
            "/customers",
            get(customers::list_customers).post(customers::register_customer),
        )
        .route(
            "/customers/:id",
            get(customers::get_customer)
                .patch(customers::update_customer)
                .delete(customers::delete_customer),
        )
        .route("/login", post(customers::login))
        .route(
            "/products",
            get(products::list_products).post(products::create_product),
        )
        .route(
            "/products/:id",
            get(products::get_product)
                .patch(products::update_product)
                .delete(products::delete_product),
        )
        .route("/orders", get(orders::list_orders).post(orders::create_order))
        .route("/orders/preview-discount", post(orders::preview_discount))
        .route(
            "/orders/:id",
            get(orders::get_order)
                .patch(orders::update_order_status)
                .delete(orders::delete_order),
        )
        .route("/orders/:id/items", get(orders::list_order_items))
        .route(
            "/orders/items/:item_id",
            get(orders::get_order_item)
                .patch(orders::update_order_item)
                .delete(orders::delete_order_item),
        )
        .route(
            "/payments",
            get(payments::list_payments).post(payments::create_payment),
        )
        .route(
            "/payments/:id",
            get(payments::get_payment).patch(payments::update_payment_status),
        )
        .route("/payments/order/:order_id", get(payments::payments_for_order))
        .route(
            "/payments/:id/refund",
            post(payments::refund_payment).patch(payments::update_refund_status),
        )
        .route("/payfast/create-payment", post(payfast::create_payment))
        .route("/payfast/notify", post(payfast::notify))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
