//! HTTP error envelope.
//!
//! Every handler failure becomes an [`ApiError`]: a status code, a stable
//! machine-readable code, and a human-readable message, serialized as
//! `{"error": {"code", "message", "details"?}}`. Storage and gateway
//! internals are logged here and never leak into response bodies.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use crate::domain::UnknownStatus;
use crate::gateway::GatewayError;
use crate::services::{CheckoutError, OrderError, PaymentError};
use crate::store::StoreError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn conflict(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, code, message)
    }

    pub fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal",
            "internal server error",
        )
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut error = json!({
            "code": self.code,
            "message": self.message,
        });
        if let Some(details) = self.details {
            error["details"] = details;
        }
        (self.status, Json(json!({ "error": error }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateEmail { email } => Self::conflict(
                "duplicate_email",
                format!("email already registered: {email}"),
            ),
            StoreError::Database(detail) => {
                tracing::error!(error = %detail, "storage failure");
                Self::internal()
            }
        }
    }
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        let message = err.to_string();
        match err {
            OrderError::CustomerNotFound { .. }
            | OrderError::OrderNotFound { .. }
            | OrderError::ProductNotFound { .. } => Self::not_found(message),
            OrderError::EmptyCart => Self::bad_request("empty_cart", message),
            OrderError::InvalidQuantity { .. } => Self::bad_request("invalid_quantity", message),
            OrderError::InsufficientStock {
                product_id,
                available,
                requested,
            } => Self::conflict("insufficient_stock", message).with_details(json!({
                "product_id": product_id,
                "available": available,
                "requested": requested,
            })),
            OrderError::Store(err) => err.into(),
        }
    }
}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        let message = err.to_string();
        match err {
            PaymentError::OrderNotFound { .. } | PaymentError::PaymentNotFound { .. } => {
                Self::not_found(message)
            }
            PaymentError::EmptyOrderTotal { .. } => {
                Self::bad_request("empty_order_total", message)
            }
            PaymentError::RefundNotAllowed { .. } => {
                Self::bad_request("refund_not_allowed", message)
            }
            PaymentError::Store(err) => err.into(),
        }
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::NotConfigured => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "gateway_not_configured",
                "payment gateway credentials are not configured",
            ),
            GatewayError::Http(detail) => {
                tracing::error!(error = %detail, "gateway request failed");
                Self::new(
                    StatusCode::BAD_GATEWAY,
                    "gateway_unreachable",
                    "payment gateway request failed",
                )
            }
            GatewayError::Declined { status, reason } => Self::new(
                StatusCode::BAD_GATEWAY,
                "gateway_declined",
                format!("payment gateway declined the request ({status}): {reason}"),
            ),
            GatewayError::MissingRedirect => Self::new(
                StatusCode::BAD_GATEWAY,
                "gateway_no_redirect",
                "payment gateway returned no redirect location",
            ),
        }
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::InvalidEmail => {
                Self::bad_request("invalid_email", "a valid email address is required")
            }
            CheckoutError::Order(err) => err.into(),
            CheckoutError::Payment(err) => err.into(),
            CheckoutError::Gateway(err) => err.into(),
            CheckoutError::Store(err) => err.into(),
        }
    }
}

impl From<UnknownStatus> for ApiError {
    fn from(err: UnknownStatus) -> Self {
        Self::bad_request("invalid_status", err.to_string())
    }
}
