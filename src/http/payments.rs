//! Payment record endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::domain::{Payment, PaymentStatus};
use crate::error::ApiError;
use crate::http::AppState;
use crate::store::{OrderStore, PaymentStore};

#[derive(Deserialize)]
pub(super) struct CreatePaymentRequest {
    order_id: i64,
    payment_method: String,
}

#[derive(Deserialize)]
pub(super) struct UpdatePaymentStatusRequest {
    payment_status: String,
}

#[derive(Deserialize)]
pub(super) struct RefundRequest {
    refund_id: String,
    #[serde(default)]
    refund_amount: Option<Decimal>,
}

#[derive(Deserialize)]
pub(super) struct RefundStatusRequest {
    refund_status: String,
}

pub(super) async fn list_payments(
    State(state): State<AppState>,
) -> Result<Json<Vec<Payment>>, ApiError> {
    Ok(Json(state.store.list_payments().await?))
}

pub(super) async fn get_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<i64>,
) -> Result<Json<Payment>, ApiError> {
    let Some(payment) = state.store.find_payment(payment_id).await? else {
        return Err(ApiError::not_found(format!(
            "payment {payment_id} not found"
        )));
    };
    Ok(Json(payment))
}

pub(super) async fn payments_for_order(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
) -> Result<Json<Vec<Payment>>, ApiError> {
    if state.store.find_order(order_id).await?.is_none() {
        return Err(ApiError::not_found(format!("order {order_id} not found")));
    }
    Ok(Json(state.store.payments_for_order(order_id).await?))
}

pub(super) async fn create_payment(
    State(state): State<AppState>,
    Json(request): Json<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<Payment>), ApiError> {
    let method = request.payment_method.trim();
    if method.is_empty() {
        return Err(ApiError::bad_request(
            "missing_method",
            "payment_method is required",
        ));
    }
    let payment = state
        .payments
        .create_payment(request.order_id, method)
        .await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

pub(super) async fn update_payment_status(
    State(state): State<AppState>,
    Path(payment_id): Path<i64>,
    Json(request): Json<UpdatePaymentStatusRequest>,
) -> Result<Json<Payment>, ApiError> {
    let status: PaymentStatus = request.payment_status.parse()?;
    if !state.store.update_payment_status(payment_id, status).await? {
        return Err(ApiError::not_found(format!(
            "payment {payment_id} not found"
        )));
    }
    let Some(payment) = state.store.find_payment(payment_id).await? else {
        return Err(ApiError::not_found(format!(
            "payment {payment_id} not found"
        )));
    };
    Ok(Json(payment))
}

pub(super) async fn refund_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<i64>,
    Json(request): Json<RefundRequest>,
) -> Result<Json<Payment>, ApiError> {
    let refund_id = request.refund_id.trim();
    if refund_id.is_empty() {
        return Err(ApiError::bad_request(
            "missing_refund_id",
            "refund_id is required",
        ));
    }
    let payment = state
        .payments
        .refund_payment(payment_id, refund_id, request.refund_amount)
        .await?;
    Ok(Json(payment))
}

pub(super) async fn update_refund_status(
    State(state): State<AppState>,
    Path(payment_id): Path<i64>,
    Json(request): Json<RefundStatusRequest>,
) -> Result<Json<Payment>, ApiError> {
    let status = request.refund_status.trim();
    if status.is_empty() {
        return Err(ApiError::bad_request(
            "missing_refund_status",
            "refund_status is required",
        ));
    }
    let Some(payment) = state.store.update_refund_status(payment_id, status).await? else {
        return Err(ApiError::not_found(format!(
            "payment {payment_id} not found"
        )));
    };
    Ok(Json(payment))
}
