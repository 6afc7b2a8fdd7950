//! Order endpoints: the assembly pipeline, the discount preview, and
//! administrative CRUD over orders and their items.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::domain::{CartLine, Order, OrderItem, OrderStatus};
use crate::error::ApiError;
use crate::http::AppState;
use crate::services::{AssembledOrder, DiscountPreview};
use crate::store::OrderStore;

#[derive(Deserialize)]
pub(super) struct OrderRequest {
    customer_id: i64,
    #[serde(default)]
    items: Vec<CartLine>,
}

#[derive(Deserialize)]
pub(super) struct UpdateOrderStatusRequest {
    order_status: String,
}

#[derive(Deserialize)]
pub(super) struct UpdateOrderItemRequest {
    quantity: i32,
}

#[derive(Serialize)]
pub(super) struct OrderDetail {
    #[serde(flatten)]
    order: Order,
    items: Vec<OrderItem>,
}

pub(super) async fn list_orders(
    State(state): State<AppState>,
) -> Result<Json<Vec<Order>>, ApiError> {
    Ok(Json(state.store.list_orders().await?))
}

pub(super) async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
) -> Result<Json<OrderDetail>, ApiError> {
    let Some(order) = state.store.find_order(order_id).await? else {
        return Err(ApiError::not_found(format!("order {order_id} not found")));
    };
    let items = state.store.order_items(order_id).await?;
    Ok(Json(OrderDetail { order, items }))
}

pub(super) async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<OrderRequest>,
) -> Result<(StatusCode, Json<AssembledOrder>), ApiError> {
    let assembled = state
        .orders
        .create_order(request.customer_id, &request.items)
        .await?;
    Ok((StatusCode::CREATED, Json(assembled)))
}

pub(super) async fn preview_discount(
    State(state): State<AppState>,
    Json(request): Json<OrderRequest>,
) -> Result<Json<DiscountPreview>, ApiError> {
    let preview = state
        .orders
        .preview_discount(request.customer_id, &request.items)
        .await?;
    Ok(Json(preview))
}

pub(super) async fn update_order_status(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
    Json(request): Json<UpdateOrderStatusRequest>,
) -> Result<Json<Order>, ApiError> {
    let status: OrderStatus = request.order_status.parse()?;
    if !state.store.update_order_status(order_id, status).await? {
        return Err(ApiError::not_found(format!("order {order_id} not found")));
    }
    let Some(order) = state.store.find_order(order_id).await? else {
        return Err(ApiError::not_found(format!("order {order_id} not found")));
    };
    Ok(Json(order))
}

pub(super) async fn delete_order(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if state.store.delete_order(order_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!("order {order_id} not found")))
    }
}

pub(super) async fn list_order_items(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
) -> Result<Json<Vec<OrderItem>>, ApiError> {
    if state.store.find_order(order_id).await?.is_none() {
        return Err(ApiError::not_found(format!("order {order_id} not found")));
    }
    Ok(Json(state.store.order_items(order_id).await?))
}

pub(super) async fn get_order_item(
    State(state): State<AppState>,
    Path(order_item_id): Path<i64>,
) -> Result<Json<OrderItem>, ApiError> {
    let Some(item) = state.store.find_order_item(order_item_id).await? else {
        return Err(ApiError::not_found(format!(
            "order item {order_item_id} not found"
        )));
    };
    Ok(Json(item))
}

/// Administrative quantity fix-up. Does not touch stock; reservations made at
/// assembly time stand.
pub(super) async fn update_order_item(
    State(state): State<AppState>,
    Path(order_item_id): Path<i64>,
    Json(request): Json<UpdateOrderItemRequest>,
) -> Result<Json<OrderItem>, ApiError> {
    if request.quantity <= 0 {
        return Err(ApiError::bad_request(
            "invalid_quantity",
            "quantity must be positive",
        ));
    }
    let Some(item) = state
        .store
        .update_order_item_quantity(order_item_id, request.quantity)
        .await?
    else {
        return Err(ApiError::not_found(format!(
            "order item {order_item_id} not found"
        )));
    };
    Ok(Json(item))
}

pub(super) async fn delete_order_item(
    State(state): State<AppState>,
    Path(order_item_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if state.store.delete_order_item(order_item_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!(
            "order item {order_item_id} not found"
        )))
    }
}
