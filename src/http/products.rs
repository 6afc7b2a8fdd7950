//! Product catalog CRUD.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::domain::{NewProduct, Product};
use crate::error::ApiError;
use crate::http::AppState;
use crate::store::{ProductPatch, ProductStore};

#[derive(Deserialize)]
pub(super) struct ProductListQuery {
    #[serde(default)]
    include_inactive: bool,
}

pub(super) async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductListQuery>,
) -> Result<Json<Vec<Product>>, ApiError> {
    Ok(Json(state.store.list_products(query.include_inactive).await?))
}

pub(super) async fn get_product(
    State(state): State<AppState>,
    Path(product_id): Path<i64>,
) -> Result<Json<Product>, ApiError> {
    let Some(product) = state.store.find_product(product_id).await? else {
        return Err(ApiError::not_found(format!(
            "product {product_id} not found"
        )));
    };
    Ok(Json(product))
}

pub(super) async fn create_product(
    State(state): State<AppState>,
    Json(new): Json<NewProduct>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    validate_product_fields(Some(&new.product_name), Some(new.product_price), Some(new.quantity))?;
    let product = state.store.insert_product(&new).await?;
    tracing::info!(product_id = product.product_id, "product created");
    Ok((StatusCode::CREATED, Json(product)))
}

pub(super) async fn update_product(
    State(state): State<AppState>,
    Path(product_id): Path<i64>,
    Json(patch): Json<ProductPatch>,
) -> Result<Json<Product>, ApiError> {
    validate_product_fields(
        patch.product_name.as_deref(),
        patch.product_price,
        patch.quantity,
    )?;
    let Some(product) = state.store.update_product(product_id, patch).await? else {
        return Err(ApiError::not_found(format!(
            "product {product_id} not found"
        )));
    };
    Ok(Json(product))
}

pub(super) async fn delete_product(
    State(state): State<AppState>,
    Path(product_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if state.store.delete_product(product_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!(
            "product {product_id} not found"
        )))
    }
}

fn validate_product_fields(
    name: Option<&str>,
    price: Option<Decimal>,
    quantity: Option<i32>,
) -> Result<(), ApiError> {
    if let Some(name) = name {
        if name.trim().is_empty() {
            return Err(ApiError::bad_request(
                "missing_name",
                "product_name is required",
            ));
        }
    }
    if let Some(price) = price {
        if price < Decimal::ZERO {
            return Err(ApiError::bad_request(
                "invalid_price",
                "product_price cannot be negative",
            ));
        }
    }
    if let Some(quantity) = quantity {
        if quantity < 0 {
            return Err(ApiError::bad_request(
                "invalid_quantity",
                "quantity cannot be negative",
            ));
        }
    }
    Ok(())
}
