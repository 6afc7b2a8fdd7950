//! Customer CRUD and login.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::domain::customer::normalize_email;
use crate::domain::{Customer, NewCustomer};
use crate::error::ApiError;
use crate::http::AppState;
use crate::store::{CustomerPatch, CustomerStore};

#[derive(Deserialize)]
pub(super) struct LoginRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Serialize)]
pub(super) struct LoginResponse {
    token: String,
}

#[derive(Deserialize)]
pub(super) struct UpdateCustomerRequest {
    customer_name: Option<String>,
    email: Option<String>,
    password: Option<String>,
}

pub(super) async fn list_customers(
    State(state): State<AppState>,
) -> Result<Json<Vec<Customer>>, ApiError> {
    Ok(Json(state.store.list_customers().await?))
}

pub(super) async fn get_customer(
    State(state): State<AppState>,
    Path(customer_id): Path<i64>,
) -> Result<Json<Customer>, ApiError> {
    let Some(customer) = state.store.find_customer(customer_id).await? else {
        return Err(ApiError::not_found(format!(
            "customer {customer_id} not found"
        )));
    };
    Ok(Json(customer))
}

pub(super) async fn register_customer(
    State(state): State<AppState>,
    Json(request): Json<NewCustomer>,
) -> Result<(StatusCode, Json<Customer>), ApiError> {
    let name = request.customer_name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request(
            "missing_name",
            "customer_name is required",
        ));
    }
    let email = normalize_email(&request.email);
    if !validator::validate_email(&email) {
        return Err(ApiError::bad_request(
            "invalid_email",
            "a valid email address is required",
        ));
    }
    if request.password.is_empty() {
        return Err(ApiError::bad_request(
            "missing_credentials",
            "password is required",
        ));
    }

    let hash = state.auth.hash_credential(&request.password);
    let customer = state
        .store
        .insert_customer(name, &email, Some(&hash))
        .await?;
    tracing::info!(customer_id = customer.customer_id, "customer registered");
    Ok((StatusCode::CREATED, Json(customer)))
}

pub(super) async fn update_customer(
    State(state): State<AppState>,
    Path(customer_id): Path<i64>,
    Json(request): Json<UpdateCustomerRequest>,
) -> Result<Json<Customer>, ApiError> {
    let email = match request.email.as_deref() {
        Some(raw) => {
            let email = normalize_email(raw);
            if !validator::validate_email(&email) {
                return Err(ApiError::bad_request(
                    "invalid_email",
                    "a valid email address is required",
                ));
            }
            Some(email)
        }
        None => None,
    };
    let patch = CustomerPatch {
        customer_name: request.customer_name.map(|name| name.trim().to_string()),
        email,
        credential_hash: request
            .password
            .as_deref()
            .map(|plain| state.auth.hash_credential(plain)),
    };
    let Some(customer) = state.store.update_customer(customer_id, patch).await? else {
        return Err(ApiError::not_found(format!(
            "customer {customer_id} not found"
        )));
    };
    Ok(Json(customer))
}

pub(super) async fn delete_customer(
    State(state): State<AppState>,
    Path(customer_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if state.store.delete_customer(customer_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!(
            "customer {customer_id} not found"
        )))
    }
}

/// Verifies a credential and issues a bearer token. The response never
/// distinguishes an unknown email from a wrong password.
pub(super) async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let email = normalize_email(&request.email);
    if email.is_empty() || request.password.is_empty() {
        return Err(ApiError::bad_request(
            "missing_credentials",
            "email and password are required",
        ));
    }
    let Some(customer) = state.store.find_customer_by_email(&email).await? else {
        return Err(ApiError::unauthorized("invalid email or password"));
    };
    let Some(stored) = customer.credential_hash.as_deref() else {
        return Err(ApiError::unauthorized("invalid email or password"));
    };
    if !state.auth.verify_credential(&request.password, stored) {
        return Err(ApiError::unauthorized("invalid email or password"));
    }
    let token = state.auth.issue_token(&customer);
    tracing::info!(customer_id = customer.customer_id, "customer logged in");
    Ok(Json(LoginResponse { token }))
}
