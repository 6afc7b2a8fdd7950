//! Hosted-gateway endpoints: session creation for the storefront and the
//! asynchronous notification hook the gateway posts back to.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::error::ApiError;
use crate::http::AppState;
use crate::services::{CheckoutRequest, CheckoutSession, NotifyOutcome};

pub(super) async fn create_payment(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<CheckoutSession>, ApiError> {
    let session = state.payments.create_hosted_payment_session(&request).await?;
    Ok(Json(session))
}

/// Notification hook. Plain-text replies: 200 `OK` when the post was
/// processed (applied or a no-op), 200 `INVALID` when it was rejected, and
/// 500 `ERROR` only when processing itself failed and the gateway should
/// retry the delivery.
pub(super) async fn notify(
    State(state): State<AppState>,
    body: String,
) -> (StatusCode, &'static str) {
    match state.reconciler.handle_notification(&body).await {
        Ok(NotifyOutcome::Applied { .. }) | Ok(NotifyOutcome::Unchanged { .. }) => {
            (StatusCode::OK, "OK")
        }
        Ok(NotifyOutcome::Rejected(_)) => (StatusCode::OK, "INVALID"),
        Err(err) => {
            tracing::error!(error = %err, "notification processing failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "ERROR")
        }
    }
}
