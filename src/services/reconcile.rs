//! Reconciliation of asynchronous gateway notifications (ITN posts) against
//! recorded payments.
//!
//! A notification is trusted only after every check passes: the payload
//! parses, the payment exists, the merchant matches, the signature verifies
//! over the fields exactly as received, the reported amount equals the
//! recorded one, and the gateway itself confirms the post. Rejections are
//! outcomes, not errors; the HTTP layer acknowledges them so the gateway
//! stops retrying.

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::config::PayFastConfig;
use crate::domain::money::{format_amount, normalize_amount};
use crate::domain::{OrderStatus, PaymentStatus};
use crate::gateway::{GatewaySignatureScheme, PayFastChannel};
use crate::store::{Store, StoreError};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Rejection {
    #[error("notification body is empty or unsigned")]
    MalformedPayload,
    #[error("no payment matches reference {reference:?}")]
    UnknownPayment { reference: String },
    #[error("merchant id {got:?} does not belong to this account")]
    MerchantMismatch { got: String },
    #[error("signature verification failed")]
    InvalidSignature,
    #[error("reported amount {reported:?} does not match recorded amount {stored}")]
    AmountMismatch { reported: String, stored: String },
    #[error("gateway did not confirm the notification")]
    GatewayRejected,
}

#[derive(Debug)]
pub enum NotifyOutcome {
    /// The notification changed payment or order state.
    Applied {
        payment_id: i64,
        payment_status: PaymentStatus,
        order_status: OrderStatus,
    },
    /// Valid, but everything it reports is already recorded.
    Unchanged { payment_id: i64 },
    Rejected(Rejection),
}

#[derive(Clone)]
pub struct NotificationReconciler {
    store: Arc<dyn Store>,
    channel: Arc<dyn PayFastChannel>,
    payfast: PayFastConfig,
}

impl NotificationReconciler {
    pub fn new(
        store: Arc<dyn Store>,
        channel: Arc<dyn PayFastChannel>,
        payfast: PayFastConfig,
    ) -> Self {
        Self {
            store,
            channel,
            payfast,
        }
    }

    /// Verifies one raw notification body and applies the reported state.
    /// Re-delivery of an already-applied notification is not an error; the
    /// per-field writes below skip values that already match.
    pub async fn handle_notification(&self, raw_body: &str) -> Result<NotifyOutcome, StoreError> {
        let correlation_id = Uuid::new_v4();

        let body = raw_body.trim();
        if body.is_empty() {
            return Ok(self.reject(correlation_id, Rejection::MalformedPayload));
        }
        // Field order is preserved: the signature covers the fields exactly
        // as the gateway sent them, empty values included.
        let fields: Vec<(String, String)> = form_urlencoded::parse(body.as_bytes())
            .into_owned()
            .collect();
        if fields.is_empty() {
            return Ok(self.reject(correlation_id, Rejection::MalformedPayload));
        }
        let Some(provided_signature) = field(&fields, "signature") else {
            return Ok(self.reject(correlation_id, Rejection::MalformedPayload));
        };

        let reference = field(&fields, "m_payment_id").unwrap_or_default();
        let payment_id = match reference.parse::<i64>() {
            Ok(id) if id > 0 => id,
            _ => {
                return Ok(self.reject(
                    correlation_id,
                    Rejection::UnknownPayment {
                        reference: reference.to_string(),
                    },
                ))
            }
        };
        let Some(payment) = self.store.find_payment(payment_id).await? else {
            return Ok(self.reject(
                correlation_id,
                Rejection::UnknownPayment {
                    reference: reference.to_string(),
                },
            ));
        };

        let merchant = field(&fields, "merchant_id").unwrap_or_default();
        let expected = self.payfast.merchant_id.as_deref().unwrap_or_default();
        if merchant != expected {
            return Ok(self.reject(
                correlation_id,
                Rejection::MerchantMismatch {
                    got: merchant.to_string(),
                },
            ));
        }

        let scheme = GatewaySignatureScheme::new(self.payfast.passphrase.clone());
        let signed_fields: Vec<(String, String)> = fields
            .iter()
            .filter(|(key, _)| key != "signature")
            .cloned()
            .collect();
        if !scheme.verify(&signed_fields, provided_signature) {
            return Ok(self.reject(correlation_id, Rejection::InvalidSignature));
        }

        let reported = field(&fields, "amount_gross").unwrap_or_default();
        let stored = format_amount(payment.amount);
        if normalize_amount(reported).as_deref() != Some(stored.as_str()) {
            return Ok(self.reject(
                correlation_id,
                Rejection::AmountMismatch {
                    reported: reported.to_string(),
                    stored,
                },
            ));
        }

        match self.channel.validate_notification(body).await {
            Ok(true) => {}
            Ok(false) => return Ok(self.reject(correlation_id, Rejection::GatewayRejected)),
            Err(err) => {
                tracing::warn!(
                    correlation_id = %correlation_id,
                    error = %err,
                    "gateway validation call failed"
                );
                return Ok(self.reject(correlation_id, Rejection::GatewayRejected));
            }
        }

        let reported_status = field(&fields, "payment_status").unwrap_or_default();
        let Some((payment_status, order_status)) = map_gateway_status(reported_status) else {
            tracing::info!(
                correlation_id = %correlation_id,
                payment_id,
                gateway_status = reported_status,
                "notification leaves payment pending"
            );
            return Ok(NotifyOutcome::Unchanged { payment_id });
        };

        let mut applied = false;
        if payment.payment_status != payment_status {
            self.store
                .update_payment_status(payment_id, payment_status)
                .await?;
            applied = true;
        }
        if let Some(order) = self.store.find_order(payment.order_id).await? {
            if order.order_status != order_status {
                self.store
                    .update_order_status(order.order_id, order_status)
                    .await?;
                applied = true;
            }
        }

        if applied {
            tracing::info!(
                correlation_id = %correlation_id,
                payment_id,
                payment_status = %payment_status,
                order_status = %order_status,
                "payment reconciled"
            );
            Ok(NotifyOutcome::Applied {
                payment_id,
                payment_status,
                order_status,
            })
        } else {
            tracing::info!(
                correlation_id = %correlation_id,
                payment_id,
                "duplicate notification, nothing to change"
            );
            Ok(NotifyOutcome::Unchanged { payment_id })
        }
    }

    fn reject(&self, correlation_id: Uuid, rejection: Rejection) -> NotifyOutcome {
        tracing::warn!(
            correlation_id = %correlation_id,
            rejection = %rejection,
            "gateway notification rejected"
        );
        NotifyOutcome::Rejected(rejection)
    }
}

fn field<'a>(fields: &'a [(String, String)], key: &str) -> Option<&'a str> {
    fields
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, value)| value.as_str())
}

/// Maps the gateway's payment_status to local statuses. Anything
/// unrecognized leaves both records as they are.
fn map_gateway_status(status: &str) -> Option<(PaymentStatus, OrderStatus)> {
    match status.trim().to_ascii_uppercase().as_str() {
        "COMPLETE" => Some((PaymentStatus::Completed, OrderStatus::Paid)),
        "FAILED" | "CANCELLED" => Some((PaymentStatus::Failed, OrderStatus::Cancelled)),
        _ => None,
    }
}
