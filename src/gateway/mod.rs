//! PayFast hosted-gateway plumbing: the outbound channel, the checkout
//! payload builder, and the wire signature scheme.

pub mod signature;

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::config::PayFastConfig;
use crate::domain::money::format_amount;
use crate::domain::CheckoutCustomer;

pub use signature::{form_encode, GatewaySignatureScheme};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("payment gateway credentials are not configured")]
    NotConfigured,
    #[error("gateway request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("hosted payment request failed ({status}): {reason}")]
    Declined { status: u16, reason: String },
    #[error("gateway response carried no redirect location")]
    MissingRedirect,
}

/// Outbound calls to the gateway. Implementations must disable redirect
/// following and bound every call with a timeout.
#[async_trait]
pub trait PayFastChannel: Send + Sync {
    /// POSTs a signed checkout form and returns the hosted page URL the
    /// buyer must be redirected to.
    async fn request_redirect_url(
        &self,
        fields: &[(String, String)],
    ) -> Result<String, GatewayError>;

    /// Re-posts a raw notification body to the gateway's validation
    /// endpoint. Ok(true) only on an exact `VALID` reply.
    async fn validate_notification(&self, raw_body: &str) -> Result<bool, GatewayError>;
}

/// Encodes fields as an `application/x-www-form-urlencoded` body in field
/// order, using the gateway's own encoding.
pub fn to_form_body(fields: &[(String, String)]) -> String {
    fields
        .iter()
        .map(|(key, value)| format!("{key}={}", form_encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

pub struct PayFastHttp {
    client: reqwest::Client,
    base_url: String,
}

impl PayFastHttp {
    pub fn new(config: &PayFastConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url().to_string(),
        })
    }
}

#[async_trait]
impl PayFastChannel for PayFastHttp {
    async fn request_redirect_url(
        &self,
        fields: &[(String, String)],
    ) -> Result<String, GatewayError> {
        let response = self
            .client
            .post(format!("{}/eng/process", self.base_url))
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body(to_form_body(fields))
            .send()
            .await?;

        let status = response.status();
        if status.is_redirection() {
            let location = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|value| value.to_str().ok())
                .ok_or(GatewayError::MissingRedirect)?;
            if location.starts_with("http://") || location.starts_with("https://") {
                return Ok(location.to_string());
            }
            return Ok(format!("{}{location}", self.base_url));
        }

        if status.is_client_error() || status.is_server_error() {
            let html = response.text().await.unwrap_or_default();
            let reason = extract_error_message(&html)
                .unwrap_or_else(|| "no detail provided".to_string());
            return Err(GatewayError::Declined {
                status: status.as_u16(),
                reason,
            });
        }

        Err(GatewayError::MissingRedirect)
    }

    async fn validate_notification(&self, raw_body: &str) -> Result<bool, GatewayError> {
        let response = self
            .client
            .post(format!("{}/eng/query/validate", self.base_url))
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body(raw_body.to_string())
            .send()
            .await?;
        let text = response.text().await?;
        Ok(text.trim() == "VALID")
    }
}

/// Pulls the human-readable reason out of the gateway's HTML error page.
fn extract_error_message(html: &str) -> Option<String> {
    let lower = html.to_ascii_lowercase();
    let open = r#"<span class="err-msg">"#;
    let start = lower.find(open)? + open.len();
    let end = lower[start..].find("</span>")? + start;

    let mut text = String::new();
    let mut in_tag = false;
    for ch in html[start..end].chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => text.push(c),
            _ => {}
        }
    }
    let cleaned = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!cleaned.is_empty()).then_some(cleaned)
}

/// Inputs for one hosted checkout payload.
pub struct CheckoutPayload<'a> {
    pub payment_id: i64,
    pub order_id: i64,
    pub amount: Decimal,
    pub buyer: &'a CheckoutCustomer,
    pub item_name: String,
    pub item_description: String,
}

fn clip(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

/// Builds the signed field list for the gateway's process endpoint. Field
/// order matters: the signature covers the fields exactly as laid out here,
/// and the signature itself rides along as the final field. Fields whose
/// trimmed value is empty are dropped before signing.
pub fn build_checkout_fields(
    payload: &CheckoutPayload<'_>,
    merchant_id: &str,
    merchant_key: &str,
    frontend_base_url: &str,
    backend_base_url: &str,
    scheme: &GatewaySignatureScheme,
) -> Vec<(String, String)> {
    let return_url = format!(
        "{frontend_base_url}/payment/success?payment_id={}&order_id={}",
        payload.payment_id, payload.order_id
    );
    let cancel_url = format!(
        "{frontend_base_url}/payment/cancel?payment_id={}&order_id={}",
        payload.payment_id, payload.order_id
    );
    let notify_url = format!("{backend_base_url}/payfast/notify");
    let item_name = if payload.item_name.trim().is_empty() {
        format!("Timberline Order #{}", payload.order_id)
    } else {
        payload.item_name.clone()
    };

    let candidates = [
        ("return_url", return_url),
        ("cancel_url", cancel_url),
        ("notify_url", notify_url),
        ("name_first", clip(&payload.buyer.first_name, 50)),
        ("name_last", clip(&payload.buyer.last_name, 50)),
        ("email_address", clip(&payload.buyer.email, 100)),
        ("m_payment_id", payload.payment_id.to_string()),
        ("amount", format_amount(payload.amount)),
        ("item_name", clip(&item_name, 100)),
        ("item_description", clip(&payload.item_description, 255)),
        ("custom_str1", payload.order_id.to_string()),
    ];

    let mut fields = vec![
        ("merchant_id".to_string(), merchant_id.trim().to_string()),
        ("merchant_key".to_string(), merchant_key.trim().to_string()),
    ];
    for (key, value) in candidates {
        let value = value.trim().to_string();
        if !value.is_empty() {
            fields.push((key.to_string(), value));
        }
    }

    let signature = scheme.sign(&fields);
    fields.push(("signature".to_string(), signature));
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn buyer(first: &str, last: &str, email: &str) -> CheckoutCustomer {
        CheckoutCustomer {
            first_name: first.to_string(),
            last_name: last.to_string(),
            email: email.to_string(),
        }
    }

    fn payload<'a>(buyer: &'a CheckoutCustomer) -> CheckoutPayload<'a> {
        CheckoutPayload {
            payment_id: 12,
            order_id: 7,
            amount: dec!(130.00),
            buyer,
            item_name: "Timberline Order #7".to_string(),
            item_description: "Folding Saw x2".to_string(),
        }
    }

    #[test]
    fn test_checkout_fields_order_and_signature() {
        let buyer = buyer("Jane", "Dube", "jane@example.com");
        let scheme = GatewaySignatureScheme::new(None);
        let fields = build_checkout_fields(
            &payload(&buyer),
            "10000100",
            "46f0cd694581a",
            "http://localhost:5173",
            "http://localhost:5050",
            &scheme,
        );

        let keys: Vec<&str> = fields.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            keys,
            [
                "merchant_id",
                "merchant_key",
                "return_url",
                "cancel_url",
                "notify_url",
                "name_first",
                "name_last",
                "email_address",
                "m_payment_id",
                "amount",
                "item_name",
                "item_description",
                "custom_str1",
                "signature",
            ]
        );

        let (signed, signature) = fields.split_at(fields.len() - 1);
        assert!(scheme.verify(signed, &signature[0].1));
    }

    #[test]
    fn test_checkout_fields_drop_empty_values() {
        let buyer = buyer("Jane", "", "jane@example.com");
        let fields = build_checkout_fields(
            &payload(&buyer),
            "10000100",
            "46f0cd694581a",
            "http://localhost:5173",
            "http://localhost:5050",
            &GatewaySignatureScheme::new(None),
        );
        assert!(!fields.iter().any(|(k, _)| k == "name_last"));
    }

    #[test]
    fn test_checkout_amount_always_two_decimals() {
        let buyer = buyer("Jane", "Dube", "jane@example.com");
        let mut data = payload(&buyer);
        data.amount = dec!(99.5);
        let fields = build_checkout_fields(
            &data,
            "10000100",
            "46f0cd694581a",
            "http://localhost:5173",
            "http://localhost:5050",
            &GatewaySignatureScheme::new(None),
        );
        let amount = fields.iter().find(|(k, _)| k == "amount").unwrap();
        assert_eq!(amount.1, "99.50");
    }

    #[test]
    fn test_default_item_name_when_blank() {
        let buyer = buyer("Jane", "Dube", "jane@example.com");
        let mut data = payload(&buyer);
        data.item_name = String::new();
        let fields = build_checkout_fields(
            &data,
            "10000100",
            "46f0cd694581a",
            "http://localhost:5173",
            "http://localhost:5050",
            &GatewaySignatureScheme::new(None),
        );
        let item_name = fields.iter().find(|(k, _)| k == "item_name").unwrap();
        assert_eq!(item_name.1, "Timberline Order #7");
    }

    #[test]
    fn test_to_form_body_encodes_values() {
        let fields = vec![
            ("item_name".to_string(), "Test Order".to_string()),
            ("amount".to_string(), "130.00".to_string()),
        ];
        assert_eq!(to_form_body(&fields), "item_name=Test+Order&amount=130.00");
    }

    #[test]
    fn test_extract_error_message() {
        let html = r#"<html><body><span class="err-msg">Merchant <b>key</b> is
            invalid</span></body></html>"#;
        assert_eq!(
            extract_error_message(html),
            Some("Merchant key is invalid".to_string())
        );
        assert_eq!(extract_error_message("<html>all good</html>"), None);
    }
}
