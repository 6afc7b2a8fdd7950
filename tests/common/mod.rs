//! Shared wiring for router-level tests: the real services over the
//! in-memory store, with a scripted gateway channel.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use timberline::auth::SaltedSha2Authority;
use timberline::config::{PayFastConfig, PayFastMode};
use timberline::gateway::{to_form_body, GatewayError, GatewaySignatureScheme, PayFastChannel};
use timberline::http::{router, AppState};
use timberline::services::{
    DiscountEngine, NotificationReconciler, OrderService, PaymentService, StockLedger,
};
use timberline::store::MemoryStore;

pub const MERCHANT_ID: &str = "10000100";
pub const MERCHANT_KEY: &str = "46f0cd694581a";
pub const PASSPHRASE: &str = "jt7NOE43FZPn";

/// Stands in for the hosted gateway: records outbound checkout fields and
/// answers validation calls with whatever verdict is currently scripted.
pub struct ScriptedChannel {
    pub redirect_url: String,
    pub verdict: Mutex<Result<bool, u16>>,
    pub sent: Mutex<Vec<Vec<(String, String)>>>,
}

impl Default for ScriptedChannel {
    fn default() -> Self {
        Self {
            redirect_url: "https://sandbox.payfast.co.za/eng/process/pay/abc123".to_string(),
            verdict: Mutex::new(Ok(true)),
            sent: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedChannel {
    pub fn set_verdict(&self, verdict: Result<bool, u16>) {
        *self.verdict.lock().unwrap() = verdict;
    }
}

#[async_trait]
impl PayFastChannel for ScriptedChannel {
    async fn request_redirect_url(
        &self,
        fields: &[(String, String)],
    ) -> Result<String, GatewayError> {
        self.sent.lock().unwrap().push(fields.to_vec());
        Ok(self.redirect_url.clone())
    }

    async fn validate_notification(&self, _raw_body: &str) -> Result<bool, GatewayError> {
        match *self.verdict.lock().unwrap() {
            Ok(valid) => Ok(valid),
            Err(status) => Err(GatewayError::Declined {
                status,
                reason: "unreachable".to_string(),
            }),
        }
    }
}

pub fn payfast_config() -> PayFastConfig {
    PayFastConfig {
        mode: PayFastMode::Sandbox,
        merchant_id: Some(MERCHANT_ID.to_string()),
        merchant_key: Some(MERCHANT_KEY.to_string()),
        passphrase: Some(PASSPHRASE.to_string()),
        timeout: Duration::from_secs(20),
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub channel: Arc<ScriptedChannel>,
}

pub fn test_app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let channel = Arc::new(ScriptedChannel::default());
    let orders = OrderService::new(
        store.clone(),
        StockLedger::new(store.clone()),
        DiscountEngine::new(store.clone()),
    );
    let payments = PaymentService::new(
        store.clone(),
        orders.clone(),
        channel.clone(),
        payfast_config(),
        "http://localhost:5173".to_string(),
        "http://localhost:5050".to_string(),
    );
    let reconciler = NotificationReconciler::new(store.clone(), channel.clone(), payfast_config());
    let state = AppState {
        store: store.clone(),
        auth: Arc::new(SaltedSha2Authority::new("test-secret")),
        orders,
        payments,
        reconciler,
    };
    TestApp {
        router: router(state),
        store,
        channel,
    }
}

/// Sends a JSON request and decodes the JSON reply. Empty reply bodies come
/// back as `Value::Null`.
pub async fn send_json(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

/// Posts a raw form-encoded body, as the gateway does, and returns the
/// plain-text reply.
pub async fn post_form(app: &Router, uri: &str, body: String) -> (StatusCode, String) {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

/// Serializes and signs a gateway notification body, signature last.
pub fn signed_notification(fields: &[(&str, &str)]) -> String {
    let mut owned: Vec<(String, String)> = fields
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
    let scheme = GatewaySignatureScheme::new(Some(PASSPHRASE.to_string()));
    let signature = scheme.sign(&owned);
    owned.push(("signature".to_string(), signature));
    to_form_body(&owned)
}
