//! Payment records and the hosted checkout session flow.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::PayFastConfig;
use crate::domain::customer::normalize_email;
use crate::domain::money::{line_total, round_currency};
use crate::domain::{CartLine, CheckoutCustomer, Customer, OrderItem, Payment, PaymentStatus};
use crate::gateway::{
    build_checkout_fields, CheckoutPayload, GatewayError, GatewaySignatureScheme, PayFastChannel,
};
use crate::services::orders::{OrderError, OrderService};
use crate::store::{Store, StoreError};

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("order {order_id} not found")]
    OrderNotFound { order_id: i64 },
    #[error("payment {payment_id} not found")]
    PaymentNotFound { payment_id: i64 },
    #[error("order {order_id} has no payable total")]
    EmptyOrderTotal { order_id: i64 },
    #[error("payment {payment_id} cannot be refunded while {status}")]
    RefundNotAllowed {
        payment_id: i64,
        status: PaymentStatus,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("a valid email address is required")]
    InvalidEmail,
    #[error(transparent)]
    Order(#[from] OrderError),
    #[error(transparent)]
    Payment(#[from] PaymentError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One line as submitted by a storefront client. Older clients send the
/// quantity under `cart_quantity`.
#[derive(Clone, Debug, Deserialize)]
pub struct RawCartLine {
    #[serde(default)]
    pub product_id: Option<i64>,
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub cart_quantity: Option<i64>,
}

impl RawCartLine {
    /// Coerces a raw line into a usable one; lines without a positive product
    /// id and quantity are dropped rather than rejected.
    fn normalize(&self) -> Option<CartLine> {
        let product_id = self.product_id?;
        let quantity = self.quantity.or(self.cart_quantity).unwrap_or(0);
        if product_id <= 0 || quantity <= 0 {
            return None;
        }
        let quantity = i32::try_from(quantity).ok()?;
        Some(CartLine {
            product_id,
            quantity,
        })
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct CheckoutRequest {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub email: String,
    pub items: Vec<RawCartLine>,
}

/// What the storefront needs to hand the buyer over to the hosted page.
#[derive(Debug, Serialize)]
pub struct CheckoutSession {
    pub payment_id: i64,
    pub order_id: i64,
    pub payfast_redirect_url: String,
}

#[derive(Clone)]
pub struct PaymentService {
    store: Arc<dyn Store>,
    orders: OrderService,
    channel: Arc<dyn PayFastChannel>,
    payfast: PayFastConfig,
    frontend_base_url: String,
    backend_base_url: String,
}

impl PaymentService {
    pub fn new(
        store: Arc<dyn Store>,
        orders: OrderService,
        channel: Arc<dyn PayFastChannel>,
        payfast: PayFastConfig,
        frontend_base_url: String,
        backend_base_url: String,
    ) -> Self {
        Self {
            store,
            orders,
            channel,
            payfast,
            frontend_base_url,
            backend_base_url,
        }
    }

    /// Records a payment for an order. The amount is always recomputed from
    /// the persisted line items, never taken from the caller.
    pub async fn create_payment(
        &self,
        order_id: i64,
        payment_method: &str,
    ) -> Result<Payment, PaymentError> {
        let Some(order) = self.store.find_order(order_id).await? else {
            return Err(PaymentError::OrderNotFound { order_id });
        };
        let items = self.store.order_items(order.order_id).await?;
        let amount = round_currency(
            items
                .iter()
                .map(|item| line_total(item.unit_price, item.quantity))
                .sum(),
        );
        if amount <= Decimal::ZERO {
            return Err(PaymentError::EmptyOrderTotal { order_id });
        }
        let payment = self
            .store
            .insert_payment(order.order_id, amount, payment_method)
            .await?;
        tracing::info!(
            payment_id = payment.payment_id,
            order_id,
            amount = %payment.amount,
            "payment recorded"
        );
        Ok(payment)
    }

    /// Runs the whole hosted checkout: resolve the buyer, assemble the order,
    /// record the payment, then ask the gateway for the page to redirect to.
    pub async fn create_hosted_payment_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, CheckoutError> {
        let (merchant_id, merchant_key) = self
            .payfast
            .credentials()
            .ok_or(GatewayError::NotConfigured)?;
        let merchant_id = merchant_id.to_string();
        let merchant_key = merchant_key.to_string();

        let lines: Vec<CartLine> = request
            .items
            .iter()
            .filter_map(RawCartLine::normalize)
            .collect();
        if lines.is_empty() {
            return Err(OrderError::EmptyCart.into());
        }

        let email = normalize_email(&request.email);
        if !validator::validate_email(&email) {
            return Err(CheckoutError::InvalidEmail);
        }
        let buyer = CheckoutCustomer {
            first_name: request.first_name.trim().to_string(),
            last_name: request.last_name.trim().to_string(),
            email,
        };

        let customer = self.resolve_customer(&buyer).await?;
        let assembled = self
            .orders
            .create_order(customer.customer_id, &lines)
            .await?;
        let payment = self
            .create_payment(assembled.order.order_id, "payfast")
            .await?;

        let scheme = GatewaySignatureScheme::new(self.payfast.passphrase.clone());
        let payload = CheckoutPayload {
            payment_id: payment.payment_id,
            order_id: assembled.order.order_id,
            amount: payment.amount,
            buyer: &buyer,
            item_name: String::new(),
            item_description: describe_items(&assembled.items),
        };
        let fields = build_checkout_fields(
            &payload,
            &merchant_id,
            &merchant_key,
            &self.frontend_base_url,
            &self.backend_base_url,
            &scheme,
        );
        let payfast_redirect_url = self.channel.request_redirect_url(&fields).await?;

        tracing::info!(
            payment_id = payment.payment_id,
            order_id = assembled.order.order_id,
            "hosted payment session created"
        );
        Ok(CheckoutSession {
            payment_id: payment.payment_id,
            order_id: assembled.order.order_id,
            payfast_redirect_url,
        })
    }

    /// Marks a completed payment refunded. Only completed payments qualify;
    /// omitting the amount refunds the payment in full.
    pub async fn refund_payment(
        &self,
        payment_id: i64,
        refund_id: &str,
        refund_amount: Option<Decimal>,
    ) -> Result<Payment, PaymentError> {
        let Some(payment) = self.store.find_payment(payment_id).await? else {
            return Err(PaymentError::PaymentNotFound { payment_id });
        };
        if payment.payment_status != PaymentStatus::Completed {
            return Err(PaymentError::RefundNotAllowed {
                payment_id,
                status: payment.payment_status,
            });
        }
        let amount = round_currency(refund_amount.unwrap_or(payment.amount));
        let updated = self
            .store
            .record_refund(payment_id, refund_id, amount, "completed")
            .await?
            .ok_or(PaymentError::PaymentNotFound { payment_id })?;
        tracing::info!(payment_id, refund_id, refund_amount = %amount, "payment refunded");
        Ok(updated)
    }

    /// Finds the customer behind a checkout email or creates a guest record.
    /// Losing a create race to a concurrent checkout is absorbed by looking
    /// the row up again.
    async fn resolve_customer(&self, buyer: &CheckoutCustomer) -> Result<Customer, CheckoutError> {
        if let Some(existing) = self.store.find_customer_by_email(&buyer.email).await? {
            return Ok(existing);
        }
        match self
            .store
            .insert_customer(&buyer.display_name(), &buyer.email, None)
            .await
        {
            Ok(created) => Ok(created),
            Err(StoreError::DuplicateEmail { .. }) => self
                .store
                .find_customer_by_email(&buyer.email)
                .await?
                .ok_or_else(|| {
                    StoreError::Database("customer missing after duplicate-email conflict".into())
                        .into()
                }),
            Err(err) => Err(err.into()),
        }
    }
}

fn describe_items(items: &[OrderItem]) -> String {
    items
        .iter()
        .map(|item| format!("{} x{}", item.product_name, item.quantity))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PayFastMode;
    use crate::domain::NewProduct;
    use crate::services::discount::DiscountEngine;
    use crate::services::stock::StockLedger;
    use crate::store::{CustomerStore, MemoryStore, OrderStore, PaymentStore, ProductStore};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Channel stub that records the checkout fields it was handed.
    #[derive(Default)]
    struct RecordingChannel {
        sent: Mutex<Vec<Vec<(String, String)>>>,
    }

    #[async_trait]
    impl PayFastChannel for RecordingChannel {
        async fn request_redirect_url(
            &self,
            fields: &[(String, String)],
        ) -> Result<String, GatewayError> {
            self.sent.lock().unwrap().push(fields.to_vec());
            Ok("https://sandbox.payfast.co.za/eng/process/pay/abc123".to_string())
        }

        async fn validate_notification(&self, _raw_body: &str) -> Result<bool, GatewayError> {
            Ok(true)
        }
    }

    fn sandbox_config(configured: bool) -> PayFastConfig {
        PayFastConfig {
            mode: PayFastMode::Sandbox,
            merchant_id: configured.then(|| "10000100".to_string()),
            merchant_key: configured.then(|| "46f0cd694581a".to_string()),
            passphrase: Some("jt7NOE43FZPn".to_string()),
            timeout: Duration::from_secs(20),
        }
    }

    fn build(
        store: &Arc<MemoryStore>,
        channel: Arc<RecordingChannel>,
        configured: bool,
    ) -> PaymentService {
        let orders = OrderService::new(
            store.clone(),
            StockLedger::new(store.clone()),
            DiscountEngine::new(store.clone()),
        );
        PaymentService::new(
            store.clone(),
            orders,
            channel,
            sandbox_config(configured),
            "http://localhost:5173".to_string(),
            "http://localhost:5050".to_string(),
        )
    }

    async fn seed_product(store: &MemoryStore, price: Decimal, quantity: i32) -> i64 {
        store
            .insert_product(&NewProduct {
                product_name: "Folding Saw".to_string(),
                product_price: price,
                quantity,
                image_url: None,
                is_active: true,
            })
            .await
            .unwrap()
            .product_id
    }

    fn checkout_request(product_id: i64, quantity: i64) -> CheckoutRequest {
        CheckoutRequest {
            first_name: "Jane".to_string(),
            last_name: "Dube".to_string(),
            email: "Jane@Example.com".to_string(),
            items: vec![RawCartLine {
                product_id: Some(product_id),
                quantity: Some(quantity),
                cart_quantity: None,
            }],
        }
    }

    #[tokio::test]
    async fn test_payment_amount_comes_from_persisted_items() {
        let store = Arc::new(MemoryStore::new());
        let channel = Arc::new(RecordingChannel::default());
        let service = build(&store, channel, true);

        let customer = store
            .insert_customer("Jane Dube", "jane@example.com", None)
            .await
            .unwrap();
        let product_id = seed_product(&store, dec!(100.00), 5).await;
        let assembled = service
            .orders
            .create_order(
                customer.customer_id,
                &[CartLine {
                    product_id,
                    quantity: 2,
                }],
            )
            .await
            .unwrap();

        let payment = service
            .create_payment(assembled.order.order_id, "payfast")
            .await
            .unwrap();
        assert_eq!(payment.amount, dec!(200.00));
        assert_eq!(payment.payment_method, "payfast");
        assert_eq!(payment.payment_status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn test_payment_for_unknown_order() {
        let store = Arc::new(MemoryStore::new());
        let channel = Arc::new(RecordingChannel::default());
        let service = build(&store, channel, true);

        assert!(matches!(
            service.create_payment(404, "payfast").await.unwrap_err(),
            PaymentError::OrderNotFound { order_id: 404 }
        ));
    }

    #[tokio::test]
    async fn test_checkout_session_end_to_end() {
        let store = Arc::new(MemoryStore::new());
        let channel = Arc::new(RecordingChannel::default());
        let service = build(&store, channel.clone(), true);
        let product_id = seed_product(&store, dec!(100.00), 5).await;

        let session = service
            .create_hosted_payment_session(&checkout_request(product_id, 2))
            .await
            .unwrap();

        assert!(session.payfast_redirect_url.contains("payfast.co.za"));

        // A guest customer was created under the normalized email.
        let customer = store
            .find_customer_by_email("jane@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(customer.customer_name, "Jane Dube");

        let order = store
            .find_order(session.order_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(order.customer_id, customer.customer_id);

        let payment = store
            .find_payment(session.payment_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payment.order_id, session.order_id);

        let sent = channel.sent.lock().unwrap();
        let fields = &sent[0];
        let get = |key: &str| {
            fields
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
                .unwrap()
        };
        assert_eq!(get("m_payment_id"), session.payment_id.to_string());
        assert_eq!(get("custom_str1"), session.order_id.to_string());
        assert_eq!(get("amount"), "200.00");
        assert_eq!(get("item_description"), "Folding Saw x2");
        assert_eq!(
            get("item_name"),
            format!("Timberline Order #{}", session.order_id)
        );
        assert_eq!(fields.last().unwrap().0, "signature");
    }

    #[tokio::test]
    async fn test_checkout_reuses_customer_by_email() {
        let store = Arc::new(MemoryStore::new());
        let channel = Arc::new(RecordingChannel::default());
        let service = build(&store, channel, true);
        let product_id = seed_product(&store, dec!(40.00), 5).await;

        store
            .insert_customer("Jane Dube", "jane@example.com", None)
            .await
            .unwrap();

        service
            .create_hosted_payment_session(&checkout_request(product_id, 1))
            .await
            .unwrap();

        assert_eq!(store.list_customers().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_checkout_drops_junk_lines_and_rejects_empty_carts() {
        let store = Arc::new(MemoryStore::new());
        let channel = Arc::new(RecordingChannel::default());
        let service = build(&store, channel, true);
        let product_id = seed_product(&store, dec!(40.00), 5).await;

        let mut request = checkout_request(product_id, 1);
        request.items.push(RawCartLine {
            product_id: Some(-3),
            quantity: Some(2),
            cart_quantity: None,
        });
        request.items.push(RawCartLine {
            product_id: None,
            quantity: None,
            cart_quantity: None,
        });
        let session = service.create_hosted_payment_session(&request).await.unwrap();
        let items = store.order_items(session.order_id).await.unwrap();
        assert_eq!(items.len(), 1);

        let mut empty = checkout_request(product_id, 1);
        empty.items = vec![RawCartLine {
            product_id: Some(product_id),
            quantity: Some(0),
            cart_quantity: None,
        }];
        assert!(matches!(
            service
                .create_hosted_payment_session(&empty)
                .await
                .unwrap_err(),
            CheckoutError::Order(OrderError::EmptyCart)
        ));
    }

    #[tokio::test]
    async fn test_checkout_accepts_legacy_quantity_field() {
        let store = Arc::new(MemoryStore::new());
        let channel = Arc::new(RecordingChannel::default());
        let service = build(&store, channel, true);
        let product_id = seed_product(&store, dec!(40.00), 5).await;

        let mut request = checkout_request(product_id, 1);
        request.items = vec![RawCartLine {
            product_id: Some(product_id),
            quantity: None,
            cart_quantity: Some(3),
        }];
        let session = service.create_hosted_payment_session(&request).await.unwrap();
        let items = store.order_items(session.order_id).await.unwrap();
        assert_eq!(items[0].quantity, 3);
    }

    #[tokio::test]
    async fn test_checkout_rejects_bad_email() {
        let store = Arc::new(MemoryStore::new());
        let channel = Arc::new(RecordingChannel::default());
        let service = build(&store, channel, true);
        let product_id = seed_product(&store, dec!(40.00), 5).await;

        let mut request = checkout_request(product_id, 1);
        request.email = "not-an-email".to_string();
        assert!(matches!(
            service
                .create_hosted_payment_session(&request)
                .await
                .unwrap_err(),
            CheckoutError::InvalidEmail
        ));
    }

    #[tokio::test]
    async fn test_checkout_requires_gateway_credentials() {
        let store = Arc::new(MemoryStore::new());
        let channel = Arc::new(RecordingChannel::default());
        let service = build(&store, channel, false);
        let product_id = seed_product(&store, dec!(40.00), 5).await;

        assert!(matches!(
            service
                .create_hosted_payment_session(&checkout_request(product_id, 1))
                .await
                .unwrap_err(),
            CheckoutError::Gateway(GatewayError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn test_refund_requires_completed_payment() {
        let store = Arc::new(MemoryStore::new());
        let channel = Arc::new(RecordingChannel::default());
        let service = build(&store, channel, true);

        let customer = store
            .insert_customer("Jane Dube", "jane@example.com", None)
            .await
            .unwrap();
        let product_id = seed_product(&store, dec!(60.00), 5).await;
        let assembled = service
            .orders
            .create_order(
                customer.customer_id,
                &[CartLine {
                    product_id,
                    quantity: 1,
                }],
            )
            .await
            .unwrap();
        let payment = service
            .create_payment(assembled.order.order_id, "payfast")
            .await
            .unwrap();

        assert!(matches!(
            service
                .refund_payment(payment.payment_id, "RF-1", None)
                .await
                .unwrap_err(),
            PaymentError::RefundNotAllowed { .. }
        ));

        store
            .update_payment_status(payment.payment_id, PaymentStatus::Completed)
            .await
            .unwrap();
        let refunded = service
            .refund_payment(payment.payment_id, "RF-1", None)
            .await
            .unwrap();
        assert_eq!(refunded.refund_id.as_deref(), Some("RF-1"));
        assert_eq!(refunded.refund_amount, Some(dec!(60.00)));
        assert_eq!(refunded.refund_status.as_deref(), Some("completed"));
    }
}
