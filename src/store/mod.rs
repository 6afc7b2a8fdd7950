//! Persistence ports. The rest of the crate talks to storage only through
//! these traits; adapters live in [`memory`] and [`postgres`].

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

use crate::domain::{
    Customer, NewProduct, Order, OrderItem, OrderStatus, Payment, PaymentStatus, Product,
    RuleWithConditions,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("email already registered: {email}")]
    DuplicateEmail { email: String },
    #[error("storage failure: {0}")]
    Database(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.to_string())
    }
}

/// Field-wise customer update; `None` leaves the column untouched.
#[derive(Clone, Debug, Default)]
pub struct CustomerPatch {
    pub customer_name: Option<String>,
    pub email: Option<String>,
    pub credential_hash: Option<String>,
}

/// Field-wise product update; `None` leaves the column untouched.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ProductPatch {
    pub product_name: Option<String>,
    pub product_price: Option<Decimal>,
    pub quantity: Option<i32>,
    pub image_url: Option<String>,
    pub is_active: Option<bool>,
}

/// Order header as computed by order assembly, before it has an id.
#[derive(Clone, Debug)]
pub struct NewOrder {
    pub customer_id: i64,
    pub original_total: Decimal,
    pub discount_percent: Decimal,
    pub discount_amount: Decimal,
    pub final_total: Decimal,
}

#[async_trait]
pub trait CustomerStore: Send + Sync {
    async fn list_customers(&self) -> Result<Vec<Customer>, StoreError>;
    async fn find_customer(&self, customer_id: i64) -> Result<Option<Customer>, StoreError>;
    /// Lookup by already-normalized (lowercased) email.
    async fn find_customer_by_email(&self, email: &str) -> Result<Option<Customer>, StoreError>;
    async fn insert_customer(
        &self,
        customer_name: &str,
        email: &str,
        credential_hash: Option<&str>,
    ) -> Result<Customer, StoreError>;
    async fn update_customer(
        &self,
        customer_id: i64,
        patch: CustomerPatch,
    ) -> Result<Option<Customer>, StoreError>;
    async fn delete_customer(&self, customer_id: i64) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn list_products(&self, include_inactive: bool) -> Result<Vec<Product>, StoreError>;
    async fn find_product(&self, product_id: i64) -> Result<Option<Product>, StoreError>;
    async fn insert_product(&self, new: &NewProduct) -> Result<Product, StoreError>;
    async fn update_product(
        &self,
        product_id: i64,
        patch: ProductPatch,
    ) -> Result<Option<Product>, StoreError>;
    async fn delete_product(&self, product_id: i64) -> Result<bool, StoreError>;
    /// Conditional decrement: succeeds only when the row still holds at least
    /// `quantity` units at update time. Returns false otherwise.
    async fn decrement_stock(&self, product_id: i64, quantity: i32) -> Result<bool, StoreError>;
    /// Unconditional add-back, used for compensation.
    async fn increment_stock(&self, product_id: i64, quantity: i32) -> Result<(), StoreError>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn list_orders(&self) -> Result<Vec<Order>, StoreError>;
    async fn find_order(&self, order_id: i64) -> Result<Option<Order>, StoreError>;
    async fn insert_order(&self, new: &NewOrder) -> Result<Order, StoreError>;
    async fn update_order_status(
        &self,
        order_id: i64,
        status: OrderStatus,
    ) -> Result<bool, StoreError>;
    /// Removes the order and, by cascade, its items.
    async fn delete_order(&self, order_id: i64) -> Result<bool, StoreError>;
    async fn count_orders_for_customer(&self, customer_id: i64) -> Result<i64, StoreError>;

    async fn insert_order_item(
        &self,
        order_id: i64,
        product_id: i64,
        quantity: i32,
        unit_price: Decimal,
    ) -> Result<OrderItem, StoreError>;
    async fn order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, StoreError>;
    async fn find_order_item(&self, order_item_id: i64) -> Result<Option<OrderItem>, StoreError>;
    async fn update_order_item_quantity(
        &self,
        order_item_id: i64,
        quantity: i32,
    ) -> Result<Option<OrderItem>, StoreError>;
    async fn delete_order_item(&self, order_item_id: i64) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn list_payments(&self) -> Result<Vec<Payment>, StoreError>;
    async fn find_payment(&self, payment_id: i64) -> Result<Option<Payment>, StoreError>;
    async fn payments_for_order(&self, order_id: i64) -> Result<Vec<Payment>, StoreError>;
    async fn insert_payment(
        &self,
        order_id: i64,
        amount: Decimal,
        payment_method: &str,
    ) -> Result<Payment, StoreError>;
    async fn update_payment_status(
        &self,
        payment_id: i64,
        status: PaymentStatus,
    ) -> Result<bool, StoreError>;
    async fn record_refund(
        &self,
        payment_id: i64,
        refund_id: &str,
        refund_amount: Decimal,
        refund_status: &str,
    ) -> Result<Option<Payment>, StoreError>;
    async fn update_refund_status(
        &self,
        payment_id: i64,
        refund_status: &str,
    ) -> Result<Option<Payment>, StoreError>;
}

#[async_trait]
pub trait DiscountRuleStore: Send + Sync {
    /// Active rules in `priority ASC, rule_id ASC` order, each with its raw
    /// condition rows.
    async fn active_rules(&self) -> Result<Vec<RuleWithConditions>, StoreError>;
}

/// The full persistence surface, for callers that span concerns.
pub trait Store:
    CustomerStore + ProductStore + OrderStore + PaymentStore + DiscountRuleStore
{
}

impl<T> Store for T where
    T: CustomerStore + ProductStore + OrderStore + PaymentStore + DiscountRuleStore
{
}
