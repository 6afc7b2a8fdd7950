//! Postgres adapter on sqlx runtime queries.
//!
//! Rows come back through private `FromRow` structs with plain text status
//! columns and convert into domain types at the edge, so a row carrying a
//! status value the code no longer knows surfaces as a storage error instead
//! of a silent default.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::domain::{
    Customer, DiscountCondition, DiscountRule, NewProduct, Order, OrderItem, OrderStatus, Payment,
    PaymentStatus, Product, RuleWithConditions, UnknownStatus,
};

use super::{
    CustomerPatch, CustomerStore, DiscountRuleStore, NewOrder, OrderStore, PaymentStore,
    ProductPatch, ProductStore, StoreError,
};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some("23505"),
        _ => false,
    }
}

fn bad_status(err: UnknownStatus) -> StoreError {
    StoreError::Database(err.to_string())
}

#[derive(sqlx::FromRow)]
struct CustomerRow {
    customer_id: i64,
    customer_name: String,
    email: String,
    credential_hash: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<CustomerRow> for Customer {
    fn from(row: CustomerRow) -> Self {
        Self {
            customer_id: row.customer_id,
            customer_name: row.customer_name,
            email: row.email,
            credential_hash: row.credential_hash,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    product_id: i64,
    product_name: String,
    product_price: Decimal,
    quantity: i32,
    image_url: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            product_id: row.product_id,
            product_name: row.product_name,
            product_price: row.product_price,
            quantity: row.quantity,
            image_url: row.image_url,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    order_id: i64,
    customer_id: i64,
    original_total: Decimal,
    discount_percent: Decimal,
    discount_amount: Decimal,
    final_total: Decimal,
    order_status: String,
    order_date: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self, StoreError> {
        Ok(Self {
            order_id: row.order_id,
            customer_id: row.customer_id,
            original_total: row.original_total,
            discount_percent: row.discount_percent,
            discount_amount: row.discount_amount,
            final_total: row.final_total,
            order_status: row.order_status.parse().map_err(bad_status)?,
            order_date: row.order_date,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    order_item_id: i64,
    order_id: i64,
    product_id: i64,
    product_name: String,
    quantity: i32,
    unit_price: Decimal,
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        Self {
            order_item_id: row.order_item_id,
            order_id: row.order_id,
            product_id: row.product_id,
            product_name: row.product_name,
            quantity: row.quantity,
            unit_price: row.unit_price,
        }
    }
}

// Line items always come back with the current catalog name joined in.
const ORDER_ITEM_COLUMNS: &str = "oi.order_item_id, oi.order_id, oi.product_id, \
     p.product_name, oi.quantity, oi.unit_price";

#[derive(sqlx::FromRow)]
struct PaymentRow {
    payment_id: i64,
    order_id: i64,
    amount: Decimal,
    payment_method: String,
    payment_status: String,
    refund_id: Option<String>,
    refund_amount: Option<Decimal>,
    refund_status: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = StoreError;

    fn try_from(row: PaymentRow) -> Result<Self, StoreError> {
        Ok(Self {
            payment_id: row.payment_id,
            order_id: row.order_id,
            amount: row.amount,
            payment_method: row.payment_method,
            payment_status: row.payment_status.parse().map_err(bad_status)?,
            refund_id: row.refund_id,
            refund_amount: row.refund_amount,
            refund_status: row.refund_status,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RuleRow {
    rule_id: i64,
    rule_name: String,
    discount_value: Decimal,
    priority: i32,
    is_active: bool,
}

#[derive(sqlx::FromRow)]
struct ConditionRow {
    condition_id: i64,
    rule_id: i64,
    condition_type: String,
    operator: String,
    condition_value: String,
}

#[async_trait]
impl CustomerStore for PgStore {
    async fn list_customers(&self) -> Result<Vec<Customer>, StoreError> {
        let rows = sqlx::query_as::<_, CustomerRow>("SELECT * FROM customer ORDER BY customer_id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Customer::from).collect())
    }

    async fn find_customer(&self, customer_id: i64) -> Result<Option<Customer>, StoreError> {
        let row = sqlx::query_as::<_, CustomerRow>("SELECT * FROM customer WHERE customer_id = $1")
            .bind(customer_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Customer::from))
    }

    async fn find_customer_by_email(&self, email: &str) -> Result<Option<Customer>, StoreError> {
        let row =
            sqlx::query_as::<_, CustomerRow>("SELECT * FROM customer WHERE LOWER(email) = LOWER($1)")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Customer::from))
    }

    async fn insert_customer(
        &self,
        customer_name: &str,
        email: &str,
        credential_hash: Option<&str>,
    ) -> Result<Customer, StoreError> {
        let row = sqlx::query_as::<_, CustomerRow>(
            "INSERT INTO customer (customer_name, email, credential_hash) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(customer_name)
        .bind(email)
        .bind(credential_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                StoreError::DuplicateEmail {
                    email: email.to_string(),
                }
            } else {
                err.into()
            }
        })?;
        Ok(row.into())
    }

    async fn update_customer(
        &self,
        customer_id: i64,
        patch: CustomerPatch,
    ) -> Result<Option<Customer>, StoreError> {
        let email_for_error = patch.email.clone();
        let row = sqlx::query_as::<_, CustomerRow>(
            "UPDATE customer SET customer_name = COALESCE($2, customer_name), email = COALESCE($3, email), credential_hash = COALESCE($4, credential_hash) WHERE customer_id = $1 RETURNING *",
        )
        .bind(customer_id)
        .bind(patch.customer_name)
        .bind(patch.email)
        .bind(patch.credential_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                StoreError::DuplicateEmail {
                    email: email_for_error.unwrap_or_default(),
                }
            } else {
                err.into()
            }
        })?;
        Ok(row.map(Customer::from))
    }

    async fn delete_customer(&self, customer_id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM customer WHERE customer_id = $1")
            .bind(customer_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl ProductStore for PgStore {
    async fn list_products(&self, include_inactive: bool) -> Result<Vec<Product>, StoreError> {
        let rows = sqlx::query_as::<_, ProductRow>(
            "SELECT * FROM products WHERE is_active OR $1 ORDER BY product_id",
        )
        .bind(include_inactive)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn find_product(&self, product_id: i64) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE product_id = $1")
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Product::from))
    }

    async fn insert_product(&self, new: &NewProduct) -> Result<Product, StoreError> {
        let row = sqlx::query_as::<_, ProductRow>(
            "INSERT INTO products (product_name, product_price, quantity, image_url, is_active) VALUES ($1, $2, $3, $4, $5) RETURNING *",
        )
        .bind(&new.product_name)
        .bind(new.product_price)
        .bind(new.quantity)
        .bind(&new.image_url)
        .bind(new.is_active)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn update_product(
        &self,
        product_id: i64,
        patch: ProductPatch,
    ) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query_as::<_, ProductRow>(
            "UPDATE products SET product_name = COALESCE($2, product_name), product_price = COALESCE($3, product_price), quantity = COALESCE($4, quantity), image_url = COALESCE($5, image_url), is_active = COALESCE($6, is_active) WHERE product_id = $1 RETURNING *",
        )
        .bind(product_id)
        .bind(patch.product_name)
        .bind(patch.product_price)
        .bind(patch.quantity)
        .bind(patch.image_url)
        .bind(patch.is_active)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Product::from))
    }

    async fn delete_product(&self, product_id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM products WHERE product_id = $1")
            .bind(product_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn decrement_stock(&self, product_id: i64, quantity: i32) -> Result<bool, StoreError> {
        // The WHERE clause is the whole concurrency story: the row-level
        // conditional update either wins atomically or leaves stock untouched.
        let result = sqlx::query(
            "UPDATE products SET quantity = quantity - $2 WHERE product_id = $1 AND quantity >= $2",
        )
        .bind(product_id)
        .bind(quantity)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn increment_stock(&self, product_id: i64, quantity: i32) -> Result<(), StoreError> {
        sqlx::query("UPDATE products SET quantity = quantity + $2 WHERE product_id = $1")
            .bind(product_id)
            .bind(quantity)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn list_orders(&self) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders ORDER BY order_id DESC")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Order::try_from).collect()
    }

    async fn find_order(&self, order_id: i64) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE order_id = $1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Order::try_from).transpose()
    }

    async fn insert_order(&self, new: &NewOrder) -> Result<Order, StoreError> {
        let row = sqlx::query_as::<_, OrderRow>(
            "INSERT INTO orders (customer_id, original_total, discount_percent, discount_amount, final_total) VALUES ($1, $2, $3, $4, $5) RETURNING *",
        )
        .bind(new.customer_id)
        .bind(new.original_total)
        .bind(new.discount_percent)
        .bind(new.discount_amount)
        .bind(new.final_total)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn update_order_status(
        &self,
        order_id: i64,
        status: OrderStatus,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE orders SET order_status = $2 WHERE order_id = $1")
            .bind(order_id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_order(&self, order_id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM orders WHERE order_id = $1")
            .bind(order_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn count_orders_for_customer(&self, customer_id: i64) -> Result<i64, StoreError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders WHERE customer_id = $1")
            .bind(customer_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    async fn insert_order_item(
        &self,
        order_id: i64,
        product_id: i64,
        quantity: i32,
        unit_price: Decimal,
    ) -> Result<OrderItem, StoreError> {
        let row = sqlx::query_as::<_, OrderItemRow>(
            "INSERT INTO order_items (order_id, product_id, quantity, unit_price) \
             VALUES ($1, $2, $3, $4) \
             RETURNING order_item_id, order_id, product_id, \
             (SELECT product_name FROM products WHERE product_id = $2) AS product_name, \
             quantity, unit_price",
        )
        .bind(order_id)
        .bind(product_id)
        .bind(quantity)
        .bind(unit_price)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, StoreError> {
        let rows = sqlx::query_as::<_, OrderItemRow>(&format!(
            "SELECT {ORDER_ITEM_COLUMNS} FROM order_items oi \
             JOIN products p ON p.product_id = oi.product_id \
             WHERE oi.order_id = $1 ORDER BY oi.order_item_id"
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(OrderItem::from).collect())
    }

    async fn find_order_item(&self, order_item_id: i64) -> Result<Option<OrderItem>, StoreError> {
        let row = sqlx::query_as::<_, OrderItemRow>(&format!(
            "SELECT {ORDER_ITEM_COLUMNS} FROM order_items oi \
             JOIN products p ON p.product_id = oi.product_id \
             WHERE oi.order_item_id = $1"
        ))
        .bind(order_item_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(OrderItem::from))
    }

    async fn update_order_item_quantity(
        &self,
        order_item_id: i64,
        quantity: i32,
    ) -> Result<Option<OrderItem>, StoreError> {
        let row = sqlx::query_as::<_, OrderItemRow>(
            "UPDATE order_items SET quantity = $2 WHERE order_item_id = $1 \
             RETURNING order_item_id, order_id, product_id, \
             (SELECT product_name FROM products WHERE product_id = order_items.product_id) \
             AS product_name, quantity, unit_price",
        )
        .bind(order_item_id)
        .bind(quantity)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(OrderItem::from))
    }

    async fn delete_order_item(&self, order_item_id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM order_items WHERE order_item_id = $1")
            .bind(order_item_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl PaymentStore for PgStore {
    async fn list_payments(&self) -> Result<Vec<Payment>, StoreError> {
        let rows = sqlx::query_as::<_, PaymentRow>("SELECT * FROM payments ORDER BY payment_id DESC")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Payment::try_from).collect()
    }

    async fn find_payment(&self, payment_id: i64) -> Result<Option<Payment>, StoreError> {
        let row = sqlx::query_as::<_, PaymentRow>("SELECT * FROM payments WHERE payment_id = $1")
            .bind(payment_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Payment::try_from).transpose()
    }

    async fn payments_for_order(&self, order_id: i64) -> Result<Vec<Payment>, StoreError> {
        let rows = sqlx::query_as::<_, PaymentRow>(
            "SELECT * FROM payments WHERE order_id = $1 ORDER BY payment_id",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Payment::try_from).collect()
    }

    async fn insert_payment(
        &self,
        order_id: i64,
        amount: Decimal,
        payment_method: &str,
    ) -> Result<Payment, StoreError> {
        let row = sqlx::query_as::<_, PaymentRow>(
            "INSERT INTO payments (order_id, amount, payment_method) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(order_id)
        .bind(amount)
        .bind(payment_method)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn update_payment_status(
        &self,
        payment_id: i64,
        status: PaymentStatus,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE payments SET payment_status = $2 WHERE payment_id = $1")
            .bind(payment_id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn record_refund(
        &self,
        payment_id: i64,
        refund_id: &str,
        refund_amount: Decimal,
        refund_status: &str,
    ) -> Result<Option<Payment>, StoreError> {
        let row = sqlx::query_as::<_, PaymentRow>(
            "UPDATE payments SET refund_id = $2, refund_amount = $3, refund_status = $4 WHERE payment_id = $1 RETURNING *",
        )
        .bind(payment_id)
        .bind(refund_id)
        .bind(refund_amount)
        .bind(refund_status)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Payment::try_from).transpose()
    }

    async fn update_refund_status(
        &self,
        payment_id: i64,
        refund_status: &str,
    ) -> Result<Option<Payment>, StoreError> {
        let row = sqlx::query_as::<_, PaymentRow>(
            "UPDATE payments SET refund_status = $2 WHERE payment_id = $1 RETURNING *",
        )
        .bind(payment_id)
        .bind(refund_status)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Payment::try_from).transpose()
    }
}

#[async_trait]
impl DiscountRuleStore for PgStore {
    async fn active_rules(&self) -> Result<Vec<RuleWithConditions>, StoreError> {
        let rules = sqlx::query_as::<_, RuleRow>(
            "SELECT * FROM discount_rules WHERE is_active ORDER BY priority, rule_id",
        )
        .fetch_all(&self.pool)
        .await?;
        if rules.is_empty() {
            return Ok(Vec::new());
        }

        let rule_ids: Vec<i64> = rules.iter().map(|r| r.rule_id).collect();
        let condition_rows = sqlx::query_as::<_, ConditionRow>(
            "SELECT * FROM discount_conditions WHERE rule_id = ANY($1) ORDER BY condition_id",
        )
        .bind(&rule_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: std::collections::HashMap<i64, Vec<DiscountCondition>> =
            std::collections::HashMap::new();
        for row in condition_rows {
            grouped
                .entry(row.rule_id)
                .or_default()
                .push(DiscountCondition {
                    condition_id: row.condition_id,
                    rule_id: row.rule_id,
                    condition_type: row.condition_type,
                    operator: row.operator,
                    condition_value: row.condition_value,
                });
        }

        Ok(rules
            .into_iter()
            .map(|row| RuleWithConditions {
                conditions: grouped.remove(&row.rule_id).unwrap_or_default(),
                rule: DiscountRule {
                    rule_id: row.rule_id,
                    rule_name: row.rule_name,
                    discount_value: row.discount_value,
                    priority: row.priority,
                    is_active: row.is_active,
                },
            })
            .collect())
    }
}
