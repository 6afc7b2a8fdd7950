//! In-memory adapter. Backs the test suites and keeps the same observable
//! semantics as the Postgres adapter, including the conditional stock
//! decrement, which here happens under a single write lock.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::{
    Customer, DiscountCondition, DiscountRule, NewProduct, Order, OrderItem, OrderStatus, Payment,
    PaymentStatus, Product, RuleWithConditions,
};

use super::{
    CustomerPatch, CustomerStore, DiscountRuleStore, NewOrder, OrderStore, PaymentStore,
    ProductPatch, ProductStore, StoreError,
};

#[derive(Default)]
struct Inner {
    customers: HashMap<i64, Customer>,
    products: HashMap<i64, Product>,
    orders: HashMap<i64, Order>,
    order_items: HashMap<i64, OrderItem>,
    payments: HashMap<i64, Payment>,
    rules: Vec<RuleWithConditions>,
    rules_unavailable: bool,
    next_id: i64,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// A thread-safe in-memory store covering every persistence port.
#[derive(Default, Clone)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an active discount rule with raw `(condition_type,
    /// condition_value)` rows and returns its id.
    pub async fn add_rule(
        &self,
        rule_name: &str,
        discount_value: Decimal,
        priority: i32,
        conditions: &[(&str, &str)],
    ) -> i64 {
        let mut inner = self.inner.write().await;
        let rule_id = inner.next_id();
        let conditions = conditions
            .iter()
            .enumerate()
            .map(|(idx, (condition_type, condition_value))| DiscountCondition {
                condition_id: rule_id * 1000 + idx as i64 + 1,
                rule_id,
                condition_type: condition_type.to_string(),
                operator: String::new(),
                condition_value: condition_value.to_string(),
            })
            .collect();
        inner.rules.push(RuleWithConditions {
            rule: DiscountRule {
                rule_id,
                rule_name: rule_name.to_string(),
                discount_value,
                priority,
                is_active: true,
            },
            conditions,
        });
        rule_id
    }

    /// Makes every rule load fail until called again with `false`.
    pub async fn set_rules_unavailable(&self, unavailable: bool) {
        self.inner.write().await.rules_unavailable = unavailable;
    }
}

#[async_trait]
impl CustomerStore for MemoryStore {
    async fn list_customers(&self) -> Result<Vec<Customer>, StoreError> {
        let inner = self.inner.read().await;
        let mut customers: Vec<_> = inner.customers.values().cloned().collect();
        customers.sort_by_key(|c| c.customer_id);
        Ok(customers)
    }

    async fn find_customer(&self, customer_id: i64) -> Result<Option<Customer>, StoreError> {
        Ok(self.inner.read().await.customers.get(&customer_id).cloned())
    }

    async fn find_customer_by_email(&self, email: &str) -> Result<Option<Customer>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .customers
            .values()
            .find(|c| c.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn insert_customer(
        &self,
        customer_name: &str,
        email: &str,
        credential_hash: Option<&str>,
    ) -> Result<Customer, StoreError> {
        let mut inner = self.inner.write().await;
        if inner
            .customers
            .values()
            .any(|c| c.email.eq_ignore_ascii_case(email))
        {
            return Err(StoreError::DuplicateEmail {
                email: email.to_string(),
            });
        }
        let customer = Customer {
            customer_id: inner.next_id(),
            customer_name: customer_name.to_string(),
            email: email.to_string(),
            credential_hash: credential_hash.map(str::to_string),
            created_at: Utc::now(),
        };
        inner.customers.insert(customer.customer_id, customer.clone());
        Ok(customer)
    }

    async fn update_customer(
        &self,
        customer_id: i64,
        patch: CustomerPatch,
    ) -> Result<Option<Customer>, StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(email) = &patch.email {
            if inner
                .customers
                .values()
                .any(|c| c.customer_id != customer_id && c.email.eq_ignore_ascii_case(email))
            {
                return Err(StoreError::DuplicateEmail {
                    email: email.clone(),
                });
            }
        }
        let Some(customer) = inner.customers.get_mut(&customer_id) else {
            return Ok(None);
        };
        if let Some(customer_name) = patch.customer_name {
            customer.customer_name = customer_name;
        }
        if let Some(email) = patch.email {
            customer.email = email;
        }
        if let Some(credential_hash) = patch.credential_hash {
            customer.credential_hash = Some(credential_hash);
        }
        Ok(Some(customer.clone()))
    }

    async fn delete_customer(&self, customer_id: i64) -> Result<bool, StoreError> {
        Ok(self
            .inner
            .write()
            .await
            .customers
            .remove(&customer_id)
            .is_some())
    }
}

#[async_trait]
impl ProductStore for MemoryStore {
    async fn list_products(&self, include_inactive: bool) -> Result<Vec<Product>, StoreError> {
        let inner = self.inner.read().await;
        let mut products: Vec<_> = inner
            .products
            .values()
            .filter(|p| include_inactive || p.is_active)
            .cloned()
            .collect();
        products.sort_by_key(|p| p.product_id);
        Ok(products)
    }

    async fn find_product(&self, product_id: i64) -> Result<Option<Product>, StoreError> {
        Ok(self.inner.read().await.products.get(&product_id).cloned())
    }

    async fn insert_product(&self, new: &NewProduct) -> Result<Product, StoreError> {
        let mut inner = self.inner.write().await;
        let product = Product {
            product_id: inner.next_id(),
            product_name: new.product_name.clone(),
            product_price: new.product_price,
            quantity: new.quantity,
            image_url: new.image_url.clone(),
            is_active: new.is_active,
            created_at: Utc::now(),
        };
        inner.products.insert(product.product_id, product.clone());
        Ok(product)
    }

    async fn update_product(
        &self,
        product_id: i64,
        patch: ProductPatch,
    ) -> Result<Option<Product>, StoreError> {
        let mut inner = self.inner.write().await;
        let Some(product) = inner.products.get_mut(&product_id) else {
            return Ok(None);
        };
        if let Some(product_name) = patch.product_name {
            product.product_name = product_name;
        }
        if let Some(product_price) = patch.product_price {
            product.product_price = product_price;
        }
        if let Some(quantity) = patch.quantity {
            product.quantity = quantity;
        }
        if let Some(image_url) = patch.image_url {
            product.image_url = Some(image_url);
        }
        if let Some(is_active) = patch.is_active {
            product.is_active = is_active;
        }
        Ok(Some(product.clone()))
    }

    async fn delete_product(&self, product_id: i64) -> Result<bool, StoreError> {
        Ok(self
            .inner
            .write()
            .await
            .products
            .remove(&product_id)
            .is_some())
    }

    async fn decrement_stock(&self, product_id: i64, quantity: i32) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        let Some(product) = inner.products.get_mut(&product_id) else {
            return Ok(false);
        };
        if product.quantity < quantity {
            return Ok(false);
        }
        product.quantity -= quantity;
        Ok(true)
    }

    async fn increment_stock(&self, product_id: i64, quantity: i32) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(product) = inner.products.get_mut(&product_id) {
            product.quantity += quantity;
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn list_orders(&self) -> Result<Vec<Order>, StoreError> {
        let inner = self.inner.read().await;
        let mut orders: Vec<_> = inner.orders.values().cloned().collect();
        orders.sort_by_key(|o| std::cmp::Reverse(o.order_id));
        Ok(orders)
    }

    async fn find_order(&self, order_id: i64) -> Result<Option<Order>, StoreError> {
        Ok(self.inner.read().await.orders.get(&order_id).cloned())
    }

    async fn insert_order(&self, new: &NewOrder) -> Result<Order, StoreError> {
        let mut inner = self.inner.write().await;
        let order = Order {
            order_id: inner.next_id(),
            customer_id: new.customer_id,
            original_total: new.original_total,
            discount_percent: new.discount_percent,
            discount_amount: new.discount_amount,
            final_total: new.final_total,
            order_status: OrderStatus::Pending,
            order_date: Utc::now(),
        };
        inner.orders.insert(order.order_id, order.clone());
        Ok(order)
    }

    async fn update_order_status(
        &self,
        order_id: i64,
        status: OrderStatus,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        match inner.orders.get_mut(&order_id) {
            Some(order) => {
                order.order_status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_order(&self, order_id: i64) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        let removed = inner.orders.remove(&order_id).is_some();
        if removed {
            inner.order_items.retain(|_, item| item.order_id != order_id);
        }
        Ok(removed)
    }

    async fn count_orders_for_customer(&self, customer_id: i64) -> Result<i64, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .orders
            .values()
            .filter(|o| o.customer_id == customer_id)
            .count() as i64)
    }

    async fn insert_order_item(
        &self,
        order_id: i64,
        product_id: i64,
        quantity: i32,
        unit_price: Decimal,
    ) -> Result<OrderItem, StoreError> {
        let mut inner = self.inner.write().await;
        let product_name = inner
            .products
            .get(&product_id)
            .map(|p| p.product_name.clone())
            .unwrap_or_default();
        let item = OrderItem {
            order_item_id: inner.next_id(),
            order_id,
            product_id,
            product_name,
            quantity,
            unit_price,
        };
        inner.order_items.insert(item.order_item_id, item.clone());
        Ok(item)
    }

    async fn order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, StoreError> {
        let inner = self.inner.read().await;
        let mut items: Vec<_> = inner
            .order_items
            .values()
            .filter(|item| item.order_id == order_id)
            .cloned()
            .collect();
        items.sort_by_key(|item| item.order_item_id);
        Ok(items)
    }

    async fn find_order_item(&self, order_item_id: i64) -> Result<Option<OrderItem>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .order_items
            .get(&order_item_id)
            .cloned())
    }

    async fn update_order_item_quantity(
        &self,
        order_item_id: i64,
        quantity: i32,
    ) -> Result<Option<OrderItem>, StoreError> {
        let mut inner = self.inner.write().await;
        Ok(inner.order_items.get_mut(&order_item_id).map(|item| {
            item.quantity = quantity;
            item.clone()
        }))
    }

    async fn delete_order_item(&self, order_item_id: i64) -> Result<bool, StoreError> {
        Ok(self
            .inner
            .write()
            .await
            .order_items
            .remove(&order_item_id)
            .is_some())
    }
}

#[async_trait]
impl PaymentStore for MemoryStore {
    async fn list_payments(&self) -> Result<Vec<Payment>, StoreError> {
        let inner = self.inner.read().await;
        let mut payments: Vec<_> = inner.payments.values().cloned().collect();
        payments.sort_by_key(|p| std::cmp::Reverse(p.payment_id));
        Ok(payments)
    }

    async fn find_payment(&self, payment_id: i64) -> Result<Option<Payment>, StoreError> {
        Ok(self.inner.read().await.payments.get(&payment_id).cloned())
    }

    async fn payments_for_order(&self, order_id: i64) -> Result<Vec<Payment>, StoreError> {
        let inner = self.inner.read().await;
        let mut payments: Vec<_> = inner
            .payments
            .values()
            .filter(|p| p.order_id == order_id)
            .cloned()
            .collect();
        payments.sort_by_key(|p| p.payment_id);
        Ok(payments)
    }

    async fn insert_payment(
        &self,
        order_id: i64,
        amount: Decimal,
        payment_method: &str,
    ) -> Result<Payment, StoreError> {
        let mut inner = self.inner.write().await;
        let payment = Payment {
            payment_id: inner.next_id(),
            order_id,
            amount,
            payment_method: payment_method.to_string(),
            payment_status: PaymentStatus::Pending,
            refund_id: None,
            refund_amount: None,
            refund_status: None,
            created_at: Utc::now(),
        };
        inner.payments.insert(payment.payment_id, payment.clone());
        Ok(payment)
    }

    async fn update_payment_status(
        &self,
        payment_id: i64,
        status: PaymentStatus,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        match inner.payments.get_mut(&payment_id) {
            Some(payment) => {
                payment.payment_status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn record_refund(
        &self,
        payment_id: i64,
        refund_id: &str,
        refund_amount: Decimal,
        refund_status: &str,
    ) -> Result<Option<Payment>, StoreError> {
        let mut inner = self.inner.write().await;
        Ok(inner.payments.get_mut(&payment_id).map(|payment| {
            payment.refund_id = Some(refund_id.to_string());
            payment.refund_amount = Some(refund_amount);
            payment.refund_status = Some(refund_status.to_string());
            payment.clone()
        }))
    }

    async fn update_refund_status(
        &self,
        payment_id: i64,
        refund_status: &str,
    ) -> Result<Option<Payment>, StoreError> {
        let mut inner = self.inner.write().await;
        Ok(inner.payments.get_mut(&payment_id).map(|payment| {
            payment.refund_status = Some(refund_status.to_string());
            payment.clone()
        }))
    }
}

#[async_trait]
impl DiscountRuleStore for MemoryStore {
    async fn active_rules(&self) -> Result<Vec<RuleWithConditions>, StoreError> {
        let inner = self.inner.read().await;
        if inner.rules_unavailable {
            return Err(StoreError::Database("rule source offline".to_string()));
        }
        let mut rules: Vec<_> = inner
            .rules
            .iter()
            .filter(|r| r.rule.is_active)
            .cloned()
            .collect();
        rules.sort_by_key(|r| (r.rule.priority, r.rule.rule_id));
        Ok(rules)
    }
}
