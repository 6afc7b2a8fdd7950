//! Order assembly: cart validation, pricing, discount selection, persistence
//! and stock reservation, in that order.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::domain::money::{line_total, round_currency};
use crate::domain::{CartLine, CustomerContext, DiscountDecision, Order, OrderItem, ValidatedLine};
use crate::services::discount::DiscountEngine;
use crate::services::stock::{StockError, StockLedger};
use crate::store::{NewOrder, Store, StoreError};

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("customer {customer_id} not found")]
    CustomerNotFound { customer_id: i64 },
    #[error("order {order_id} not found")]
    OrderNotFound { order_id: i64 },
    #[error("cart has no lines")]
    EmptyCart,
    #[error("product {product_id} not found")]
    ProductNotFound { product_id: i64 },
    #[error("invalid quantity {quantity} for product {product_id}")]
    InvalidQuantity { product_id: i64, quantity: i32 },
    #[error(
        "insufficient stock for product {product_id}: available {available}, requested {requested}"
    )]
    InsufficientStock {
        product_id: i64,
        available: i32,
        requested: i32,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<StockError> for OrderError {
    fn from(err: StockError) -> Self {
        match err {
            StockError::ProductNotFound { product_id } => Self::ProductNotFound { product_id },
            StockError::InsufficientStock {
                product_id,
                available,
                requested,
            } => Self::InsufficientStock {
                product_id,
                available,
                requested,
            },
            StockError::Store(err) => Self::Store(err),
        }
    }
}

/// A freshly created order with its line items and the discount decision that
/// priced it.
#[derive(Debug, Serialize)]
pub struct AssembledOrder {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub discount_summary: DiscountDecision,
}

/// What a cart would cost right now, without touching stock or storage.
#[derive(Debug, Serialize)]
pub struct DiscountPreview {
    pub subtotal: Decimal,
    pub discount: DiscountDecision,
}

#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn Store>,
    ledger: StockLedger,
    discounts: DiscountEngine,
}

impl OrderService {
    pub fn new(store: Arc<dyn Store>, ledger: StockLedger, discounts: DiscountEngine) -> Self {
        Self {
            store,
            ledger,
            discounts,
        }
    }

    /// Resolves the customer and whether this would be their first order.
    pub async fn customer_context(&self, customer_id: i64) -> Result<CustomerContext, OrderError> {
        let Some(customer) = self.store.find_customer(customer_id).await? else {
            return Err(OrderError::CustomerNotFound { customer_id });
        };
        let prior_orders = self
            .store
            .count_orders_for_customer(customer.customer_id)
            .await?;
        Ok(CustomerContext {
            customer_id: customer.customer_id,
            first_time_buyer: prior_orders == 0,
        })
    }

    /// Checks every line before anything is written: the product must exist
    /// and be active, the quantity positive, and (when `check_stock`) covered
    /// by the current stock snapshot.
    async fn validate_lines(
        &self,
        cart_lines: &[CartLine],
        check_stock: bool,
    ) -> Result<Vec<ValidatedLine>, OrderError> {
        let mut validated = Vec::with_capacity(cart_lines.len());
        for line in cart_lines {
            let Some(product) = self.store.find_product(line.product_id).await? else {
                return Err(OrderError::ProductNotFound {
                    product_id: line.product_id,
                });
            };
            if !product.purchasable() {
                return Err(OrderError::ProductNotFound {
                    product_id: line.product_id,
                });
            }
            if line.quantity <= 0 {
                return Err(OrderError::InvalidQuantity {
                    product_id: line.product_id,
                    quantity: line.quantity,
                });
            }
            if check_stock && product.quantity < line.quantity {
                return Err(OrderError::InsufficientStock {
                    product_id: line.product_id,
                    available: product.quantity,
                    requested: line.quantity,
                });
            }
            validated.push(ValidatedLine {
                product_id: product.product_id,
                product_name: product.product_name,
                quantity: line.quantity,
                unit_price: product.product_price,
            });
        }
        Ok(validated)
    }

    fn subtotal(validated: &[ValidatedLine]) -> Decimal {
        validated
            .iter()
            .map(|line| line_total(line.unit_price, line.quantity))
            .sum()
    }

    /// Creates an order end to end. The snapshot stock check above only
    /// filters the obvious failures; the reservation step afterwards is the
    /// authoritative one, and losing it rolls the whole order back.
    pub async fn create_order(
        &self,
        customer_id: i64,
        cart_lines: &[CartLine],
    ) -> Result<AssembledOrder, OrderError> {
        let ctx = self.customer_context(customer_id).await?;
        if cart_lines.is_empty() {
            return Err(OrderError::EmptyCart);
        }
        let validated = self.validate_lines(cart_lines, true).await?;

        let subtotal = Self::subtotal(&validated);
        let decision = self
            .discounts
            .select_best_discount(&ctx, subtotal, chrono::Utc::now())
            .await;

        let order = self
            .store
            .insert_order(&NewOrder {
                customer_id: ctx.customer_id,
                original_total: decision.original_total,
                discount_percent: decision.discount_percent,
                discount_amount: decision.discount_amount,
                final_total: decision.final_total,
            })
            .await?;

        let mut items = Vec::with_capacity(validated.len());
        for line in &validated {
            match self
                .store
                .insert_order_item(order.order_id, line.product_id, line.quantity, line.unit_price)
                .await
            {
                Ok(item) => items.push(item),
                Err(err) => {
                    self.roll_back(order.order_id, &[]).await;
                    return Err(err.into());
                }
            }
        }

        let mut reserved: Vec<(i64, i32)> = Vec::with_capacity(validated.len());
        for line in &validated {
            match self.ledger.reserve(line.product_id, line.quantity).await {
                Ok(()) => reserved.push((line.product_id, line.quantity)),
                Err(err) => {
                    self.roll_back(order.order_id, &reserved).await;
                    return Err(err.into());
                }
            }
        }

        tracing::info!(
            order_id = order.order_id,
            customer_id = ctx.customer_id,
            original_total = %order.original_total,
            final_total = %order.final_total,
            "order created"
        );
        Ok(AssembledOrder {
            order,
            items,
            discount_summary: decision,
        })
    }

    /// Prices a cart as [`create_order`](Self::create_order) would, without
    /// reserving stock or writing anything.
    pub async fn preview_discount(
        &self,
        customer_id: i64,
        cart_lines: &[CartLine],
    ) -> Result<DiscountPreview, OrderError> {
        let ctx = self.customer_context(customer_id).await?;
        if cart_lines.is_empty() {
            return Err(OrderError::EmptyCart);
        }
        let validated = self.validate_lines(cart_lines, false).await?;
        let subtotal = Self::subtotal(&validated);
        let decision = self
            .discounts
            .select_best_discount(&ctx, subtotal, chrono::Utc::now())
            .await;
        Ok(DiscountPreview {
            subtotal: round_currency(subtotal),
            discount: decision,
        })
    }

    /// Undoes a partially created order: returns any reserved units and drops
    /// the order row with its items. Failures here are logged, not returned,
    /// since the caller is already on an error path.
    async fn roll_back(&self, order_id: i64, reserved: &[(i64, i32)]) {
        for (product_id, quantity) in reserved {
            if let Err(err) = self.ledger.release(*product_id, *quantity).await {
                tracing::error!(
                    error = %err,
                    product_id,
                    quantity,
                    "stock release failed while rolling back an order"
                );
            }
        }
        match self.store.delete_order(order_id).await {
            Ok(_) => tracing::warn!(order_id, "order rolled back after failed reservation"),
            Err(err) => {
                tracing::error!(error = %err, order_id, "order cleanup failed during rollback");
            }
        }
    }
}
