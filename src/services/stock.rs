//! Stock ledger: the only writer of product quantity.

use std::sync::Arc;
use thiserror::Error;

use crate::store::{ProductStore, StoreError};

#[derive(Debug, Error)]
pub enum StockError {
    #[error("product {product_id} not found")]
    ProductNotFound { product_id: i64 },
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

#[derive(Clone)]
pub struct StockLedger {
    products: Arc<dyn ProductStore>,
}

impl StockLedger {
    pub fn new(products: Arc<dyn ProductStore>) -> Self {
        Self { products }
    }

    /// Atomically takes `quantity` units, or fails without mutating anything.
    /// Concurrent reservations serialize at the store's conditional update.
    pub async fn reserve(&self, product_id: i64, quantity: i32) -> Result<(), StockError> {
        if self.products.decrement_stock(product_id, quantity).await? {
            return Ok(());
        }
        // Lost the conditional update; re-read for a current availability
        // figure to report.
        match self.products.find_product(product_id).await? {
            Some(product) => Err(StockError::InsufficientStock {
                product_id,
                available: product.quantity,
                requested: quantity,
            }),
            None => Err(StockError::ProductNotFound { product_id }),
        }
    }

    /// Adds units back. Best-effort compensation, not transactional with the
    /// order that triggered it.
    pub async fn release(&self, product_id: i64, quantity: i32) -> Result<(), StockError> {
        Ok(self.products.increment_stock(product_id, quantity).await?)
    }
}
