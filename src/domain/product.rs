//! Product catalog records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Product {
    pub product_id: i64,
    pub product_name: String,
    pub product_price: Decimal,
    pub quantity: i32,
    pub image_url: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Product {
    /// Whether the product can currently be put in a cart.
    pub fn purchasable(&self) -> bool {
        self.is_active
    }
}

/// Fields accepted when creating or replacing a product.
#[derive(Clone, Debug, Deserialize)]
pub struct NewProduct {
    pub product_name: String,
    pub product_price: Decimal,
    #[serde(default)]
    pub quantity: i32,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}
