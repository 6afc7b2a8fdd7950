//! Customer records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Customer {
    pub customer_id: i64,
    pub customer_name: String,
    /// Stored lowercased; uniqueness is case-insensitive.
    pub email: String,
    /// Absent for guest-checkout customers until they register.
    #[serde(skip_serializing)]
    pub credential_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Canonical form used for lookups and uniqueness.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Fields accepted at registration.
#[derive(Clone, Debug, Deserialize)]
pub struct NewCustomer {
    pub customer_name: String,
    pub email: String,
    pub password: String,
}

/// Buyer identity supplied by the hosted-checkout entry point.
#[derive(Clone, Debug, Deserialize)]
pub struct CheckoutCustomer {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub email: String,
}

impl CheckoutCustomer {
    pub fn display_name(&self) -> String {
        let name = format!("{} {}", self.first_name.trim(), self.last_name.trim());
        let name = name.trim().to_string();
        if name.is_empty() {
            self.email.trim().to_string()
        } else {
            name
        }
    }
}
