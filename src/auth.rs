//! Credential handling behind an injected capability, so no handler or
//! service names a digest library directly.

use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};

use crate::domain::Customer;

pub trait CredentialAuthority: Send + Sync {
    /// Produces the storable form of a plaintext credential.
    fn hash_credential(&self, plain: &str) -> String;
    /// Checks a plaintext credential against its stored form.
    fn verify_credential(&self, plain: &str, stored: &str) -> bool;
    /// Issues an opaque signed bearer token for a customer.
    fn issue_token(&self, customer: &Customer) -> String;
}

/// Salted SHA-256 credentials plus keyed-digest tokens. Stored form is
/// `<salt_hex>$<digest_hex>`; tokens are `<customer_id>.<expiry_epoch>.<mac>`.
pub struct SaltedSha2Authority {
    token_secret: String,
}

impl SaltedSha2Authority {
    pub fn new(token_secret: impl Into<String>) -> Self {
        Self {
            token_secret: token_secret.into(),
        }
    }

    fn digest(salt_hex: &str, plain: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(salt_hex.as_bytes());
        hasher.update(plain.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

impl CredentialAuthority for SaltedSha2Authority {
    fn hash_credential(&self, plain: &str) -> String {
        let salt: [u8; 16] = rand::random();
        let salt_hex = hex::encode(salt);
        let digest = Self::digest(&salt_hex, plain);
        format!("{salt_hex}${digest}")
    }

    fn verify_credential(&self, plain: &str, stored: &str) -> bool {
        match stored.split_once('$') {
            Some((salt_hex, digest)) => Self::digest(salt_hex, plain) == digest,
            None => false,
        }
    }

    fn issue_token(&self, customer: &Customer) -> String {
        let expiry = (Utc::now() + Duration::hours(24)).timestamp();
        let base = format!("{}.{}", customer.customer_id, expiry);
        let mut hasher = Sha256::new();
        hasher.update(self.token_secret.as_bytes());
        hasher.update(base.as_bytes());
        let mac = format!("{:x}", hasher.finalize());
        format!("{base}.{mac}")
    }
}
