//! Environment-backed configuration, read once at startup into typed structs.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),
    #[error("invalid value for environment variable {0}")]
    InvalidVar(&'static str),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayFastMode {
    Sandbox,
    Live,
}

#[derive(Clone, Debug)]
pub struct PayFastConfig {
    pub mode: PayFastMode,
    pub merchant_id: Option<String>,
    pub merchant_key: Option<String>,
    pub passphrase: Option<String>,
    /// Applied to every outbound gateway call.
    pub timeout: Duration,
}

impl PayFastConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mode = match optional("PAYFAST_MODE").as_deref() {
            Some("live") => PayFastMode::Live,
            _ => PayFastMode::Sandbox,
        };
        let timeout = match optional("PAYFAST_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(
                raw.parse()
                    .map_err(|_| ConfigError::InvalidVar("PAYFAST_TIMEOUT_SECS"))?,
            ),
            None => Duration::from_secs(20),
        };
        Ok(Self {
            mode,
            merchant_id: optional("PAYFAST_MERCHANT_ID"),
            merchant_key: optional("PAYFAST_MERCHANT_KEY"),
            passphrase: optional("PAYFAST_PASSPHRASE"),
            timeout,
        })
    }

    pub fn base_url(&self) -> &'static str {
        match self.mode {
            PayFastMode::Sandbox => "https://sandbox.payfast.co.za",
            PayFastMode::Live => "https://www.payfast.co.za",
        }
    }

    /// Merchant id and key, present only when both are configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.merchant_id.as_deref(), self.merchant_key.as_deref()) {
            (Some(id), Some(key)) => Some((id, key)),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub frontend_base_url: String,
    pub backend_base_url: String,
    pub token_secret: String,
    pub payfast: PayFastConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = match optional("PORT") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidVar("PORT"))?,
            None => 5050,
        };
        let backend_base_url =
            optional("BACKEND_BASE_URL").unwrap_or_else(|| format!("http://localhost:{port}"));
        Ok(Self {
            port,
            database_url: required("DATABASE_URL")?,
            frontend_base_url: optional("FRONTEND_BASE_URL")
                .unwrap_or_else(|| "http://localhost:5173".to_string()),
            backend_base_url,
            token_secret: optional("TOKEN_SECRET").unwrap_or_else(|| "change-me".to_string()),
            payfast: PayFastConfig::from_env()?,
        })
    }
}

fn optional(name: &'static str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    optional(name).ok_or(ConfigError::MissingVar(name))
}
