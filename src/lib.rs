//! Timberline commerce backend: product catalog, customers, discounted
//! order assembly, and PayFast hosted payments.
//!
//! The crate is layered the obvious way: [`domain`] holds the records and
//! currency arithmetic, [`store`] the persistence ports and adapters,
//! [`services`] the checkout pipeline, [`gateway`] the PayFast wire
//! protocol, and [`http`] the axum surface that ties them together.

pub mod auth;
pub mod config;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod http;
pub mod services;
pub mod store;
