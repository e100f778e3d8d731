//! Inventory Relay - Steam inventory fetcher behind a rotating proxy pool
//!
//! ## Features
//!
//! - Proxy pool backed by a paginated provider list, refreshed when stale
//! - Working/cooldown bookkeeping with eviction of rejected proxies
//! - Bounded retry loop that mixes direct, random and known-good routes
//! - Token-protected HTTP endpoint with per-request timeout

pub mod api;
pub mod config;
pub mod error;
pub mod fetch;
pub mod models;
pub mod proxy;

pub use config::Config;
pub use error::{RelayError, Result};
