//! Proxy pool management
//!
//! This module provides:
//! - The upstream provider client that lists leased proxies
//! - The shared pool with working/cooldown tracking and eviction

pub mod pool;
pub mod source;

pub use pool::ProxyPool;
pub use source::{ProxySource, WebshareSource};
