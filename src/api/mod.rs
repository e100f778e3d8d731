//! HTTP API
//!
//! Exposes the resilient inventory fetch behind a bearer token.

pub mod handlers;
pub mod middleware;
pub mod port;
pub mod routes;
pub mod server;

pub use server::{ApiServer, AppState};
