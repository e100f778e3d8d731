//! Request logging middleware

use axum::body::Body;
use axum::http::{HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;
use std::time::Instant;
use tracing::{debug, info, Instrument};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Request logging middleware
pub struct RequestLogging;

impl RequestLogging {
    /// Log request details under a per-request id span
    pub async fn log_request(req: Request<Body>, next: Next) -> Response {
        let method = req.method().clone();
        // Path only; the query may carry the api key.
        let path = req.uri().path().to_string();
        let request_id = Uuid::new_v4();
        let start = Instant::now();

        let span = tracing::info_span!("request", id = %request_id);

        let mut response = async move {
            debug!("{} {} - started", method, path);
            let response = next.run(req).await;
            info!(
                "{} {} - {} in {:?}",
                method,
                path,
                response.status(),
                start.elapsed()
            );
            response
        }
        .instrument(span)
        .await;

        if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }

        response
    }
}
