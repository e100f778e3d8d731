//! Bearer token authentication
//!
//! Clients present the shared token either as `Authorization: Bearer <token>`
//! or as an `api_key` query parameter. When no token is configured a random
//! one is generated at startup and logged once.

use std::sync::Arc;

use axum::extract::{FromRef, FromRequestParts};
use axum::http::header;
use axum::http::request::Parts;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{debug, warn};

use crate::error::{RelayError, Result};

const QUERY_PARAM: &str = "api_key";

/// Shared-secret token check
#[derive(Clone)]
pub struct TokenAuth {
    token: Arc<str>,
}

impl TokenAuth {
    /// Use the configured token, or generate one if it is empty
    pub fn from_config(configured: &str) -> Result<Self> {
        if !configured.is_empty() {
            return Ok(Self::new(configured));
        }

        let mut key_bytes = [0u8; 32];
        OsRng.try_fill_bytes(&mut key_bytes).map_err(|e| {
            RelayError::Internal(format!("failed to generate authorization token: {}", e))
        })?;

        let token = URL_SAFE_NO_PAD.encode(key_bytes);
        warn!("AUTH_TOKEN is not set, generated authorization token: {}", token);
        Ok(Self::new(&token))
    }

    pub fn new(token: &str) -> Self {
        Self {
            token: Arc::from(token),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Compare in time independent of where the first mismatch is
    pub fn verify(&self, presented: &str) -> bool {
        let expected = self.token.as_bytes();
        let presented = presented.as_bytes();
        if expected.len() != presented.len() {
            return false;
        }

        expected
            .iter()
            .zip(presented)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }

    /// Extract token from Authorization header
    pub fn extract_bearer(authorization: &str) -> Option<&str> {
        authorization.strip_prefix("Bearer ").map(str::trim)
    }

    /// Extract token from the `api_key` query parameter
    pub fn extract_query(query: &str) -> Option<String> {
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == QUERY_PARAM)
            .map(|(_, value)| value.into_owned())
    }

    fn presented(parts: &Parts) -> Option<String> {
        let from_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(Self::extract_bearer)
            .map(str::to_string);

        from_header.or_else(|| parts.uri.query().and_then(Self::extract_query))
    }
}

/// Extractor for requests carrying a valid token
#[derive(Debug, Clone, Copy)]
pub struct Authorized;

#[axum::async_trait]
impl<S> FromRequestParts<S> for Authorized
where
    TokenAuth: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = RelayError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        let auth = TokenAuth::from_ref(state);
        let presented = TokenAuth::presented(parts).ok_or(RelayError::MissingToken)?;

        if auth.verify(&presented) {
            Ok(Authorized)
        } else {
            debug!(path = %parts.uri.path(), "Rejected request with invalid token");
            Err(RelayError::InvalidToken)
        }
    }
}
