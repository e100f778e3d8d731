//! Typed result of one fetch attempt

use http::StatusCode;
use serde_json::Value;

use super::transport::RawResponse;

/// What a single attempt produced
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    /// Connection, TLS, timeout or read failure
    Transport(String),
    /// 200 with nothing usable in the body
    EmptyBody,
    /// 429 from the target
    RateLimited,
    /// 407 from the proxy
    ProxyRejected,
    /// Any other non-200 status
    TargetRejected(StatusCode),
    /// 200 with a JSON payload
    Success(Value),
}

/// Pool mutation owed for an outcome when a proxy carried the attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolAction {
    None,
    MarkWorking,
    MarkCooldown,
    Evict,
}

/// Loop control after an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Try the next attempt
    Retry,
    /// Give up on the whole fetch
    Abandon,
    /// Hand the payload back
    Done,
}

impl AttemptOutcome {
    /// Classify a completed HTTP exchange
    pub fn from_response(response: RawResponse) -> Self {
        match response.status {
            StatusCode::OK => match serde_json::from_slice::<Value>(&response.body) {
                Ok(value) if is_empty_payload(&value) => Self::EmptyBody,
                Ok(value) => Self::Success(value),
                Err(_) => Self::EmptyBody,
            },
            StatusCode::TOO_MANY_REQUESTS => Self::RateLimited,
            StatusCode::PROXY_AUTHENTICATION_REQUIRED => Self::ProxyRejected,
            status => Self::TargetRejected(status),
        }
    }

    pub fn pool_action(&self) -> PoolAction {
        match self {
            Self::Transport(_) | Self::EmptyBody => PoolAction::None,
            Self::RateLimited | Self::TargetRejected(_) => PoolAction::MarkCooldown,
            Self::ProxyRejected => PoolAction::Evict,
            Self::Success(_) => PoolAction::MarkWorking,
        }
    }

    pub fn disposition(&self) -> Disposition {
        match self {
            Self::Transport(_) | Self::EmptyBody | Self::RateLimited | Self::ProxyRejected => {
                Disposition::Retry
            }
            Self::TargetRejected(_) => Disposition::Abandon,
            Self::Success(_) => Disposition::Done,
        }
    }

    /// Short label for logs
    pub fn label(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport_error",
            Self::EmptyBody => "empty_body",
            Self::RateLimited => "rate_limited",
            Self::ProxyRejected => "proxy_rejected",
            Self::TargetRejected(_) => "target_rejected",
            Self::Success(_) => "success",
        }
    }
}

fn is_empty_payload(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use serde_json::json;

    fn raw(status: u16, body: &'static str) -> RawResponse {
        RawResponse {
            status: StatusCode::from_u16(status).unwrap(),
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    #[test]
    fn test_success_with_json_payload() {
        let outcome = AttemptOutcome::from_response(raw(200, r#"{"assets":[],"success":1}"#));
        assert_eq!(
            outcome,
            AttemptOutcome::Success(json!({"assets": [], "success": 1}))
        );
        assert_eq!(outcome.pool_action(), PoolAction::MarkWorking);
        assert_eq!(outcome.disposition(), Disposition::Done);
    }

    #[test]
    fn test_unusable_200_bodies_are_empty() {
        for body in ["", "null", "{}", "<html>blocked</html>"] {
            let outcome = AttemptOutcome::from_response(raw(200, body));
            assert_eq!(outcome, AttemptOutcome::EmptyBody, "body: {:?}", body);
            assert_eq!(outcome.pool_action(), PoolAction::None);
            assert_eq!(outcome.disposition(), Disposition::Retry);
        }
    }

    #[test]
    fn test_rate_limited() {
        let outcome = AttemptOutcome::from_response(raw(429, ""));
        assert_eq!(outcome, AttemptOutcome::RateLimited);
        assert_eq!(outcome.pool_action(), PoolAction::MarkCooldown);
        assert_eq!(outcome.disposition(), Disposition::Retry);
    }

    #[test]
    fn test_proxy_auth_required() {
        let outcome = AttemptOutcome::from_response(raw(407, ""));
        assert_eq!(outcome, AttemptOutcome::ProxyRejected);
        assert_eq!(outcome.pool_action(), PoolAction::Evict);
        assert_eq!(outcome.disposition(), Disposition::Retry);
    }

    #[test]
    fn test_other_statuses_abandon() {
        for status in [400, 403, 404, 500, 502] {
            let outcome = AttemptOutcome::from_response(raw(status, "{}"));
            assert_eq!(
                outcome,
                AttemptOutcome::TargetRejected(StatusCode::from_u16(status).unwrap())
            );
            assert_eq!(outcome.pool_action(), PoolAction::MarkCooldown);
            assert_eq!(outcome.disposition(), Disposition::Abandon);
        }
    }

    #[test]
    fn test_transport_error_retries_without_action() {
        let outcome = AttemptOutcome::Transport("connection refused".into());
        assert_eq!(outcome.pool_action(), PoolAction::None);
        assert_eq!(outcome.disposition(), Disposition::Retry);
        assert_eq!(outcome.label(), "transport_error");
    }
}
