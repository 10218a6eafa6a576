// API Key authentication middleware
use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;

use crate::proxy::server::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    MissingOrInvalidHeader,
    InvalidKey,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::MissingOrInvalidHeader => "missing_or_invalid_header",
            DenyReason::InvalidKey => "invalid_key",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            DenyReason::MissingOrInvalidHeader => "Missing or invalid Authorization header",
            DenyReason::InvalidKey => "Invalid API key",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDecision {
    Allow,
    Deny(DenyReason),
}

/// Bearer token check against the configured API key, with mirror bypass
#[derive(Debug, Clone)]
pub struct AccessGate {
    api_key: Arc<str>,
    mirror_prefix: Option<Arc<str>>,
}

impl AccessGate {
    pub fn new(api_key: &str, mirror_prefix: Option<&str>) -> Self {
        Self {
            api_key: Arc::from(api_key),
            mirror_prefix: mirror_prefix.map(Arc::from),
        }
    }

    pub fn from_config(config: &crate::proxy::ProxyConfig) -> Self {
        Self::new(&config.api_key, config.mirror_prefix())
    }

    pub fn authorize(&self, path: &str, authorization: Option<&str>) -> AuthDecision {
        if let Some(prefix) = self.mirror_prefix.as_deref() {
            if path.starts_with(prefix) {
                return AuthDecision::Allow;
            }
        }

        let Some(value) = authorization.filter(|v| !v.is_empty()) else {
            return AuthDecision::Deny(DenyReason::MissingOrInvalidHeader);
        };

        let key = value.strip_prefix("Bearer ").unwrap_or(value);
        if key == &*self.api_key {
            AuthDecision::Allow
        } else {
            AuthDecision::Deny(DenyReason::InvalidKey)
        }
    }
}

/// API Key authentication middleware
pub async fn auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    tracing::debug!("Request: {} {}", request.method(), request.uri());

    // A header that is not valid UTF-8 counts as missing
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .map(|h| h.to_str().unwrap_or_default());

    match state
        .access_gate
        .authorize(request.uri().path(), authorization)
    {
        AuthDecision::Allow => next.run(request).await,
        AuthDecision::Deny(reason) => {
            tracing::warn!(
                "Rejected {} {}: {}",
                request.method(),
                request.uri().path(),
                reason.as_str()
            );
            (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({
                    "error": reason.message(),
                    "reason": reason.as_str(),
                })),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_bearer() {
        let gate = AccessGate::new("secret", None);
        assert_eq!(
            gate.authorize("/v1/chat/completions", Some("Bearer secret")),
            AuthDecision::Allow
        );
    }

    #[test]
    fn test_bare_key_without_prefix() {
        let gate = AccessGate::new("secret", None);
        assert_eq!(
            gate.authorize("/v1/models", Some("secret")),
            AuthDecision::Allow
        );
    }

    #[test]
    fn test_wrong_key() {
        let gate = AccessGate::new("other", None);
        assert_eq!(
            gate.authorize("/v1/chat/completions", Some("Bearer secret")),
            AuthDecision::Deny(DenyReason::InvalidKey)
        );
    }

    #[test]
    fn test_missing_header() {
        let gate = AccessGate::new("secret", None);
        assert_eq!(
            gate.authorize("/v1/chat/completions", None),
            AuthDecision::Deny(DenyReason::MissingOrInvalidHeader)
        );
        assert_eq!(
            gate.authorize("/v1/chat/completions", Some("")),
            AuthDecision::Deny(DenyReason::MissingOrInvalidHeader)
        );
    }

    #[test]
    fn test_mirror_bypass() {
        let gate = AccessGate::new("secret", Some("/mirror"));
        assert_eq!(
            gate.authorize("/mirror/v1/chat/completions", None),
            AuthDecision::Allow
        );
        // Outside the prefix the key is still required
        assert_eq!(
            gate.authorize("/v1/chat/completions", None),
            AuthDecision::Deny(DenyReason::MissingOrInvalidHeader)
        );
    }

    #[test]
    fn test_mirror_disabled_requires_key() {
        let gate = AccessGate::new("secret", None);
        assert_eq!(
            gate.authorize("/mirror/v1/chat/completions", None),
            AuthDecision::Deny(DenyReason::MissingOrInvalidHeader)
        );
    }

    #[test]
    fn test_reason_strings() {
        assert_eq!(DenyReason::MissingOrInvalidHeader.as_str(), "missing_or_invalid_header");
        assert_eq!(DenyReason::InvalidKey.as_str(), "invalid_key");
    }
}
