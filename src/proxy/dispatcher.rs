// Dispatcher: bounded attempt loop over the session pool
use axum::http::StatusCode;
use std::future::Future;
use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::proxy::common::utils::mask_secret;
use crate::proxy::session_pool::{Session, SessionPool};
use crate::proxy::sticky::select_proxy;

/// How a single attempt failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptError {
    /// Rotate to the next session and try again
    Retry(String),
    /// Report to the caller without further attempts
    Fatal(StatusCode, String),
}

#[derive(Debug)]
pub enum DispatchError {
    /// Every attempt within the retry budget failed
    Exhausted { attempts: usize, last_error: String },
    Fatal(StatusCode, String),
    Pool(AppError),
}

impl DispatchError {
    pub fn into_response_parts(self) -> (StatusCode, String) {
        match self {
            DispatchError::Exhausted {
                attempts,
                last_error,
            } => (
                StatusCode::SERVICE_UNAVAILABLE,
                format!(
                    "All {} attempts failed. Last error: {}",
                    attempts, last_error
                ),
            ),
            DispatchError::Fatal(status, message) => (status, message),
            DispatchError::Pool(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    pool: Arc<SessionPool>,
}

impl Dispatcher {
    pub fn new(pool: Arc<SessionPool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Arc<SessionPool> {
        &self.pool
    }

    /// Next credential from the rotation; `attempt` is only used for logging
    pub fn acquire_credential_for_attempt(&self, attempt: usize) -> AppResult<Session> {
        let session = self.pool.next_session()?;
        tracing::debug!(
            "Attempt {} using session {}",
            attempt + 1,
            mask_secret(&session.key)
        );
        Ok(session)
    }

    /// Sticky proxy for the session, `None` for a direct connection
    pub fn proxy_for(&self, session: &Session) -> Option<String> {
        select_proxy(&session.key, self.pool.proxies()).map(str::to_string)
    }

    pub fn record_organization_id(&self, key: &str, organization_id: &str) {
        self.pool.set_organization_id(key, organization_id);
    }

    /// Run `attempt_fn` with fresh sessions until it succeeds, fails fatally,
    /// or the retry budget is spent
    pub async fn dispatch<T, F, Fut>(&self, mut attempt_fn: F) -> Result<T, DispatchError>
    where
        F: FnMut(Session, Option<String>) -> Fut,
        Fut: Future<Output = Result<T, AttemptError>>,
    {
        self.pool.ensure_not_empty().map_err(DispatchError::Pool)?;

        let max_attempts = self.pool.retry_budget().max(1);
        let mut last_error = String::new();

        for attempt in 0..max_attempts {
            let session = self
                .acquire_credential_for_attempt(attempt)
                .map_err(DispatchError::Pool)?;
            let proxy = self.proxy_for(&session);
            let masked = mask_secret(&session.key);

            match attempt_fn(session, proxy).await {
                Ok(value) => return Ok(value),
                Err(AttemptError::Retry(reason)) => {
                    tracing::warn!(
                        "Request failed on attempt {}/{} with session {}: {}",
                        attempt + 1,
                        max_attempts,
                        masked,
                        reason
                    );
                    last_error = reason;
                }
                Err(AttemptError::Fatal(status, message)) => {
                    tracing::error!("Upstream non-retryable error {}: {}", status, message);
                    return Err(DispatchError::Fatal(status, message));
                }
            }
        }

        Err(DispatchError::Exhausted {
            attempts: max_attempts,
            last_error,
        })
    }
}
