use std::collections::HashSet;
use std::sync::{PoisonError, RwLock};

use crate::error::{AppError, AppResult};
use crate::models::SessionSpec;
use crate::proxy::common::utils::mask_secret;
use crate::proxy::rotator::SessionRotator;

/// Upper bound on dispatch attempts per request
pub const MAX_RETRY_BUDGET: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub key: String,
    /// Assigned once the upstream reveals it
    pub organization_id: Option<String>,
}

impl Session {
    pub fn new(key: impl Into<String>, organization_id: Option<String>) -> Self {
        Self {
            key: key.into(),
            organization_id: organization_id.filter(|org| !org.is_empty()),
        }
    }
}

/// Parse session specs in order, skipping empty entries.
///
/// Keys are unique within the pool: a repeated key keeps its first entry.
pub fn parse_session_specs<'a, I>(specs: I) -> Vec<Session>
where
    I: IntoIterator<Item = &'a SessionSpec>,
{
    let mut seen = HashSet::new();
    specs
        .into_iter()
        .filter_map(SessionSpec::parts)
        .filter(|(key, _)| {
            let first = seen.insert(key.clone());
            if !first {
                tracing::warn!("Duplicate session {} ignored", mask_secret(key));
            }
            first
        })
        .map(|(key, org)| Session::new(key, org))
        .collect()
}

/// Split a comma separated `key[:org]` list, keeping empty entries
pub fn split_session_env(value: &str) -> Vec<SessionSpec> {
    if value.is_empty() {
        return Vec::new();
    }
    value
        .split(',')
        .map(|pair| SessionSpec::Pair(pair.to_string()))
        .collect()
}

/// `min(5, session count)`
pub fn retry_budget(session_count: usize) -> usize {
    session_count.min(MAX_RETRY_BUDGET)
}

/// The process-wide pool of sessions and health-filtered proxies.
///
/// Sessions sit behind one coarse `RwLock`: organization id writes are rare
/// and every critical section touches a single entry. The rotation cursor
/// and the proxy list are kept outside that lock.
pub struct SessionPool {
    sessions: RwLock<Vec<Session>>,
    rotator: SessionRotator,
    proxies: Vec<String>,
    retry_budget: usize,
}

impl SessionPool {
    /// Create a pool from parsed sessions and the usable proxy list
    pub fn new(sessions: Vec<Session>, usable_proxies: Vec<String>) -> Self {
        let len = sessions.len();
        Self {
            sessions: RwLock::new(sessions),
            rotator: SessionRotator::new(len),
            proxies: usable_proxies,
            retry_budget: retry_budget(len),
        }
    }

    /// Build a pool straight from configured specs
    pub fn load<'a, I>(specs: I, usable_proxies: Vec<String>) -> Self
    where
        I: IntoIterator<Item = &'a SessionSpec>,
    {
        Self::new(parse_session_specs(specs), usable_proxies)
    }

    /// Refuse an empty pool before anything is dispatched
    pub fn ensure_not_empty(&self) -> AppResult<()> {
        if self.is_empty() {
            return Err(AppError::EmptyPool);
        }
        Ok(())
    }

    pub fn get_session(&self, index: usize) -> AppResult<Session> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions
            .get(index)
            .cloned()
            .ok_or(AppError::SessionIndex {
                index,
                len: sessions.len(),
            })
    }

    /// Record the organization id of the session with this exact key.
    /// Unknown keys are ignored.
    pub fn set_organization_id(&self, key: &str, organization_id: &str) {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(session) = sessions.iter_mut().find(|s| s.key == key) {
            if session.organization_id.as_deref() != Some(organization_id) {
                tracing::info!(
                    "Setting OrgID for session {} to {}",
                    mask_secret(key),
                    organization_id
                );
                session.organization_id =
                    Some(organization_id.to_string()).filter(|org| !org.is_empty());
            }
        }
    }

    /// Next session in round-robin order
    pub fn next_session(&self) -> AppResult<Session> {
        self.get_session(self.rotator.next_index())
    }

    /// Health-filtered proxies, in configuration order
    pub fn proxies(&self) -> &[String] {
        &self.proxies
    }

    pub fn retry_budget(&self) -> usize {
        self.retry_budget
    }

    pub fn len(&self) -> usize {
        self.rotator.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
