use crate::proxy::ProxyConfig;
use serde::{Deserialize, Serialize};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    /// Upstream session credentials, in rotation order
    #[serde(default)]
    pub sessions: Vec<SessionSpec>,
    /// Egress proxies, before health filtering
    #[serde(default)]
    pub proxies: Vec<String>,
    #[serde(flatten)]
    pub proxy: ProxyConfig,
}

/// One configured session.
///
/// The file form accepts either `"key"` / `"key:orgID"` strings or
/// `{"sessionKey": ..., "orgID": ...}` objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SessionSpec {
    Entry {
        #[serde(rename = "sessionKey")]
        session_key: String,
        #[serde(rename = "orgID", default)]
        org_id: String,
    },
    Pair(String),
}

impl SessionSpec {
    /// Split into `(key, organization_id)`; `None` for empty entries
    pub fn parts(&self) -> Option<(String, Option<String>)> {
        let (key, org) = match self {
            SessionSpec::Entry {
                session_key,
                org_id,
            } => (session_key.trim(), org_id.trim()),
            SessionSpec::Pair(pair) => {
                let mut parts = pair.trim().split(':');
                let key = parts.next().unwrap_or_default();
                let org = parts.next().unwrap_or_default();
                (key.trim(), org.trim())
            }
        };

        if key.is_empty() {
            return None;
        }
        let org = (!org.is_empty()).then(|| org.to_string());
        Some((key.to_string(), org))
    }
}

const PROXY_SCHEMES: [&str; 4] = ["http", "https", "socks5", "socks5h"];

impl AppConfig {
    /// Fill defaults and drop proxy entries that are not usable proxy URLs
    pub fn normalize(&mut self) {
        self.proxy.normalize();

        let proxies = std::mem::take(&mut self.proxies);
        self.proxies = proxies
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .filter(|p| match url::Url::parse(p) {
                Ok(url) if PROXY_SCHEMES.contains(&url.scheme()) && url.host().is_some() => {
                    true
                }
                Ok(url) => {
                    tracing::warn!(
                        "Dropping proxy {} with unsupported scheme {}",
                        crate::proxy::common::utils::mask_proxy_url(p),
                        url.scheme()
                    );
                    false
                }
                Err(e) => {
                    tracing::warn!("Dropping malformed proxy entry: {}", e);
                    false
                }
            })
            .collect();
    }

    /// Log the effective configuration with secrets masked
    pub fn log_summary(&self) {
        use crate::proxy::common::utils::{mask_proxy_url, mask_secret};

        tracing::info!("Loaded config:");
        tracing::info!("Address: {}", self.proxy.address);
        tracing::info!("APIKey: {}", mask_secret(&self.proxy.api_key));
        for spec in &self.sessions {
            if let Some((key, org)) = spec.parts() {
                tracing::info!(
                    "Session: {}, OrgID: {}",
                    mask_secret(&key),
                    org.as_deref().unwrap_or("-")
                );
            }
        }
        let proxies: Vec<String> = self.proxies.iter().map(|p| mask_proxy_url(p)).collect();
        tracing::info!("Proxies: {:?}", proxies);
        tracing::info!("EnableMirrorApi: {}", self.proxy.enable_mirror_api);
        tracing::info!("MirrorApiPrefix: {}", self.proxy.mirror_api_prefix);
        tracing::info!("Upstream: {}", self.proxy.upstream.base_url);
        tracing::info!("Probe target: {}", self.proxy.health_check.probe_url);
    }
}
