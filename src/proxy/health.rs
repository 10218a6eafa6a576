// Proxy health filter
// Probes every configured proxy once at startup and keeps the ones that reach
// the upstream without hitting a challenge page.

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use std::time::Duration;

use crate::proxy::common::utils::mask_proxy_url;
use crate::proxy::config::{HealthCheckConfig, DEFAULT_PROBE_ACCEPT, DEFAULT_PROBE_USER_AGENT};

/// Result of probing one proxy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Usable,
    /// The response body carried the challenge marker
    Blocked,
    /// Transport failure or timeout
    Unreachable(String),
}

#[async_trait]
pub trait ProxyProbe: Send + Sync {
    async fn probe(&self, proxy_url: &str) -> ProbeOutcome;
}

/// Probe that issues one GET to the target through the proxy.
///
/// The request presents itself as a browser so a challenge page reflects the
/// proxy's egress, not the probe's identity.
pub struct HttpProbe {
    target: String,
    timeout: Duration,
    challenge_marker: String,
    user_agent: String,
    accept: String,
}

impl HttpProbe {
    pub fn new(target: impl Into<String>, timeout: Duration, challenge_marker: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            timeout,
            challenge_marker: challenge_marker.into(),
            user_agent: DEFAULT_PROBE_USER_AGENT.to_string(),
            accept: DEFAULT_PROBE_ACCEPT.to_string(),
        }
    }

    /// Override the browser headers sent with each probe
    pub fn with_browser_headers(mut self, user_agent: impl Into<String>, accept: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self.accept = accept.into();
        self
    }

    pub fn from_config(config: &HealthCheckConfig) -> Self {
        Self::new(
            config.probe_url.clone(),
            Duration::from_secs(config.timeout_secs),
            config.challenge_marker.clone(),
        )
        .with_browser_headers(config.user_agent.clone(), config.accept.clone())
    }

    fn classify_body(&self, body: &str) -> ProbeOutcome {
        if !self.challenge_marker.is_empty() && body.contains(&self.challenge_marker) {
            ProbeOutcome::Blocked
        } else {
            ProbeOutcome::Usable
        }
    }
}

#[async_trait]
impl ProxyProbe for HttpProbe {
    async fn probe(&self, proxy_url: &str) -> ProbeOutcome {
        let client = match crate::utils::http::create_client_with_proxy(self.timeout, Some(proxy_url)) {
            Ok(client) => client,
            Err(e) => return ProbeOutcome::Unreachable(e.to_string()),
        };

        // Any HTTP response counts as reachable; challenge pages often come back as 403
        let request = client
            .get(&self.target)
            .header(USER_AGENT, self.user_agent.as_str())
            .header(ACCEPT, self.accept.as_str())
            .header(ACCEPT_LANGUAGE, "en-US,en;q=0.9");
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return ProbeOutcome::Unreachable(e.to_string()),
        };

        match response.text().await {
            Ok(body) => self.classify_body(&body),
            Err(e) => ProbeOutcome::Unreachable(format!("failed to read body: {}", e)),
        }
    }
}

/// Lazily probe `proxies` in order, yielding the usable ones.
///
/// Proxies are probed one at a time as the stream is polled; a proxy is
/// never retried.
pub fn filter_usable<'a, P>(proxies: Vec<String>, probe: &'a P) -> impl Stream<Item = String> + 'a
where
    P: ProxyProbe + ?Sized,
{
    async_stream::stream! {
        for proxy in proxies {
            let masked = mask_proxy_url(&proxy);
            match probe.probe(&proxy).await {
                ProbeOutcome::Usable => {
                    tracing::info!("proxy {} OK", masked);
                    yield proxy;
                }
                ProbeOutcome::Blocked => {
                    tracing::warn!("proxy {} blocked (challenge page), dropping", masked);
                }
                ProbeOutcome::Unreachable(reason) => {
                    tracing::warn!("proxy {} unavailable: {}", masked, reason);
                }
            }
        }
    }
}

/// Run the whole filter and collect the usable proxies
pub async fn collect_usable<P>(proxies: Vec<String>, probe: &P) -> Vec<String>
where
    P: ProxyProbe + ?Sized,
{
    let total = proxies.len();
    let usable: Vec<String> = filter_usable(proxies, probe).collect().await;
    if total > 0 {
        tracing::info!("Proxy health check finished: {}/{} usable", usable.len(), total);
    }
    usable
}
