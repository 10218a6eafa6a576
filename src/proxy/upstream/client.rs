// Upstream client
// Relays OpenAI-format chat bodies to the upstream with the session as credential.

use dashmap::DashMap;
use reqwest::{header, Client, Response};
use serde_json::Value;
use std::time::Duration;

use crate::error::{AppError, AppResult};
use crate::proxy::config::UpstreamConfig;
use crate::proxy::session_pool::Session;

/// Cache key for clients that connect directly
const DIRECT: &str = "";

pub struct UpstreamClient {
    base_url: String,
    organization_header: header::HeaderName,
    timeout: Duration,
    // One client per egress, keyed by proxy url
    clients: DashMap<String, Client>,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig, timeout_secs: u64) -> AppResult<Self> {
        let organization_header = header::HeaderName::from_bytes(
            config.organization_header.trim().as_bytes(),
        )
        .map_err(|e| {
            AppError::Config(format!(
                "invalid organization header {:?}: {}",
                config.organization_header, e
            ))
        })?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            organization_header,
            timeout: Duration::from_secs(timeout_secs),
            clients: DashMap::new(),
        })
    }

    fn build_url(base_url: &str, path: &str) -> String {
        format!("{}/{}", base_url, path.trim_start_matches('/'))
    }

    /// Client for the given egress, built on first use
    fn client_for(&self, proxy: Option<&str>) -> AppResult<Client> {
        let key = proxy.unwrap_or(DIRECT);
        if let Some(client) = self.clients.get(key) {
            return Ok(client.clone());
        }

        let client = crate::utils::http::create_client_with_proxy(self.timeout, proxy)?;
        Ok(self
            .clients
            .entry(key.to_string())
            .or_insert(client)
            .clone())
    }

    /// POST the chat body to the upstream chat completions endpoint
    pub async fn chat_completions(
        &self,
        session: &Session,
        proxy: Option<&str>,
        body: &Value,
    ) -> AppResult<Response> {
        let url = Self::build_url(&self.base_url, "v1/chat/completions");
        let client = self.client_for(proxy)?;

        let mut request = client
            .post(&url)
            .bearer_auth(&session.key)
            .header(header::CONTENT_TYPE, "application/json")
            .json(body);

        if let Some(org) = session.organization_id.as_deref() {
            request = request.header(self.organization_header.clone(), org);
        }

        let response = request.send().await?;
        Ok(response)
    }

    /// Organization id announced by the upstream, if any
    pub fn organization_id(&self, response: &Response) -> Option<String> {
        response
            .headers()
            .get(&self.organization_header)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    #[cfg(test)]
    fn cached_clients(&self) -> usize {
        self.clients.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header as header_eq, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> UpstreamClient {
        let config = UpstreamConfig {
            base_url: format!("{}/", server.uri()),
            organization_header: "x-org-id".to_string(),
        };
        UpstreamClient::new(&config, 5).unwrap()
    }

    #[test]
    fn test_build_url() {
        assert_eq!(
            UpstreamClient::build_url("https://api.example.com", "/v1/chat/completions"),
            "https://api.example.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_invalid_organization_header() {
        let config = UpstreamConfig {
            base_url: "https://api.example.com".to_string(),
            organization_header: "bad header".to_string(),
        };
        assert!(matches!(
            UpstreamClient::new(&config, 5),
            Err(AppError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_chat_completions_sends_credentials() {
        let server = MockServer::start().await;
        let body = serde_json::json!({"model": "claude-3", "messages": []});

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header_eq("authorization", "Bearer session-key"))
            .and(header_eq("x-org-id", "org-1"))
            .and(body_json(&body))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-org-id", "org-1")
                    .set_body_json(serde_json::json!({"id": "chatcmpl-1"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let upstream = client_for(&server);
        let session = Session::new("session-key", Some("org-1".to_string()));
        let response = upstream
            .chat_completions(&session, None, &body)
            .await
            .unwrap();

        assert!(response.status().is_success());
        assert_eq!(upstream.organization_id(&response).as_deref(), Some("org-1"));
    }

    #[tokio::test]
    async fn test_clients_are_cached_per_egress() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let upstream = client_for(&server);
        let session = Session::new("k", None);
        let body = serde_json::json!({});
        upstream.chat_completions(&session, None, &body).await.unwrap();
        upstream.chat_completions(&session, None, &body).await.unwrap();

        assert_eq!(upstream.cached_clients(), 1);
        assert!(upstream.client_for(Some("http://127.0.0.1:3128")).is_ok());
        assert_eq!(upstream.cached_clients(), 2);
    }
}
