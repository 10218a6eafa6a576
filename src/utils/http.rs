use reqwest::{Client, Proxy};
use std::time::Duration;

use crate::error::AppResult;
use crate::proxy::common::utils::mask_proxy_url;

const USER_AGENT: &str = concat!("session-gateway/", env!("CARGO_PKG_VERSION"));

/// Create an HTTP client that egresses through `proxy_url`, or directly when `None`.
///
/// An unparsable proxy is an error rather than a silent direct connection.
pub fn create_client_with_proxy(timeout: Duration, proxy_url: Option<&str>) -> AppResult<Client> {
    let mut builder = Client::builder().timeout(timeout).user_agent(USER_AGENT);

    if let Some(url) = proxy_url.filter(|u| !u.is_empty()) {
        builder = builder.proxy(Proxy::all(url)?);
        tracing::debug!("HTTP client upstream proxy enabled: {}", mask_proxy_url(url));
    } else {
        builder = builder.no_proxy();
    }

    Ok(builder.build()?)
}
