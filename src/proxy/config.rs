use serde::{Deserialize, Serialize};

/// 网关服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProxyConfig {
    /// 监听地址 (host:port)
    pub address: String,

    /// API 密钥
    pub api_key: String,

    /// 是否启用镜像 API (免鉴权前缀)
    pub enable_mirror_api: bool,

    /// 镜像 API 路径前缀, 例如 "/mirror"
    pub mirror_api_prefix: String,

    /// API 请求超时时间(秒)
    pub request_timeout: u64,

    /// 上游服务配置
    pub upstream: UpstreamConfig,

    /// 代理健康检查配置
    pub health_check: HealthCheckConfig,
}

/// 上游服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpstreamConfig {
    /// 上游基础地址, chat 请求发往 `{base_url}/v1/chat/completions`
    pub base_url: String,
    /// 上游返回组织 ID 所用的响应头, 同名请求头用于回传已知组织 ID
    pub organization_header: String,
}

/// 代理健康检查配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HealthCheckConfig {
    /// 探测目标地址
    pub probe_url: String,
    /// 单个代理的探测超时(秒)
    pub timeout_secs: u64,
    /// 挑战页标记, 响应体包含该字符串即视为代理被拦截
    pub challenge_marker: String,
    /// 探测请求的 User-Agent, 非浏览器 UA 会直接被挑战页拦下
    pub user_agent: String,
    /// 探测请求的 Accept 头
    pub accept: String,
}

pub const DEFAULT_ADDRESS: &str = "0.0.0.0:8080";
pub const DEFAULT_MIRROR_PREFIX: &str = "/mirror";
pub const DEFAULT_PROBE_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
pub const DEFAULT_PROBE_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            api_key: String::new(),
            enable_mirror_api: false,
            mirror_api_prefix: String::new(),
            request_timeout: default_request_timeout(),
            upstream: UpstreamConfig::default(),
            health_check: HealthCheckConfig::default(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.anthropic.com".to_string(),
            organization_header: "anthropic-organization-id".to_string(),
        }
    }
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            probe_url: "https://claude.ai/login".to_string(),
            timeout_secs: 10,
            challenge_marker: "Just a moment...".to_string(),
            user_agent: DEFAULT_PROBE_USER_AGENT.to_string(),
            accept: DEFAULT_PROBE_ACCEPT.to_string(),
        }
    }
}

fn default_request_timeout() -> u64 {
    120
}

impl ProxyConfig {
    /// 镜像模式启用时返回其前缀
    pub fn mirror_prefix(&self) -> Option<&str> {
        if self.enable_mirror_api {
            Some(self.mirror_api_prefix.as_str())
        } else {
            None
        }
    }

    /// 补全缺省值: 空地址、空 API 密钥、空镜像前缀
    pub fn normalize(&mut self) {
        if self.address.trim().is_empty() {
            self.address = DEFAULT_ADDRESS.to_string();
        }

        if self.api_key.is_empty() {
            self.api_key = format!("sk-{}", uuid::Uuid::new_v4().simple());
            tracing::warn!(
                "No API key configured, generated one for this run: {}",
                self.api_key
            );
        }

        if self.enable_mirror_api {
            let prefix = self.mirror_api_prefix.trim().trim_end_matches('/');
            self.mirror_api_prefix = if prefix.is_empty() {
                tracing::warn!(
                    "Mirror API enabled without a prefix, using {}",
                    DEFAULT_MIRROR_PREFIX
                );
                DEFAULT_MIRROR_PREFIX.to_string()
            } else if prefix.starts_with('/') {
                prefix.to_string()
            } else {
                format!("/{}", prefix)
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_fills_defaults() {
        let mut config = ProxyConfig {
            address: "  ".to_string(),
            enable_mirror_api: true,
            ..ProxyConfig::default()
        };
        config.normalize();

        assert_eq!(config.address, DEFAULT_ADDRESS);
        assert!(config.api_key.starts_with("sk-"));
        assert_eq!(config.mirror_prefix(), Some(DEFAULT_MIRROR_PREFIX));
    }

    #[test]
    fn test_normalize_mirror_prefix() {
        let mut config = ProxyConfig {
            api_key: "secret".to_string(),
            enable_mirror_api: true,
            mirror_api_prefix: "mirror/".to_string(),
            ..ProxyConfig::default()
        };
        config.normalize();

        assert_eq!(config.api_key, "secret");
        assert_eq!(config.mirror_prefix(), Some("/mirror"));
    }

    #[test]
    fn test_mirror_disabled() {
        let config = ProxyConfig {
            mirror_api_prefix: "/mirror".to_string(),
            ..ProxyConfig::default()
        };
        assert_eq!(config.mirror_prefix(), None);
    }
}
