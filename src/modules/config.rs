use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};
use crate::models::AppConfig;
use crate::proxy::session_pool::split_session_env;

const CONFIG_FILE: &str = "config.json";
const DATA_DIR: &str = ".session_gateway";

/// Gateway data directory (`~/.session_gateway`), created on demand
pub fn get_data_dir() -> Result<PathBuf, String> {
    let home = dirs::home_dir().ok_or("Failed to get user home directory")?;
    let data_dir = home.join(DATA_DIR);

    if !data_dir.exists() {
        fs::create_dir_all(&data_dir)
            .map_err(|e| format!("Failed to create data directory: {}", e))?;
    }

    Ok(data_dir)
}

/// Config file candidates: next to the executable, working directory, data directory
fn config_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
    {
        candidates.push(exe_dir.join(CONFIG_FILE));
    }
    if let Ok(work_dir) = std::env::current_dir() {
        candidates.push(work_dir.join(CONFIG_FILE));
    }
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(DATA_DIR).join(CONFIG_FILE));
    }
    candidates
}

fn find_config_file() -> Option<PathBuf> {
    config_candidates().into_iter().find(|p| p.is_file())
}

/// Load config from a JSON file
pub fn load_from_file(path: &Path) -> AppResult<AppConfig> {
    let content = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("failed to read config file: {}", e)))?;

    serde_json::from_str(&content)
        .map_err(|e| AppError::Config(format!("failed to parse config file: {}", e)))
}

/// Build config from environment-style variables
pub fn load_from_env_with<F>(lookup: F) -> AppConfig
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = AppConfig::default();
    let var = |name: &str| lookup(name).unwrap_or_default();
    let flag = |name: &str| lookup(name).map(|v| v.trim() == "true");

    config.sessions = split_session_env(&var("SESSIONS"));
    config.proxies = var("PROXIES")
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();

    let proxy = &mut config.proxy;
    if let Some(address) = lookup("ADDRESS") {
        proxy.address = address;
    }
    proxy.api_key = var("APIKEY");
    proxy.enable_mirror_api = flag("ENABLE_MIRROR_API").unwrap_or(false);
    proxy.mirror_api_prefix = var("MIRROR_API_PREFIX");

    if let Some(timeout) = lookup("REQUEST_TIMEOUT").and_then(|v| v.trim().parse().ok()) {
        proxy.request_timeout = timeout;
    }
    if let Some(base_url) = lookup("UPSTREAM_BASE_URL").filter(|v| !v.is_empty()) {
        proxy.upstream.base_url = base_url;
    }
    if let Some(probe_url) = lookup("PROBE_URL").filter(|v| !v.is_empty()) {
        proxy.health_check.probe_url = probe_url;
    }
    if let Some(timeout) = lookup("PROBE_TIMEOUT").and_then(|v| v.trim().parse().ok()) {
        proxy.health_check.timeout_secs = timeout;
    }
    if let Some(marker) = lookup("CHALLENGE_MARKER") {
        proxy.health_check.challenge_marker = marker;
    }
    if let Some(user_agent) = lookup("PROBE_USER_AGENT").filter(|v| !v.is_empty()) {
        proxy.health_check.user_agent = user_agent;
    }

    config
}

/// Load application config.
///
/// A config file wins when present and valid; otherwise the environment is used.
pub fn load_app_config() -> AppConfig {
    let mut config = match find_config_file() {
        Some(path) => {
            tracing::info!("Found config file at {}", path.display());
            match load_from_file(&path) {
                Ok(config) => {
                    tracing::info!("Successfully loaded configuration from config file");
                    config
                }
                Err(e) => {
                    tracing::error!(
                        "Failed to load config from file: {}, falling back to environment variables",
                        e
                    );
                    load_from_env_with(|name| std::env::var(name).ok())
                }
            }
        }
        None => {
            tracing::info!("Loading configuration from environment variables");
            load_from_env_with(|name| std::env::var(name).ok())
        }
    };

    config.normalize();
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_env_config() {
        let config = load_from_env_with(env(&[
            ("SESSIONS", "a,b:org-b,,c"),
            ("PROXIES", "http://p1:1, ,socks5://p2:2"),
            ("APIKEY", "secret"),
            ("ENABLE_MIRROR_API", "true"),
            ("MIRROR_API_PREFIX", "/mirror"),
            ("PROBE_TIMEOUT", "3"),
            ("CHALLENGE_MARKER", "Checking your browser"),
            ("PROBE_USER_AGENT", "TestBrowser/1.0"),
        ]));

        assert_eq!(config.sessions.len(), 4);
        assert_eq!(config.proxies, vec!["http://p1:1", "socks5://p2:2"]);
        assert_eq!(config.proxy.api_key, "secret");
        assert_eq!(config.proxy.mirror_prefix(), Some("/mirror"));
        assert_eq!(config.proxy.address, crate::proxy::config::DEFAULT_ADDRESS);
        assert_eq!(config.proxy.health_check.timeout_secs, 3);
        assert_eq!(config.proxy.health_check.challenge_marker, "Checking your browser");
        assert_eq!(config.proxy.health_check.user_agent, "TestBrowser/1.0");
    }

    #[test]
    fn test_env_bad_numbers_keep_defaults() {
        let config = load_from_env_with(env(&[("PROBE_TIMEOUT", "soon"), ("REQUEST_TIMEOUT", "")]));
        assert_eq!(config.proxy.health_check.timeout_secs, 10);
        assert_eq!(config.proxy.request_timeout, 120);
        assert!(config.sessions.is_empty());
        assert!(config.proxies.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"sessions": ["k1", {{"sessionKey": "k2", "orgID": "o2"}}], "proxies": ["http://p:1"], "apiKey": "secret"}}"#
        )
        .unwrap();

        let config = load_from_file(file.path()).unwrap();
        assert_eq!(config.sessions.len(), 2);
        assert_eq!(config.proxies, vec!["http://p:1"]);
        assert_eq!(config.proxy.api_key, "secret");
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "sessions: [a, b]").unwrap();

        assert!(matches!(load_from_file(file.path()), Err(AppError::Config(_))));
        assert!(matches!(
            load_from_file(Path::new("/nonexistent/config.json")),
            Err(AppError::Config(_))
        ));
    }
}
