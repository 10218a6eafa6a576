// Sticky proxy selection: the same session key always egresses through the same proxy
use sha2::{Digest, Sha256};

use crate::proxy::common::utils::{mask_proxy_url, mask_secret};

/// Index of the proxy assigned to `session_key` among `proxy_count` proxies.
///
/// Uses the first SHA-256 byte modulo the count. Counts that do not divide
/// 256 get a slight bias towards lower indices; this only spreads load.
pub fn proxy_index(session_key: &str, proxy_count: usize) -> Option<usize> {
    if proxy_count == 0 {
        return None;
    }
    let digest = Sha256::digest(session_key.as_bytes());
    Some(usize::from(digest[0]) % proxy_count)
}

/// Proxy assigned to `session_key`, or `None` to dispatch directly
pub fn select_proxy<'a>(session_key: &str, proxies: &'a [String]) -> Option<&'a str> {
    let idx = proxy_index(session_key, proxies.len())?;
    let proxy = proxies[idx].as_str();
    tracing::debug!(
        "SelectProxy: session={} -> proxyIdx={} ({})",
        mask_secret(session_key),
        idx,
        mask_proxy_url(proxy)
    );
    Some(proxy)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proxies(n: usize) -> Vec<String> {
        (0..n)
            .map(|i| format!("http://10.0.0.{}:8080", i + 1))
            .collect()
    }

    fn first_digest_byte(key: &str) -> u8 {
        Sha256::digest(key.as_bytes())[0]
    }

    #[test]
    fn test_empty_proxy_list() {
        assert_eq!(select_proxy("session-a", &[]), None);
        assert_eq!(proxy_index("session-a", 0), None);
    }

    #[test]
    fn test_deterministic() {
        let list = proxies(5);
        let first = select_proxy("session-a", &list);
        let second = select_proxy("session-a", &list);
        assert!(first.is_some());
        assert_eq!(first, second);
    }

    #[test]
    fn test_matches_first_digest_byte() {
        let list = proxies(3);
        for key in ["alpha", "beta", "gamma", "delta"] {
            let expected = usize::from(first_digest_byte(key)) % 3;
            assert_eq!(select_proxy(key, &list), Some(list[expected].as_str()));
        }
    }

    #[test]
    fn test_both_residues_reachable() {
        let list = proxies(2);
        let even = (0..)
            .map(|i| format!("key-{}", i))
            .find(|k| first_digest_byte(k) % 2 == 0)
            .unwrap();
        let odd = (0..)
            .map(|i| format!("key-{}", i))
            .find(|k| first_digest_byte(k) % 2 == 1)
            .unwrap();

        assert_eq!(select_proxy(&even, &list), Some(list[0].as_str()));
        assert_eq!(select_proxy(&odd, &list), Some(list[1].as_str()));
    }

    #[test]
    fn test_single_proxy_takes_everything() {
        let list = proxies(1);
        for key in ["a", "b", "c"] {
            assert_eq!(select_proxy(key, &list), Some(list[0].as_str()));
        }
    }
}
