// Client configuration: where the instance lives and how the session
// talks to it.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::Proxy;
use tracing::warn;
use url::Url;

use crate::error::Result;

/// Public instance operated by CIRCL.
pub const DEFAULT_ROOT_URL: &str = "https://pandora.circl.lu/";

pub const USER_AGENT: &str = concat!("pandora-cli/", env!("CARGO_PKG_VERSION"));

const MAX_BACKOFF: Duration = Duration::from_secs(120);

/// Transport-level retry policy.
///
/// Only connection failures and the statuses in `status_forcelist` are
/// retried. Error payloads returned with a 200 are left to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Number of retries after the first attempt.
    pub total: u32,
    /// Seconds; retry `n` sleeps `backoff_factor * 2^(n-1)`.
    pub backoff_factor: f64,
    pub status_forcelist: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            total: 5,
            backoff_factor: 0.1,
            status_forcelist: vec![500, 502, 503, 504],
        }
    }
}

impl RetryPolicy {
    /// A policy that sends every request exactly once.
    pub fn none() -> Self {
        Self {
            total: 0,
            ..Self::default()
        }
    }

    pub fn is_retryable(&self, status: u16) -> bool {
        self.status_forcelist.contains(&status)
    }

    /// Sleep before the `retry`-th retry (1-based), never above two
    /// minutes. A NaN or non-positive factor means no sleep.
    pub fn backoff(&self, retry: u32) -> Duration {
        if retry == 0 || self.backoff_factor.is_nan() || self.backoff_factor <= 0.0 {
            return Duration::ZERO;
        }
        let exponent = (retry - 1).min(i32::MAX as u32) as i32;
        let secs = (self.backoff_factor * 2f64.powi(exponent)).min(MAX_BACKOFF.as_secs_f64());
        Duration::try_from_secs_f64(secs).unwrap_or(MAX_BACKOFF)
    }
}

/// Session-level configuration, fixed once the client is built.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub root_url: Url,
    pub useragent: String,
    /// Scheme (`http`, `https` or `all`) to proxy URL.
    pub proxies: BTreeMap<String, String>,
    pub retries: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            root_url: Url::parse(DEFAULT_ROOT_URL).expect("default root URL is valid"),
            useragent: USER_AGENT.to_string(),
            proxies: BTreeMap::new(),
            retries: RetryPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Configuration for the instance at `root_url`, normalized with
    /// [`normalize_root_url`].
    pub fn new(root_url: &str) -> Result<Self> {
        Ok(Self {
            root_url: normalize_root_url(root_url)?,
            ..Self::default()
        })
    }

    pub fn with_useragent(mut self, useragent: impl Into<String>) -> Self {
        self.useragent = useragent.into();
        self
    }

    pub fn with_proxy(mut self, scheme: impl Into<String>, proxy_url: impl Into<String>) -> Self {
        self.proxies.insert(scheme.into(), proxy_url.into());
        self
    }

    pub fn with_retries(mut self, retries: RetryPolicy) -> Self {
        self.retries = retries;
        self
    }

    /// Build the underlying HTTP session. No request is sent.
    pub(crate) fn build_http(&self) -> Result<Client> {
        let mut builder = Client::builder().user_agent(self.useragent.as_str());
        for (scheme, proxy_url) in &self.proxies {
            let proxy = match scheme.as_str() {
                "http" => Proxy::http(proxy_url.as_str())?,
                "https" => Proxy::https(proxy_url.as_str())?,
                "all" => Proxy::all(proxy_url.as_str())?,
                other => {
                    warn!(scheme = other, "ignoring proxy for unsupported scheme");
                    continue;
                }
            };
            builder = builder.proxy(proxy);
        }
        Ok(builder.build()?)
    }
}

/// Give `raw` a scheme (`http://` when it has none) and exactly one
/// trailing slash.
pub fn normalize_root_url(raw: &str) -> Result<Url> {
    let raw = raw.trim();
    let mut normalized = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{}", raw)
    };
    let len = normalized.trim_end_matches('/').len();
    normalized.truncate(len);
    normalized.push('/');
    Ok(Url::parse(&normalized)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_url_without_scheme_gets_http() {
        let url = normalize_root_url("example.org").unwrap();
        assert_eq!(url.as_str(), "http://example.org/");
    }

    #[test]
    fn test_root_url_gets_trailing_slash() {
        let url = normalize_root_url("https://example.org").unwrap();
        assert_eq!(url.as_str(), "https://example.org/");

        let url = normalize_root_url("https://example.org/pandora").unwrap();
        assert_eq!(url.as_str(), "https://example.org/pandora/");
    }

    #[test]
    fn test_normalized_root_url_unchanged() {
        let url = normalize_root_url("https://example.org/").unwrap();
        assert_eq!(url.as_str(), "https://example.org/");
    }

    #[test]
    fn test_host_with_port_and_no_scheme() {
        let url = normalize_root_url("127.0.0.1:6100").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:6100/");
    }

    #[test]
    fn test_extra_trailing_slashes_collapse() {
        let url = normalize_root_url("https://example.org/pandora//").unwrap();
        assert_eq!(url.as_str(), "https://example.org/pandora/");
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::ZERO);
        assert_eq!(policy.backoff(1), Duration::from_secs_f64(0.1));
        assert_eq!(policy.backoff(2), Duration::from_secs_f64(0.2));
        assert_eq!(policy.backoff(3), Duration::from_secs_f64(0.4));
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy {
            backoff_factor: 10.0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff(10), MAX_BACKOFF);
    }

    #[test]
    fn test_backoff_survives_overflow() {
        let huge = RetryPolicy {
            backoff_factor: 1e308,
            ..RetryPolicy::default()
        };
        assert_eq!(huge.backoff(2), MAX_BACKOFF);
        assert_eq!(RetryPolicy::default().backoff(5000), MAX_BACKOFF);
        assert_eq!(RetryPolicy::default().backoff(u32::MAX), MAX_BACKOFF);

        let infinite = RetryPolicy {
            backoff_factor: f64::INFINITY,
            ..RetryPolicy::default()
        };
        assert_eq!(infinite.backoff(1), MAX_BACKOFF);

        let nan = RetryPolicy {
            backoff_factor: f64::NAN,
            ..RetryPolicy::default()
        };
        assert_eq!(nan.backoff(3), Duration::ZERO);
    }

    #[test]
    fn test_default_forcelist() {
        let policy = RetryPolicy::default();
        for status in [500, 502, 503, 504] {
            assert!(policy.is_retryable(status));
        }
        assert!(!policy.is_retryable(404));
        assert!(!policy.is_retryable(200));
    }

    #[test]
    fn test_default_config_points_at_public_instance() {
        let config = ClientConfig::default();
        assert_eq!(config.root_url.as_str(), DEFAULT_ROOT_URL);
        assert!(config.useragent.starts_with("pandora-cli/"));
        assert!(config.proxies.is_empty());
    }
}
