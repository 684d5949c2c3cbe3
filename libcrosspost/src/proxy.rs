//! Media proxy collaborator
//!
//! Some media hosts refuse hot-linking from the gateway's fetchers. URLs on
//! those hosts are rewritten to go through a proxy endpoint before they are
//! handed to the gateway.

use url::Url;

use crate::config::MediaProxyConfig;
use crate::error::{ConfigError, Result};

/// Rewrites media URLs that the gateway cannot fetch directly
///
/// Implementations must be idempotent: a rewritten URL is never eligible
/// again.
pub trait MediaProxy: Send + Sync {
    /// Whether `url` should be routed through the proxy
    fn is_eligible(&self, url: &str) -> bool;

    /// Proxied form of `url`
    fn rewrite(&self, url: &str) -> String;
}

/// Leaves every URL untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughProxy;

impl MediaProxy for PassthroughProxy {
    fn is_eligible(&self, _url: &str) -> bool {
        false
    }

    fn rewrite(&self, url: &str) -> String {
        url.to_string()
    }
}

/// Proxies URLs whose host matches one of a configured set of domains
#[derive(Debug, Clone)]
pub struct HostProxy {
    base: Url,
    hosts: Vec<String>,
}

impl HostProxy {
    /// Create a proxy rooted at `base_url`
    ///
    /// `hosts` match exactly or as a parent domain (`cdn.example` matches
    /// `img.cdn.example`).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if `base_url` is not an absolute URL.
    pub fn new(base_url: &str, hosts: Vec<String>) -> Result<Self> {
        let base = Url::parse(base_url).map_err(|e| ConfigError::InvalidValue {
            field: "media_proxy.base_url".to_string(),
            reason: e.to_string(),
        })?;
        let hosts = hosts
            .into_iter()
            .map(|h| h.trim().trim_start_matches('.').to_lowercase())
            .filter(|h| !h.is_empty())
            .collect();
        Ok(Self { base, hosts })
    }

    /// Build from configuration; no config means no proxying
    pub fn from_config(config: Option<&MediaProxyConfig>) -> Result<Box<dyn MediaProxy>> {
        match config {
            Some(cfg) if !cfg.hosts.is_empty() => {
                Ok(Box::new(HostProxy::new(&cfg.base_url, cfg.hosts.clone())?))
            }
            _ => Ok(Box::new(PassthroughProxy)),
        }
    }

    fn is_proxied(&self, url: &Url) -> bool {
        url.host_str() == self.base.host_str() && url.path() == self.base.path()
    }
}

impl MediaProxy for HostProxy {
    fn is_eligible(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        if self.is_proxied(&parsed) {
            return false;
        }
        let Some(host) = parsed.host_str() else {
            return false;
        };
        let host = host.to_lowercase();
        self.hosts
            .iter()
            .any(|h| host == *h || host.ends_with(&format!(".{}", h)))
    }

    fn rewrite(&self, url: &str) -> String {
        if !self.is_eligible(url) {
            return url.to_string();
        }
        let mut proxied = self.base.clone();
        proxied.query_pairs_mut().append_pair("url", url);
        proxied.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proxy() -> HostProxy {
        HostProxy::new(
            "https://media.crosspost.test/proxy",
            vec!["private-cdn.test".to_string()],
        )
        .unwrap()
    }

    #[test]
    fn test_eligible_hosts() {
        let proxy = proxy();
        assert!(proxy.is_eligible("https://private-cdn.test/a.png"));
        assert!(proxy.is_eligible("https://img.private-cdn.test/a.png"));
        assert!(!proxy.is_eligible("https://notprivate-cdn.test/a.png"));
        assert!(!proxy.is_eligible("https://public.test/a.png"));
        assert!(!proxy.is_eligible("not a url"));
    }

    #[test]
    fn test_rewrite_encodes_original() {
        let rewritten = proxy().rewrite("https://private-cdn.test/a b.png?x=1");
        assert_eq!(
            rewritten,
            "https://media.crosspost.test/proxy?url=https%3A%2F%2Fprivate-cdn.test%2Fa+b.png%3Fx%3D1"
        );
    }

    #[test]
    fn test_rewrite_keeps_base_query() {
        let proxy = HostProxy::new(
            "https://media.crosspost.test/proxy?key=abc",
            vec!["private-cdn.test".to_string()],
        )
        .unwrap();
        let rewritten = proxy.rewrite("https://private-cdn.test/a.png");
        assert_eq!(
            rewritten,
            "https://media.crosspost.test/proxy?key=abc&url=https%3A%2F%2Fprivate-cdn.test%2Fa.png"
        );
        assert_eq!(proxy.rewrite(&rewritten), rewritten);
    }

    #[test]
    fn test_rewrite_is_idempotent() {
        let proxy = proxy();
        let once = proxy.rewrite("https://private-cdn.test/a.png");
        let twice = proxy.rewrite(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(HostProxy::new("/relative", vec![]).is_err());
    }

    #[test]
    fn test_passthrough() {
        let proxy = PassthroughProxy;
        assert!(!proxy.is_eligible("https://private-cdn.test/a.png"));
        assert_eq!(proxy.rewrite("https://a.test/x"), "https://a.test/x");
    }
}
