//! Media URL normalization and attachment limits

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::proxy::MediaProxy;
use crate::request::MediaRef;
use crate::types::Platform;

/// Turns media references into the URL list sent to the gateway
pub struct MediaNormalizer<'a> {
    proxy: &'a dyn MediaProxy,
}

impl<'a> MediaNormalizer<'a> {
    pub fn new(proxy: &'a dyn MediaProxy) -> Self {
        Self { proxy }
    }

    /// Trim, drop entries without a URL, proxy-rewrite, dedupe.
    ///
    /// First-seen order is preserved. Deduplication runs on the rewritten
    /// form, so a raw URL and its proxied twin collapse into one entry.
    pub fn normalize(&self, refs: &[MediaRef]) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut urls = Vec::with_capacity(refs.len());

        for media in refs {
            let Some(url) = media.url().map(str::trim).filter(|u| !u.is_empty()) else {
                continue;
            };
            let url = if self.proxy.is_eligible(url) {
                let rewritten = self.proxy.rewrite(url);
                debug!("Proxied media URL {} -> {}", url, rewritten);
                rewritten
            } else {
                url.to_string()
            };
            if seen.insert(url.clone()) {
                urls.push(url);
            }
        }

        urls
    }
}

/// Truncate `urls` to the platform's attachment limit
pub fn clamp(platform: Platform, urls: Vec<String>) -> Vec<String> {
    match platform.max_attachments() {
        Some(limit) => truncate(urls, limit, platform.as_str()),
        None => urls,
    }
}

/// Smallest finite attachment limit among `platforms`
pub fn group_limit(platforms: &[Platform]) -> Option<usize> {
    platforms.iter().filter_map(Platform::max_attachments).min()
}

/// Truncate `urls` to the tightest limit in the group.
///
/// A group made only of unbounded platforms is left unclamped.
pub fn clamp_for_group(platforms: &[Platform], urls: Vec<String>) -> Vec<String> {
    match group_limit(platforms) {
        Some(limit) => {
            let label = platforms
                .iter()
                .map(Platform::as_str)
                .collect::<Vec<_>>()
                .join(",");
            truncate(urls, limit, &label)
        }
        None => urls,
    }
}

fn truncate(mut urls: Vec<String>, limit: usize, target: &str) -> Vec<String> {
    if urls.len() > limit {
        warn!(
            "Dropping {} media item(s) for {}: attachment limit is {}",
            urls.len() - limit,
            target,
            limit
        );
        urls.truncate(limit);
    }
    urls
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::{HostProxy, PassthroughProxy};
    use serde_json::json;

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_normalize_trims_drops_and_dedupes() {
        let proxy = PassthroughProxy;
        let normalizer = MediaNormalizer::new(&proxy);
        let refs = vec![
            MediaRef::from(" https://a.test/1.png "),
            MediaRef::from(""),
            MediaRef::Other(json!(7)),
            MediaRef::from("https://a.test/2.png"),
            MediaRef::from("https://a.test/1.png"),
        ];

        assert_eq!(
            normalizer.normalize(&refs),
            urls(&["https://a.test/1.png", "https://a.test/2.png"])
        );
    }

    #[test]
    fn test_normalize_rewrites_through_proxy_before_dedupe() {
        let proxy = HostProxy::new("https://proxy.test/m", vec!["locked.test".to_string()]).unwrap();
        let normalizer = MediaNormalizer::new(&proxy);
        let raw = "https://locked.test/a.png";
        let proxied = proxy.rewrite(raw);
        let refs = vec![MediaRef::from(raw), MediaRef::Url(proxied.clone())];

        assert_eq!(normalizer.normalize(&refs), vec![proxied]);
    }

    #[test]
    fn test_clamp_reddit_keeps_first() {
        let input = urls(&["https://a.test/1", "https://a.test/2", "https://a.test/3"]);
        assert_eq!(clamp(Platform::Reddit, input), urls(&["https://a.test/1"]));
    }

    #[test]
    fn test_clamp_under_limit_untouched() {
        let input = urls(&["https://a.test/1", "https://a.test/2"]);
        assert_eq!(clamp(Platform::X, input.clone()), input);
    }

    #[test]
    fn test_clamp_unbounded_platform() {
        let input: Vec<String> = (0..20).map(|i| format!("https://a.test/{}", i)).collect();
        assert_eq!(clamp(Platform::Youtube, input.clone()).len(), 20);
    }

    #[test]
    fn test_clamp_for_group_uses_minimum() {
        let input: Vec<String> = (0..12).map(|i| format!("https://a.test/{}", i)).collect();
        let out = clamp_for_group(&[Platform::Instagram, Platform::Linkedin, Platform::X], input);
        assert_eq!(out.len(), 4);
        assert_eq!(out[0], "https://a.test/0");
    }

    #[test]
    fn test_clamp_for_group_ignores_unbounded_members() {
        let input: Vec<String> = (0..12).map(|i| format!("https://a.test/{}", i)).collect();
        let out = clamp_for_group(&[Platform::Tiktok, Platform::Linkedin], input);
        assert_eq!(out.len(), 9);
    }

    #[test]
    fn test_clamp_for_group_all_unbounded() {
        let input: Vec<String> = (0..12).map(|i| format!("https://a.test/{}", i)).collect();
        let out = clamp_for_group(&[Platform::Tiktok, Platform::Telegram], input);
        assert_eq!(out.len(), 12);
        assert_eq!(group_limit(&[]), None);
    }
}
