//! Publish request composition
//!
//! Turns a post-creation request (base content, base media, overrides)
//! plus the stored post's saved platform variants into the smallest set of
//! gateway requests:
//!
//! - every platform with an override or a saved variant gets a dedicated
//!   request with its own content, media and options;
//! - every other platform shares a single grouped request built from the
//!   base content.
//!
//! Composition is pure: no I/O, no errors, same input → same output.
//!
//! # Example
//!
//! ```
//! use libcrosspost::compose::PublishRequestComposer;
//! use libcrosspost::request::CreatePostRequest;
//! use libcrosspost::variants::build_post;
//!
//! let request = CreatePostRequest {
//!     account_group_id: "acme".to_string(),
//!     content: "We shipped!".to_string(),
//!     platforms: vec!["x".to_string(), "linkedin".to_string()],
//!     ..Default::default()
//! }
//! .validate()
//! .unwrap();
//!
//! let post = build_post(&request);
//! let requests = PublishRequestComposer::default().compose(&request, &post);
//! assert_eq!(requests.len(), 1);
//! assert_eq!(requests[0].platforms.len(), 2);
//! ```

pub mod content;
pub mod grouping;
pub mod media;
pub mod options;

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::Result;
use crate::options::{OptionKind, OptionsSet};
use crate::proxy::{HostProxy, MediaProxy, PassthroughProxy};
use crate::request::{MediaRef, PostRequest};
use crate::types::{Platform, Post, VariantKey};

use self::media::MediaNormalizer;
use self::options::{OptionSources, PlatformOptionsResolver};

/// One outbound request to the publishing gateway
#[derive(Debug, Clone, PartialEq)]
pub struct PublishRequest {
    pub content: String,
    /// Internal platform names; mapped to gateway names on serialization
    pub platforms: Vec<Platform>,
    /// Normalized and clamped media URLs
    pub media_urls: Vec<String>,
    pub options: OptionsSet,
    pub schedule_date: Option<DateTime<Utc>>,
    pub profile_key: Option<String>,
    /// Variant that records this request's outcome: the platform's own for
    /// a dedicated request, the base for the grouped one. Not sent.
    pub target: VariantKey,
}

impl PublishRequest {
    /// Whether this request fans out to more than one platform
    pub fn is_grouped(&self) -> bool {
        self.platforms.len() > 1
    }

    /// Gateway spelling of the target platforms
    pub fn gateway_platforms(&self) -> Vec<&'static str> {
        self.platforms.iter().map(Platform::gateway_name).collect()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GatewayPayload<'a> {
    content: &'a str,
    platforms: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    media_urls: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    schedule_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    profile_key: Option<&'a str>,
    #[serde(flatten)]
    options: &'a OptionsSet,
}

impl Serialize for PublishRequest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        GatewayPayload {
            content: &self.content,
            platforms: self.gateway_platforms(),
            media_urls: (!self.media_urls.is_empty()).then_some(self.media_urls.as_slice()),
            schedule_date: self
                .schedule_date
                .map(|d| d.to_rfc3339_opts(SecondsFormat::Secs, true)),
            profile_key: self.profile_key.as_deref(),
            options: &self.options,
        }
        .serialize(serializer)
    }
}

/// Builds the ordered list of gateway requests for a post
#[derive(Clone)]
pub struct PublishRequestComposer {
    proxy: Arc<dyn MediaProxy>,
    options: PlatformOptionsResolver,
}

impl Default for PublishRequestComposer {
    fn default() -> Self {
        Self::new(Arc::new(PassthroughProxy), PlatformOptionsResolver::default())
    }
}

impl PublishRequestComposer {
    pub fn new(proxy: Arc<dyn MediaProxy>, options: PlatformOptionsResolver) -> Self {
        Self { proxy, options }
    }

    /// Build a composer from the media proxy and Pinterest sections of `config`
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the media proxy base URL is invalid.
    pub fn from_config(config: &Config) -> Result<Self> {
        let proxy: Arc<dyn MediaProxy> =
            Arc::from(HostProxy::from_config(config.media_proxy.as_ref())?);
        let options = PlatformOptionsResolver::from_config(config.pinterest.as_ref());
        Ok(Self::new(proxy, options))
    }

    /// Compose the gateway requests for `post` as requested by `request`.
    ///
    /// Dedicated requests come first in first-appearance order, the grouped
    /// request (if any) last. Every target platform appears in exactly one
    /// returned request.
    pub fn compose(&self, request: &PostRequest, post: &Post) -> Vec<PublishRequest> {
        let partition = grouping::partition(request, post);
        debug!(
            "Composing post {}: {} dedicated, {} grouped",
            post.id,
            partition.dedicated.len(),
            partition.groupable.len()
        );

        let mut requests: Vec<PublishRequest> = partition
            .dedicated
            .iter()
            .map(|platform| self.compose_dedicated(*platform, request, post))
            .collect();

        if !partition.groupable.is_empty() {
            requests.push(self.compose_grouped(&partition.groupable, request, post));
        }

        info!(
            "Composed {} publish request(s) for post {} covering {} platform(s)",
            requests.len(),
            post.id,
            requests.iter().map(|r| r.platforms.len()).sum::<usize>()
        );
        requests
    }

    fn compose_dedicated(&self, platform: Platform, request: &PostRequest, post: &Post) -> PublishRequest {
        let override_ = request.override_for(platform);
        let saved = post.saved_variant(platform);

        let resolved = content::resolve(
            platform,
            override_,
            saved,
            &request.content,
            &request.media,
        );

        let normalizer = MediaNormalizer::new(self.proxy.as_ref());
        let media_urls = media::clamp(platform, normalizer.normalize(&resolved.media));

        let mut options = OptionsSet::default();
        if let Some(kind) = platform.option_kind() {
            let sources = OptionSources {
                override_: override_.map(|o| &o.options),
                saved: saved.map(|v| &v.options),
                request: &request.options,
            };
            if let Some(resolved_options) =
                self.options
                    .resolve(kind, sources, request_title(request, post), &resolved.content)
            {
                options.insert(resolved_options);
            }
        }

        PublishRequest {
            content: resolved.content,
            platforms: vec![platform],
            media_urls,
            options,
            schedule_date: request.schedule_date(),
            profile_key: request.profile_key.clone(),
            target: VariantKey::Platform(platform),
        }
    }

    fn compose_grouped(&self, bucket: &[Platform], request: &PostRequest, post: &Post) -> PublishRequest {
        let base_refs: Vec<MediaRef> = request.media.iter().map(MediaRef::from).collect();
        let normalizer = MediaNormalizer::new(self.proxy.as_ref());
        let media_urls = media::clamp_for_group(bucket, normalizer.normalize(&base_refs));

        let mut kinds: Vec<OptionKind> = bucket.iter().filter_map(Platform::option_kind).collect();
        kinds.sort();
        kinds.dedup();

        let mut options = OptionsSet::default();
        for kind in kinds {
            if let Some(resolved) = self.options.resolve(
                kind,
                OptionSources::request_only(&request.options),
                request_title(request, post),
                &request.content,
            ) {
                options.insert(resolved);
            }
        }

        PublishRequest {
            content: request.content.clone(),
            platforms: bucket.to_vec(),
            media_urls,
            options,
            schedule_date: request.schedule_date(),
            profile_key: request.profile_key.clone(),
            target: VariantKey::Base,
        }
    }
}

fn request_title<'a>(request: &'a PostRequest, post: &'a Post) -> Option<&'a str> {
    request.title.as_deref().or(post.title.as_deref())
}
