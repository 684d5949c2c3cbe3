//! Building posts from requests and recording publish outcomes on them

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::compose::PublishRequest;
use crate::dispatch::DispatchOutcome;
use crate::request::{Override, PostRequest};
use crate::types::{MediaItem, Post, Variant, VariantKey};

/// Build the post a request describes.
///
/// The base variant carries the request content, media and top-level
/// options. Each override key adds one platform variant; platforms without
/// an override get none. A client-supplied post id is kept so that a retried
/// request attaches to the same entry.
pub fn build_post(request: &PostRequest) -> Post {
    build_post_at(request, Utc::now())
}

/// `build_post` with an explicit clock
pub fn build_post_at(request: &PostRequest, now: DateTime<Utc>) -> Post {
    let mut base = Variant::new(
        request.content.clone(),
        request.media.clone(),
        request.options.clone(),
    );
    base.apply_schedule(request.scheduled_at, request.publish_immediately, now);

    let mut post = Post::new(&request.account_group_id, request.title.clone(), base);
    post.created_at = now.timestamp();
    if let Some(id) = &request.post_id {
        post = post.with_id(id.clone());
    }

    for (platform, override_) in &request.overrides {
        post.add_variant(*platform, override_variant(request, override_, now));
    }

    debug!(
        "Built post {} with {} platform variant(s)",
        post.id,
        post.variants.len()
    );
    post
}

/// Variant stored for a platform override: its own content and media when
/// set, the request's otherwise
pub fn override_variant(
    request: &PostRequest,
    override_: &Override,
    now: DateTime<Utc>,
) -> Variant {
    let text = override_.content().unwrap_or(&request.content).to_string();
    let media: Vec<MediaItem> = match override_.media() {
        Some(refs) => refs.iter().filter_map(|r| r.to_item()).collect(),
        None => request.media.clone(),
    };
    let mut variant = Variant::new(text, media, override_.options.clone());
    variant.apply_schedule(request.scheduled_at, request.publish_immediately, now);
    variant
}

impl Post {
    /// Add a variant for every override whose platform has none yet.
    ///
    /// A retry attaches to the stored post, so overrides introduced by the
    /// retry have no variant to record their outcome on. Existing variants
    /// are left untouched. Returns the keys that were added.
    pub fn adopt_overrides(
        &mut self,
        request: &PostRequest,
        now: DateTime<Utc>,
    ) -> Vec<VariantKey> {
        let mut added = Vec::new();
        for (platform, override_) in &request.overrides {
            if self.variants.contains_key(platform) {
                continue;
            }
            self.add_variant(*platform, override_variant(request, override_, now));
            added.push(VariantKey::Platform(*platform));
        }
        if !added.is_empty() {
            debug!("Post {} gained {} variant(s) from overrides", self.id, added.len());
        }
        added
    }

    /// Record an accepted request on the variant it targets.
    ///
    /// Scheduled requests keep their status and only gain the external
    /// reference; immediate ones become published at `at`. A grouped
    /// request records the gateway-level id on the base variant. Returns the
    /// key that changed, or `None` when the targeted variant does not exist.
    pub fn record_outcome(
        &mut self,
        request: &PublishRequest,
        outcome: &DispatchOutcome,
        at: DateTime<Utc>,
    ) -> Option<VariantKey> {
        let (external_id, url) = match request.target {
            VariantKey::Platform(platform) => {
                let post = outcome.post_for(platform);
                (post.id, post.url)
            }
            VariantKey::Base => (outcome.id.clone(), None),
        };

        let variant = self.variant_mut(request.target)?;
        if request.schedule_date.is_some() {
            variant.mark_accepted(external_id, url);
        } else {
            variant.mark_published(external_id, url, at);
        }
        Some(request.target)
    }
}
