//! Effective text and media for one platform

use tracing::debug;

use crate::request::{MediaRef, Override};
use crate::types::{MediaItem, Platform, Variant};

/// Content chosen for a platform, media still unnormalized
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedContent {
    pub content: String,
    pub media: Vec<MediaRef>,
}

/// Pick text and media from override, saved variant and base post.
///
/// Text: non-empty override content, then the saved variant's text, then
/// the base content.
///
/// Media: a non-empty override list is used on its own. Otherwise the saved
/// variant's media, unless no usable URL can be taken from it, in which case
/// the base media. A saved variant with no media URLs has simply not had
/// media set yet.
pub fn resolve(
    platform: Platform,
    override_: Option<&Override>,
    saved: Option<&Variant>,
    base_content: &str,
    base_media: &[MediaItem],
) -> ResolvedContent {
    let content = match (override_.and_then(Override::content), saved) {
        (Some(text), _) => text.to_string(),
        (None, Some(variant)) => variant.text.clone(),
        (None, None) => base_content.to_string(),
    };

    let media = if let Some(media) = override_.and_then(Override::media) {
        debug!("{}: using {} override media reference(s)", platform, media.len());
        media.to_vec()
    } else {
        match saved {
            Some(variant) if !variant.media_urls().is_empty() => {
                variant.media.iter().map(MediaRef::from).collect()
            }
            _ => base_media.iter().map(MediaRef::from).collect(),
        }
    };

    ResolvedContent { content, media }
}
