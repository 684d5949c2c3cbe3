//! Dedicated / groupable partition of the target platforms

use crate::request::PostRequest;
use crate::types::{Platform, Post};

/// Target platforms split by whether they need a request of their own
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    /// Platforms with an override or a saved variant, first-appearance order
    pub dedicated: Vec<Platform>,
    /// Platforms with neither, sharing one request
    pub groupable: Vec<Platform>,
}

/// Request platforms followed by any saved-variant platform not already listed
pub fn target_platforms(request: &PostRequest, post: &Post) -> Vec<Platform> {
    let mut targets: Vec<Platform> = Vec::with_capacity(request.platforms.len());
    let saved = post.variants.keys().copied();

    for platform in request.platforms.iter().copied().chain(saved) {
        if !targets.contains(&platform) {
            targets.push(platform);
        }
    }
    targets
}

/// Split the target set in a single pass.
///
/// A platform is dedicated as soon as either the request overrides it or
/// the post already holds a variant for it.
pub fn partition(request: &PostRequest, post: &Post) -> Partition {
    let mut partition = Partition::default();

    for platform in target_platforms(request, post) {
        let has_override = request.override_for(platform).is_some();
        let has_saved = post.saved_variant(platform).is_some();

        if has_override || has_saved {
            partition.dedicated.push(platform);
        } else {
            partition.groupable.push(platform);
        }
    }

    partition
}
