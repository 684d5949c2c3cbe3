//! Post-creation requests
//!
//! `CreatePostRequest` is the wire shape accepted from callers. It is
//! validated once into a `PostRequest`, which is what the rest of the crate
//! works with: platforms parsed, overrides keyed by platform, schedule
//! parsed, legacy image URLs folded into media.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CrosspostError, Result};
use crate::options::OptionsSet;
use crate::types::{MediaItem, MediaType, Platform};

/// A media reference as supplied in an override
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MediaRef {
    Url(String),
    Item(MediaItem),
    Other(Value),
}

impl MediaRef {
    /// The URL this reference carries, untrimmed, if it has one
    pub fn url(&self) -> Option<&str> {
        match self {
            MediaRef::Url(url) => Some(url),
            MediaRef::Item(item) => Some(&item.url),
            MediaRef::Other(value) => value.get("url").and_then(Value::as_str),
        }
    }

    /// Convert into an owned media item, dropping references without a URL
    pub fn to_item(&self) -> Option<MediaItem> {
        match self {
            MediaRef::Item(item) if !item.url.trim().is_empty() => Some(MediaItem {
                url: item.url.trim().to_string(),
                ..item.clone()
            }),
            other => {
                let url = other.url()?.trim();
                (!url.is_empty()).then(|| MediaItem::from_url(url))
            }
        }
    }
}

impl From<&MediaItem> for MediaRef {
    fn from(item: &MediaItem) -> Self {
        MediaRef::Item(item.clone())
    }
}

impl From<&str> for MediaRef {
    fn from(url: &str) -> Self {
        MediaRef::Url(url.to_string())
    }
}

/// Caller-supplied content for one platform, valid for a single request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Override {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<Vec<MediaRef>>,
    #[serde(default, flatten)]
    pub options: OptionsSet,
}

impl Override {
    /// Override text, if non-empty
    pub fn content(&self) -> Option<&str> {
        self.content.as_deref().filter(|c| !c.trim().is_empty())
    }

    /// Override media list, if non-empty
    pub fn media(&self) -> Option<&[MediaRef]> {
        self.media.as_deref().filter(|m| !m.is_empty())
    }
}

/// Raw post-creation request as received on the wire
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostRequest {
    #[serde(default)]
    pub account_group_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_id: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub platforms: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<Vec<MediaItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_urls: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variants: BTreeMap<String, Override>,
    #[serde(default, flatten)]
    pub options: OptionsSet,
    #[serde(default)]
    pub publish_immediately: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_key: Option<String>,
}

/// A validated post-creation request
#[derive(Debug, Clone, PartialEq)]
pub struct PostRequest {
    pub account_group_id: String,
    pub post_id: Option<String>,
    pub content: String,
    /// Target platforms, deduplicated, in request order
    pub platforms: Vec<Platform>,
    pub title: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub media: Vec<MediaItem>,
    pub overrides: BTreeMap<Platform, Override>,
    /// Request-level platform options
    pub options: OptionsSet,
    pub publish_immediately: bool,
    pub profile_key: Option<String>,
}

impl PostRequest {
    pub fn override_for(&self, platform: Platform) -> Option<&Override> {
        self.overrides.get(&platform)
    }

    /// Schedule date to forward to the gateway, if any
    pub fn schedule_date(&self) -> Option<DateTime<Utc>> {
        if self.publish_immediately {
            None
        } else {
            self.scheduled_at
        }
    }
}

impl CreatePostRequest {
    /// Validate the request at the boundary
    ///
    /// # Errors
    ///
    /// Returns `CrosspostError::InvalidInput` when required fields are
    /// missing or a platform name, override key or schedule date is invalid.
    pub fn validate(self) -> Result<PostRequest> {
        if self.account_group_id.trim().is_empty() {
            return Err(CrosspostError::InvalidInput(
                "accountGroupId is required".to_string(),
            ));
        }

        if self.content.trim().is_empty() {
            return Err(CrosspostError::InvalidInput(
                "Content cannot be empty".to_string(),
            ));
        }

        if self.platforms.is_empty() {
            return Err(CrosspostError::InvalidInput(
                "At least one platform is required".to_string(),
            ));
        }

        let mut platforms = Vec::with_capacity(self.platforms.len());
        for name in &self.platforms {
            let platform: Platform = name.parse()?;
            if !platforms.contains(&platform) {
                platforms.push(platform);
            }
        }

        let mut overrides = BTreeMap::new();
        for (key, value) in self.variants {
            let platform: Platform = key.parse().map_err(|_| {
                CrosspostError::InvalidInput(format!("Unknown platform in variants: '{}'", key))
            })?;
            overrides.insert(platform, value);
        }

        let scheduled_at = self
            .scheduled_date
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(parse_iso8601)
            .transpose()?;

        let media = match self.media {
            Some(items) if !items.is_empty() => items
                .into_iter()
                .filter(|item| !item.url.trim().is_empty())
                .collect(),
            _ => self
                .image_urls
                .unwrap_or_default()
                .into_iter()
                .map(|url| url.trim().to_string())
                .filter(|url| !url.is_empty())
                .map(|url| MediaItem {
                    media_type: MediaType::Image,
                    url,
                    alt_text: None,
                    filename: None,
                })
                .collect(),
        };

        Ok(PostRequest {
            account_group_id: self.account_group_id,
            post_id: self.post_id.filter(|id| !id.trim().is_empty()),
            content: self.content,
            platforms,
            title: self.title.filter(|t| !t.trim().is_empty()),
            scheduled_at,
            media,
            overrides,
            options: self.options,
            publish_immediately: self.publish_immediately,
            profile_key: self.profile_key,
        })
    }
}

/// Parse an ISO-8601 timestamp; one without an offset is taken as UTC
pub fn parse_iso8601(input: &str) -> Result<DateTime<Utc>> {
    let input = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| {
            CrosspostError::InvalidInput(format!("Invalid scheduledDate '{}': {}", input, e))
        })
}
