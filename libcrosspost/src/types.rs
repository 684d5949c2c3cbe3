//! Core types for Crosspost

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CrosspostError;
use crate::options::{OptionKind, OptionsSet};

/// Literal key of the default variant of every post
pub const BASE_VARIANT_KEY: &str = "base";

// ============================================================================
// Platforms
// ============================================================================

/// Platforms reachable through the publishing gateway
///
/// Declaration order is the key order of saved variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum Platform {
    X,
    Bluesky,
    Instagram,
    Threads,
    Facebook,
    Linkedin,
    Reddit,
    Pinterest,
    Tiktok,
    Youtube,
    GoogleBusiness,
    Telegram,
}

impl Platform {
    pub const ALL: [Platform; 12] = [
        Platform::X,
        Platform::Bluesky,
        Platform::Instagram,
        Platform::Threads,
        Platform::Facebook,
        Platform::Linkedin,
        Platform::Reddit,
        Platform::Pinterest,
        Platform::Tiktok,
        Platform::Youtube,
        Platform::GoogleBusiness,
        Platform::Telegram,
    ];

    /// Internal name, as used in requests and as variant key
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::X => "x",
            Platform::Bluesky => "bluesky",
            Platform::Instagram => "instagram",
            Platform::Threads => "threads",
            Platform::Facebook => "facebook",
            Platform::Linkedin => "linkedin",
            Platform::Reddit => "reddit",
            Platform::Pinterest => "pinterest",
            Platform::Tiktok => "tiktok",
            Platform::Youtube => "youtube",
            Platform::GoogleBusiness => "google_business",
            Platform::Telegram => "telegram",
        }
    }

    /// The gateway's spelling of this platform
    pub fn gateway_name(&self) -> &'static str {
        match self {
            Platform::X => "twitter",
            Platform::GoogleBusiness => "gmb",
            other => other.as_str(),
        }
    }

    /// Maximum number of media attachments per post, `None` when unbounded
    pub fn max_attachments(&self) -> Option<usize> {
        match self {
            Platform::Reddit | Platform::Pinterest => Some(1),
            Platform::X | Platform::Bluesky => Some(4),
            Platform::Instagram | Platform::Threads | Platform::Facebook => Some(10),
            Platform::Linkedin => Some(9),
            Platform::Tiktok | Platform::Youtube | Platform::GoogleBusiness | Platform::Telegram => {
                None
            }
        }
    }

    /// Which platform-options kind applies to this platform, if any
    pub fn option_kind(&self) -> Option<OptionKind> {
        match self {
            Platform::X => Some(OptionKind::Thread),
            Platform::Reddit => Some(OptionKind::Title),
            Platform::Pinterest => Some(OptionKind::Board),
            _ => None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = CrosspostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "x" | "twitter" => Ok(Platform::X),
            "bluesky" => Ok(Platform::Bluesky),
            "instagram" => Ok(Platform::Instagram),
            "threads" => Ok(Platform::Threads),
            "facebook" => Ok(Platform::Facebook),
            "linkedin" => Ok(Platform::Linkedin),
            "reddit" => Ok(Platform::Reddit),
            "pinterest" => Ok(Platform::Pinterest),
            "tiktok" => Ok(Platform::Tiktok),
            "youtube" => Ok(Platform::Youtube),
            "google_business" | "gmb" => Ok(Platform::GoogleBusiness),
            "telegram" => Ok(Platform::Telegram),
            _ => Err(CrosspostError::InvalidInput(format!(
                "Unknown platform: '{}'",
                s
            ))),
        }
    }
}

impl TryFrom<String> for Platform {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse().map_err(|e: CrosspostError| e.to_string())
    }
}

impl From<Platform> for &'static str {
    fn from(platform: Platform) -> Self {
        platform.as_str()
    }
}

/// Key of an entry in a post's variant map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariantKey {
    Base,
    Platform(Platform),
}

impl fmt::Display for VariantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariantKey::Base => f.write_str(BASE_VARIANT_KEY),
            VariantKey::Platform(p) => f.write_str(p.as_str()),
        }
    }
}

impl FromStr for VariantKey {
    type Err = CrosspostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == BASE_VARIANT_KEY {
            Ok(VariantKey::Base)
        } else {
            s.parse().map(VariantKey::Platform)
        }
    }
}

// ============================================================================
// Media
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    #[default]
    Image,
    Video,
}

impl MediaType {
    /// Guess the media type from the URL's file extension
    pub fn infer(url: &str) -> Self {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let ext = path.rsplit_once('.').map(|(_, ext)| ext.to_lowercase());
        match ext.as_deref() {
            Some("mp4" | "mov" | "webm" | "m4v" | "avi") => MediaType::Video,
            _ => MediaType::Image,
        }
    }
}

/// A media attachment owned by exactly one variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    #[serde(rename = "type", default)]
    pub media_type: MediaType,
    pub url: String,
    #[serde(default, alias = "alt", skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl MediaItem {
    /// Build an item from a bare URL, inferring its type
    pub fn from_url(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            media_type: MediaType::infer(&url),
            url,
            alt_text: None,
            filename: None,
        }
    }
}

// ============================================================================
// Variants
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantStatus {
    #[default]
    Draft,
    Scheduled,
    Published,
}

impl VariantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VariantStatus::Draft => "draft",
            VariantStatus::Scheduled => "scheduled",
            VariantStatus::Published => "published",
        }
    }
}

impl FromStr for VariantStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(VariantStatus::Draft),
            "scheduled" => Ok(VariantStatus::Scheduled),
            "published" => Ok(VariantStatus::Published),
            other => Err(format!("unknown variant status '{}'", other)),
        }
    }
}

/// Default content or a platform-specific override of a post
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    pub text: String,
    #[serde(default)]
    pub media: Vec<MediaItem>,
    #[serde(default, flatten)]
    pub options: OptionsSet,
    #[serde(default)]
    pub status: VariantStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_url: Option<String>,
}

impl Variant {
    /// Create a draft variant
    pub fn new(text: impl Into<String>, media: Vec<MediaItem>, options: OptionsSet) -> Self {
        Self {
            text: text.into(),
            media,
            options,
            ..Default::default()
        }
    }

    /// Apply the requested schedule.
    ///
    /// The variant only becomes `scheduled` when `at` lies in the future and
    /// immediate publishing was not requested; otherwise it stays a draft.
    pub fn apply_schedule(
        &mut self,
        at: Option<DateTime<Utc>>,
        publish_immediately: bool,
        now: DateTime<Utc>,
    ) {
        match at {
            Some(at) if !publish_immediately && at > now => {
                self.status = VariantStatus::Scheduled;
                self.scheduled_at = Some(at);
            }
            _ => {
                self.status = VariantStatus::Draft;
                self.scheduled_at = None;
            }
        }
    }

    /// Record a completed publish
    pub fn mark_published(&mut self, external_id: String, url: Option<String>, at: DateTime<Utc>) {
        self.status = VariantStatus::Published;
        self.published_at = Some(at);
        self.scheduled_at = None;
        self.external_id = Some(external_id);
        self.external_url = url;
    }

    /// Record that the gateway accepted a scheduled publish
    ///
    /// Status stays `scheduled`; only the external reference is stored.
    pub fn mark_accepted(&mut self, external_id: String, url: Option<String>) {
        self.external_id = Some(external_id);
        self.external_url = url;
    }

    /// URLs of the non-blank media entries, in order
    pub fn media_urls(&self) -> Vec<String> {
        self.media
            .iter()
            .map(|m| m.url.trim())
            .filter(|u| !u.is_empty())
            .map(str::to_string)
            .collect()
    }
}

// ============================================================================
// Posts
// ============================================================================

/// A stored post: one base variant plus platform-keyed variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub account_group_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub created_at: i64,
    pub base: Variant,
    #[serde(default)]
    pub variants: BTreeMap<Platform, Variant>,
}

impl Post {
    pub fn new(account_group_id: impl Into<String>, title: Option<String>, base: Variant) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            account_group_id: account_group_id.into(),
            title,
            created_at: Utc::now().timestamp(),
            base,
            variants: BTreeMap::new(),
        }
    }

    /// Use a caller-supplied identity instead of a generated one
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn variant(&self, key: VariantKey) -> Option<&Variant> {
        match key {
            VariantKey::Base => Some(&self.base),
            VariantKey::Platform(p) => self.variants.get(&p),
        }
    }

    pub fn variant_mut(&mut self, key: VariantKey) -> Option<&mut Variant> {
        match key {
            VariantKey::Base => Some(&mut self.base),
            VariantKey::Platform(p) => self.variants.get_mut(&p),
        }
    }

    /// Saved platform variant, never the base
    pub fn saved_variant(&self, platform: Platform) -> Option<&Variant> {
        self.variants.get(&platform)
    }

    /// Append a platform variant.
    ///
    /// Existing variants are never replaced; returns `false` if the key was
    /// already present.
    pub fn add_variant(&mut self, platform: Platform, variant: Variant) -> bool {
        if self.variants.contains_key(&platform) {
            return false;
        }
        self.variants.insert(platform, variant);
        true
    }

    /// All variant keys, base first
    pub fn variant_keys(&self) -> Vec<VariantKey> {
        std::iter::once(VariantKey::Base)
            .chain(self.variants.keys().copied().map(VariantKey::Platform))
            .collect()
    }
}
