//! Crosspost - variant resolution and publish request composition
//!
//! A post has a base variant and optional per-platform variants. This
//! library turns a post-creation request plus the stored post into the
//! minimal set of publishing-gateway requests, attaches posts to their
//! account group at most once, and drives the publish flow end to end.

pub mod collection;
pub mod compose;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod options;
pub mod proxy;
pub mod request;
pub mod scheduling;
pub mod service;
pub mod types;
pub mod variants;

// Re-export commonly used types
pub use collection::{attach, InMemoryCollection, PostCollection};
pub use compose::{PublishRequest, PublishRequestComposer};
pub use config::Config;
pub use db::{Database, SqliteCollection};
pub use error::{CrosspostError, Result};
pub use request::{CreatePostRequest, PostRequest};
pub use types::{MediaItem, Platform, Post, Variant, VariantKey, VariantStatus};
pub use variants::build_post;
