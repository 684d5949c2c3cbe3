//! Post collections and the idempotent attach guard
//!
//! A collection holds the posts of one account group. Attaching a post is
//! idempotent on the post id: attaching a post whose id is already present
//! returns the stored post and leaves the collection untouched.
//!
//! The check-then-insert must be atomic against a concurrent attach of the
//! same id (a retried request racing the original). That guarantee lives in
//! `PostCollection::insert_if_absent`, so each store can use whatever
//! primitive it has: a single write lock in memory, a primary-key conflict
//! in SQLite.

use std::sync::RwLock;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{CrosspostError, DbError, Result};
use crate::types::{Post, Variant, VariantKey};

/// Outcome of `insert_if_absent`
#[derive(Debug, Clone, PartialEq)]
pub enum Attached {
    /// The post was not present and has been added
    Inserted(Post),
    /// A post with the same id was already present; this is the stored one
    Existing(Post),
}

impl Attached {
    pub fn into_post(self) -> Post {
        match self {
            Attached::Inserted(post) | Attached::Existing(post) => post,
        }
    }

    pub fn was_inserted(&self) -> bool {
        matches!(self, Attached::Inserted(_))
    }
}

/// Storage port for the posts of one account group
#[async_trait]
pub trait PostCollection: Send + Sync {
    /// Account group this collection belongs to
    fn account_group_id(&self) -> &str;

    /// All posts, in insertion order
    async fn list(&self) -> Result<Vec<Post>>;

    /// Append a post without any identity check
    async fn append(&self, post: &Post) -> Result<()>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Post>>;

    /// Store `variant` under `key`, appending the key if it is new
    async fn update_variant(&self, post_id: &str, key: VariantKey, variant: &Variant) -> Result<()>;

    /// Insert `post` unless a post with the same id exists.
    ///
    /// The default implementation scans and then appends; it is NOT atomic
    /// and two concurrent callers can both insert. Stores with a real
    /// uniqueness primitive override it.
    async fn insert_if_absent(&self, post: &Post) -> Result<Attached> {
        if let Some(existing) = self.find_by_id(&post.id).await? {
            return Ok(Attached::Existing(existing));
        }
        self.append(post).await?;
        Ok(Attached::Inserted(post.clone()))
    }
}

/// Attach `post` to `collection` at most once.
///
/// Returns the post now stored under that id: `post` itself if it was
/// inserted, otherwise the entry that was already there.
///
/// # Errors
///
/// Returns `InvalidInput` if the post belongs to another account group, or
/// a storage error from the collection.
pub async fn attach(collection: &dyn PostCollection, post: Post) -> Result<Post> {
    check_group(collection.account_group_id(), &post)?;

    let outcome = collection.insert_if_absent(&post).await?;
    if outcome.was_inserted() {
        debug!("Attached post {} to {}", post.id, collection.account_group_id());
    } else {
        debug!(
            "Post {} already attached to {}, returning stored entry",
            post.id,
            collection.account_group_id()
        );
    }
    Ok(outcome.into_post())
}

pub(crate) fn check_group(group: &str, post: &Post) -> Result<()> {
    if post.account_group_id != group {
        return Err(CrosspostError::InvalidInput(format!(
            "Post {} belongs to account group '{}', not '{}'",
            post.id, post.account_group_id, group
        )));
    }
    Ok(())
}

/// In-process collection, atomic under a single write lock
pub struct InMemoryCollection {
    account_group_id: String,
    posts: RwLock<Vec<Post>>,
}

impl InMemoryCollection {
    pub fn new(account_group_id: impl Into<String>) -> Self {
        Self {
            account_group_id: account_group_id.into(),
            posts: RwLock::new(Vec::new()),
        }
    }

    fn poisoned(e: impl std::fmt::Display) -> CrosspostError {
        DbError::Poisoned(e.to_string()).into()
    }
}

#[async_trait]
impl PostCollection for InMemoryCollection {
    fn account_group_id(&self) -> &str {
        &self.account_group_id
    }

    async fn list(&self) -> Result<Vec<Post>> {
        let posts = self.posts.read().map_err(Self::poisoned)?;
        Ok(posts.clone())
    }

    async fn append(&self, post: &Post) -> Result<()> {
        let mut posts = self.posts.write().map_err(Self::poisoned)?;
        posts.push(post.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Post>> {
        let posts = self.posts.read().map_err(Self::poisoned)?;
        Ok(posts.iter().find(|p| p.id == id).cloned())
    }

    async fn update_variant(&self, post_id: &str, key: VariantKey, variant: &Variant) -> Result<()> {
        let mut posts = self.posts.write().map_err(Self::poisoned)?;
        let post = posts
            .iter_mut()
            .find(|p| p.id == post_id)
            .ok_or_else(|| CrosspostError::InvalidInput(format!("Post not found: {}", post_id)))?;
        match key {
            VariantKey::Base => post.base = variant.clone(),
            VariantKey::Platform(platform) => {
                post.variants.insert(platform, variant.clone());
            }
        }
        Ok(())
    }

    async fn insert_if_absent(&self, post: &Post) -> Result<Attached> {
        let mut posts = self.posts.write().map_err(Self::poisoned)?;
        if let Some(existing) = posts.iter().find(|p| p.id == post.id) {
            return Ok(Attached::Existing(existing.clone()));
        }
        posts.push(post.clone());
        Ok(Attached::Inserted(post.clone()))
    }
}
