//! SQLite persistence for post collections

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnection, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::{debug, warn};

use crate::collection::{check_group, Attached, PostCollection};
use crate::error::{CrosspostError, DbError, Result};
use crate::options::OptionsSet;
use crate::types::{MediaItem, Platform, Post, Variant, VariantKey, VariantStatus};

const MEMORY_PATH: &str = ":memory:";

const SELECT_VARIANT_COLUMNS: &str = r#"
    SELECT post_id, variant_key, text, media, options, status,
           scheduled_at, published_at, external_id, external_url
    FROM variants
"#;

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database at `db_path` and run migrations.
    ///
    /// `":memory:"` opens a private in-memory database on a single
    /// connection.
    pub async fn new(db_path: &str) -> Result<Self> {
        let pool = if db_path == MEMORY_PATH {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect("sqlite::memory:")
                .await
                .map_err(DbError::SqlxError)?
        } else {
            let expanded_path = shellexpand::tilde(db_path).to_string();
            let path = Path::new(&expanded_path);

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
            }

            // mode=rwc creates the file on first use
            let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));
            SqlitePool::connect(&db_url)
                .await
                .map_err(DbError::SqlxError)?
        };

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        debug!("Opened database at {}", db_path);
        Ok(Self { pool })
    }

    /// Collection holding the posts of `account_group_id`
    pub fn collection(&self, account_group_id: impl Into<String>) -> SqliteCollection {
        SqliteCollection {
            pool: self.pool.clone(),
            account_group_id: account_group_id.into(),
        }
    }

    /// Account groups with at least one stored post
    pub async fn account_groups(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT DISTINCT account_group_id FROM posts ORDER BY account_group_id")
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;
        Ok(rows.iter().map(|r| r.get("account_group_id")).collect())
    }
}

/// Posts of one account group stored in SQLite
#[derive(Clone)]
pub struct SqliteCollection {
    pool: SqlitePool,
    account_group_id: String,
}

fn format_time(at: Option<DateTime<Utc>>) -> Option<String> {
    at.map(|t| t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

fn corrupt(column: &str, reason: impl ToString) -> CrosspostError {
    DbError::Corrupt {
        column: column.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

fn parse_time(row: &SqliteRow, column: &str) -> Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(column);
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| corrupt(column, e))
    })
    .transpose()
}

fn variant_from_row(row: &SqliteRow) -> Result<(String, VariantKey, Variant)> {
    let post_id: String = row.get("post_id");
    let key_raw: String = row.get("variant_key");
    let key = VariantKey::from_str(&key_raw).map_err(|e| corrupt("variant_key", e))?;

    let media: Vec<MediaItem> =
        serde_json::from_str(row.get("media")).map_err(|e| corrupt("media", e))?;
    let options: OptionsSet =
        serde_json::from_str(row.get("options")).map_err(|e| corrupt("options", e))?;
    let status = VariantStatus::from_str(row.get("status")).map_err(|e| corrupt("status", e))?;

    let variant = Variant {
        text: row.get("text"),
        media,
        options,
        status,
        scheduled_at: parse_time(row, "scheduled_at")?,
        published_at: parse_time(row, "published_at")?,
        external_id: row.get("external_id"),
        external_url: row.get("external_url"),
    };
    Ok((post_id, key, variant))
}

/// Assemble posts from their rows, keeping the order of `post_rows`
fn assemble(post_rows: &[SqliteRow], variant_rows: &[SqliteRow]) -> Result<Vec<Post>> {
    let mut base: HashMap<String, Variant> = HashMap::new();
    let mut platform: HashMap<String, Vec<(Platform, Variant)>> = HashMap::new();

    for row in variant_rows {
        let (post_id, key, variant) = variant_from_row(row)?;
        match key {
            VariantKey::Base => {
                base.insert(post_id, variant);
            }
            VariantKey::Platform(p) => platform.entry(post_id).or_default().push((p, variant)),
        }
    }

    post_rows
        .iter()
        .map(|row| {
            let id: String = row.get("id");
            let base_variant = base
                .remove(&id)
                .ok_or_else(|| corrupt("variant_key", format!("post {} has no base variant", id)))?;
            let variants = platform.remove(&id).unwrap_or_default().into_iter().collect();
            Ok(Post {
                id,
                account_group_id: row.get("account_group_id"),
                title: row.get("title"),
                created_at: row.get("created_at"),
                base: base_variant,
                variants,
            })
        })
        .collect()
}

impl SqliteCollection {
    async fn write_variant(
        conn: &mut SqliteConnection,
        group: &str,
        post_id: &str,
        key: VariantKey,
        variant: &Variant,
    ) -> Result<()> {
        let media = serde_json::to_string(&variant.media).map_err(|e| corrupt("media", e))?;
        let options = serde_json::to_string(&variant.options).map_err(|e| corrupt("options", e))?;

        sqlx::query(
            r#"
            INSERT INTO variants (account_group_id, post_id, variant_key, text, media, options,
                                  status, scheduled_at, published_at, external_id, external_url)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (account_group_id, post_id, variant_key) DO UPDATE SET
                text = excluded.text,
                media = excluded.media,
                options = excluded.options,
                status = excluded.status,
                scheduled_at = excluded.scheduled_at,
                published_at = excluded.published_at,
                external_id = excluded.external_id,
                external_url = excluded.external_url
            "#,
        )
        .bind(group)
        .bind(post_id)
        .bind(key.to_string())
        .bind(&variant.text)
        .bind(media)
        .bind(options)
        .bind(variant.status.as_str())
        .bind(format_time(variant.scheduled_at))
        .bind(format_time(variant.published_at))
        .bind(&variant.external_id)
        .bind(&variant.external_url)
        .execute(&mut *conn)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    async fn load(&self, conn: &mut SqliteConnection, id: &str) -> Result<Option<Post>> {
        let post_rows = sqlx::query(
            "SELECT account_group_id, id, title, created_at FROM posts WHERE account_group_id = ? AND id = ?",
        )
        .bind(&self.account_group_id)
        .bind(id)
        .fetch_all(&mut *conn)
        .await
        .map_err(DbError::SqlxError)?;

        if post_rows.is_empty() {
            return Ok(None);
        }

        let variant_rows = sqlx::query(&format!(
            "{} WHERE account_group_id = ? AND post_id = ?",
            SELECT_VARIANT_COLUMNS
        ))
        .bind(&self.account_group_id)
        .bind(id)
        .fetch_all(&mut *conn)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(assemble(&post_rows, &variant_rows)?.into_iter().next())
    }

    /// Body of `insert_if_absent`, run inside an immediate transaction
    async fn insert_locked(&self, conn: &mut SqliteConnection, post: &Post) -> Result<Attached> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO posts (account_group_id, id, title, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (account_group_id, id) DO NOTHING
            "#,
        )
        .bind(&post.account_group_id)
        .bind(&post.id)
        .bind(&post.title)
        .bind(post.created_at)
        .execute(&mut *conn)
        .await
        .map_err(DbError::SqlxError)?
        .rows_affected();

        if inserted == 0 {
            let existing = self
                .load(conn, &post.id)
                .await?
                .ok_or_else(|| corrupt("id", format!("post {} vanished during attach", post.id)))?;
            return Ok(Attached::Existing(existing));
        }

        for key in post.variant_keys() {
            if let Some(variant) = post.variant(key) {
                Self::write_variant(conn, &post.account_group_id, &post.id, key, variant).await?;
            }
        }
        Ok(Attached::Inserted(post.clone()))
    }
}

#[async_trait]
impl PostCollection for SqliteCollection {
    fn account_group_id(&self) -> &str {
        &self.account_group_id
    }

    async fn list(&self) -> Result<Vec<Post>> {
        let post_rows = sqlx::query(
            "SELECT account_group_id, id, title, created_at FROM posts WHERE account_group_id = ? ORDER BY rowid",
        )
        .bind(&self.account_group_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        let variant_rows = sqlx::query(&format!(
            "{} WHERE account_group_id = ? ORDER BY rowid",
            SELECT_VARIANT_COLUMNS
        ))
        .bind(&self.account_group_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        assemble(&post_rows, &variant_rows)
    }

    async fn append(&self, post: &Post) -> Result<()> {
        check_group(&self.account_group_id, post)?;
        let mut tx = self.pool.begin().await.map_err(DbError::SqlxError)?;

        sqlx::query("INSERT INTO posts (account_group_id, id, title, created_at) VALUES (?, ?, ?, ?)")
            .bind(&post.account_group_id)
            .bind(&post.id)
            .bind(&post.title)
            .bind(post.created_at)
            .execute(&mut *tx)
            .await
            .map_err(DbError::SqlxError)?;

        for key in post.variant_keys() {
            if let Some(variant) = post.variant(key) {
                Self::write_variant(&mut tx, &post.account_group_id, &post.id, key, variant).await?;
            }
        }

        tx.commit().await.map_err(DbError::SqlxError)?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Post>> {
        let mut conn = self.pool.acquire().await.map_err(DbError::SqlxError)?;
        self.load(&mut conn, id).await
    }

    async fn update_variant(&self, post_id: &str, key: VariantKey, variant: &Variant) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(DbError::SqlxError)?;

        let exists = sqlx::query("SELECT 1 FROM posts WHERE account_group_id = ? AND id = ?")
            .bind(&self.account_group_id)
            .bind(post_id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(DbError::SqlxError)?
            .is_some();
        if !exists {
            return Err(CrosspostError::InvalidInput(format!("Post not found: {}", post_id)));
        }

        Self::write_variant(&mut conn, &self.account_group_id, post_id, key, variant).await
    }

    /// Atomic: the write lock is taken before the existence check, and the
    /// `(account_group_id, id)` primary key admits a single row.
    async fn insert_if_absent(&self, post: &Post) -> Result<Attached> {
        check_group(&self.account_group_id, post)?;
        let mut conn = self.pool.acquire().await.map_err(DbError::SqlxError)?;

        sqlx::query("BEGIN IMMEDIATE")
            .execute(&mut *conn)
            .await
            .map_err(DbError::SqlxError)?;

        match self.insert_locked(&mut conn, post).await {
            Ok(attached) => {
                sqlx::query("COMMIT")
                    .execute(&mut *conn)
                    .await
                    .map_err(DbError::SqlxError)?;
                Ok(attached)
            }
            Err(e) => {
                if let Err(rollback) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                    warn!("Rollback after failed attach of {} failed: {}", post.id, rollback);
                }
                Err(e)
            }
        }
    }
}
