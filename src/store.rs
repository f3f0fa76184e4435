use std::{str::FromStr, sync::Arc};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use uuid::Uuid;

use crate::{
    error::{StoreError, StoreResult},
    models::{
        self, Comment, EditPolicy, Mood, NewComment, Post, PostSummary, PostThread, Settings,
        SettingsForm,
    },
};

/// ContentStore Trait
///
/// Every post, comment and settings operation the handlers can perform. Each call is
/// atomic on its own; no operation spans more than one row update.
///
/// Failures come back as a typed `StoreError` so the response router can decide how
/// to render them.
#[async_trait]
pub trait ContentStore: Send + Sync {
    // --- Posts ---
    // Newest first, with comment counts.
    async fn list_posts(&self) -> StoreResult<Vec<PostSummary>>;
    async fn create_post(&self, slug: &str, owner_id: &str) -> StoreResult<Post>;
    async fn post_exists(&self, slug: &str) -> StoreResult<bool>;
    // `viewer_id` flags the viewer's own comments; empty for anonymous viewers.
    async fn get_post_with_comments(&self, slug: &str, viewer_id: &str) -> StoreResult<PostThread>;
    async fn edit_mood(&self, slug: &str, mood: &str, editor_id: &str) -> StoreResult<Post>;
    async fn edit_description(
        &self,
        slug: &str,
        description: &str,
        editor_id: &str,
    ) -> StoreResult<Post>;

    // --- Comments ---
    // Returns the generated comment id.
    async fn insert_comment(&self, comment: NewComment) -> StoreResult<String>;
    // Returns the new upvote count. The comment must belong to `slug`.
    async fn upvote(&self, slug: &str, comment_id: &str, voter_id: &str) -> StoreResult<i64>;
    // Author-only. The comment must belong to `slug`.
    async fn delete_comment(
        &self,
        slug: &str,
        comment_id: &str,
        requester_id: &str,
    ) -> StoreResult<()>;

    // --- Settings ---
    async fn get_settings(&self, user_id: &str) -> StoreResult<Settings>;
    async fn save_settings(&self, user_id: &str, form: SettingsForm) -> StoreResult<Settings>;

    /// Development only: wipes every table.
    async fn reset(&self) -> StoreResult<()>;
}

/// StoreState
///
/// The concrete type used to share the store across the application state.
pub type StoreState = Arc<dyn ContentStore>;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS posts (
    id          TEXT PRIMARY KEY,
    owner_id    TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    mood        TEXT NOT NULL DEFAULT 'neutral',
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS comments (
    seq         INTEGER PRIMARY KEY AUTOINCREMENT,
    id          TEXT NOT NULL UNIQUE,
    post_id     TEXT NOT NULL REFERENCES posts(id),
    author_id   TEXT NOT NULL,
    content     TEXT NOT NULL,
    upvotes     INTEGER NOT NULL DEFAULT 0 CHECK (upvotes >= 0),
    created_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_comments_post ON comments(post_id, seq);

CREATE TABLE IF NOT EXISTS settings (
    user_id         TEXT PRIMARY KEY,
    preferred_name  TEXT NOT NULL DEFAULT '',
    contact_me      TEXT NOT NULL DEFAULT ''
);
"#;

const POST_COLUMNS: &str = "id, owner_id, description, mood, created_at";

/// SqliteContentStore
///
/// `ContentStore` backed by sqlite through a sqlx pool.
pub struct SqliteContentStore {
    pool: SqlitePool,
    edit_policy: EditPolicy,
}

impl SqliteContentStore {
    /// Wraps an existing pool. Call `migrate` before use.
    pub fn new(pool: SqlitePool, edit_policy: EditPolicy) -> Self {
        Self { pool, edit_policy }
    }

    /// Opens (creating if needed) the database at `url` and bootstraps the schema.
    ///
    /// In-memory databases live and die with their connection, so they are held on a
    /// single connection that is never recycled.
    pub async fn open(url: &str, edit_policy: EditPolicy) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = if url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        };

        let store = Self::new(pool, edit_policy);
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        tracing::info!("Content store schema ready");
        Ok(())
    }

    async fn fetch_post(&self, slug: &str) -> StoreResult<Option<Post>> {
        let post = sqlx::query_as::<_, Post>(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE id = ?1"
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;
        Ok(post)
    }

    async fn fetch_comments(&self, slug: &str, viewer_id: &str) -> StoreResult<Vec<Comment>> {
        let mut comments = sqlx::query_as::<_, Comment>(
            r#"
            SELECT c.id, c.post_id, c.author_id, c.content, c.created_at,
                   c.upvotes AS upvote_count,
                   NULLIF(s.preferred_name, '') AS author_name
            FROM comments c
            LEFT JOIN settings s ON s.user_id = c.author_id
            WHERE c.post_id = ?1
            ORDER BY c.seq ASC
            "#,
        )
        .bind(slug)
        .fetch_all(&self.pool)
        .await?;

        for comment in &mut comments {
            comment.viewer_is_author = !viewer_id.is_empty() && comment.author_id == viewer_id;
        }
        Ok(comments)
    }

    /// Runs a single-row post update under the configured edit policy. The ownership
    /// check lives in the WHERE clause so it is atomic with the write.
    async fn update_post(
        &self,
        slug: &str,
        editor_id: &str,
        assignment: &str,
        value: &str,
    ) -> StoreResult<Post> {
        if editor_id.is_empty() {
            return Err(StoreError::validation("You need to be logged in to edit a post"));
        }
        let owner_only = self.edit_policy == EditPolicy::OwnerOnly;

        let updated = sqlx::query_as::<_, Post>(&format!(
            "UPDATE posts SET {assignment} = ?1 \
             WHERE id = ?2 AND (?3 = 0 OR owner_id = ?4) \
             RETURNING {POST_COLUMNS}"
        ))
        .bind(value)
        .bind(slug)
        .bind(owner_only)
        .bind(editor_id)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(post) => Ok(post),
            None if self.fetch_post(slug).await?.is_some() => Err(StoreError::Forbidden),
            None => Err(StoreError::not_found(format!("post '{slug}'"))),
        }
    }
}

#[async_trait]
impl ContentStore for SqliteContentStore {
    async fn list_posts(&self) -> StoreResult<Vec<PostSummary>> {
        let posts = sqlx::query_as::<_, PostSummary>(
            r#"
            SELECT p.id, p.owner_id, p.description, p.mood, p.created_at,
                   COUNT(c.id) AS comment_count
            FROM posts p
            LEFT JOIN comments c ON c.post_id = p.id
            GROUP BY p.id
            ORDER BY p.created_at DESC, p.rowid DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .inspect_err(|e| tracing::error!("list_posts error: {:?}", e))?;
        Ok(posts)
    }

    /// create_post
    ///
    /// Inserts a new post owned by `owner_id`. The primary key makes the uniqueness
    /// check and the insert one atomic step; a duplicate slug surfaces as `Conflict`.
    async fn create_post(&self, slug: &str, owner_id: &str) -> StoreResult<Post> {
        models::validate_slug(slug)?;
        if owner_id.is_empty() {
            return Err(StoreError::validation("You need to be logged in to create a post"));
        }

        let inserted = sqlx::query_as::<_, Post>(&format!(
            "INSERT INTO posts (id, owner_id, description, mood, created_at) \
             VALUES (?1, ?2, '', ?3, ?4) RETURNING {POST_COLUMNS}"
        ))
        .bind(slug)
        .bind(owner_id)
        .bind(Mood::default().as_str())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await;

        match inserted {
            Ok(post) => {
                tracing::info!(slug, owner_id, "post created");
                Ok(post)
            }
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(
                StoreError::Conflict(format!("A post named '{slug}' already exists")),
            ),
            Err(e) => {
                tracing::error!("create_post error: {:?}", e);
                Err(e.into())
            }
        }
    }

    async fn post_exists(&self, slug: &str) -> StoreResult<bool> {
        let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM posts WHERE id = ?1")
            .bind(slug)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists > 0)
    }

    async fn get_post_with_comments(&self, slug: &str, viewer_id: &str) -> StoreResult<PostThread> {
        let post = self
            .fetch_post(slug)
            .await
            .inspect_err(|e| tracing::error!("get_post error: {:?}", e))?
            .ok_or_else(|| StoreError::not_found(format!("post '{slug}'")))?;

        let comments = self
            .fetch_comments(slug, viewer_id)
            .await
            .inspect_err(|e| tracing::error!("get_comments error: {:?}", e))?;

        Ok(PostThread { post, comments })
    }

    async fn edit_mood(&self, slug: &str, mood: &str, editor_id: &str) -> StoreResult<Post> {
        let mood: Mood = mood
            .parse()
            .map_err(|e: models::UnknownMood| StoreError::validation(e.to_string()))?;
        self.update_post(slug, editor_id, "mood", mood.as_str()).await
    }

    async fn edit_description(
        &self,
        slug: &str,
        description: &str,
        editor_id: &str,
    ) -> StoreResult<Post> {
        models::validate_description(description)?;
        self.update_post(slug, editor_id, "description", description.trim())
            .await
    }

    /// insert_comment
    ///
    /// The existence check on the post and the insert run as one statement, so a
    /// comment can never reference a missing post.
    async fn insert_comment(&self, comment: NewComment) -> StoreResult<String> {
        if comment.author_id.is_empty() {
            return Err(StoreError::validation("You need to be logged in to comment"));
        }
        models::validate_comment(&comment.content)?;

        let id = Uuid::new_v4().to_string();
        let result = sqlx::query(
            r#"
            INSERT INTO comments (id, post_id, author_id, content, upvotes, created_at)
            SELECT ?1, ?2, ?3, ?4, 0, ?5
            WHERE EXISTS (SELECT 1 FROM posts WHERE id = ?2)
            "#,
        )
        .bind(&id)
        .bind(&comment.post_id)
        .bind(&comment.author_id)
        .bind(comment.content.trim())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .inspect_err(|e| tracing::error!("insert_comment error: {:?}", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(format!("post '{}'", comment.post_id)));
        }
        Ok(id)
    }

    /// upvote
    ///
    /// One increment per call. Repeat votes by the same voter are not deduplicated.
    /// A comment addressed through another post's slug is not found.
    async fn upvote(&self, slug: &str, comment_id: &str, voter_id: &str) -> StoreResult<i64> {
        if voter_id.is_empty() {
            return Err(StoreError::validation("You need to be logged in to vote"));
        }

        sqlx::query_scalar::<_, i64>(
            "UPDATE comments SET upvotes = upvotes + 1 \
             WHERE id = ?1 AND post_id = ?2 RETURNING upvotes",
        )
        .bind(comment_id)
        .bind(slug)
        .fetch_optional(&self.pool)
        .await
        .inspect_err(|e| tracing::error!("upvote error: {:?}", e))?
        .ok_or_else(|| StoreError::not_found(format!("comment '{comment_id}'")))
    }

    /// delete_comment
    ///
    /// Deletes only when `requester_id` wrote the comment. When nothing was deleted a
    /// follow-up lookup tells a foreign comment (`Forbidden`) from a missing one.
    async fn delete_comment(
        &self,
        slug: &str,
        comment_id: &str,
        requester_id: &str,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            "DELETE FROM comments WHERE id = ?1 AND post_id = ?2 AND author_id = ?3",
        )
        .bind(comment_id)
        .bind(slug)
        .bind(requester_id)
        .execute(&self.pool)
        .await
        .inspect_err(|e| tracing::error!("delete_comment error: {:?}", e))?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        let exists = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM comments WHERE id = ?1 AND post_id = ?2",
        )
        .bind(comment_id)
        .bind(slug)
        .fetch_one(&self.pool)
        .await?;

        if exists > 0 {
            tracing::warn!(comment_id, requester_id, "delete of foreign comment refused");
            Err(StoreError::Forbidden)
        } else {
            Err(StoreError::not_found(format!("comment '{comment_id}'")))
        }
    }

    async fn get_settings(&self, user_id: &str) -> StoreResult<Settings> {
        let settings = sqlx::query_as::<_, Settings>(
            "SELECT user_id, preferred_name, contact_me FROM settings WHERE user_id = ?1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .inspect_err(|e| tracing::error!("get_settings error: {:?}", e))?;

        Ok(settings.unwrap_or_else(|| Settings {
            user_id: user_id.to_string(),
            ..Settings::default()
        }))
    }

    async fn save_settings(&self, user_id: &str, form: SettingsForm) -> StoreResult<Settings> {
        if user_id.is_empty() {
            return Err(StoreError::validation("You need to be logged in to save settings"));
        }
        models::validate_settings(&form)?;

        let saved = sqlx::query_as::<_, Settings>(
            r#"
            INSERT INTO settings (user_id, preferred_name, contact_me) VALUES (?1, ?2, ?3)
            ON CONFLICT(user_id) DO UPDATE SET
                preferred_name = excluded.preferred_name,
                contact_me = excluded.contact_me
            RETURNING user_id, preferred_name, contact_me
            "#,
        )
        .bind(user_id)
        .bind(form.preferred_name.trim())
        .bind(form.contact_me.trim())
        .fetch_one(&self.pool)
        .await
        .inspect_err(|e| tracing::error!("save_settings error: {:?}", e))?;

        Ok(saved)
    }

    async fn reset(&self) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM comments").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM posts").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM settings").execute(&mut *tx).await?;
        tx.commit().await?;
        tracing::warn!("content store reset");
        Ok(())
    }
}
