//! # rf-db-sqlite Implementation
//!
//! Durable `PostStore` over SQLite. Maps the relational model (one `posts`
//! row per post, one `replies` row per reply keyed by `(post_id, seq)`) to
//! the `rf-core` domain models.
//!
//! # Developer Note
//! Every update runs as a single transaction that starts with a write, so
//! SQLite's writer lock serializes concurrent updates and each call commits
//! at most once. Timestamps are stored as Unix milliseconds.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rf_core::error::Result;
use rf_core::models::{new_post_id, CounterField, FieldValue, NewPost, Post, PostUpdate, Reply};
use rf_core::query::{PostFilter, SortDirection, SortKey};
use rf_core::traits::PostStore;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::{debug, info};

const CREATE_POSTS: &str = "CREATE TABLE IF NOT EXISTS posts (
    id         TEXT PRIMARY KEY NOT NULL,
    title      TEXT NOT NULL,
    content    TEXT NOT NULL,
    author     TEXT NOT NULL,
    votes      INTEGER NOT NULL DEFAULT 0 CHECK (votes >= 0),
    answered   INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    revision   INTEGER NOT NULL DEFAULT 0
)";

const CREATE_REPLIES: &str = "CREATE TABLE IF NOT EXISTS replies (
    post_id    TEXT NOT NULL REFERENCES posts(id),
    seq        INTEGER NOT NULL,
    content    TEXT NOT NULL,
    author     TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (post_id, seq)
)";

const SELECT_POST: &str =
    "SELECT id, title, content, author, votes, answered, created_at, revision FROM posts";

pub struct SqlitePostStore {
    pool: SqlitePool,
}

impl SqlitePostStore {
    /// Opens (creating if missing) the database at `url` and ensures the schema.
    ///
    /// In-memory URLs are pinned to a single long-lived connection, since every
    /// SQLite connection to `:memory:` is a separate database.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("invalid sqlite url {url}"))?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        let pool = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await
        } else {
            SqlitePoolOptions::new()
                .max_connections(max_connections.max(1))
                .connect_with(options.journal_mode(SqliteJournalMode::Wal))
                .await
        }
        .with_context(|| format!("failed to open sqlite database {url}"))?;

        let store = Self::new(pool);
        store.migrate().await?;
        info!(url, in_memory, "sqlite post store ready");
        Ok(store)
    }

    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        for ddl in [CREATE_POSTS, CREATE_REPLIES] {
            sqlx::query(ddl)
                .execute(&self.pool)
                .await
                .context("failed to apply sqlite schema")?;
        }
        Ok(())
    }

    /// Waits for in-flight statements and closes every connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl PostStore for SqlitePostStore {
    async fn insert(&self, new_post: NewPost) -> Result<Post> {
        let post = new_post.into_post(new_post_id());

        sqlx::query("INSERT INTO posts (id, title, content, author, votes, answered, created_at, revision) VALUES (?, ?, ?, ?, 0, 0, ?, 0)")
            .bind(&post.id)
            .bind(&post.title)
            .bind(&post.content)
            .bind(&post.author)
            .bind(post.created_at.timestamp_millis())
            .execute(&self.pool)
            .await
            .context("failed to insert post")?;

        debug!(post_id = %post.id, "sqlite: post inserted");
        Ok(post)
    }

    /// Reads posts and replies inside one transaction, so the result is a
    /// consistent snapshot.
    async fn query_all(
        &self,
        filter: &PostFilter,
        key: SortKey,
        direction: SortDirection,
    ) -> Result<Vec<Post>> {
        let mut tx = self.pool.begin().await.context("failed to begin read")?;

        let sql = format!("{SELECT_POST} ORDER BY {}", order_by(key, direction));
        let rows = sqlx::query(&sql)
            .fetch_all(&mut *tx)
            .await
            .context("failed to list posts")?;

        let mut replies: HashMap<String, Vec<Reply>> = HashMap::new();
        let reply_rows = sqlx::query("SELECT post_id, content, author, created_at FROM replies ORDER BY post_id, seq")
            .fetch_all(&mut *tx)
            .await
            .context("failed to list replies")?;
        for row in &reply_rows {
            let post_id: String = row.try_get("post_id").context("malformed reply row")?;
            replies.entry(post_id).or_default().push(reply_from_row(row)?);
        }

        tx.commit().await.context("failed to end read")?;

        let mut posts = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut post = post_from_row(row)?;
            if !filter.matches(&post) {
                continue;
            }
            post.replies = replies.remove(&post.id).unwrap_or_default();
            posts.push(post);
        }
        Ok(posts)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Post>> {
        let mut conn = self.pool.acquire().await.context("failed to acquire connection")?;
        Ok(load_post(&mut conn, id).await?)
    }

    async fn apply_update(&self, id: &str, update: PostUpdate) -> Result<Option<Post>> {
        let mut tx = self.pool.begin().await.context("failed to begin update")?;

        // Each statement bumps the revision and doubles as the existence check.
        let bump = match &update {
            PostUpdate::Increment(CounterField::Votes) => sqlx::query(
                "UPDATE posts SET votes = votes + 1, revision = revision + 1 WHERE id = ?",
            )
            .bind(id),
            PostUpdate::Set(FieldValue::Answered(answered)) => {
                sqlx::query("UPDATE posts SET answered = ?, revision = revision + 1 WHERE id = ?")
                    .bind(*answered)
                    .bind(id)
            }
            PostUpdate::AppendReply(_) => {
                sqlx::query("UPDATE posts SET revision = revision + 1 WHERE id = ?").bind(id)
            }
        };
        let affected = bump
            .execute(&mut *tx)
            .await
            .context("failed to update post")?
            .rows_affected();
        if affected == 0 {
            // Dropping `tx` rolls back.
            return Ok(None);
        }

        if let PostUpdate::AppendReply(reply) = &update {
            sqlx::query(
                "INSERT INTO replies (post_id, seq, content, author, created_at)
                 VALUES (?, (SELECT COALESCE(MAX(seq) + 1, 0) FROM replies WHERE post_id = ?), ?, ?, ?)",
            )
            .bind(id)
            .bind(id)
            .bind(&reply.content)
            .bind(&reply.author)
            .bind(reply.created_at.timestamp_millis())
            .execute(&mut *tx)
            .await
            .context("failed to append reply")?;
        }

        let post = load_post(&mut tx, id).await?;
        tx.commit().await.context("failed to commit update")?;
        Ok(post)
    }
}

fn order_by(key: SortKey, direction: SortDirection) -> &'static str {
    match (key, direction) {
        (SortKey::CreatedAt, SortDirection::Descending) => "created_at DESC, id DESC",
        (SortKey::CreatedAt, SortDirection::Ascending) => "created_at ASC, id DESC",
        (SortKey::Votes, SortDirection::Descending) => "votes DESC, created_at DESC, id DESC",
        (SortKey::Votes, SortDirection::Ascending) => "votes ASC, created_at DESC, id DESC",
    }
}

async fn load_post(conn: &mut SqliteConnection, id: &str) -> anyhow::Result<Option<Post>> {
    let row = sqlx::query(&format!("{SELECT_POST} WHERE id = ?"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .context("failed to load post")?;

    let Some(row) = row else {
        return Ok(None);
    };
    let mut post = post_from_row(&row)?;

    post.replies = sqlx::query("SELECT content, author, created_at FROM replies WHERE post_id = ? ORDER BY seq")
        .bind(id)
        .fetch_all(&mut *conn)
        .await
        .context("failed to load replies")?
        .iter()
        .map(reply_from_row)
        .collect::<anyhow::Result<_>>()?;

    Ok(Some(post))
}

fn post_from_row(row: &SqliteRow) -> anyhow::Result<Post> {
    let votes: i64 = row.try_get("votes")?;
    let revision: i64 = row.try_get("revision")?;
    Ok(Post {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        author: row.try_get("author")?,
        votes: u64::try_from(votes).context("negative vote count in storage")?,
        answered: row.try_get("answered")?,
        created_at: millis_to_datetime(row.try_get("created_at")?)?,
        replies: Vec::new(),
        revision: u64::try_from(revision).context("negative revision in storage")?,
    })
}

fn reply_from_row(row: &SqliteRow) -> anyhow::Result<Reply> {
    Ok(Reply {
        content: row.try_get("content")?,
        author: row.try_get("author")?,
        created_at: millis_to_datetime(row.try_get("created_at")?)?,
    })
}

fn millis_to_datetime(millis: i64) -> anyhow::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).with_context(|| format!("timestamp out of range: {millis}"))
}
