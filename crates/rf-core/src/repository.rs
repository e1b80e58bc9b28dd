//! # Post Repository
//!
//! Domain-level operations layered over a [`PostStore`]. The repository owns
//! query semantics and the last line of field validation; it holds no locks
//! of its own and relies on the store for per-id atomicity.

use std::sync::Arc;

use tracing::debug;

use crate::error::{AppError, Result};
use crate::models::{CounterField, FieldValue, NewPost, Post, PostUpdate, Reply};
use crate::query::{PostFilter, SortDirection, SortKey, SortMode};
use crate::traits::PostStore;

/// Results returned by [`PostRepository::find_similar`] when no limit is given.
pub const DEFAULT_SIMILAR_LIMIT: usize = 5;

/// Characters of content kept by [`PostRepository::summarize`].
pub const SUMMARY_CHARS: usize = 150;

const ELLIPSIS: &str = "...";

/// A reply together with the post state it was committed into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendedReply {
    pub post: Post,
    pub reply: Reply,
}

#[derive(Clone)]
pub struct PostRepository {
    store: Arc<dyn PostStore>,
}

impl PostRepository {
    pub fn new(store: Arc<dyn PostStore>) -> Self {
        Self { store }
    }

    pub async fn create_post(&self, title: &str, content: &str, author: Option<&str>) -> Result<Post> {
        require_text("title", title)?;
        require_text("content", content)?;
        self.store.insert(NewPost::new(title, content, author)).await
    }

    pub async fn list_posts(&self, search: Option<&str>, sort: SortMode) -> Result<Vec<Post>> {
        let filter = search.map(PostFilter::text).unwrap_or_default();
        let posts = self
            .store
            .query_all(&filter, sort.sort_key(), SortDirection::Descending)
            .await?;
        debug!(count = posts.len(), ?sort, filtered = !filter.is_match_all(), "listed posts");
        Ok(posts)
    }

    /// Newest-first posts matching `term`, at most `limit` of them.
    /// An empty term yields nothing rather than everything.
    pub async fn find_similar(&self, term: &str, limit: Option<usize>) -> Result<Vec<Post>> {
        let limit = limit.unwrap_or(DEFAULT_SIMILAR_LIMIT);
        if term.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let mut posts = self
            .store
            .query_all(&PostFilter::text(term), SortKey::CreatedAt, SortDirection::Descending)
            .await?;
        posts.truncate(limit);
        Ok(posts)
    }

    pub async fn get_post(&self, id: &str) -> Result<Post> {
        self.store
            .get_by_id(id)
            .await?
            .ok_or_else(|| AppError::post_not_found(id))
    }

    /// Short content preview plus reply count, recomputed on every call.
    pub async fn summarize(&self, id: &str) -> Result<String> {
        let post = self.get_post(id).await?;
        Ok(summary_of(&post))
    }

    pub async fn add_reply(&self, id: &str, content: &str, author: Option<&str>) -> Result<AppendedReply> {
        require_text("reply content", content)?;
        let reply = Reply::new(content, author);
        let post = self.update(id, PostUpdate::AppendReply(reply)).await?;
        // Report the reply as committed.
        let reply = post
            .replies
            .last()
            .cloned()
            .ok_or_else(|| AppError::Storage(anyhow::anyhow!("reply missing from post {id} after append")))?;
        Ok(AppendedReply { post, reply })
    }

    pub async fn upvote(&self, id: &str) -> Result<Post> {
        self.update(id, PostUpdate::Increment(CounterField::Votes)).await
    }

    /// Sets `answered`; calling it again succeeds and leaves it set.
    pub async fn mark_answered(&self, id: &str) -> Result<Post> {
        self.update(id, PostUpdate::Set(FieldValue::Answered(true))).await
    }

    async fn update(&self, id: &str, update: PostUpdate) -> Result<Post> {
        self.store
            .apply_update(id, update)
            .await?
            .ok_or_else(|| AppError::post_not_found(id))
    }
}

/// `content` cut to [`SUMMARY_CHARS`] characters (with `...` when cut),
/// then ` [<n> reply(ies)]`.
pub fn summary_of(post: &Post) -> String {
    let mut summary: String = post.content.chars().take(SUMMARY_CHARS).collect();
    if post.content.chars().count() > SUMMARY_CHARS {
        summary.push_str(ELLIPSIS);
    }
    summary.push_str(&format!(" [{} reply(ies)]", post.replies.len()));
    summary
}

fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AppError::ValidationError(format!("{field} must not be empty")));
    }
    Ok(())
}
