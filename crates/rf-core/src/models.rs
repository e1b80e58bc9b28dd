//! # Domain Models
//!
//! These structs represent the core entities of Rusty-Forum.
//! Post ids are UUID v7 strings: time-ordered, opaque to callers.

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Display name used when a post or reply is submitted without one.
pub const ANONYMOUS: &str = "Anonymous";

/// A discussion thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub title: String,
    pub content: String,
    pub author: String,
    pub votes: u64,
    pub answered: bool,
    pub created_at: DateTime<Utc>,
    /// Append-only, in commit order.
    pub replies: Vec<Reply>,
    /// Bumped by one on every committed update; 0 right after creation.
    pub revision: u64,
}

/// A reply owned by its parent [`Post`]. It has no identity of its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    pub content: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
}

impl Reply {
    pub fn new(content: impl Into<String>, author: Option<&str>) -> Self {
        Self {
            content: content.into(),
            author: author_or_anonymous(author),
            created_at: now(),
        }
    }
}

/// A post that has not been stored yet. The store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
}

impl NewPost {
    pub fn new(title: impl Into<String>, content: impl Into<String>, author: Option<&str>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            author: author_or_anonymous(author),
            created_at: now(),
        }
    }

    /// Materializes the stored form with zeroed counters.
    pub fn into_post(self, id: String) -> Post {
        Post {
            id,
            title: self.title,
            content: self.content,
            author: self.author,
            votes: 0,
            answered: false,
            created_at: self.created_at,
            replies: Vec::new(),
            revision: 0,
        }
    }
}

/// Numeric fields that accept an atomic `+1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterField {
    Votes,
}

/// Fields that can be overwritten with a literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue {
    Answered(bool),
}

/// The only update shapes a [`crate::PostStore`] has to support.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostUpdate {
    Increment(CounterField),
    Set(FieldValue),
    AppendReply(Reply),
}

impl PostUpdate {
    /// Applies the update to an in-memory post and bumps its revision.
    ///
    /// Stores that hold posts as plain values use this under their own
    /// per-id lock; stores with native update primitives mirror it in their
    /// query language.
    pub fn apply_to(&self, post: &mut Post) {
        match self {
            PostUpdate::Increment(CounterField::Votes) => post.votes += 1,
            PostUpdate::Set(FieldValue::Answered(answered)) => post.answered = *answered,
            PostUpdate::AppendReply(reply) => post.replies.push(reply.clone()),
        }
        post.revision += 1;
    }
}

/// Current time at the precision every store can round-trip (milliseconds).
pub fn now() -> DateTime<Utc> {
    let now = Utc::now();
    now.duration_trunc(TimeDelta::milliseconds(1)).unwrap_or(now)
}

fn author_or_anonymous(author: Option<&str>) -> String {
    match author.map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => ANONYMOUS.to_string(),
    }
}

/// Fresh, time-ordered post id.
pub fn new_post_id() -> String {
    uuid::Uuid::now_v7().to_string()
}
