//! # Core Traits (Ports)
//!
//! Any plugin must implement these traits to be wired into a `Forum`.

use async_trait::async_trait;

use crate::error::Result;
use crate::events::PostEvent;
use crate::models::{NewPost, Post, PostUpdate};
use crate::query::{PostFilter, SortDirection, SortKey};

/// Persistence contract for posts and their replies.
///
/// Implementations are the only synchronization point for post state: every
/// `apply_update` on one id must be atomic with respect to every other
/// `apply_update` on that id, and must be applied at most once per call.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Persists a new post and returns its stored form, id assigned.
    async fn insert(&self, post: NewPost) -> Result<Post>;

    /// Snapshot of every matching post in the requested order.
    async fn query_all(
        &self,
        filter: &PostFilter,
        key: SortKey,
        direction: SortDirection,
    ) -> Result<Vec<Post>>;

    async fn get_by_id(&self, id: &str) -> Result<Option<Post>>;

    /// Applies one update and returns the post as committed,
    /// or `None` if no post has this id.
    async fn apply_update(&self, id: &str, update: PostUpdate) -> Result<Option<Post>>;
}

/// Fan-out of committed mutations to connected viewers.
///
/// Delivery must not block on slow viewers; the call returns once the event
/// has been handed to every viewer connected at that moment.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait EventBroadcaster: Send + Sync {
    fn broadcast(&self, event: PostEvent);
}
