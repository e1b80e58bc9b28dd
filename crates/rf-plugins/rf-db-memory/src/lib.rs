//! # rf-db-memory
//!
//! Transient implementation of `PostStore`. State lives for the process
//! lifetime only; nothing is written to disk.
//!
//! Posts sit in a sharded concurrent map. `apply_update` mutates a post while
//! holding its entry's write guard, which gives per-id read-modify-write
//! atomicity without a global lock.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rf_core::error::Result;
use rf_core::models::{new_post_id, NewPost, Post, PostUpdate};
use rf_core::query::{self, PostFilter, SortDirection, SortKey};
use rf_core::traits::PostStore;
use tracing::debug;

#[derive(Debug, Default)]
pub struct MemoryPostStore {
    posts: DashMap<String, Post>,
}

impl MemoryPostStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }
}

#[async_trait]
impl PostStore for MemoryPostStore {
    async fn insert(&self, new_post: NewPost) -> Result<Post> {
        // Ids stay unique for the process lifetime, even on a v7 collision.
        loop {
            match self.posts.entry(new_post_id()) {
                Entry::Occupied(_) => continue,
                Entry::Vacant(slot) => {
                    let post = new_post.into_post(slot.key().clone());
                    slot.insert(post.clone());
                    debug!(post_id = %post.id, "memory: post inserted");
                    return Ok(post);
                }
            }
        }
    }

    async fn query_all(
        &self,
        filter: &PostFilter,
        key: SortKey,
        direction: SortDirection,
    ) -> Result<Vec<Post>> {
        let snapshot: Vec<Post> = self.posts.iter().map(|entry| entry.value().clone()).collect();
        Ok(query::select(snapshot, filter, key, direction))
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Post>> {
        Ok(self.posts.get(id).map(|entry| entry.value().clone()))
    }

    async fn apply_update(&self, id: &str, update: PostUpdate) -> Result<Option<Post>> {
        let Some(mut entry) = self.posts.get_mut(id) else {
            return Ok(None);
        };
        update.apply_to(entry.value_mut());
        Ok(Some(entry.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rf_core::models::{CounterField, Reply};

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = MemoryPostStore::new();
        let post = store.insert(NewPost::new("Hello", "World", None)).await.unwrap();

        let fetched = store.get_by_id(&post.id).await.unwrap().unwrap();
        assert_eq!(fetched, post);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_query_result_is_a_snapshot() {
        let store = MemoryPostStore::new();
        let post = store.insert(NewPost::new("Hello", "World", None)).await.unwrap();

        let listed = store
            .query_all(&PostFilter::all(), SortKey::CreatedAt, SortDirection::Descending)
            .await
            .unwrap();
        store
            .apply_update(&post.id, PostUpdate::AppendReply(Reply::new("later", None)))
            .await
            .unwrap();

        assert!(listed[0].replies.is_empty());
    }

    #[tokio::test]
    async fn test_update_unknown_id() {
        let store = MemoryPostStore::new();
        let updated = store
            .apply_update("nope", PostUpdate::Increment(CounterField::Votes))
            .await
            .unwrap();
        assert!(updated.is_none());
    }
}
