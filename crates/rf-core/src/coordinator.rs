//! # Mutation Coordinator
//!
//! The single entry point for every mutating action. Each method runs the
//! repository operation to completion and only then broadcasts one event
//! carrying the committed state. A failed operation broadcasts nothing and
//! its error reaches the caller unchanged.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::error::{AppError, Result};
use crate::events::{PostEvent, ReplyCreated};
use crate::models::Post;
use crate::repository::{AppendedReply, PostRepository};
use crate::traits::EventBroadcaster;

#[derive(Clone)]
pub struct MutationCoordinator {
    repo: PostRepository,
    events: Arc<dyn EventBroadcaster>,
}

impl MutationCoordinator {
    pub fn new(repo: PostRepository, events: Arc<dyn EventBroadcaster>) -> Self {
        Self { repo, events }
    }

    /// Read access for the query side (`list_posts`, `get_post`, ...).
    pub fn repository(&self) -> &PostRepository {
        &self.repo
    }

    pub async fn create_post(&self, title: &str, content: &str, author: Option<&str>) -> Result<Post> {
        let post = self
            .repo
            .create_post(title, content, author)
            .await
            .inspect_err(|e| report("create-post", None, e))?;
        info!(post_id = %post.id, author = %post.author, "post created");
        self.events.broadcast(PostEvent::PostCreated(post.clone()));
        Ok(post)
    }

    pub async fn add_reply(&self, post_id: &str, content: &str, author: Option<&str>) -> Result<AppendedReply> {
        let appended = self
            .repo
            .add_reply(post_id, content, author)
            .await
            .inspect_err(|e| report("add-reply", Some(post_id), e))?;
        info!(
            post_id,
            revision = appended.post.revision,
            replies = appended.post.replies.len(),
            "reply created"
        );
        self.events.broadcast(PostEvent::ReplyCreated(ReplyCreated {
            post_id: appended.post.id.clone(),
            reply: appended.reply.clone(),
            revision: appended.post.revision,
        }));
        Ok(appended)
    }

    pub async fn upvote(&self, post_id: &str) -> Result<Post> {
        let post = self
            .repo
            .upvote(post_id)
            .await
            .inspect_err(|e| report("upvote", Some(post_id), e))?;
        info!(post_id, votes = post.votes, revision = post.revision, "post upvoted");
        self.events.broadcast(PostEvent::PostUpvoted(post.clone()));
        Ok(post)
    }

    pub async fn mark_answered(&self, post_id: &str) -> Result<Post> {
        let post = self
            .repo
            .mark_answered(post_id)
            .await
            .inspect_err(|e| report("mark-answered", Some(post_id), e))?;
        info!(post_id, revision = post.revision, "post answered");
        self.events.broadcast(PostEvent::PostAnswered(post.clone()));
        Ok(post)
    }
}

/// Infrastructure faults are errors; rejected requests are only warnings.
fn report(op: &str, post_id: Option<&str>, err: &AppError) {
    match err {
        AppError::Storage(_) | AppError::Config(_) => {
            error!(op, post_id, error = %err, "mutation failed")
        }
        AppError::NotFound(..) | AppError::ValidationError(_) => {
            warn!(op, post_id, error = %err, "mutation rejected")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewPost;
    use crate::traits::{MockEventBroadcaster, MockPostStore};

    fn coordinator(store: MockPostStore, events: MockEventBroadcaster) -> MutationCoordinator {
        MutationCoordinator::new(PostRepository::new(Arc::new(store)), Arc::new(events))
    }

    #[tokio::test]
    async fn storage_fault_emits_nothing_and_propagates() {
        let mut store = MockPostStore::new();
        store
            .expect_apply_update()
            .returning(|_, _| Err(AppError::Storage(anyhow::anyhow!("disk full"))));
        store
            .expect_insert()
            .returning(|_| Err(AppError::Storage(anyhow::anyhow!("connection reset"))));
        let mut events = MockEventBroadcaster::new();
        events.expect_broadcast().never();
        let coordinator = coordinator(store, events);

        assert!(matches!(coordinator.upvote("p1").await, Err(AppError::Storage(_))));
        assert!(matches!(coordinator.mark_answered("p1").await, Err(AppError::Storage(_))));
        assert!(matches!(coordinator.add_reply("p1", "hi", None).await, Err(AppError::Storage(_))));
        assert!(matches!(coordinator.create_post("t", "c", None).await, Err(AppError::Storage(_))));
    }

    #[tokio::test]
    async fn success_broadcasts_the_committed_post_once() {
        let mut store = MockPostStore::new();
        store.expect_apply_update().times(1).returning(|id, update| {
            let mut post = NewPost::new("t", "c", None).into_post(id.to_string());
            update.apply_to(&mut post);
            Ok(Some(post))
        });
        let mut events = MockEventBroadcaster::new();
        events
            .expect_broadcast()
            .withf(|event| {
                matches!(event, PostEvent::PostUpvoted(post) if post.votes == 1 && post.revision == 1)
            })
            .times(1)
            .return_const(());
        let coordinator = coordinator(store, events);

        let post = coordinator.upvote("p1").await.unwrap();
        assert_eq!(post.votes, 1);
    }

    #[tokio::test]
    async fn rejected_input_emits_nothing() {
        let mut store = MockPostStore::new();
        store.expect_insert().never();
        let mut events = MockEventBroadcaster::new();
        events.expect_broadcast().never();
        let coordinator = coordinator(store, events);

        let err = coordinator.create_post("", "content", None).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }
}
