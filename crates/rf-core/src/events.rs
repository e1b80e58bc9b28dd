//! Outbound realtime events, one per committed mutation.

use serde::{Deserialize, Serialize};

use crate::models::{Post, Reply};

/// Payload of `reply-created`: the single appended reply, not the whole post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyCreated {
    pub post_id: String,
    pub reply: Reply,
    /// Revision of the parent post right after the append.
    pub revision: u64,
}

/// Serialized as `{"event": "<name>", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum PostEvent {
    PostCreated(Post),
    PostUpvoted(Post),
    PostAnswered(Post),
    ReplyCreated(ReplyCreated),
}

impl PostEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PostEvent::PostCreated(_) => "post-created",
            PostEvent::PostUpvoted(_) => "post-upvoted",
            PostEvent::PostAnswered(_) => "post-answered",
            PostEvent::ReplyCreated(_) => "reply-created",
        }
    }

    pub fn post_id(&self) -> &str {
        match self {
            PostEvent::PostCreated(post)
            | PostEvent::PostUpvoted(post)
            | PostEvent::PostAnswered(post) => &post.id,
            PostEvent::ReplyCreated(created) => &created.post_id,
        }
    }

    /// Revision of the post state this event describes.
    pub fn revision(&self) -> u64 {
        match self {
            PostEvent::PostCreated(post)
            | PostEvent::PostUpvoted(post)
            | PostEvent::PostAnswered(post) => post.revision,
            PostEvent::ReplyCreated(created) => created.revision,
        }
    }
}
