//! # rf-realtime
//!
//! In-process implementation of `EventBroadcaster`.
//!
//! The hub keeps the set of connected viewers (joined and left by the
//! transport layer) and pushes every event to each of them over an unbounded
//! channel, so a broadcast never waits on a slow viewer. Events of one post
//! are released in revision order: the hub holds that post's cursor while it
//! fans out, and buffers any revision that arrives ahead of its predecessor
//! for at most [`GAP_WAIT`]. A post the hub has not seen before starts at the
//! first revision it observes.
//! There is no replay. A viewer that joins late catches up by reading from
//! the repository.

mod sequencer;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use dashmap::DashMap;
use rf_core::events::PostEvent;
use rf_core::models::Post;
use rf_core::traits::EventBroadcaster;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

use sequencer::{Admission, PostCursor};

pub use sequencer::GAP_WAIT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewerId(u64);

impl fmt::Display for ViewerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "viewer-{}", self.0)
    }
}

#[derive(Default)]
struct HubInner {
    viewers: DashMap<ViewerId, UnboundedSender<Arc<PostEvent>>>,
    cursors: DashMap<String, PostCursor>,
    next_viewer: AtomicU64,
}

/// Process-wide viewer membership and ordered fan-out. Cheap to clone.
#[derive(Clone, Default)]
pub struct ViewerHub {
    inner: Arc<HubInner>,
}

impl ViewerHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a viewer; it receives every event broadcast from now on.
    /// Dropping the returned handle leaves the hub.
    pub fn join(&self) -> Viewer {
        let id = ViewerId(self.inner.next_viewer.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.viewers.insert(id, tx);
        debug!(viewer = %id, "viewer joined");
        Viewer {
            id,
            rx,
            hub: Arc::downgrade(&self.inner),
        }
    }

    pub fn leave(&self, id: ViewerId) {
        self.inner.leave(id);
    }

    pub fn viewer_count(&self) -> usize {
        self.inner.viewers.len()
    }

    /// Registers the current revision of posts that existed before this hub,
    /// so that their next events are released without waiting.
    ///
    /// Posts without an entry start at the first revision the hub observes.
    pub fn resume_from<'a>(&self, posts: impl IntoIterator<Item = &'a Post>) {
        for post in posts {
            self.inner
                .cursors
                .insert(post.id.clone(), PostCursor::resume_after(post.revision));
        }
    }
}

impl HubInner {
    fn leave(&self, id: ViewerId) {
        if self.viewers.remove(&id).is_some() {
            debug!(viewer = %id, "viewer left");
        }
    }

    fn fan_out(&self, event: &Arc<PostEvent>) {
        let mut closed = Vec::new();
        for viewer in self.viewers.iter() {
            if viewer.value().send(Arc::clone(event)).is_err() {
                closed.push(*viewer.key());
            }
        }
        for id in closed {
            warn!(viewer = %id, "pruning disconnected viewer");
            self.viewers.remove(&id);
        }
        debug!(
            event = event.name(),
            post_id = event.post_id(),
            revision = event.revision(),
            viewers = self.viewers.len(),
            "event delivered"
        );
    }
}

impl EventBroadcaster for ViewerHub {
    fn broadcast(&self, event: PostEvent) {
        let event = Arc::new(event);
        let revision = event.revision();
        // The cursor guard stays held through fan-out, so two broadcasts for
        // the same post cannot interleave their deliveries.
        let mut cursor = self
            .inner
            .cursors
            .entry(event.post_id().to_string())
            .or_insert_with(|| PostCursor::starting_at(revision));
        match cursor.admit(Arc::clone(&event), Instant::now()) {
            Admission::Deliver(ready) => {
                for ready_event in &ready {
                    self.inner.fan_out(ready_event);
                }
            }
            Admission::Buffered { gap_opened } => {
                debug!(
                    post_id = event.post_id(),
                    revision,
                    waiting_for = cursor.next(),
                    "event held for ordering"
                );
                if gap_opened {
                    if let Some(deadline) = cursor.gap_deadline() {
                        self.release_gap_at(event.post_id().to_string(), deadline);
                    }
                }
            }
            Admission::Stale { expected } => {
                warn!(
                    event = event.name(),
                    post_id = event.post_id(),
                    revision,
                    expected,
                    "dropping stale event"
                );
            }
        }
    }
}

impl ViewerHub {
    /// Flushes a post's held events once its gap is overdue, and keeps doing
    /// so for as long as that post has a gap.
    ///
    /// Outside a tokio runtime the gap is instead released by the next
    /// broadcast for that post that arrives after the deadline.
    fn release_gap_at(&self, post_id: String, deadline: Instant) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let hub = Arc::downgrade(&self.inner);
        runtime.spawn(async move {
            let mut deadline = deadline;
            loop {
                tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await;
                let Some(inner) = hub.upgrade() else {
                    return;
                };
                let Some(mut cursor) = inner.cursors.get_mut(&post_id) else {
                    return;
                };
                let missing = cursor.next();
                let released = cursor.release_overdue(Instant::now());
                if !released.is_empty() {
                    warn!(
                        post_id = %post_id,
                        missing,
                        released = released.len(),
                        "revision never broadcast; releasing held events"
                    );
                }
                for event in &released {
                    inner.fan_out(event);
                }
                match cursor.gap_deadline() {
                    Some(next_deadline) => deadline = next_deadline,
                    None => return,
                }
            }
        });
    }
}

/// A connected viewer's end of the hub.
#[derive(Debug)]
pub struct Viewer {
    id: ViewerId,
    rx: UnboundedReceiver<Arc<PostEvent>>,
    hub: Weak<HubInner>,
}

impl Viewer {
    pub fn id(&self) -> ViewerId {
        self.id
    }

    /// Next event; `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<Arc<PostEvent>> {
        self.rx.recv().await
    }

    /// Next already-delivered event, without waiting.
    pub fn try_recv(&mut self) -> Option<Arc<PostEvent>> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Viewer {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.leave(self.id);
        }
    }
}
