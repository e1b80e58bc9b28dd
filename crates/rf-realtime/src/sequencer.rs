//! Per-post reordering of events by revision.
//!
//! A revision can commit without ever being broadcast (the caller saw an
//! error after the write landed, or its future was dropped mid-commit), so a
//! gap is only waited on for [`GAP_WAIT`]. After that the cursor skips to the
//! oldest buffered revision and releases everything that is ready.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rf_core::events::PostEvent;

/// Longest time a committed event is held back waiting for an earlier revision.
pub const GAP_WAIT: Duration = Duration::from_millis(100);

/// Events buffered for one post before a gap is skipped regardless of age.
pub(crate) const MAX_PENDING: usize = 64;

pub(crate) enum Admission {
    /// Deliver these now, in order.
    Deliver(Vec<Arc<PostEvent>>),
    /// Held until the revisions before it arrive or the gap times out.
    /// `gap_opened` is set when this event started a new wait.
    Buffered { gap_opened: bool },
    /// Revision already delivered or already buffered.
    Stale { expected: u64 },
}

/// Next revision owed to viewers for one post, plus anything that arrived early.
#[derive(Debug)]
pub(crate) struct PostCursor {
    next: u64,
    pending: BTreeMap<u64, Arc<PostEvent>>,
    gap_since: Option<Instant>,
}

impl PostCursor {
    /// Cursor whose first owed event is `revision`.
    pub(crate) fn starting_at(revision: u64) -> Self {
        Self {
            next: revision,
            pending: BTreeMap::new(),
            gap_since: None,
        }
    }

    pub(crate) fn resume_after(revision: u64) -> Self {
        Self::starting_at(revision + 1)
    }

    pub(crate) fn next(&self) -> u64 {
        self.next
    }

    /// When the current gap stops being waited on, if there is one.
    pub(crate) fn gap_deadline(&self) -> Option<Instant> {
        self.gap_since.map(|since| since + GAP_WAIT)
    }

    pub(crate) fn admit(&mut self, event: Arc<PostEvent>, now: Instant) -> Admission {
        let revision = event.revision();
        if revision < self.next || self.pending.contains_key(&revision) {
            return Admission::Stale { expected: self.next };
        }
        if revision == self.next {
            self.next += 1;
            let ready = self.drain_ready(vec![event], now);
            return Admission::Deliver(ready);
        }

        self.pending.insert(revision, event);
        let gap_opened = self.gap_since.is_none();
        let since = *self.gap_since.get_or_insert(now);
        if self.pending.len() > MAX_PENDING || now.duration_since(since) >= GAP_WAIT {
            return Admission::Deliver(self.skip_gap(now));
        }
        Admission::Buffered { gap_opened }
    }

    /// Skips the current gap if it has been waited on for [`GAP_WAIT`].
    pub(crate) fn release_overdue(&mut self, now: Instant) -> Vec<Arc<PostEvent>> {
        match self.gap_deadline() {
            Some(deadline) if now >= deadline => self.skip_gap(now),
            _ => Vec::new(),
        }
    }

    fn skip_gap(&mut self, now: Instant) -> Vec<Arc<PostEvent>> {
        if let Some(oldest) = self.pending.keys().next().copied() {
            self.next = oldest;
        }
        self.drain_ready(Vec::new(), now)
    }

    /// Moves the contiguous run starting at `next` into `ready`. Any gap left
    /// behind is timed from `now`.
    fn drain_ready(&mut self, mut ready: Vec<Arc<PostEvent>>, now: Instant) -> Vec<Arc<PostEvent>> {
        while let Some(event) = self.pending.remove(&self.next) {
            ready.push(event);
            self.next += 1;
        }
        self.gap_since = if self.pending.is_empty() { None } else { Some(now) };
        ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rf_core::models::NewPost;

    fn upvoted(revision: u64) -> Arc<PostEvent> {
        let mut post = NewPost::new("t", "c", None).into_post("p1".into());
        post.revision = revision;
        post.votes = revision;
        Arc::new(PostEvent::PostUpvoted(post))
    }

    fn revisions(events: &[Arc<PostEvent>]) -> Vec<u64> {
        events.iter().map(|e| e.revision()).collect()
    }

    fn delivered(admission: Admission) -> Vec<u64> {
        match admission {
            Admission::Deliver(events) => revisions(&events),
            Admission::Buffered { .. } | Admission::Stale { .. } => Vec::new(),
        }
    }

    #[test]
    fn early_revisions_wait_for_their_predecessors() {
        let now = Instant::now();
        let mut cursor = PostCursor::starting_at(0);
        assert_eq!(delivered(cursor.admit(upvoted(0), now)), [0]);
        assert!(matches!(cursor.admit(upvoted(2), now), Admission::Buffered { gap_opened: true }));
        assert!(matches!(cursor.admit(upvoted(3), now), Admission::Buffered { gap_opened: false }));
        assert_eq!(delivered(cursor.admit(upvoted(1), now)), [1, 2, 3]);
        assert_eq!(cursor.next(), 4);
        assert_eq!(cursor.gap_deadline(), None);
    }

    #[test]
    fn duplicates_are_stale() {
        let now = Instant::now();
        let mut cursor = PostCursor::resume_after(4);
        assert!(matches!(cursor.admit(upvoted(4), now), Admission::Stale { expected: 5 }));
        assert!(matches!(cursor.admit(upvoted(7), now), Admission::Buffered { .. }));
        assert!(matches!(cursor.admit(upvoted(7), now), Admission::Stale { .. }));
    }

    #[test]
    fn a_gap_is_released_once_it_is_overdue() {
        let start = Instant::now();
        let mut cursor = PostCursor::starting_at(1);
        assert!(matches!(cursor.admit(upvoted(2), start), Admission::Buffered { gap_opened: true }));
        assert!(matches!(cursor.admit(upvoted(3), start), Admission::Buffered { .. }));
        assert_eq!(cursor.gap_deadline(), Some(start + GAP_WAIT));

        assert!(cursor.release_overdue(start + GAP_WAIT / 2).is_empty());
        let released = cursor.release_overdue(start + GAP_WAIT);
        assert_eq!(revisions(&released), [2, 3]);
        assert_eq!(cursor.next(), 4);
        assert_eq!(cursor.gap_deadline(), None);
    }

    #[test]
    fn an_arrival_after_the_deadline_releases_the_gap_itself() {
        let start = Instant::now();
        let mut cursor = PostCursor::starting_at(1);
        cursor.admit(upvoted(3), start);

        let released = delivered(cursor.admit(upvoted(4), start + GAP_WAIT));
        assert_eq!(released, [3, 4]);
        assert!(matches!(cursor.admit(upvoted(1), start + GAP_WAIT), Admission::Stale { expected: 5 }));
    }

    #[test]
    fn a_second_gap_gets_its_own_wait() {
        let start = Instant::now();
        let mut cursor = PostCursor::starting_at(1);
        cursor.admit(upvoted(2), start);
        cursor.admit(upvoted(4), start);

        let later = start + GAP_WAIT;
        assert_eq!(revisions(&cursor.release_overdue(later)), [2]);
        assert_eq!(cursor.next(), 3);
        assert_eq!(cursor.gap_deadline(), Some(later + GAP_WAIT));
    }

    #[test]
    fn too_many_pending_skips_the_gap_early() {
        let now = Instant::now();
        let mut cursor = PostCursor::starting_at(0);
        for revision in 1..=MAX_PENDING as u64 {
            assert!(matches!(cursor.admit(upvoted(revision), now), Admission::Buffered { .. }));
        }
        let released = delivered(cursor.admit(upvoted(MAX_PENDING as u64 + 1), now));
        assert_eq!(released.len(), MAX_PENDING + 1);
        assert_eq!(released.first(), Some(&1));
        assert_eq!(cursor.next(), MAX_PENDING as u64 + 2);
    }
}
