//! Query vocabulary shared by the repository and every store.
//!
//! Stores receive `(filter, key, direction)` and must return a snapshot that
//! agrees with [`PostFilter::matches`] and [`compare`]. The in-memory store
//! uses these directly; SQL-backed stores evaluate the filter with the same
//! predicate and encode the ordering in `ORDER BY`.

use std::cmp::Ordering;

use crate::models::Post;

/// Case-insensitive substring match over title and content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostFilter {
    needle: Option<String>,
}

impl PostFilter {
    /// Matches every post.
    pub fn all() -> Self {
        Self { needle: None }
    }

    /// Matches posts whose title or content contains `term`, ignoring case.
    /// An empty term matches everything.
    pub fn text(term: &str) -> Self {
        if term.is_empty() {
            Self::all()
        } else {
            Self { needle: Some(term.to_lowercase()) }
        }
    }

    pub fn is_match_all(&self) -> bool {
        self.needle.is_none()
    }

    pub fn matches(&self, post: &Post) -> bool {
        match &self.needle {
            None => true,
            Some(needle) => {
                post.title.to_lowercase().contains(needle.as_str())
                    || post.content.to_lowercase().contains(needle.as_str())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    CreatedAt,
    Votes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// The two listing orders offered to viewers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortMode {
    #[default]
    Newest,
    TopVotes,
}

impl SortMode {
    /// Lenient parse of a `sort` query parameter; unknown values mean newest.
    pub fn from_query(raw: &str) -> Self {
        match raw.trim() {
            "votes" | "top" | "topVotes" | "top-votes" => SortMode::TopVotes,
            _ => SortMode::Newest,
        }
    }

    pub fn sort_key(self) -> SortKey {
        match self {
            SortMode::Newest => SortKey::CreatedAt,
            SortMode::TopVotes => SortKey::Votes,
        }
    }
}

/// Total order used by every store: primary key in `direction`, then
/// `created_at` descending, then `id` descending.
pub fn compare(a: &Post, b: &Post, key: SortKey, direction: SortDirection) -> Ordering {
    let primary = match key {
        SortKey::CreatedAt => a.created_at.cmp(&b.created_at),
        SortKey::Votes => a.votes.cmp(&b.votes),
    };
    let primary = match direction {
        SortDirection::Ascending => primary,
        SortDirection::Descending => primary.reverse(),
    };
    primary
        .then_with(|| b.created_at.cmp(&a.created_at))
        .then_with(|| b.id.cmp(&a.id))
}

/// Filters and sorts an owned collection in place.
pub fn select(mut posts: Vec<Post>, filter: &PostFilter, key: SortKey, direction: SortDirection) -> Vec<Post> {
    posts.retain(|post| filter.matches(post));
    posts.sort_by(|a, b| compare(a, b, key, direction));
    posts
}
