//! The `PostStore` contract, checked against every backend.

use std::sync::Arc;

use integration_tests::{backends, tick};
use rf_core::models::{CounterField, FieldValue, NewPost, PostUpdate, Reply};
use rf_core::query::{PostFilter, SortDirection, SortKey};
use rf_core::traits::PostStore;

#[tokio::test]
async fn insert_assigns_unique_ids_and_zeroed_counters() {
    for backend in backends().await {
        let store = &backend.store;
        let a = store.insert(NewPost::new("A", "first", None)).await.unwrap();
        let b = store.insert(NewPost::new("B", "second", Some("bo"))).await.unwrap();

        assert_ne!(a.id, b.id, "{}", backend.name);
        assert_eq!((a.votes, a.answered, a.revision), (0, false, 0), "{}", backend.name);
        assert_eq!(b.author, "bo", "{}", backend.name);
        assert_eq!(store.get_by_id(&a.id).await.unwrap(), Some(a), "{}", backend.name);
    }
}

#[tokio::test]
async fn get_unknown_id_is_none() {
    for backend in backends().await {
        assert!(backend.store.get_by_id("no-such-post").await.unwrap().is_none(), "{}", backend.name);
    }
}

#[tokio::test]
async fn query_filters_case_insensitively_over_title_and_content() {
    for backend in backends().await {
        let store = &backend.store;
        store.insert(NewPost::new("Intro to Go", "goroutines", None)).await.unwrap();
        store.insert(NewPost::new("Cooking", "An INTRO to knives", None)).await.unwrap();
        store.insert(NewPost::new("Gardening", "soil", None)).await.unwrap();

        let hits = store
            .query_all(&PostFilter::text("intro"), SortKey::CreatedAt, SortDirection::Descending)
            .await
            .unwrap();
        let mut titles: Vec<_> = hits.iter().map(|p| p.title.clone()).collect();
        titles.sort();
        assert_eq!(titles, ["Cooking", "Intro to Go"], "{}", backend.name);

        let all = store
            .query_all(&PostFilter::all(), SortKey::CreatedAt, SortDirection::Descending)
            .await
            .unwrap();
        assert_eq!(all.len(), 3, "{}", backend.name);
    }
}

#[tokio::test]
async fn query_orders_by_key_with_newest_tiebreak() {
    for backend in backends().await {
        let store = &backend.store;
        let mut ids = Vec::new();
        for (title, votes) in [("old", 2), ("mid", 7), ("new", 2)] {
            let post = store.insert(NewPost::new(title, "x", None)).await.unwrap();
            for _ in 0..votes {
                store
                    .apply_update(&post.id, PostUpdate::Increment(CounterField::Votes))
                    .await
                    .unwrap();
            }
            ids.push(post.id);
            tick().await;
        }

        let by_votes: Vec<_> = store
            .query_all(&PostFilter::all(), SortKey::Votes, SortDirection::Descending)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.title)
            .collect();
        assert_eq!(by_votes, ["mid", "new", "old"], "{}", backend.name);

        let by_date: Vec<_> = store
            .query_all(&PostFilter::all(), SortKey::CreatedAt, SortDirection::Descending)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.title)
            .collect();
        assert_eq!(by_date, ["new", "mid", "old"], "{}", backend.name);

        let oldest_first: Vec<_> = store
            .query_all(&PostFilter::all(), SortKey::CreatedAt, SortDirection::Ascending)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.title)
            .collect();
        assert_eq!(oldest_first, ["old", "mid", "new"], "{}", backend.name);
    }
}

#[tokio::test]
async fn query_results_do_not_change_after_later_writes() {
    for backend in backends().await {
        let store = &backend.store;
        let post = store.insert(NewPost::new("Snap", "shot", None)).await.unwrap();

        let before = store
            .query_all(&PostFilter::all(), SortKey::CreatedAt, SortDirection::Descending)
            .await
            .unwrap();
        store
            .apply_update(&post.id, PostUpdate::Increment(CounterField::Votes))
            .await
            .unwrap();

        assert_eq!(before[0].votes, 0, "{}", backend.name);
    }
}

#[tokio::test]
async fn every_update_shape_bumps_the_revision_once() {
    for backend in backends().await {
        let store = &backend.store;
        let post = store.insert(NewPost::new("Rev", "x", None)).await.unwrap();

        let updates = [
            PostUpdate::Increment(CounterField::Votes),
            PostUpdate::Set(FieldValue::Answered(true)),
            PostUpdate::Set(FieldValue::Answered(true)),
            PostUpdate::AppendReply(Reply::new("hi", None)),
        ];
        for (expected, update) in (1u64..).zip(updates) {
            let updated = store.apply_update(&post.id, update).await.unwrap().unwrap();
            assert_eq!(updated.revision, expected, "{}", backend.name);
        }

        let stored = store.get_by_id(&post.id).await.unwrap().unwrap();
        assert_eq!((stored.votes, stored.answered, stored.replies.len()), (1, true, 1), "{}", backend.name);
    }
}

#[tokio::test]
async fn update_of_unknown_id_is_none_for_every_shape() {
    for backend in backends().await {
        let store = &backend.store;
        for update in [
            PostUpdate::Increment(CounterField::Votes),
            PostUpdate::Set(FieldValue::Answered(true)),
            PostUpdate::AppendReply(Reply::new("orphan", None)),
        ] {
            assert!(store.apply_update("ghost", update).await.unwrap().is_none(), "{}", backend.name);
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_increments_are_never_lost() {
    for backend in backends().await {
        let post = backend.store.insert(NewPost::new("Hot", "take", None)).await.unwrap();

        let tasks: Vec<_> = (0..50)
            .map(|_| {
                let store = Arc::clone(&backend.store);
                let id = post.id.clone();
                tokio::spawn(async move {
                    store
                        .apply_update(&id, PostUpdate::Increment(CounterField::Votes))
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap().unwrap();
        }

        let stored = backend.store.get_by_id(&post.id).await.unwrap().unwrap();
        assert_eq!(stored.votes, 50, "{}", backend.name);
        assert_eq!(stored.revision, 50, "{}", backend.name);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn appends_racing_increments_lose_nothing() {
    for backend in backends().await {
        let post = backend.store.insert(NewPost::new("Busy", "thread", None)).await.unwrap();

        let tasks: Vec<_> = (0..40)
            .map(|i| {
                let store: Arc<dyn PostStore> = Arc::clone(&backend.store);
                let id = post.id.clone();
                tokio::spawn(async move {
                    let update = if i % 2 == 0 {
                        PostUpdate::AppendReply(Reply::new(format!("reply {i}"), None))
                    } else {
                        PostUpdate::Increment(CounterField::Votes)
                    };
                    store.apply_update(&id, update).await
                })
            })
            .collect();

        let mut revisions = Vec::new();
        for task in tasks {
            revisions.push(task.await.unwrap().unwrap().unwrap().revision);
        }
        revisions.sort_unstable();
        assert_eq!(revisions, (1..=40).collect::<Vec<u64>>(), "{}", backend.name);

        let stored = backend.store.get_by_id(&post.id).await.unwrap().unwrap();
        assert_eq!(stored.votes, 20, "{}", backend.name);
        assert_eq!(stored.replies.len(), 20, "{}", backend.name);
    }
}
