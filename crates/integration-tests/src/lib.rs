//! Shared fixtures for the cross-crate test suites under `tests/`.

use std::sync::Arc;

use rf_app::Forum;
use rf_config::{Settings, StorageBackend};
use rf_core::traits::PostStore;
use rf_db_memory::MemoryPostStore;

/// A named store under test.
pub struct Backend {
    pub name: &'static str,
    pub store: Arc<dyn PostStore>,
    // Keeps on-disk databases alive for the test's duration.
    _dir: Option<tempfile::TempDir>,
}

/// One instance of every compiled-in backend, each starting empty.
///
/// SQLite is exercised twice: a single-connection in-memory database and a
/// file database with a multi-connection pool.
pub async fn backends() -> Vec<Backend> {
    let mut all = vec![Backend {
        name: "memory",
        store: Arc::new(MemoryPostStore::new()),
        _dir: None,
    }];

    #[cfg(feature = "db-sqlite")]
    {
        use rf_db_sqlite::SqlitePostStore;

        let in_memory = SqlitePostStore::connect("sqlite::memory:", 1)
            .await
            .expect("in-memory sqlite");
        all.push(Backend {
            name: "sqlite-memory",
            store: Arc::new(in_memory),
            _dir: None,
        });

        let dir = tempfile::tempdir().expect("temp dir");
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("forum.db").display());
        let on_disk = SqlitePostStore::connect(&url, 8).await.expect("file sqlite");
        all.push(Backend {
            name: "sqlite-file",
            store: Arc::new(on_disk),
            _dir: Some(dir),
        });
    }

    all
}

/// Sleeps long enough for the next `created_at` to differ at ms precision.
pub async fn tick() {
    tokio::time::sleep(std::time::Duration::from_millis(3)).await;
}

/// A fully wired forum core on every compiled-in backend.
pub async fn forums() -> Vec<(&'static str, Forum)> {
    let mut all = vec![(
        "memory",
        Forum::open(&Settings::in_memory()).await.expect("memory forum"),
    )];

    #[cfg(feature = "db-sqlite")]
    {
        let mut settings = Settings::in_memory();
        settings.storage.backend = StorageBackend::Sqlite;
        all.push(("sqlite", Forum::open(&settings).await.expect("sqlite forum")));
    }

    all
}
