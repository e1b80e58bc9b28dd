//! # rf-app
//!
//! Assembles a running forum core from [`Settings`]: the storage backend is
//! resolved once here and never swapped afterwards. The transport layer holds
//! a [`Forum`], sends mutations through [`Forum::coordinator`], queries
//! through [`Forum::repository`], and joins viewers on [`Forum::hub`].

use std::sync::Arc;

use rf_config::{LogFormat, LogSettings, Settings, StorageBackend, StorageSettings};
use rf_core::coordinator::MutationCoordinator;
use rf_core::error::{AppError, Result};
use rf_core::query::{PostFilter, SortDirection, SortKey};
use rf_core::repository::PostRepository;
use rf_core::traits::PostStore;
use rf_db_memory::MemoryPostStore;
use rf_realtime::ViewerHub;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// The wired core. Cheap to clone; clones share store, hub and viewers.
#[derive(Clone)]
pub struct Forum {
    backend: StorageBackend,
    coordinator: MutationCoordinator,
    hub: ViewerHub,
}

impl Forum {
    /// Opens the configured backend and seeds the hub with the revision of
    /// every stored post.
    pub async fn open(settings: &Settings) -> Result<Self> {
        let store = open_store(&settings.storage).await?;

        let hub = ViewerHub::new();
        let existing = store
            .query_all(&PostFilter::all(), SortKey::CreatedAt, SortDirection::Descending)
            .await?;
        hub.resume_from(&existing);

        let repo = PostRepository::new(store);
        let coordinator = MutationCoordinator::new(repo, Arc::new(hub.clone()));
        info!(
            backend = ?settings.storage.backend,
            posts = existing.len(),
            "forum core ready"
        );
        Ok(Self {
            backend: settings.storage.backend,
            coordinator,
            hub,
        })
    }

    pub fn backend(&self) -> StorageBackend {
        self.backend
    }

    pub fn coordinator(&self) -> &MutationCoordinator {
        &self.coordinator
    }

    pub fn repository(&self) -> &PostRepository {
        self.coordinator.repository()
    }

    pub fn hub(&self) -> &ViewerHub {
        &self.hub
    }
}

async fn open_store(settings: &StorageSettings) -> Result<Arc<dyn PostStore>> {
    match settings.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryPostStore::new())),
        #[cfg(feature = "db-sqlite")]
        StorageBackend::Sqlite => {
            let store = rf_db_sqlite::SqlitePostStore::connect(
                &settings.database_url,
                settings.max_connections,
            )
            .await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "db-sqlite"))]
        StorageBackend::Sqlite => Err(AppError::Config(
            "sqlite backend selected but this build lacks the `db-sqlite` feature".to_string(),
        )),
    }
}

/// Installs the global subscriber. `RUST_LOG` wins over `settings.filter`.
pub fn init_tracing(settings: &LogSettings) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.filter))
        .map_err(|e| AppError::Config(format!("invalid log filter {:?}: {e}", settings.filter)))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = match settings.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };
    installed.map_err(|e| AppError::Config(format!("tracing already initialised: {e}")))
}
