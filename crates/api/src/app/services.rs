use std::sync::Arc;

use parcelmark_infra::store::postgres;
use parcelmark_infra::store::{
    InMemoryTrackStore, InMemoryUserStore, PostgresTrackStore, PostgresUserStore, StoreError,
};
use parcelmark_infra::{BookmarkResolver, TrackStore, UserStore};

use crate::config::ApiConfig;

/// Resolver over type-erased stores, so one handler serves every backend.
pub type DynBookmarkResolver = BookmarkResolver<Arc<dyn UserStore>, Arc<dyn TrackStore>>;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    InMemory,
    Postgres,
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreBackend::InMemory => "in_memory",
            StoreBackend::Postgres => "postgres",
        }
    }
}

/// Services shared by all handlers.
#[derive(Clone)]
pub struct AppServices {
    resolver: DynBookmarkResolver,
    backend: StoreBackend,
}

impl AppServices {
    pub fn new(users: Arc<dyn UserStore>, tracks: Arc<dyn TrackStore>, backend: StoreBackend) -> Self {
        Self {
            resolver: BookmarkResolver::new(users, tracks),
            backend,
        }
    }

    /// In-memory wiring (dev/test). Callers keep the store handles to seed and inspect them.
    pub fn in_memory(users: Arc<InMemoryUserStore>, tracks: Arc<InMemoryTrackStore>) -> Self {
        Self::new(users, tracks, StoreBackend::InMemory)
    }

    /// Postgres when `DATABASE_URL` is configured, otherwise empty in-memory stores.
    pub async fn from_config(config: &ApiConfig) -> Result<Self, StoreError> {
        match &config.database_url {
            Some(url) => {
                let pool = postgres::connect(url, config.db_max_connections).await?;
                Ok(Self::new(
                    Arc::new(PostgresUserStore::new(pool.clone())),
                    Arc::new(PostgresTrackStore::new(pool)),
                    StoreBackend::Postgres,
                ))
            }
            None => {
                tracing::warn!("DATABASE_URL not set; serving from empty in-memory stores");
                Ok(Self::in_memory(InMemoryUserStore::arc(), InMemoryTrackStore::arc()))
            }
        }
    }

    pub fn resolver(&self) -> &DynBookmarkResolver {
        &self.resolver
    }

    pub fn backend(&self) -> StoreBackend {
        self.backend
    }
}
