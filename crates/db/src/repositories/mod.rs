use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use skucast_core::{BuildStats, FrequencyIndex};

pub mod index_snapshot;
pub mod memory;

pub use index_snapshot::SqlIndexSnapshotRepository;
pub use memory::InMemoryIndexSnapshotRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// A persisted index together with the statistics of the build that produced it.
#[derive(Clone, Debug, PartialEq)]
pub struct IndexSnapshot {
    pub build_id: String,
    pub created_at: DateTime<Utc>,
    pub index: FrequencyIndex,
    pub stats: BuildStats,
}

/// Storage for the single current index. Every refresh replaces the previous
/// snapshot wholesale; nothing is merged with earlier builds.
#[async_trait]
pub trait IndexSnapshotRepository: Send + Sync {
    /// Stores `index` as the current snapshot and returns its build id.
    async fn replace(
        &self,
        index: &FrequencyIndex,
        stats: &BuildStats,
    ) -> Result<String, RepositoryError>;

    async fn load(&self) -> Result<Option<IndexSnapshot>, RepositoryError>;
}
