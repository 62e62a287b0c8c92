use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use skucast_core::{BuildStats, FrequencyIndex};

use super::{IndexSnapshot, IndexSnapshotRepository, RepositoryError};

#[derive(Default)]
pub struct InMemoryIndexSnapshotRepository {
    current: RwLock<Option<IndexSnapshot>>,
}

#[async_trait::async_trait]
impl IndexSnapshotRepository for InMemoryIndexSnapshotRepository {
    async fn replace(
        &self,
        index: &FrequencyIndex,
        stats: &BuildStats,
    ) -> Result<String, RepositoryError> {
        let build_id = Uuid::new_v4().to_string();
        let mut current = self.current.write().await;
        *current = Some(IndexSnapshot {
            build_id: build_id.clone(),
            created_at: Utc::now(),
            index: index.clone(),
            stats: stats.clone(),
        });
        Ok(build_id)
    }

    async fn load(&self) -> Result<Option<IndexSnapshot>, RepositoryError> {
        let current = self.current.read().await;
        Ok(current.clone())
    }
}
