use async_trait::async_trait;
use uuid::Uuid;

use super::ChartRecord;
use crate::error::ChartError;

/// Persistence for chart records.
#[async_trait]
pub trait ChartBackend: Send + Sync {
    async fn load(&self, id: Uuid) -> Result<Option<ChartRecord>, ChartError>;

    /// Inserts or replaces the record with the same id.
    async fn save(&self, record: &ChartRecord) -> Result<(), ChartError>;

    /// Returns whether a record was removed.
    async fn delete(&self, id: Uuid) -> Result<bool, ChartError>;

    /// Every readable record, in no particular order.
    async fn load_all(&self) -> Result<Vec<ChartRecord>, ChartError>;
}
