use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ChartBackend, ChartRecord};
use crate::error::ChartError;

/// Keeps charts in process memory; they are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryChartBackend {
    charts: RwLock<BTreeMap<Uuid, ChartRecord>>,
}

#[async_trait]
impl ChartBackend for MemoryChartBackend {
    async fn load(&self, id: Uuid) -> Result<Option<ChartRecord>, ChartError> {
        Ok(self.charts.read().await.get(&id).cloned())
    }

    async fn save(&self, record: &ChartRecord) -> Result<(), ChartError> {
        self.charts.write().await.insert(record.id, record.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, ChartError> {
        Ok(self.charts.write().await.remove(&id).is_some())
    }

    async fn load_all(&self) -> Result<Vec<ChartRecord>, ChartError> {
        Ok(self.charts.read().await.values().cloned().collect())
    }
}
