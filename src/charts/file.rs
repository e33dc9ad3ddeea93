use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{ChartBackend, ChartRecord};
use crate::error::ChartError;

/// Stores each chart as `<dir>/<id>.json`.
#[derive(Debug, Clone)]
pub struct FileChartBackend {
    dir: PathBuf,
}

impl FileChartBackend {
    /// Opens `dir`, creating it if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, ChartError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        debug!(dir = %dir.display(), "Chart directory ready");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

#[async_trait]
impl ChartBackend for FileChartBackend {
    async fn load(&self, id: Uuid) -> Result<Option<ChartRecord>, ChartError> {
        let bytes = match fs::read(self.path_for(id)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    async fn save(&self, record: &ChartRecord) -> Result<(), ChartError> {
        let body = serde_json::to_vec_pretty(record)?;
        let path = self.path_for(record.id);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, body).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, ChartError> {
        match fs::remove_file(self.path_for(id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn load_all(&self) -> Result<Vec<ChartRecord>, ChartError> {
        let mut charts = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = match fs::read(&path).await {
                Ok(bytes) => {
                    serde_json::from_slice::<ChartRecord>(&bytes).map_err(ChartError::from)
                }
                Err(e) => Err(e.into()),
            };
            match parsed {
                Ok(record) => charts.push(record),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable chart file")
                }
            }
        }

        Ok(charts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charts::{ChartStore, NewChart};
    use serde_json::{Map, json};
    use std::env;
    use std::sync::Arc;

    fn temp_dir(name: &str) -> PathBuf {
        env::temp_dir().join(format!("fleet_kpi_charts_{}_{}", name, std::process::id()))
    }

    fn chart(title: &str) -> NewChart {
        let mut config = Map::new();
        config.insert("type".into(), json!("line"));
        NewChart {
            chart_config: config,
            title: Some(title.into()),
            description: Some("from test".into()),
        }
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = temp_dir("reopen");
        let _ = std::fs::remove_dir_all(&dir);

        let store = ChartStore::new(Arc::new(FileChartBackend::open(&dir).await.unwrap()));
        let created = store.create(chart("Utilization")).await.unwrap();
        assert!(dir.join(format!("{}.json", created.id)).exists());

        let reopened = ChartStore::new(Arc::new(FileChartBackend::open(&dir).await.unwrap()));
        assert_eq!(reopened.get(&created.id.to_string()).await.unwrap(), created);

        reopened.remove(&created.id.to_string()).await.unwrap();
        assert!(!dir.join(format!("{}.json", created.id)).exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_files_are_skipped() {
        let dir = temp_dir("corrupt");
        let _ = std::fs::remove_dir_all(&dir);

        let backend = FileChartBackend::open(&dir).await.unwrap();
        let store = ChartStore::new(Arc::new(backend.clone()));
        store.create(chart("Delays")).await.unwrap();
        std::fs::write(backend.dir().join("broken.json"), "{not json").unwrap();
        std::fs::write(backend.dir().join("notes.txt"), "ignored").unwrap();

        let list = store.list().await.unwrap();
        assert_eq!(list.total, 1);
        assert_eq!(list.charts[0].title, "Delays");

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
