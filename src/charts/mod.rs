//! Saved chart configurations.
//!
//! The store owns id assignment, timestamps and ordering; persistence is
//! delegated to a [`ChartBackend`].

mod backend;
mod file;
mod memory;

pub use backend::ChartBackend;
pub use file::FileChartBackend;
pub use memory::MemoryChartBackend;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::ChartError;

const UNTITLED: &str = "Untitled chart";

/// A persisted chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartRecord {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub chart_config: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewChart {
    pub chart_config: Map<String, Value>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Partial update; absent fields are left as they are.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChartUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub chart_config: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChartList {
    pub charts: Vec<ChartRecord>,
    pub total: usize,
}

/// Title carried inside a chart configuration.
///
/// Chart configs put the title either as a plain string or as an object
/// with a `text` field (which may itself be a list of lines).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChartTitle {
    Text(String),
    None,
}

impl ChartTitle {
    pub fn from_value(value: Option<&Value>) -> Self {
        let text = match value {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Object(obj)) => return Self::from_value(obj.get("text")),
            Some(Value::Array(lines)) => lines
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .collect::<Vec<_>>()
                .join(" "),
            _ => String::new(),
        };
        if text.is_empty() { ChartTitle::None } else { ChartTitle::Text(text) }
    }

    /// Looks for `title`, then `options.plugins.title`.
    pub fn from_config(config: &Map<String, Value>) -> Self {
        match Self::from_value(config.get("title")) {
            ChartTitle::None => Self::from_value(
                config
                    .get("options")
                    .and_then(|o| o.get("plugins"))
                    .and_then(|p| p.get("title")),
            ),
            found => found,
        }
    }

    pub fn into_option(self) -> Option<String> {
        match self {
            ChartTitle::Text(text) => Some(text),
            ChartTitle::None => None,
        }
    }
}

fn resolve_title(explicit: Option<String>, config: &Map<String, Value>) -> String {
    explicit
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .or_else(|| ChartTitle::from_config(config).into_option())
        .unwrap_or_else(|| UNTITLED.to_string())
}

/// Chart ids are UUIDs; anything else cannot name a stored chart.
fn parse_id(chart_id: &str) -> Result<Uuid, ChartError> {
    Uuid::parse_str(chart_id).map_err(|_| ChartError::NotFound)
}

#[derive(Clone)]
pub struct ChartStore {
    backend: Arc<dyn ChartBackend>,
}

impl ChartStore {
    pub fn new(backend: Arc<dyn ChartBackend>) -> Self {
        Self { backend }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryChartBackend::default()))
    }

    pub async fn create(&self, request: NewChart) -> Result<ChartRecord, ChartError> {
        let now = Utc::now();
        let record = ChartRecord {
            id: Uuid::new_v4(),
            title: resolve_title(request.title, &request.chart_config),
            description: request.description,
            chart_config: request.chart_config,
            created_at: now,
            updated_at: now,
        };
        self.backend.save(&record).await?;
        info!(chart_id = %record.id, title = %record.title, "Chart saved");
        Ok(record)
    }

    pub async fn get(&self, chart_id: &str) -> Result<ChartRecord, ChartError> {
        let id = parse_id(chart_id)?;
        self.backend.load(id).await?.ok_or(ChartError::NotFound)
    }

    pub async fn update(
        &self,
        chart_id: &str,
        update: ChartUpdate,
    ) -> Result<ChartRecord, ChartError> {
        let mut record = self.get(chart_id).await?;

        if let Some(config) = update.chart_config {
            record.chart_config = config;
        }
        if let Some(title) = update.title {
            record.title = resolve_title(Some(title), &record.chart_config);
        }
        if let Some(description) = update.description {
            record.description = Some(description);
        }
        record.updated_at = Utc::now();

        self.backend.save(&record).await?;
        info!(chart_id = %record.id, "Chart updated");
        Ok(record)
    }

    pub async fn remove(&self, chart_id: &str) -> Result<(), ChartError> {
        let id = parse_id(chart_id)?;
        if !self.backend.delete(id).await? {
            return Err(ChartError::NotFound);
        }
        info!(chart_id = %id, "Chart deleted");
        Ok(())
    }

    /// All charts, newest first.
    pub async fn list(&self) -> Result<ChartList, ChartError> {
        let mut charts = self.backend.load_all().await?;
        charts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(ChartList {
            total: charts.len(),
            charts,
        })
    }
}
