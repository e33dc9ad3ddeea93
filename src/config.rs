use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Tunable constants for the KPI calculators and the orchestrator.
///
/// Stored as a plain JSON object on disk; omitted keys keep their defaults:
/// ```json
/// {
///   "on_time_grace_minutes": 10,
///   "top_n": 10,
///   "parallel": false
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KpiSettings {
    /// A late arrival within this window still counts as on time.
    pub on_time_grace_minutes: i64,
    /// Departures/arrivals later than planned by more than this are delayed.
    pub delay_grace_minutes: i64,
    /// Length of every ranked list (bottlenecks, worst trips, top performers).
    pub top_n: usize,
    pub underutilization_threshold_pct: f64,
    pub high_utilization_threshold_pct: f64,
    /// Upper bound applied to per-trip fulfillment percentages.
    pub fulfillment_cap_pct: f64,
    /// Mean monthly downtime above which a vehicle needs maintenance.
    pub maintenance_threshold_hours: f64,
    /// Window used when a request omits `start_date`.
    pub default_range_days: i64,
    pub fetch_timeout_secs: u64,
    /// Run calculators concurrently on the blocking pool.
    pub parallel: bool,
}

impl Default for KpiSettings {
    fn default() -> Self {
        Self {
            on_time_grace_minutes: 15,
            delay_grace_minutes: 15,
            top_n: 5,
            underutilization_threshold_pct: 40.0,
            high_utilization_threshold_pct: 80.0,
            fulfillment_cap_pct: 150.0,
            maintenance_threshold_hours: 20.0,
            default_range_days: 30,
            fetch_timeout_secs: 30,
            parallel: true,
        }
    }
}

impl KpiSettings {
    /// Loads settings from a JSON file at `path`.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read KPI settings from '{path}'"))?;
        let settings: KpiSettings = serde_json::from_str(&content)
            .with_context(|| format!("invalid KPI settings in '{path}'"))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Loads from `path` when given, otherwise returns the defaults.
    pub fn load_or_default(path: Option<&str>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.on_time_grace_minutes >= 0, "on_time_grace_minutes must be >= 0");
        anyhow::ensure!(self.delay_grace_minutes >= 0, "delay_grace_minutes must be >= 0");
        anyhow::ensure!(self.default_range_days >= 0, "default_range_days must be >= 0");
        anyhow::ensure!(self.fulfillment_cap_pct > 0.0, "fulfillment_cap_pct must be > 0");
        Ok(())
    }
}
