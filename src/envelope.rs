use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::dataset::DateRange;
use crate::engine::OperationsReport;
use crate::kpis::{MetricKey, OperationsKpis};

/// Body of a `GET /api/operations-kpis` response.
#[derive(Debug, Clone, Serialize)]
pub struct KpiEnvelope {
    pub success: bool,
    pub data: OperationsKpis,
    pub message: String,
    pub extraction_timestamp: DateTime<Utc>,
    pub date_range: DateRange,
}

impl KpiEnvelope {
    /// Success holds when at least one metric was computed.
    pub fn from_report(report: OperationsReport) -> Self {
        let available = report.kpis.available_count();
        let missing = report.kpis.unavailable_keys();
        let total = MetricKey::ALL.len();

        let message = if missing.is_empty() {
            format!(
                "All {total} operations KPIs extracted for period {}",
                report.date_range
            )
        } else if available == 0 {
            format!("No operations KPIs could be extracted for period {}", report.date_range)
        } else {
            let names: Vec<&str> = missing.iter().map(MetricKey::as_str).collect();
            format!(
                "{available} of {total} operations KPIs extracted for period {}; unavailable: {}",
                report.date_range,
                names.join(", ")
            )
        };

        Self {
            success: available > 0,
            data: report.kpis,
            message,
            extraction_timestamp: report.extraction_timestamp,
            date_range: report.date_range,
        }
    }
}
