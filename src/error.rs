//! Error types for the KPI engine, row sources and chart storage.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{NaiveDate, Utc};
use serde_json::json;
use thiserror::Error;

/// Request-level failures of the KPI endpoint.
#[derive(Error, Debug)]
pub enum KpiError {
    #[error("start_date {start} is after end_date {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("invalid {param} '{value}': expected a calendar date formatted YYYY-MM-DD")]
    InvalidDate { param: &'static str, value: String },

    /// The row source itself could not be reached. Aborts every metric.
    #[error("trip data source unavailable: {message}")]
    UpstreamUnavailable { message: String },
}

impl KpiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            KpiError::InvalidRange { .. } | KpiError::InvalidDate { .. } => StatusCode::BAD_REQUEST,
            KpiError::UpstreamUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            KpiError::InvalidRange { .. } => "invalid_range",
            KpiError::InvalidDate { .. } => "invalid_date",
            KpiError::UpstreamUnavailable { .. } => "upstream_unavailable",
        }
    }
}

impl From<SourceError> for KpiError {
    fn from(err: SourceError) -> Self {
        KpiError::UpstreamUnavailable {
            message: err.to_string(),
        }
    }
}

impl IntoResponse for KpiError {
    fn into_response(self) -> Response {
        error_response(self.status_code(), self.error_code(), self.to_string())
    }
}

/// A single calculator could not produce its metric.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetricError {
    #[error("{reason}")]
    DataUnavailable { reason: String },
}

impl MetricError {
    pub fn data_unavailable(reason: impl Into<String>) -> Self {
        MetricError::DataUnavailable {
            reason: reason.into(),
        }
    }
}

/// Failures reading trips from a row source.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("trip table not found at {path}")]
    MissingTable { path: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("fetch timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("background read failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Chart storage failures.
#[derive(Error, Debug)]
pub enum ChartError {
    #[error("Chart not found")]
    NotFound,

    #[error("chart storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("chart serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ChartError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ChartError::NotFound => StatusCode::NOT_FOUND,
            ChartError::Storage(_) | ChartError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ChartError {
    fn into_response(self) -> Response {
        let code = match self {
            ChartError::NotFound => "not_found",
            ChartError::Storage(_) => "storage_error",
            ChartError::Serialization(_) => "serialization_error",
        };
        error_response(self.status_code(), code, self.to_string())
    }
}

fn error_response(status: StatusCode, code: &str, message: String) -> Response {
    let body = json!({
        "success": false,
        "error": code,
        "message": message,
        "timestamp": Utc::now().to_rfc3339(),
    });
    (status, Json(body)).into_response()
}
