//! The twelve operations metrics.
//!
//! Every calculator is a pure function over a borrowed [`TripDataset`] and
//! the shared [`KpiSettings`]. Calculators never fail on sparse data: rows
//! missing a required field are skipped and counted. The only error is
//! [`MetricError::DataUnavailable`], raised when a required dimension table
//! could not be read.
//!
//! [`TripDataset`]: crate::dataset::TripDataset
//! [`KpiSettings`]: crate::config::KpiSettings
//! [`MetricError::DataUnavailable`]: crate::error::MetricError::DataUnavailable

pub mod delays;
pub mod distance;
pub mod geo;
pub mod grade;
pub mod maintenance;
pub mod missed;
pub mod on_time;
pub mod stops;
pub mod transporter;
pub mod trip_count;
pub mod turnaround;
pub mod types;
pub mod utility;
pub mod utilization;
pub mod volume;

#[cfg(test)]
pub(crate) mod fixtures;

pub use types::{MetricKey, MetricSlot, OperationsKpis, Unavailable};
