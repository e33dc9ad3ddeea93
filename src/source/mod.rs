//! Row sources the KPI engine reads trips from.

mod csv;
mod postgres;

pub use self::csv::CsvTripSource;
pub use self::postgres::PgTripSource;

use async_trait::async_trait;

use crate::dataset::{DateRange, TripDataset};
use crate::error::SourceError;

/// Read-only access to trip records and their dimension tables.
///
/// `fetch` may return rows outside `range`; the engine filters by reference
/// time afterwards. A dimension that cannot be read is returned as `None`
/// rather than failing the call.
#[async_trait]
pub trait TripSource: Send + Sync {
    async fn fetch(&self, range: &DateRange) -> Result<TripDataset, SourceError>;

    /// Checks that the source is reachable.
    async fn ping(&self) -> Result<(), SourceError>;

    /// Short label for logs and the health endpoint.
    fn describe(&self) -> String;
}
