//! Aggregation orchestrator.
//!
//! One request resolves its date range, fetches rows once, narrows them to
//! the range and hands the same read-only dataset to all twelve
//! calculators. A failing or panicking calculator yields an unavailable
//! marker for its own slot and leaves the others untouched.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};

use crate::config::KpiSettings;
use crate::dataset::{DateRange, TripDataset};
use crate::error::{KpiError, MetricError, SourceError};
use crate::kpis::{
    MetricKey, MetricSlot, OperationsKpis, delays, distance, geo, maintenance, missed, on_time,
    stops, transporter, trip_count, turnaround, utilization, volume,
};
use crate::source::TripSource;

/// Result of one extraction.
#[derive(Debug, Clone, Serialize)]
pub struct OperationsReport {
    pub extraction_timestamp: DateTime<Utc>,
    pub date_range: DateRange,
    pub trips_in_range: usize,
    /// Trips dropped for having neither an actual nor a planned departure.
    pub undated_trips: usize,
    /// Rows the source could not parse.
    pub skipped_rows: usize,
    pub kpis: OperationsKpis,
}

pub struct KpiEngine {
    source: Arc<dyn TripSource>,
    settings: Arc<KpiSettings>,
}

impl KpiEngine {
    pub fn new(source: Arc<dyn TripSource>, settings: KpiSettings) -> Self {
        Self {
            source,
            settings: Arc::new(settings),
        }
    }

    pub fn source_name(&self) -> String {
        self.source.describe()
    }

    /// Resolves request bounds against today's UTC date.
    pub fn resolve_range(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<DateRange, KpiError> {
        let today = Utc::now().date_naive();
        DateRange::resolve(start, end, today, self.settings.default_range_days)
    }

    /// Computes all twelve metrics for the given bounds.
    ///
    /// The range is validated before the source is touched.
    pub async fn extract(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<OperationsReport, KpiError> {
        let range = self.resolve_range(start, end)?;
        self.extract_range(range).await
    }

    #[tracing::instrument(
        skip(self, range),
        fields(range = %range, source = %self.source.describe())
    )]
    pub async fn extract_range(&self, range: DateRange) -> Result<OperationsReport, KpiError> {
        let secs = self.settings.fetch_timeout_secs;
        let fetched = tokio::time::timeout(Duration::from_secs(secs), self.source.fetch(&range))
            .await
            .map_err(|_| SourceError::Timeout { secs })??;

        let (dataset, undated_trips) = fetched.within(&range);
        if undated_trips > 0 {
            warn!(undated_trips, "Dropped trips without a departure time");
        }
        let skipped_rows = dataset.skipped_rows;
        if skipped_rows > 0 {
            warn!(skipped_rows, "Source skipped unparseable trip rows");
        }
        let trips_in_range = dataset.trips.len();
        debug!(trips = trips_in_range, "Working set ready");

        let kpis = if self.settings.parallel {
            compute_parallel(Arc::new(dataset), Arc::clone(&self.settings)).await
        } else {
            compute_sequential(&dataset, &self.settings)
        };

        info!(
            trips = trips_in_range,
            available = kpis.available_count(),
            "KPI extraction complete"
        );

        Ok(OperationsReport {
            extraction_timestamp: Utc::now(),
            date_range: range,
            trips_in_range,
            undated_trips,
            skipped_rows,
            kpis,
        })
    }

    /// Pings the row source.
    pub async fn health(&self) -> Result<(), SourceError> {
        self.source.ping().await
    }
}

type Outcome<T> = Result<Result<T, MetricError>, String>;

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn join_message(err: JoinError) -> String {
    if err.is_panic() {
        panic_message(err.into_panic().as_ref())
    } else {
        err.to_string()
    }
}

/// Turns one calculator outcome into its result slot, logging failures.
fn settle<T>(key: MetricKey, outcome: Outcome<T>) -> MetricSlot<T> {
    match outcome {
        Ok(Ok(value)) => MetricSlot::Available(value),
        Ok(Err(MetricError::DataUnavailable { reason })) => {
            warn!(metric = %key, reason = %reason, "Metric unavailable");
            MetricSlot::unavailable(reason)
        }
        Err(panic) => {
            warn!(metric = %key, reason = %panic, "Metric calculator panicked");
            MetricSlot::unavailable(format!("calculator failed: {panic}"))
        }
    }
}

type Calculator<T> = fn(&TripDataset, &KpiSettings) -> Result<T, MetricError>;

fn run_inline<T>(
    (key, data, settings): (MetricKey, &TripDataset, &KpiSettings),
    calc: Calculator<T>,
) -> MetricSlot<T> {
    let outcome = catch_unwind(AssertUnwindSafe(|| calc(data, settings)))
        .map_err(|payload| panic_message(payload.as_ref()));
    settle(key, outcome)
}

/// Runs every calculator on the current thread.
pub fn compute_sequential(data: &TripDataset, settings: &KpiSettings) -> OperationsKpis {
    let run = |key| (key, data, settings);
    OperationsKpis {
        turnaround_time: run_inline(run(MetricKey::TurnaroundTime), turnaround::compute),
        trip_count_per_vehicle: run_inline(
            run(MetricKey::TripCountPerVehicle),
            trip_count::compute,
        ),
        distance_variance: run_inline(run(MetricKey::DistanceVariance), distance::compute),
        vehicle_utilization: run_inline(run(MetricKey::VehicleUtilization), utilization::compute),
        on_time_arrival: run_inline(run(MetricKey::OnTimeArrival), on_time::compute),
        trip_delays: run_inline(run(MetricKey::TripDelays), delays::compute),
        transporter_performance: run_inline(
            run(MetricKey::TransporterPerformance),
            transporter::compute,
        ),
        missed_deliveries: run_inline(run(MetricKey::MissedDeliveries), missed::compute),
        geo_deviation_events: run_inline(run(MetricKey::GeoDeviationEvents), geo::compute),
        loading_unloading_time: run_inline(run(MetricKey::LoadingUnloadingTime), stops::compute),
        delivery_volume_variance: run_inline(
            run(MetricKey::DeliveryVolumeVariance),
            volume::compute,
        ),
        maintenance_downtime: run_inline(
            run(MetricKey::MaintenanceDowntime),
            maintenance::compute,
        ),
    }
}

fn spawn<T: Send + 'static>(
    data: &Arc<TripDataset>,
    settings: &Arc<KpiSettings>,
    calc: Calculator<T>,
) -> JoinHandle<Result<T, MetricError>> {
    let data = Arc::clone(data);
    let settings = Arc::clone(settings);
    tokio::task::spawn_blocking(move || calc(&data, &settings))
}

async fn collect<T>(key: MetricKey, handle: JoinHandle<Result<T, MetricError>>) -> MetricSlot<T> {
    settle(key, handle.await.map_err(join_message))
}

/// Runs every calculator concurrently on the blocking pool.
pub async fn compute_parallel(
    data: Arc<TripDataset>,
    settings: Arc<KpiSettings>,
) -> OperationsKpis {
    let (d, s) = (&data, &settings);
    let (
        turnaround_time,
        trip_count_per_vehicle,
        distance_variance,
        vehicle_utilization,
        on_time_arrival,
        trip_delays,
        transporter_performance,
        missed_deliveries,
        geo_deviation_events,
        loading_unloading_time,
        delivery_volume_variance,
        maintenance_downtime,
    ) = tokio::join!(
        collect(MetricKey::TurnaroundTime, spawn(d, s, turnaround::compute)),
        collect(
            MetricKey::TripCountPerVehicle,
            spawn(d, s, trip_count::compute)
        ),
        collect(MetricKey::DistanceVariance, spawn(d, s, distance::compute)),
        collect(
            MetricKey::VehicleUtilization,
            spawn(d, s, utilization::compute)
        ),
        collect(MetricKey::OnTimeArrival, spawn(d, s, on_time::compute)),
        collect(MetricKey::TripDelays, spawn(d, s, delays::compute)),
        collect(
            MetricKey::TransporterPerformance,
            spawn(d, s, transporter::compute)
        ),
        collect(MetricKey::MissedDeliveries, spawn(d, s, missed::compute)),
        collect(MetricKey::GeoDeviationEvents, spawn(d, s, geo::compute)),
        collect(MetricKey::LoadingUnloadingTime, spawn(d, s, stops::compute)),
        collect(
            MetricKey::DeliveryVolumeVariance,
            spawn(d, s, volume::compute)
        ),
        collect(
            MetricKey::MaintenanceDowntime,
            spawn(d, s, maintenance::compute)
        ),
    );

    OperationsKpis {
        turnaround_time,
        trip_count_per_vehicle,
        distance_variance,
        vehicle_utilization,
        on_time_arrival,
        trip_delays,
        transporter_performance,
        missed_deliveries,
        geo_deviation_events,
        loading_unloading_time,
        delivery_volume_variance,
        maintenance_downtime,
    }
}
