use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::TripSource;
use crate::dataset::{DateRange, LocationType, Transporter, TripDataset, TripRecord, Vehicle};
use crate::error::SourceError;

/// Trips are read from the `trip_records` view, which flattens the trip,
/// stop and maintenance tables into one row per trip. Numeric columns are
/// expected as `DOUBLE PRECISION` and timestamps as `TIMESTAMP`.
const TRIPS_SQL: &str = r#"
SELECT trip_id, vehicle_id, driver_id, transporter_id,
       origin_type, destination_type, origin_location, destination_location,
       planned_departure, actual_departure, planned_arrival, actual_arrival,
       planned_distance_km, actual_distance_km, planned_volume, actual_volume,
       loading_start, loading_end, unloading_start, unloading_end,
       geo_deviation_flag, missed_delivery_flag, missed_delivery_reason,
       maintenance_hours
FROM trip_records
WHERE (COALESCE(actual_departure, planned_departure) >= $1
       AND COALESCE(actual_departure, planned_departure) < $2)
   OR COALESCE(actual_departure, planned_departure) IS NULL
ORDER BY trip_id
"#;

const VEHICLES_SQL: &str =
    "SELECT vehicle_id, plate_number, vehicle_type FROM vehicles ORDER BY vehicle_id";
const TRANSPORTERS_SQL: &str =
    "SELECT transporter_id, name FROM transporters ORDER BY transporter_id";

/// Reads trips from PostgreSQL over a shared connection pool.
#[derive(Debug, Clone)]
pub struct PgTripSource {
    pool: PgPool,
}

impl PgTripSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, SourceError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;
        info!(max_connections, "PostgreSQL pool ready");
        Ok(Self::new(pool))
    }

    async fn vehicles(&self) -> Option<Vec<Vehicle>> {
        let rows = match sqlx::query(VEHICLES_SQL).fetch_all(&self.pool).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "Vehicle table unavailable");
                return None;
            }
        };
        rows.iter().map(vehicle_from_row).collect::<Result<_, _>>().map_or_else(
            |e| {
                warn!(error = %e, "Vehicle rows malformed");
                None
            },
            Some,
        )
    }

    async fn transporters(&self) -> Option<Vec<Transporter>> {
        let rows = match sqlx::query(TRANSPORTERS_SQL).fetch_all(&self.pool).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "Transporter table unavailable");
                return None;
            }
        };
        rows.iter().map(transporter_from_row).collect::<Result<_, _>>().map_or_else(
            |e| {
                warn!(error = %e, "Transporter rows malformed");
                None
            },
            Some,
        )
    }
}

fn location_type(row: &PgRow, column: &str) -> Result<Option<LocationType>, sqlx::Error> {
    let raw: Option<String> = row.try_get(column)?;
    Ok(raw.and_then(|value| match value.parse() {
        Ok(t) => Some(t),
        Err(e) => {
            debug!(column, error = %e, "Ignoring location type");
            None
        }
    }))
}

fn flag(row: &PgRow, column: &str) -> Result<bool, sqlx::Error> {
    Ok(row.try_get::<Option<bool>, _>(column)?.unwrap_or(false))
}

fn trip_from_row(row: &PgRow) -> Result<TripRecord, sqlx::Error> {
    Ok(TripRecord {
        trip_id: row.try_get("trip_id")?,
        vehicle_id: row.try_get("vehicle_id")?,
        driver_id: row.try_get("driver_id")?,
        transporter_id: row.try_get("transporter_id")?,
        origin_type: location_type(row, "origin_type")?,
        destination_type: location_type(row, "destination_type")?,
        origin_location: row.try_get("origin_location")?,
        destination_location: row.try_get("destination_location")?,
        planned_departure: row.try_get("planned_departure")?,
        actual_departure: row.try_get("actual_departure")?,
        planned_arrival: row.try_get("planned_arrival")?,
        actual_arrival: row.try_get("actual_arrival")?,
        planned_distance_km: row.try_get("planned_distance_km")?,
        actual_distance_km: row.try_get("actual_distance_km")?,
        planned_volume: row.try_get("planned_volume")?,
        actual_volume: row.try_get("actual_volume")?,
        loading_start: row.try_get("loading_start")?,
        loading_end: row.try_get("loading_end")?,
        unloading_start: row.try_get("unloading_start")?,
        unloading_end: row.try_get("unloading_end")?,
        geo_deviation_flag: flag(row, "geo_deviation_flag")?,
        missed_delivery_flag: flag(row, "missed_delivery_flag")?,
        missed_delivery_reason: row.try_get("missed_delivery_reason")?,
        maintenance_hours: row.try_get("maintenance_hours")?,
    })
}

fn vehicle_from_row(row: &PgRow) -> Result<Vehicle, sqlx::Error> {
    Ok(Vehicle {
        vehicle_id: row.try_get("vehicle_id")?,
        plate_number: row.try_get("plate_number")?,
        vehicle_type: row.try_get("vehicle_type")?,
    })
}

fn transporter_from_row(row: &PgRow) -> Result<Transporter, sqlx::Error> {
    Ok(Transporter {
        transporter_id: row.try_get("transporter_id")?,
        name: row.try_get("name")?,
    })
}

#[async_trait]
impl TripSource for PgTripSource {
    #[tracing::instrument(skip(self, range), fields(range = %range))]
    async fn fetch(&self, range: &DateRange) -> Result<TripDataset, SourceError> {
        let rows = sqlx::query(TRIPS_SQL)
            .bind(range.start_time())
            .bind(range.end_exclusive())
            .fetch_all(&self.pool)
            .await?;

        let mut trips = Vec::with_capacity(rows.len());
        let mut skipped = 0;
        for row in &rows {
            match trip_from_row(row) {
                Ok(trip) => trips.push(trip),
                Err(e) => {
                    warn!(error = %e, "Skipping undecodable trip row");
                    skipped += 1;
                }
            }
        }

        let (vehicles, transporters) = tokio::join!(self.vehicles(), self.transporters());
        info!(trips = trips.len(), skipped, "PostgreSQL fetch complete");

        Ok(TripDataset::new(trips)
            .with_vehicles(vehicles)
            .with_transporters(transporters)
            .with_skipped_rows(skipped))
    }

    async fn ping(&self) -> Result<(), SourceError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn describe(&self) -> String {
        "postgres".to_string()
    }
}
