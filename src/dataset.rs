//! Trip records and the in-memory working set the KPI calculators read.
//!
//! Records are owned by the row source and never mutated here. A request
//! narrows them to a [`DateRange`], producing a fresh [`TripDataset`].

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::KpiError;

/// Category of a trip origin or destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationType {
    #[serde(alias = "Plant")]
    Plant,
    #[serde(alias = "Warehouse")]
    Warehouse,
    #[serde(alias = "Delivery Point", alias = "delivery point")]
    DeliveryPoint,
}

impl LocationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocationType::Plant => "plant",
            LocationType::Warehouse => "warehouse",
            LocationType::DeliveryPoint => "delivery_point",
        }
    }
}

impl fmt::Display for LocationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LocationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "plant" => Ok(LocationType::Plant),
            "warehouse" => Ok(LocationType::Warehouse),
            "delivery_point" => Ok(LocationType::DeliveryPoint),
            other => Err(format!("unknown location type '{other}'")),
        }
    }
}

/// A location a trip stops at, keyed by name with its category when known.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct LocationKey {
    pub location: String,
    pub location_type: Option<LocationType>,
}

impl LocationKey {
    /// Builds a key from a location name, falling back to the type label.
    /// Returns `None` when neither is known.
    fn from_parts(name: Option<&str>, location_type: Option<LocationType>) -> Option<Self> {
        let location = match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => name.to_string(),
            None => location_type?.as_str().to_string(),
        };
        Some(Self {
            location,
            location_type,
        })
    }
}

/// One logistics trip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TripRecord {
    pub trip_id: String,
    pub vehicle_id: Option<String>,
    pub driver_id: Option<String>,
    pub transporter_id: Option<String>,

    pub origin_type: Option<LocationType>,
    pub destination_type: Option<LocationType>,
    pub origin_location: Option<String>,
    pub destination_location: Option<String>,

    pub planned_departure: Option<NaiveDateTime>,
    pub actual_departure: Option<NaiveDateTime>,
    pub planned_arrival: Option<NaiveDateTime>,
    pub actual_arrival: Option<NaiveDateTime>,

    pub planned_distance_km: Option<f64>,
    pub actual_distance_km: Option<f64>,
    pub planned_volume: Option<f64>,
    pub actual_volume: Option<f64>,

    pub loading_start: Option<NaiveDateTime>,
    pub loading_end: Option<NaiveDateTime>,
    pub unloading_start: Option<NaiveDateTime>,
    pub unloading_end: Option<NaiveDateTime>,

    #[serde(default, deserialize_with = "flag")]
    pub geo_deviation_flag: bool,
    #[serde(default, deserialize_with = "flag")]
    pub missed_delivery_flag: bool,
    pub missed_delivery_reason: Option<String>,
    pub maintenance_hours: Option<f64>,
}

/// Accepts `true`/`false`, `1`/`0`, `yes`/`no` and blank (false).
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim).map(str::to_ascii_lowercase).as_deref() {
        None | Some("") | Some("false") | Some("0") | Some("no") | Some("f") => Ok(false),
        Some("true") | Some("1") | Some("yes") | Some("t") => Ok(true),
        Some(other) => Err(serde::de::Error::custom(format!("invalid flag '{other}'"))),
    }
}

impl TripRecord {
    /// The timestamp used for date filtering and day/month bucketing.
    pub fn reference_time(&self) -> Option<NaiveDateTime> {
        self.actual_departure.or(self.planned_departure)
    }

    pub fn reference_date(&self) -> Option<NaiveDate> {
        self.reference_time().map(|t| t.date())
    }

    pub fn origin_key(&self) -> Option<LocationKey> {
        LocationKey::from_parts(self.origin_location.as_deref(), self.origin_type)
    }

    pub fn destination_key(&self) -> Option<LocationKey> {
        LocationKey::from_parts(self.destination_location.as_deref(), self.destination_type)
    }
}

/// Vehicle dimension row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub vehicle_id: String,
    pub plate_number: Option<String>,
    pub vehicle_type: Option<String>,
}

/// Transporter dimension row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transporter {
    pub transporter_id: String,
    pub name: Option<String>,
}

/// Materialized rows for one request.
///
/// A dimension set to `None` means the join could not be read; calculators
/// that require it report the metric as unavailable.
#[derive(Debug, Clone, Default)]
pub struct TripDataset {
    pub trips: Vec<TripRecord>,
    pub vehicles: Option<Vec<Vehicle>>,
    pub transporters: Option<Vec<Transporter>>,
    /// Trip rows the source could not parse and left out.
    pub skipped_rows: usize,
}

impl TripDataset {
    pub fn new(trips: Vec<TripRecord>) -> Self {
        Self {
            trips,
            vehicles: Some(Vec::new()),
            transporters: Some(Vec::new()),
            skipped_rows: 0,
        }
    }

    pub fn with_vehicles(mut self, vehicles: Option<Vec<Vehicle>>) -> Self {
        self.vehicles = vehicles;
        self
    }

    pub fn with_transporters(mut self, transporters: Option<Vec<Transporter>>) -> Self {
        self.transporters = transporters;
        self
    }

    pub fn with_skipped_rows(mut self, skipped_rows: usize) -> Self {
        self.skipped_rows = skipped_rows;
        self
    }

    pub fn vehicle_index(&self) -> Option<HashMap<&str, &Vehicle>> {
        self.vehicles
            .as_ref()
            .map(|rows| rows.iter().map(|v| (v.vehicle_id.as_str(), v)).collect())
    }

    pub fn transporter_index(&self) -> Option<HashMap<&str, &Transporter>> {
        self.transporters
            .as_ref()
            .map(|rows| rows.iter().map(|t| (t.transporter_id.as_str(), t)).collect())
    }

    /// Returns the trips whose reference time falls inside `range`, plus the
    /// number of trips dropped because they carry no departure time at all.
    pub fn within(&self, range: &DateRange) -> (TripDataset, usize) {
        let mut undated = 0;
        let trips = self
            .trips
            .iter()
            .filter(|trip| match trip.reference_date() {
                Some(day) => range.contains(day),
                None => {
                    undated += 1;
                    false
                }
            })
            .cloned()
            .collect();

        let subset = TripDataset {
            trips,
            vehicles: self.vehicles.clone(),
            transporters: self.transporters.clone(),
            skipped_rows: self.skipped_rows,
        };
        (subset, undated)
    }
}

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Resolves optional bounds against `today`.
    ///
    /// `end` defaults to `today` and `start` to `default_days` before `end`.
    /// An `end` too early for that window is rejected as an invalid date.
    pub fn resolve(
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        today: NaiveDate,
        default_days: i64,
    ) -> Result<Self, KpiError> {
        let end = end.unwrap_or(today);
        let start = match start {
            Some(start) => start,
            None => end
                .checked_sub_signed(Duration::days(default_days))
                .ok_or_else(|| KpiError::InvalidDate {
                    param: "end_date",
                    value: end.to_string(),
                })?,
        };

        if start > end {
            return Err(KpiError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        day >= self.start && day <= self.end
    }

    /// Midnight at the start of the range.
    pub fn start_time(&self) -> NaiveDateTime {
        self.start.and_time(NaiveTime::MIN)
    }

    /// Midnight after the last day of the range, saturating at the latest
    /// representable timestamp.
    pub fn end_exclusive(&self) -> NaiveDateTime {
        self.end
            .succ_opt()
            .map_or(NaiveDateTime::MAX, |next| next.and_time(NaiveTime::MIN))
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

/// Parses an optional `YYYY-MM-DD` query value. Blank values count as absent.
pub fn parse_date_param(
    param: &'static str,
    value: Option<&str>,
) -> Result<Option<NaiveDate>, KpiError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| KpiError::InvalidDate {
                param,
                value: raw.to_string(),
            }),
    }
}
