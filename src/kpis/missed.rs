use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::KpiSettings;
use crate::dataset::TripDataset;
use crate::error::MetricError;
use crate::kpis::utility::{pct, round2};

/// Reason bucket used when a missed trip carries no reason.
pub const UNSPECIFIED_REASON: &str = "unspecified";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissedTrip {
    pub trip_id: String,
    pub vehicle_id: Option<String>,
    pub transporter_id: Option<String>,
    pub destination_location: Option<String>,
    pub planned_arrival: Option<NaiveDateTime>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissedDeliveryKpi {
    pub missed_delivery_rate_pct: f64,
    pub missed_deliveries: usize,
    pub total_trips: usize,
    pub by_reason: BTreeMap<String, usize>,
    pub by_transporter: BTreeMap<String, usize>,
    /// Missed trips with no transporter, left out of `by_transporter`.
    pub unassigned_trips: usize,
    pub missed_trips: Vec<MissedTrip>,
}

pub fn compute(
    data: &TripDataset,
    _settings: &KpiSettings,
) -> Result<MissedDeliveryKpi, MetricError> {
    let mut by_reason: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_transporter: BTreeMap<String, usize> = BTreeMap::new();
    let mut unassigned_trips = 0;
    let mut missed_trips = Vec::new();

    for trip in data.trips.iter().filter(|t| t.missed_delivery_flag) {
        let reason = trip
            .missed_delivery_reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(UNSPECIFIED_REASON)
            .to_string();

        *by_reason.entry(reason.clone()).or_default() += 1;
        match &trip.transporter_id {
            Some(t) => *by_transporter.entry(t.clone()).or_default() += 1,
            None => unassigned_trips += 1,
        }
        missed_trips.push(MissedTrip {
            trip_id: trip.trip_id.clone(),
            vehicle_id: trip.vehicle_id.clone(),
            transporter_id: trip.transporter_id.clone(),
            destination_location: trip.destination_location.clone(),
            planned_arrival: trip.planned_arrival,
            reason,
        });
    }
    missed_trips.sort_by(|a, b| a.trip_id.cmp(&b.trip_id));

    Ok(MissedDeliveryKpi {
        missed_delivery_rate_pct: round2(pct(missed_trips.len(), data.trips.len())),
        missed_deliveries: missed_trips.len(),
        total_trips: data.trips.len(),
        by_reason,
        by_transporter,
        unassigned_trips,
        missed_trips,
    })
}
