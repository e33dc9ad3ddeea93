use chrono::Duration;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::KpiSettings;
use crate::dataset::{TripDataset, TripRecord};
use crate::error::MetricError;
use crate::kpis::utility::{pct, round2};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransporterOnTime {
    pub on_time_rate_pct: f64,
    pub on_time_trips: usize,
    pub measured_trips: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OnTimeArrivalKpi {
    pub on_time_rate_pct: f64,
    pub on_time_trips: usize,
    pub late_trips: usize,
    pub measured_trips: usize,
    pub grace_minutes: i64,
    pub by_transporter: BTreeMap<String, TransporterOnTime>,
    /// Measured trips with no transporter, left out of `by_transporter`.
    pub unassigned_trips: usize,
    pub excluded_rows: usize,
}

/// Whether a trip arrived within `grace_minutes` of plan. The boundary is
/// inclusive. `None` when either arrival time is missing.
pub fn is_on_time(trip: &TripRecord, grace_minutes: i64) -> Option<bool> {
    let planned = trip.planned_arrival?;
    let actual = trip.actual_arrival?;
    Some(actual <= planned + Duration::minutes(grace_minutes))
}

pub fn compute(
    data: &TripDataset,
    settings: &KpiSettings,
) -> Result<OnTimeArrivalKpi, MetricError> {
    let grace = settings.on_time_grace_minutes;
    let mut on_time_trips = 0;
    let mut measured_trips = 0;
    let mut unassigned_trips = 0;
    let mut per_transporter: BTreeMap<&str, (usize, usize)> = BTreeMap::new();

    for trip in &data.trips {
        let Some(on_time) = is_on_time(trip, grace) else {
            continue;
        };
        measured_trips += 1;
        if on_time {
            on_time_trips += 1;
        }
        match trip.transporter_id.as_deref() {
            Some(t) => {
                let entry = per_transporter.entry(t).or_default();
                entry.1 += 1;
                if on_time {
                    entry.0 += 1;
                }
            }
            None => unassigned_trips += 1,
        }
    }

    Ok(OnTimeArrivalKpi {
        on_time_rate_pct: round2(pct(on_time_trips, measured_trips)),
        on_time_trips,
        late_trips: measured_trips - on_time_trips,
        measured_trips,
        grace_minutes: grace,
        by_transporter: per_transporter
            .into_iter()
            .map(|(t, (ok, total))| {
                (
                    t.to_string(),
                    TransporterOnTime {
                        on_time_rate_pct: round2(pct(ok, total)),
                        on_time_trips: ok,
                        measured_trips: total,
                    },
                )
            })
            .collect(),
        unassigned_trips,
        excluded_rows: data.trips.len() - measured_trips,
    })
}
