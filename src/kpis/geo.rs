use chrono::NaiveDateTime;
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::BTreeMap;

use crate::config::KpiSettings;
use crate::dataset::TripDataset;
use crate::error::MetricError;
use crate::kpis::utility::{pct, round2};

/// A trip flagged for leaving its planned route.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoDeviationEvent {
    pub trip_id: String,
    pub vehicle_id: Option<String>,
    pub transporter_id: Option<String>,
    pub driver_id: Option<String>,
    pub timestamp: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoDeviationKpi {
    pub deviation_rate_pct: f64,
    pub deviation_events: usize,
    pub total_trips: usize,
    /// Newest first; undated events last.
    pub events: Vec<GeoDeviationEvent>,
    pub by_transporter: BTreeMap<String, usize>,
    /// Flagged trips with no transporter, left out of `by_transporter`.
    pub unassigned_trips: usize,
}

pub fn compute(
    data: &TripDataset,
    _settings: &KpiSettings,
) -> Result<GeoDeviationKpi, MetricError> {
    let mut by_transporter: BTreeMap<String, usize> = BTreeMap::new();
    let mut unassigned_trips = 0;
    let mut events: Vec<GeoDeviationEvent> = data
        .trips
        .iter()
        .filter(|t| t.geo_deviation_flag)
        .map(|t| {
            match &t.transporter_id {
                Some(id) => *by_transporter.entry(id.clone()).or_default() += 1,
                None => unassigned_trips += 1,
            }
            GeoDeviationEvent {
                trip_id: t.trip_id.clone(),
                vehicle_id: t.vehicle_id.clone(),
                transporter_id: t.transporter_id.clone(),
                driver_id: t.driver_id.clone(),
                timestamp: t.reference_time(),
            }
        })
        .collect();

    // Option orders None first, so reversing puts undated events last.
    events.sort_by(|a, b| {
        Reverse(a.timestamp)
            .cmp(&Reverse(b.timestamp))
            .then_with(|| a.trip_id.cmp(&b.trip_id))
    });

    Ok(GeoDeviationKpi {
        deviation_rate_pct: round2(pct(events.len(), data.trips.len())),
        deviation_events: events.len(),
        total_trips: data.trips.len(),
        events,
        by_transporter,
        unassigned_trips,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::TripRecord;
    use crate::kpis::fixtures::{run, trip};

    fn flagged(id: &str, departure: &str, transporter: &str) -> TripRecord {
        TripRecord {
            geo_deviation_flag: true,
            transporter_id: Some(transporter.to_string()),
            ..run(id, "V1", departure, departure)
        }
    }

    #[test]
    fn test_events_newest_first() {
        let undated = TripRecord {
            geo_deviation_flag: true,
            ..trip("undated")
        };
        let data = TripDataset::new(vec![
            flagged("old", "2024-01-01 08:00", "T1"),
            undated,
            flagged("new", "2024-01-03 08:00", "T1"),
            flagged("mid", "2024-01-02 08:00", "T2"),
            trip("clean"),
        ]);
        let kpi = compute(&data, &KpiSettings::default()).unwrap();

        let order: Vec<_> = kpi.events.iter().map(|e| e.trip_id.as_str()).collect();
        assert_eq!(order, vec!["new", "mid", "old", "undated"]);
        assert_eq!(kpi.deviation_events, 4);
        assert_eq!(kpi.deviation_rate_pct, 80.0);
        assert_eq!(kpi.by_transporter["T1"], 2);
        assert_eq!(kpi.by_transporter["T2"], 1);
        assert_eq!(kpi.unassigned_trips, 1);
    }

    #[test]
    fn test_empty_input_reports_zero() {
        let kpi = compute(&TripDataset::default(), &KpiSettings::default()).unwrap();
        assert_eq!(kpi.deviation_rate_pct, 0.0);
        assert!(kpi.events.is_empty());
    }
}
