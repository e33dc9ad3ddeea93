use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::KpiSettings;
use crate::dataset::TripDataset;
use crate::error::MetricError;
use crate::kpis::utility::{asc_then, mean, non_negative, round2};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolumeTrip {
    pub trip_id: String,
    pub transporter_id: Option<String>,
    pub planned_volume: f64,
    pub actual_volume: f64,
    pub fulfillment_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryVolumeKpi {
    pub avg_fulfillment_pct: f64,
    /// Mean of `actual - planned`.
    pub avg_volume_variance: f64,
    pub total_planned_volume: f64,
    pub total_actual_volume: f64,
    pub over_delivered_trips: usize,
    pub under_delivered_trips: usize,
    pub exact_trips: usize,
    pub fulfillment_cap_pct: f64,
    /// Trips whose fulfillment was clamped to the cap.
    pub capped_trips: usize,
    pub measured_trips: usize,
    pub worst_underperformers: Vec<VolumeTrip>,
    pub by_transporter: BTreeMap<String, f64>,
    /// Measured trips with no transporter, left out of `by_transporter`.
    pub unassigned_trips: usize,
    pub excluded_rows: usize,
}

pub fn compute(
    data: &TripDataset,
    settings: &KpiSettings,
) -> Result<DeliveryVolumeKpi, MetricError> {
    let cap = settings.fulfillment_cap_pct;
    let mut measured: Vec<VolumeTrip> = Vec::new();
    let mut capped_trips = 0;
    let mut excluded_rows = 0;

    for trip in &data.trips {
        let planned = non_negative(trip.planned_volume).filter(|p| *p > 0.0);
        let (Some(planned), Some(actual)) = (planned, non_negative(trip.actual_volume)) else {
            excluded_rows += 1;
            continue;
        };
        let raw = actual / planned * 100.0;
        if raw > cap {
            capped_trips += 1;
        }
        measured.push(VolumeTrip {
            trip_id: trip.trip_id.clone(),
            transporter_id: trip.transporter_id.clone(),
            planned_volume: planned,
            actual_volume: actual,
            fulfillment_pct: raw.min(cap),
        });
    }

    let fulfillment: Vec<f64> = measured.iter().map(|m| m.fulfillment_pct).collect();
    let variance: Vec<f64> = measured
        .iter()
        .map(|m| m.actual_volume - m.planned_volume)
        .collect();

    let mut per_transporter: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    let mut unassigned_trips = 0;
    for m in &measured {
        match m.transporter_id.as_deref() {
            Some(t) => per_transporter.entry(t).or_default().push(m.fulfillment_pct),
            None => unassigned_trips += 1,
        }
    }
    let by_transporter = per_transporter
        .into_iter()
        .map(|(t, series)| (t.to_string(), round2(mean(&series))))
        .collect();

    let mut worst_underperformers: Vec<VolumeTrip> = measured
        .iter()
        .filter(|m| m.actual_volume < m.planned_volume)
        .map(|m| VolumeTrip {
            planned_volume: round2(m.planned_volume),
            actual_volume: round2(m.actual_volume),
            fulfillment_pct: round2(m.fulfillment_pct),
            ..m.clone()
        })
        .collect();
    worst_underperformers.sort_by(|a, b| {
        asc_then(a.fulfillment_pct, b.fulfillment_pct, &a.trip_id, &b.trip_id)
    });
    worst_underperformers.truncate(settings.top_n);

    Ok(DeliveryVolumeKpi {
        avg_fulfillment_pct: round2(mean(&fulfillment)),
        avg_volume_variance: round2(mean(&variance)),
        total_planned_volume: round2(measured.iter().map(|m| m.planned_volume).sum()),
        total_actual_volume: round2(measured.iter().map(|m| m.actual_volume).sum()),
        over_delivered_trips: variance.iter().filter(|v| **v > 0.0).count(),
        under_delivered_trips: variance.iter().filter(|v| **v < 0.0).count(),
        exact_trips: variance.iter().filter(|v| **v == 0.0).count(),
        fulfillment_cap_pct: cap,
        capped_trips,
        measured_trips: measured.len(),
        worst_underperformers,
        by_transporter,
        unassigned_trips,
        excluded_rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::TripRecord;
    use crate::kpis::fixtures::trip;

    fn load(id: &str, planned: Option<f64>, actual: Option<f64>) -> TripRecord {
        TripRecord {
            planned_volume: planned,
            actual_volume: actual,
            transporter_id: Some("T1".into()),
            ..trip(id)
        }
    }

    #[test]
    fn test_fulfillment_and_counts() {
        let data = TripDataset::new(vec![
            load("full", Some(10.0), Some(10.0)),
            load("short", Some(10.0), Some(8.0)),
            load("over", Some(10.0), Some(12.0)),
        ]);
        let kpi = compute(&data, &KpiSettings::default()).unwrap();

        assert_eq!(kpi.avg_fulfillment_pct, 100.0);
        assert_eq!(kpi.avg_volume_variance, 0.0);
        assert_eq!(kpi.total_planned_volume, 30.0);
        assert_eq!(kpi.exact_trips, 1);
        assert_eq!(kpi.under_delivered_trips, 1);
        assert_eq!(kpi.over_delivered_trips, 1);
        assert_eq!(kpi.worst_underperformers.len(), 1);
        assert_eq!(kpi.worst_underperformers[0].fulfillment_pct, 80.0);
        assert_eq!(kpi.by_transporter["T1"], 100.0);
        assert_eq!(kpi.unassigned_trips, 0);
    }

    #[test]
    fn test_trips_without_transporter_are_counted() {
        let data = TripDataset::new(vec![
            load("assigned", Some(10.0), Some(9.0)),
            TripRecord {
                transporter_id: None,
                ..load("loose", Some(10.0), Some(5.0))
            },
        ]);
        let kpi = compute(&data, &KpiSettings::default()).unwrap();

        assert_eq!(kpi.by_transporter.len(), 1);
        assert_eq!(kpi.by_transporter["T1"], 90.0);
        assert_eq!(kpi.unassigned_trips, 1);
        assert_eq!(kpi.measured_trips, 2);
    }

    #[test]
    fn test_fulfillment_is_capped() {
        let data = TripDataset::new(vec![load("huge", Some(10.0), Some(40.0))]);
        let kpi = compute(&data, &KpiSettings::default()).unwrap();

        assert_eq!(kpi.avg_fulfillment_pct, 150.0);
        assert_eq!(kpi.capped_trips, 1);
        assert_eq!(kpi.avg_volume_variance, 30.0);
    }

    #[test]
    fn test_zero_or_missing_plan_is_excluded() {
        let data = TripDataset::new(vec![
            load("zero", Some(0.0), Some(5.0)),
            load("none", None, Some(5.0)),
            load("neg", Some(5.0), Some(-1.0)),
        ]);
        let kpi = compute(&data, &KpiSettings::default()).unwrap();

        assert_eq!(kpi.excluded_rows, 3);
        assert_eq!(kpi.measured_trips, 0);
        assert_eq!(kpi.avg_fulfillment_pct, 0.0);
    }
}
