use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::KpiSettings;
use crate::dataset::TripDataset;
use crate::error::MetricError;
use crate::kpis::utility::{desc_then, mean, non_negative, round2};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistanceVarianceTrip {
    pub trip_id: String,
    pub vehicle_id: Option<String>,
    pub transporter_id: Option<String>,
    pub planned_distance_km: f64,
    pub actual_distance_km: f64,
    pub variance_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistanceVarianceKpi {
    /// Mean of |variance_pct|.
    pub avg_abs_variance_pct: f64,
    pub avg_variance_pct: f64,
    pub avg_variance_km: f64,
    pub trips_over_planned: usize,
    pub trips_under_planned: usize,
    pub measured_trips: usize,
    pub worst_variance_trips: Vec<DistanceVarianceTrip>,
    /// Mean |variance_pct| per transporter.
    pub by_transporter: BTreeMap<String, f64>,
    /// Measured trips with no transporter, left out of `by_transporter`.
    pub unassigned_trips: usize,
    /// Trips with a planned distance of exactly zero.
    pub zero_planned_distance: usize,
    /// All trips left out, including the zero-distance ones.
    pub excluded_rows: usize,
}

struct Measured<'a> {
    trip_id: &'a str,
    vehicle_id: Option<&'a str>,
    transporter_id: Option<&'a str>,
    planned: f64,
    actual: f64,
    variance_pct: f64,
}

/// Percent deviation of actual from planned distance. `None` unless both are
/// usable and planned is strictly positive.
pub fn variance_pct(planned: Option<f64>, actual: Option<f64>) -> Option<f64> {
    let planned = non_negative(planned).filter(|p| *p > 0.0)?;
    let actual = non_negative(actual)?;
    Some((actual - planned) / planned * 100.0)
}

pub fn compute(
    data: &TripDataset,
    settings: &KpiSettings,
) -> Result<DistanceVarianceKpi, MetricError> {
    let mut measured = Vec::new();
    let mut zero_planned_distance = 0;
    let mut excluded_rows = 0;

    for trip in &data.trips {
        if trip.planned_distance_km == Some(0.0) {
            zero_planned_distance += 1;
        }
        match variance_pct(trip.planned_distance_km, trip.actual_distance_km) {
            Some(variance_pct) => measured.push(Measured {
                trip_id: &trip.trip_id,
                vehicle_id: trip.vehicle_id.as_deref(),
                transporter_id: trip.transporter_id.as_deref(),
                planned: trip.planned_distance_km.unwrap_or_default(),
                actual: trip.actual_distance_km.unwrap_or_default(),
                variance_pct,
            }),
            None => excluded_rows += 1,
        }
    }

    let abs: Vec<f64> = measured.iter().map(|m| m.variance_pct.abs()).collect();
    let signed: Vec<f64> = measured.iter().map(|m| m.variance_pct).collect();
    let km: Vec<f64> = measured.iter().map(|m| m.actual - m.planned).collect();

    let mut per_transporter: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    let mut unassigned_trips = 0;
    for m in &measured {
        match m.transporter_id {
            Some(t) => per_transporter.entry(t).or_default().push(m.variance_pct.abs()),
            None => unassigned_trips += 1,
        }
    }

    let mut ranked: Vec<&Measured> = measured.iter().collect();
    ranked.sort_by(|a, b| {
        desc_then(a.variance_pct.abs(), b.variance_pct.abs(), a.trip_id, b.trip_id)
    });

    let worst_variance_trips = ranked
        .into_iter()
        .take(settings.top_n)
        .map(|m| DistanceVarianceTrip {
            trip_id: m.trip_id.to_string(),
            vehicle_id: m.vehicle_id.map(str::to_string),
            transporter_id: m.transporter_id.map(str::to_string),
            planned_distance_km: round2(m.planned),
            actual_distance_km: round2(m.actual),
            variance_pct: round2(m.variance_pct),
        })
        .collect();

    Ok(DistanceVarianceKpi {
        avg_abs_variance_pct: round2(mean(&abs)),
        avg_variance_pct: round2(mean(&signed)),
        avg_variance_km: round2(mean(&km)),
        trips_over_planned: signed.iter().filter(|v| **v > 0.0).count(),
        trips_under_planned: signed.iter().filter(|v| **v < 0.0).count(),
        measured_trips: measured.len(),
        worst_variance_trips,
        by_transporter: per_transporter
            .into_iter()
            .map(|(t, series)| (t.to_string(), round2(mean(&series))))
            .collect(),
        unassigned_trips,
        zero_planned_distance,
        excluded_rows,
    })
}
