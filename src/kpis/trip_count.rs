use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::KpiSettings;
use crate::dataset::TripDataset;
use crate::error::MetricError;
use crate::kpis::utility::{mean, round2};

/// Trips per day for one vehicle, over the days it was active.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleTripCount {
    pub vehicle_id: String,
    pub plate_number: Option<String>,
    pub vehicle_type: Option<String>,
    pub avg_daily_trips: f64,
    pub max_daily_trips: usize,
    pub total_trips: usize,
    pub active_days: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TripCountKpi {
    pub avg_trips_per_vehicle_per_day: f64,
    pub max_trips_per_vehicle_per_day: usize,
    pub vehicle_days: usize,
    pub vehicle_performance: Vec<VehicleTripCount>,
    /// Mean trips per vehicle-day by vehicle type. Empty without the vehicle table.
    pub by_vehicle_type: BTreeMap<String, f64>,
    /// Trips without a vehicle or a departure day.
    pub excluded_rows: usize,
}

pub fn compute(data: &TripDataset, _settings: &KpiSettings) -> Result<TripCountKpi, MetricError> {
    let mut counts: BTreeMap<(&str, NaiveDate), usize> = BTreeMap::new();
    let mut excluded_rows = 0;

    for trip in &data.trips {
        match (trip.vehicle_id.as_deref(), trip.reference_date()) {
            (Some(vehicle), Some(day)) => *counts.entry((vehicle, day)).or_default() += 1,
            _ => excluded_rows += 1,
        }
    }

    let daily: Vec<f64> = counts.values().map(|c| *c as f64).collect();
    let vehicles = data.vehicle_index();

    let mut per_vehicle: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for ((vehicle, _), count) in &counts {
        per_vehicle.entry(*vehicle).or_default().push(*count);
    }

    let mut by_type_series: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    let vehicle_performance = per_vehicle
        .into_iter()
        .map(|(vehicle_id, days)| {
            let dim = vehicles.as_ref().and_then(|idx| idx.get(vehicle_id).copied());
            let vehicle_type = dim.and_then(|v| v.vehicle_type.clone());
            let series: Vec<f64> = days.iter().map(|c| *c as f64).collect();

            if let Some(t) = &vehicle_type {
                by_type_series.entry(t.clone()).or_default().extend(series.iter().copied());
            }

            VehicleTripCount {
                vehicle_id: vehicle_id.to_string(),
                plate_number: dim.and_then(|v| v.plate_number.clone()),
                vehicle_type,
                avg_daily_trips: round2(mean(&series)),
                max_daily_trips: days.iter().copied().max().unwrap_or(0),
                total_trips: days.iter().sum(),
                active_days: days.len(),
            }
        })
        .collect();

    Ok(TripCountKpi {
        avg_trips_per_vehicle_per_day: round2(mean(&daily)),
        max_trips_per_vehicle_per_day: counts.values().copied().max().unwrap_or(0),
        vehicle_days: counts.len(),
        vehicle_performance,
        by_vehicle_type: by_type_series
            .into_iter()
            .map(|(t, series)| (t, round2(mean(&series))))
            .collect(),
        excluded_rows,
    })
}
