//! Turnaround time: hours a vehicle spends at each stop.
//!
//! The origin stop runs from `loading_start` to `actual_departure`; the
//! destination stop from `actual_arrival` to `unloading_end`.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::KpiSettings;
use crate::dataset::{LocationKey, LocationType, TripDataset};
use crate::error::MetricError;
use crate::kpis::utility::{desc_then, hours_between, max, mean, round2, stddev};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationTypeTat {
    pub avg_tat_hours: f64,
    pub stop_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationTat {
    #[serde(flatten)]
    pub location: LocationKey,
    pub avg_tat_hours: f64,
    pub min_tat_hours: f64,
    pub max_tat_hours: f64,
    pub stop_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnaroundTimeKpi {
    pub overall_avg_tat_hours: f64,
    pub stddev_tat_hours: f64,
    pub measured_stops: usize,
    pub by_location_type: BTreeMap<LocationType, LocationTypeTat>,
    pub top_bottleneck_locations: Vec<LocationTat>,
    /// Trips that yielded no usable stop sample.
    pub excluded_rows: usize,
    /// Stop samples dropped because completion preceded arrival.
    pub negative_samples: usize,
}

struct StopSample {
    location: Option<LocationKey>,
    hours: f64,
}

fn sample(
    arrival: Option<NaiveDateTime>,
    completion: Option<NaiveDateTime>,
    location: Option<LocationKey>,
) -> Option<Result<StopSample, ()>> {
    let hours = hours_between(arrival?, completion?);
    if hours < 0.0 {
        return Some(Err(()));
    }
    Some(Ok(StopSample { location, hours }))
}

pub fn compute(
    data: &TripDataset,
    settings: &KpiSettings,
) -> Result<TurnaroundTimeKpi, MetricError> {
    let mut samples = Vec::new();
    let mut excluded_rows = 0;
    let mut negative_samples = 0;

    for trip in &data.trips {
        let stops = [
            sample(trip.loading_start, trip.actual_departure, trip.origin_key()),
            sample(trip.actual_arrival, trip.unloading_end, trip.destination_key()),
        ];

        let mut contributed = false;
        for stop in stops.into_iter().flatten() {
            match stop {
                Ok(s) => {
                    samples.push(s);
                    contributed = true;
                }
                Err(()) => negative_samples += 1,
            }
        }
        if !contributed {
            excluded_rows += 1;
        }
    }

    let hours: Vec<f64> = samples.iter().map(|s| s.hours).collect();
    let overall = mean(&hours);

    let mut by_type: BTreeMap<LocationType, Vec<f64>> = BTreeMap::new();
    let mut by_location: BTreeMap<LocationKey, Vec<f64>> = BTreeMap::new();
    for s in &samples {
        if let Some(key) = &s.location {
            if let Some(location_type) = key.location_type {
                by_type.entry(location_type).or_default().push(s.hours);
            }
            by_location.entry(key.clone()).or_default().push(s.hours);
        }
    }

    let by_location_type = by_type
        .into_iter()
        .map(|(location_type, series)| {
            (
                location_type,
                LocationTypeTat {
                    avg_tat_hours: round2(mean(&series)),
                    stop_count: series.len(),
                },
            )
        })
        .collect();

    let mut locations: Vec<LocationTat> = by_location
        .into_iter()
        .map(|(location, series)| LocationTat {
            location,
            avg_tat_hours: round2(mean(&series)),
            min_tat_hours: round2(series.iter().copied().fold(f64::INFINITY, f64::min)),
            max_tat_hours: round2(max(&series).unwrap_or(0.0)),
            stop_count: series.len(),
        })
        .collect();
    locations.sort_by(|a, b| desc_then(a.avg_tat_hours, b.avg_tat_hours, &a.location, &b.location));
    locations.truncate(settings.top_n);

    Ok(TurnaroundTimeKpi {
        overall_avg_tat_hours: round2(overall),
        stddev_tat_hours: round2(stddev(&hours, overall)),
        measured_stops: samples.len(),
        by_location_type,
        top_bottleneck_locations: locations,
        excluded_rows,
        negative_samples,
    })
}
