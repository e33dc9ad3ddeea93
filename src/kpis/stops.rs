//! Loading and unloading time per stop, in minutes.
//!
//! Loading happens at the trip origin, unloading at the destination. A stop
//! is measured only when both ends are present and the end does not precede
//! the start.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::KpiSettings;
use crate::dataset::{LocationKey, LocationType, TripDataset};
use crate::error::MetricError;
use crate::kpis::utility::{desc_then, max, mean, minutes_between, round2};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StopTimes {
    pub avg_loading_minutes: Option<f64>,
    pub avg_unloading_minutes: Option<f64>,
    pub loading_stops: usize,
    pub unloading_stops: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StopLocation {
    #[serde(flatten)]
    pub location: LocationKey,
    pub avg_stop_minutes: f64,
    pub max_stop_minutes: f64,
    pub stop_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadingUnloadingKpi {
    pub avg_loading_minutes: f64,
    pub avg_unloading_minutes: f64,
    pub max_loading_minutes: Option<f64>,
    pub max_unloading_minutes: Option<f64>,
    pub loading_stops: usize,
    pub unloading_stops: usize,
    pub by_location_type: BTreeMap<LocationType, StopTimes>,
    pub bottleneck_locations: Vec<StopLocation>,
    pub excluded_loading_rows: usize,
    pub excluded_unloading_rows: usize,
}

fn stop_minutes(start: Option<NaiveDateTime>, end: Option<NaiveDateTime>) -> Option<f64> {
    let minutes = minutes_between(start?, end?);
    (minutes >= 0.0).then_some(minutes)
}

#[derive(Default)]
struct TypeSeries {
    loading: Vec<f64>,
    unloading: Vec<f64>,
}

pub fn compute(
    data: &TripDataset,
    settings: &KpiSettings,
) -> Result<LoadingUnloadingKpi, MetricError> {
    let mut loading = Vec::new();
    let mut unloading = Vec::new();
    let mut by_type: BTreeMap<LocationType, TypeSeries> = BTreeMap::new();
    let mut by_location: BTreeMap<LocationKey, Vec<f64>> = BTreeMap::new();
    let mut excluded_loading_rows = 0;
    let mut excluded_unloading_rows = 0;

    for trip in &data.trips {
        match stop_minutes(trip.loading_start, trip.loading_end) {
            Some(minutes) => {
                loading.push(minutes);
                if let Some(t) = trip.origin_type {
                    by_type.entry(t).or_default().loading.push(minutes);
                }
                if let Some(key) = trip.origin_key() {
                    by_location.entry(key).or_default().push(minutes);
                }
            }
            None => excluded_loading_rows += 1,
        }

        match stop_minutes(trip.unloading_start, trip.unloading_end) {
            Some(minutes) => {
                unloading.push(minutes);
                if let Some(t) = trip.destination_type {
                    by_type.entry(t).or_default().unloading.push(minutes);
                }
                if let Some(key) = trip.destination_key() {
                    by_location.entry(key).or_default().push(minutes);
                }
            }
            None => excluded_unloading_rows += 1,
        }
    }

    let by_location_type = by_type
        .into_iter()
        .map(|(t, series)| {
            let avg = |s: &[f64]| (!s.is_empty()).then(|| round2(mean(s)));
            (
                t,
                StopTimes {
                    avg_loading_minutes: avg(&series.loading),
                    avg_unloading_minutes: avg(&series.unloading),
                    loading_stops: series.loading.len(),
                    unloading_stops: series.unloading.len(),
                },
            )
        })
        .collect();

    let mut bottleneck_locations: Vec<StopLocation> = by_location
        .into_iter()
        .map(|(location, series)| StopLocation {
            location,
            avg_stop_minutes: round2(mean(&series)),
            max_stop_minutes: round2(max(&series).unwrap_or(0.0)),
            stop_count: series.len(),
        })
        .collect();
    bottleneck_locations.sort_by(|a, b| {
        desc_then(a.avg_stop_minutes, b.avg_stop_minutes, &a.location, &b.location)
    });
    bottleneck_locations.truncate(settings.top_n);

    Ok(LoadingUnloadingKpi {
        avg_loading_minutes: round2(mean(&loading)),
        avg_unloading_minutes: round2(mean(&unloading)),
        max_loading_minutes: max(&loading).map(round2),
        max_unloading_minutes: max(&unloading).map(round2),
        loading_stops: loading.len(),
        unloading_stops: unloading.len(),
        by_location_type,
        bottleneck_locations,
        excluded_loading_rows,
        excluded_unloading_rows,
    })
}
