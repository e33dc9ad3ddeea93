use chrono::Datelike;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::KpiSettings;
use crate::dataset::TripDataset;
use crate::error::MetricError;
use crate::kpis::utility::{desc_then, mean, non_negative, round2};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleDowntime {
    pub vehicle_id: String,
    pub plate_number: Option<String>,
    pub vehicle_type: Option<String>,
    pub avg_monthly_downtime_hours: f64,
    pub total_downtime_hours: f64,
    pub months_recorded: usize,
    pub needs_maintenance: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaintenanceDowntimeKpi {
    pub avg_downtime_hours_per_vehicle_month: f64,
    pub threshold_hours: f64,
    pub vehicles_needing_maintenance: usize,
    /// Highest downtime first.
    pub maintenance_details: Vec<VehicleDowntime>,
    pub by_vehicle_type: BTreeMap<String, f64>,
    pub excluded_rows: usize,
}

pub fn compute(
    data: &TripDataset,
    settings: &KpiSettings,
) -> Result<MaintenanceDowntimeKpi, MetricError> {
    let vehicles = data
        .vehicle_index()
        .ok_or_else(|| MetricError::data_unavailable("vehicle table unavailable"))?;

    let mut monthly: BTreeMap<(&str, i32, u32), f64> = BTreeMap::new();
    let mut excluded_rows = 0;
    for trip in &data.trips {
        let (Some(vehicle), Some(day), Some(hours)) = (
            trip.vehicle_id.as_deref(),
            trip.reference_date(),
            non_negative(trip.maintenance_hours),
        ) else {
            excluded_rows += 1;
            continue;
        };
        *monthly.entry((vehicle, day.year(), day.month())).or_default() += hours;
    }

    let mut per_vehicle: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for ((vehicle, _, _), hours) in &monthly {
        per_vehicle.entry(*vehicle).or_default().push(*hours);
    }

    let mut by_type_series: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    let mut per_vehicle_avg: Vec<f64> = Vec::new();
    let mut maintenance_details: Vec<VehicleDowntime> = per_vehicle
        .into_iter()
        .map(|(vehicle_id, months)| {
            let dim = vehicles.get(vehicle_id).copied();
            let avg = mean(&months);
            per_vehicle_avg.push(avg);
            let vehicle_type = dim.and_then(|v| v.vehicle_type.clone());
            if let Some(t) = &vehicle_type {
                by_type_series.entry(t.clone()).or_default().push(avg);
            }
            VehicleDowntime {
                vehicle_id: vehicle_id.to_string(),
                plate_number: dim.and_then(|v| v.plate_number.clone()),
                vehicle_type,
                avg_monthly_downtime_hours: round2(avg),
                total_downtime_hours: round2(months.iter().sum()),
                months_recorded: months.len(),
                needs_maintenance: avg > settings.maintenance_threshold_hours,
            }
        })
        .collect();

    maintenance_details.sort_by(|a, b| {
        desc_then(
            a.avg_monthly_downtime_hours,
            b.avg_monthly_downtime_hours,
            &a.vehicle_id,
            &b.vehicle_id,
        )
    });

    Ok(MaintenanceDowntimeKpi {
        avg_downtime_hours_per_vehicle_month: round2(mean(&per_vehicle_avg)),
        threshold_hours: settings.maintenance_threshold_hours,
        vehicles_needing_maintenance: maintenance_details
            .iter()
            .filter(|d| d.needs_maintenance)
            .count(),
        maintenance_details,
        by_vehicle_type: by_type_series
            .into_iter()
            .map(|(t, series)| (t, round2(mean(&series))))
            .collect(),
        excluded_rows,
    })
}
