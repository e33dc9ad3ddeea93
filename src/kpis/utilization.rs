use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::KpiSettings;
use crate::dataset::TripDataset;
use crate::error::MetricError;
use crate::kpis::utility::{asc_then, desc_then, hours_between, max, mean, round2};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleUtilization {
    pub vehicle_id: String,
    pub plate_number: Option<String>,
    pub avg_utilization_pct: f64,
    pub max_utilization_pct: f64,
    pub total_trip_hours: f64,
    pub active_days: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleUtilizationKpi {
    pub avg_utilization_pct: f64,
    pub vehicle_days: usize,
    /// All vehicles, highest average utilization first.
    pub vehicle_utilization: Vec<VehicleUtilization>,
    pub underutilized_vehicles: Vec<VehicleUtilization>,
    pub highly_utilized_vehicles: Vec<VehicleUtilization>,
    pub excluded_rows: usize,
}

/// Share of a 24 hour day spent on trips, capped at 100.
fn day_pct(hours: f64) -> f64 {
    (hours / 24.0 * 100.0).min(100.0)
}

pub fn compute(
    data: &TripDataset,
    settings: &KpiSettings,
) -> Result<VehicleUtilizationKpi, MetricError> {
    let mut hours_by_day: BTreeMap<(&str, NaiveDate), f64> = BTreeMap::new();
    let mut excluded_rows = 0;

    for trip in &data.trips {
        let (Some(vehicle), Some(departure), Some(arrival)) =
            (trip.vehicle_id.as_deref(), trip.actual_departure, trip.actual_arrival)
        else {
            excluded_rows += 1;
            continue;
        };
        let hours = hours_between(departure, arrival);
        if hours < 0.0 {
            excluded_rows += 1;
            continue;
        }
        *hours_by_day.entry((vehicle, departure.date())).or_default() += hours;
    }

    let daily_pct: Vec<f64> = hours_by_day.values().map(|h| day_pct(*h)).collect();
    let vehicles = data.vehicle_index();

    let mut per_vehicle: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for ((vehicle, _), hours) in &hours_by_day {
        per_vehicle.entry(*vehicle).or_default().push(*hours);
    }

    let mut vehicle_utilization: Vec<VehicleUtilization> = per_vehicle
        .into_iter()
        .map(|(vehicle_id, days)| {
            let pcts: Vec<f64> = days.iter().map(|h| day_pct(*h)).collect();
            VehicleUtilization {
                vehicle_id: vehicle_id.to_string(),
                plate_number: vehicles
                    .as_ref()
                    .and_then(|idx| idx.get(vehicle_id))
                    .and_then(|v| v.plate_number.clone()),
                avg_utilization_pct: round2(mean(&pcts)),
                max_utilization_pct: round2(max(&pcts).unwrap_or(0.0)),
                total_trip_hours: round2(days.iter().sum()),
                active_days: days.len(),
            }
        })
        .collect();
    vehicle_utilization.sort_by(|a, b| {
        desc_then(a.avg_utilization_pct, b.avg_utilization_pct, &a.vehicle_id, &b.vehicle_id)
    });

    let mut underutilized_vehicles: Vec<VehicleUtilization> = vehicle_utilization
        .iter()
        .filter(|v| v.avg_utilization_pct < settings.underutilization_threshold_pct)
        .cloned()
        .collect();
    underutilized_vehicles.sort_by(|a, b| {
        asc_then(a.avg_utilization_pct, b.avg_utilization_pct, &a.vehicle_id, &b.vehicle_id)
    });

    let highly_utilized_vehicles = vehicle_utilization
        .iter()
        .filter(|v| v.avg_utilization_pct > settings.high_utilization_threshold_pct)
        .cloned()
        .collect();

    Ok(VehicleUtilizationKpi {
        avg_utilization_pct: round2(mean(&daily_pct)),
        vehicle_days: hours_by_day.len(),
        vehicle_utilization,
        underutilized_vehicles,
        highly_utilized_vehicles,
        excluded_rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kpis::fixtures::{run, trip};

    #[test]
    fn test_six_hours_is_a_quarter_day() {
        let data =
            TripDataset::new(vec![run("1", "V1", "2024-01-01 06:00", "2024-01-01 12:00")]);
        let kpi = compute(&data, &KpiSettings::default()).unwrap();

        assert_eq!(kpi.avg_utilization_pct, 25.0);
        assert_eq!(kpi.vehicle_utilization[0].avg_utilization_pct, 25.0);
        assert_eq!(kpi.underutilized_vehicles.len(), 1);
        assert!(kpi.highly_utilized_vehicles.is_empty());
    }

    #[test]
    fn test_trips_on_one_day_are_summed() {
        let data = TripDataset::new(vec![
            run("1", "V1", "2024-01-01 06:00", "2024-01-01 08:00"),
            run("2", "V1", "2024-01-01 09:00", "2024-01-01 12:00"),
            run("3", "V1", "2024-01-01 14:00", "2024-01-01 15:00"),
        ]);
        let kpi = compute(&data, &KpiSettings::default()).unwrap();

        assert_eq!(kpi.vehicle_days, 1);
        assert_eq!(kpi.avg_utilization_pct, 25.0);
        assert_eq!(kpi.vehicle_utilization[0].total_trip_hours, 6.0);
        assert_eq!(kpi.vehicle_utilization[0].max_utilization_pct, 25.0);
    }

    #[test]
    fn test_day_is_capped_at_full_utilization() {
        let data = TripDataset::new(vec![
            run("1", "V1", "2024-01-01 00:00", "2024-01-01 20:00"),
            run("2", "V1", "2024-01-01 20:30", "2024-01-02 06:30"),
        ]);
        let kpi = compute(&data, &KpiSettings::default()).unwrap();

        assert_eq!(kpi.vehicle_days, 1);
        assert_eq!(kpi.avg_utilization_pct, 100.0);
        assert_eq!(kpi.vehicle_utilization[0].total_trip_hours, 30.0);
        assert_eq!(kpi.highly_utilized_vehicles.len(), 1);
    }

    #[test]
    fn test_thresholds_split_vehicles() {
        let data = TripDataset::new(vec![
            run("1", "busy", "2024-01-01 00:00", "2024-01-01 21:36"),
            run("2", "mid", "2024-01-01 06:00", "2024-01-01 18:00"),
            run("3", "idle", "2024-01-01 06:00", "2024-01-01 08:24"),
            run("4", "idler", "2024-01-01 06:00", "2024-01-01 07:12"),
        ]);
        let kpi = compute(&data, &KpiSettings::default()).unwrap();

        let order: Vec<_> =
            kpi.vehicle_utilization.iter().map(|v| v.vehicle_id.as_str()).collect();
        assert_eq!(order, vec!["busy", "mid", "idle", "idler"]);

        let under: Vec<_> =
            kpi.underutilized_vehicles.iter().map(|v| v.vehicle_id.as_str()).collect();
        assert_eq!(under, vec!["idler", "idle"]);
        assert_eq!(kpi.highly_utilized_vehicles[0].vehicle_id, "busy");
        assert_eq!(kpi.highly_utilized_vehicles[0].avg_utilization_pct, 90.0);
    }

    #[test]
    fn test_incomplete_trips_are_excluded() {
        let mut negative = run("2", "V1", "2024-01-01 12:00", "2024-01-01 06:00");
        negative.vehicle_id = Some("V2".into());
        let data = TripDataset::new(vec![trip("no-times"), negative]);

        let kpi = compute(&data, &KpiSettings::default()).unwrap();
        assert_eq!(kpi.excluded_rows, 2);
        assert_eq!(kpi.avg_utilization_pct, 0.0);
        assert!(kpi.vehicle_utilization.is_empty());
    }
}
