use chrono::{Duration, NaiveDateTime};
use serde::Serialize;

use crate::config::KpiSettings;
use crate::dataset::TripDataset;
use crate::error::MetricError;
use crate::kpis::utility::{desc_then, max, mean, minutes_between, pct, round2};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DelayedTrip {
    pub trip_id: String,
    pub vehicle_id: Option<String>,
    pub transporter_id: Option<String>,
    pub arrival_delay_minutes: f64,
    pub departure_delay_minutes: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TripDelaysKpi {
    pub departure_delay_pct: f64,
    pub arrival_delay_pct: f64,
    pub delayed_departures: usize,
    pub delayed_arrivals: usize,
    pub measured_departures: usize,
    pub measured_arrivals: usize,
    /// Averages are over delayed trips only.
    pub avg_departure_delay_minutes: f64,
    pub avg_arrival_delay_minutes: f64,
    pub max_departure_delay_minutes: Option<f64>,
    pub max_arrival_delay_minutes: Option<f64>,
    pub worst_delayed_trips: Vec<DelayedTrip>,
    /// Trips with neither a departure nor an arrival pair.
    pub excluded_rows: usize,
}

/// Minutes late beyond the grace window. `Some` only when strictly delayed.
fn delay(
    planned: Option<NaiveDateTime>,
    actual: Option<NaiveDateTime>,
    grace: Duration,
) -> Option<Option<f64>> {
    let (planned, actual) = (planned?, actual?);
    if actual > planned + grace {
        Some(Some(minutes_between(planned, actual)))
    } else {
        Some(None)
    }
}

pub fn compute(data: &TripDataset, settings: &KpiSettings) -> Result<TripDelaysKpi, MetricError> {
    let grace = Duration::minutes(settings.delay_grace_minutes);
    let mut measured_departures = 0;
    let mut measured_arrivals = 0;
    let mut departure_delays = Vec::new();
    let mut arrival_delays = Vec::new();
    let mut delayed_trips = Vec::new();
    let mut excluded_rows = 0;

    for trip in &data.trips {
        let departure = delay(trip.planned_departure, trip.actual_departure, grace);
        let arrival = delay(trip.planned_arrival, trip.actual_arrival, grace);

        if departure.is_none() && arrival.is_none() {
            excluded_rows += 1;
            continue;
        }
        if let Some(d) = departure {
            measured_departures += 1;
            departure_delays.extend(d);
        }
        if let Some(a) = arrival {
            measured_arrivals += 1;
            if let Some(minutes) = a {
                arrival_delays.push(minutes);
                delayed_trips.push(DelayedTrip {
                    trip_id: trip.trip_id.clone(),
                    vehicle_id: trip.vehicle_id.clone(),
                    transporter_id: trip.transporter_id.clone(),
                    arrival_delay_minutes: round2(minutes),
                    departure_delay_minutes: departure.flatten().map(round2),
                });
            }
        }
    }

    delayed_trips.sort_by(|a, b| {
        desc_then(a.arrival_delay_minutes, b.arrival_delay_minutes, &a.trip_id, &b.trip_id)
    });
    delayed_trips.truncate(settings.top_n);

    Ok(TripDelaysKpi {
        departure_delay_pct: round2(pct(departure_delays.len(), measured_departures)),
        arrival_delay_pct: round2(pct(arrival_delays.len(), measured_arrivals)),
        delayed_departures: departure_delays.len(),
        delayed_arrivals: arrival_delays.len(),
        measured_departures,
        measured_arrivals,
        avg_departure_delay_minutes: round2(mean(&departure_delays)),
        avg_arrival_delay_minutes: round2(mean(&arrival_delays)),
        max_departure_delay_minutes: max(&departure_delays).map(round2),
        max_arrival_delay_minutes: max(&arrival_delays).map(round2),
        worst_delayed_trips: delayed_trips,
        excluded_rows,
    })
}
