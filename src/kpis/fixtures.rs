//! Builders shared by calculator tests.

use chrono::NaiveDateTime;

use crate::dataset::{Transporter, TripRecord, Vehicle};

pub fn at(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
}

pub fn trip(id: &str) -> TripRecord {
    TripRecord {
        trip_id: id.to_string(),
        ..Default::default()
    }
}

/// A trip for `vehicle` departing and arriving at the given times.
pub fn run(id: &str, vehicle: &str, departure: &str, arrival: &str) -> TripRecord {
    TripRecord {
        trip_id: id.to_string(),
        vehicle_id: Some(vehicle.to_string()),
        actual_departure: Some(at(departure)),
        actual_arrival: Some(at(arrival)),
        ..Default::default()
    }
}

pub fn vehicle(id: &str, plate: &str, vehicle_type: &str) -> Vehicle {
    Vehicle {
        vehicle_id: id.to_string(),
        plate_number: Some(plate.to_string()),
        vehicle_type: Some(vehicle_type.to_string()),
    }
}

pub fn transporter(id: &str, name: &str) -> Transporter {
    Transporter {
        transporter_id: id.to_string(),
        name: Some(name.to_string()),
    }
}
