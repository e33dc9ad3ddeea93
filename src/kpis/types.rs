//! Result envelope types shared by the calculators and the orchestrator.

use serde::Serialize;
use std::fmt;

use super::delays::TripDelaysKpi;
use super::distance::DistanceVarianceKpi;
use super::geo::GeoDeviationKpi;
use super::maintenance::MaintenanceDowntimeKpi;
use super::missed::MissedDeliveryKpi;
use super::on_time::OnTimeArrivalKpi;
use super::stops::LoadingUnloadingKpi;
use super::transporter::TransporterPerformanceKpi;
use super::trip_count::TripCountKpi;
use super::turnaround::TurnaroundTimeKpi;
use super::utilization::VehicleUtilizationKpi;
use super::volume::DeliveryVolumeKpi;

/// Identifies one of the twelve operations metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MetricKey {
    TurnaroundTime,
    TripCountPerVehicle,
    DistanceVariance,
    VehicleUtilization,
    OnTimeArrival,
    TripDelays,
    TransporterPerformance,
    MissedDeliveries,
    GeoDeviationEvents,
    LoadingUnloadingTime,
    DeliveryVolumeVariance,
    MaintenanceDowntime,
}

impl MetricKey {
    pub const ALL: [MetricKey; 12] = [
        MetricKey::TurnaroundTime,
        MetricKey::TripCountPerVehicle,
        MetricKey::DistanceVariance,
        MetricKey::VehicleUtilization,
        MetricKey::OnTimeArrival,
        MetricKey::TripDelays,
        MetricKey::TransporterPerformance,
        MetricKey::MissedDeliveries,
        MetricKey::GeoDeviationEvents,
        MetricKey::LoadingUnloadingTime,
        MetricKey::DeliveryVolumeVariance,
        MetricKey::MaintenanceDowntime,
    ];

    /// The key used in the response `data` object.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKey::TurnaroundTime => "turnaround_time",
            MetricKey::TripCountPerVehicle => "trip_count_per_vehicle",
            MetricKey::DistanceVariance => "distance_variance",
            MetricKey::VehicleUtilization => "vehicle_utilization",
            MetricKey::OnTimeArrival => "on_time_arrival",
            MetricKey::TripDelays => "trip_delays",
            MetricKey::TransporterPerformance => "transporter_performance",
            MetricKey::MissedDeliveries => "missed_deliveries",
            MetricKey::GeoDeviationEvents => "geo_deviation_events",
            MetricKey::LoadingUnloadingTime => "loading_unloading_time",
            MetricKey::DeliveryVolumeVariance => "delivery_volume_variance",
            MetricKey::MaintenanceDowntime => "maintenance_downtime",
        }
    }

    /// Human-readable title, as listed by the info endpoint.
    pub fn title(&self) -> &'static str {
        match self {
            MetricKey::TurnaroundTime => {
                "Turnaround Time (TAT) at plant, warehouse, delivery point"
            }
            MetricKey::TripCountPerVehicle => "Trip Count per Vehicle per Day",
            MetricKey::DistanceVariance => "Trip Distance vs Planned Distance",
            MetricKey::VehicleUtilization => "Vehicle Utilization Rate",
            MetricKey::OnTimeArrival => "On-time Arrival Rate",
            MetricKey::TripDelays => "Trip Delays (%) beyond scheduled departure/arrival",
            MetricKey::TransporterPerformance => "Transporter-wise Performance Score",
            MetricKey::MissedDeliveries => "Missed Delivery",
            MetricKey::GeoDeviationEvents => "Geo-deviation Events (off-route movement)",
            MetricKey::LoadingUnloadingTime => "Loading/Unloading Time per Stop",
            MetricKey::DeliveryVolumeVariance => "Planned vs Actual Delivery Volume",
            MetricKey::MaintenanceDowntime => "Maintenance Downtime (hrs/vehicle/month)",
        }
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Marker written in place of a metric that could not be computed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Unavailable {
    pub unavailable: bool,
    pub reason: String,
}

/// Either a computed metric or an explicit unavailable marker.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MetricSlot<T> {
    Available(T),
    Unavailable(Unavailable),
}

impl<T> MetricSlot<T> {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        MetricSlot::Unavailable(Unavailable {
            unavailable: true,
            reason: reason.into(),
        })
    }

    pub fn is_available(&self) -> bool {
        matches!(self, MetricSlot::Available(_))
    }

    pub fn available(&self) -> Option<&T> {
        match self {
            MetricSlot::Available(value) => Some(value),
            MetricSlot::Unavailable(_) => None,
        }
    }

    pub fn unavailable_reason(&self) -> Option<&str> {
        match self {
            MetricSlot::Available(_) => None,
            MetricSlot::Unavailable(marker) => Some(&marker.reason),
        }
    }
}

/// All twelve operations metrics. Every key is always present.
#[derive(Debug, Clone, Serialize)]
pub struct OperationsKpis {
    pub turnaround_time: MetricSlot<TurnaroundTimeKpi>,
    pub trip_count_per_vehicle: MetricSlot<TripCountKpi>,
    pub distance_variance: MetricSlot<DistanceVarianceKpi>,
    pub vehicle_utilization: MetricSlot<VehicleUtilizationKpi>,
    pub on_time_arrival: MetricSlot<OnTimeArrivalKpi>,
    pub trip_delays: MetricSlot<TripDelaysKpi>,
    pub transporter_performance: MetricSlot<TransporterPerformanceKpi>,
    pub missed_deliveries: MetricSlot<MissedDeliveryKpi>,
    pub geo_deviation_events: MetricSlot<GeoDeviationKpi>,
    pub loading_unloading_time: MetricSlot<LoadingUnloadingKpi>,
    pub delivery_volume_variance: MetricSlot<DeliveryVolumeKpi>,
    pub maintenance_downtime: MetricSlot<MaintenanceDowntimeKpi>,
}

impl OperationsKpis {
    /// Availability of each slot, in [`MetricKey::ALL`] order.
    pub fn availability(&self) -> [(MetricKey, bool); 12] {
        [
            (MetricKey::TurnaroundTime, self.turnaround_time.is_available()),
            (MetricKey::TripCountPerVehicle, self.trip_count_per_vehicle.is_available()),
            (MetricKey::DistanceVariance, self.distance_variance.is_available()),
            (MetricKey::VehicleUtilization, self.vehicle_utilization.is_available()),
            (MetricKey::OnTimeArrival, self.on_time_arrival.is_available()),
            (MetricKey::TripDelays, self.trip_delays.is_available()),
            (MetricKey::TransporterPerformance, self.transporter_performance.is_available()),
            (MetricKey::MissedDeliveries, self.missed_deliveries.is_available()),
            (MetricKey::GeoDeviationEvents, self.geo_deviation_events.is_available()),
            (MetricKey::LoadingUnloadingTime, self.loading_unloading_time.is_available()),
            (MetricKey::DeliveryVolumeVariance, self.delivery_volume_variance.is_available()),
            (MetricKey::MaintenanceDowntime, self.maintenance_downtime.is_available()),
        ]
    }

    pub fn available_count(&self) -> usize {
        self.availability().iter().filter(|(_, ok)| *ok).count()
    }

    pub fn unavailable_keys(&self) -> Vec<MetricKey> {
        self.availability()
            .iter()
            .filter(|(_, ok)| !*ok)
            .map(|(key, _)| *key)
            .collect()
    }
}
