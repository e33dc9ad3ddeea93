use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use fleet_kpi::config::KpiSettings;
use fleet_kpi::dataset::{DateRange, Transporter, TripDataset, TripRecord, Vehicle};
use fleet_kpi::engine::KpiEngine;
use fleet_kpi::envelope::KpiEnvelope;
use fleet_kpi::error::{KpiError, SourceError};
use fleet_kpi::kpis::MetricKey;
use fleet_kpi::source::{CsvTripSource, TripSource};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

struct StubSource {
    dataset: TripDataset,
    fetches: AtomicUsize,
    delay: Option<Duration>,
}

impl StubSource {
    fn new(dataset: TripDataset) -> Arc<Self> {
        Arc::new(Self {
            dataset,
            fetches: AtomicUsize::new(0),
            delay: None,
        })
    }

    fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TripSource for StubSource {
    async fn fetch(&self, _range: &DateRange) -> Result<TripDataset, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.dataset.clone())
    }

    async fn ping(&self) -> Result<(), SourceError> {
        Ok(())
    }

    fn describe(&self) -> String {
        "stub".to_string()
    }
}

struct DownSource;

#[async_trait]
impl TripSource for DownSource {
    async fn fetch(&self, _range: &DateRange) -> Result<TripDataset, SourceError> {
        Err(SourceError::MissingTable {
            path: "trip_records".to_string(),
        })
    }

    async fn ping(&self) -> Result<(), SourceError> {
        Err(SourceError::MissingTable {
            path: "trip_records".to_string(),
        })
    }

    fn describe(&self) -> String {
        "down".to_string()
    }
}

fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn at(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
}

fn trip(id: &str) -> TripRecord {
    TripRecord {
        trip_id: id.to_string(),
        vehicle_id: Some("V1".to_string()),
        transporter_id: Some("T1".to_string()),
        actual_departure: Some(at("2024-01-10 06:00")),
        ..Default::default()
    }
}

fn dimensions(trips: Vec<TripRecord>) -> TripDataset {
    TripDataset::new(trips)
        .with_vehicles(Some(vec![Vehicle {
            vehicle_id: "V1".into(),
            plate_number: Some("KA-01".into()),
            vehicle_type: Some("truck".into()),
        }]))
        .with_transporters(Some(vec![Transporter {
            transporter_id: "T1".into(),
            name: Some("Acme".into()),
        }]))
}

fn engine_for(dataset: TripDataset, settings: KpiSettings) -> (KpiEngine, Arc<StubSource>) {
    let source = StubSource::new(dataset);
    (KpiEngine::new(source.clone(), settings), source)
}

async fn january(engine: &KpiEngine) -> KpiEnvelope {
    let report = engine.extract(Some(day("2024-01-01")), Some(day("2024-01-31"))).await.unwrap();
    KpiEnvelope::from_report(report)
}

fn data_json(envelope: &KpiEnvelope) -> Value {
    serde_json::to_value(&envelope.data).unwrap()
}

#[tokio::test]
async fn test_inverted_range_is_rejected_before_fetch() {
    let (engine, source) = engine_for(dimensions(vec![trip("1")]), KpiSettings::default());

    let err = engine
        .extract(Some(day("2024-02-02")), Some(day("2024-02-01")))
        .await
        .unwrap_err();

    assert!(matches!(err, KpiError::InvalidRange { .. }));
    assert_eq!(err.status_code(), 400);
    assert_eq!(source.fetch_count(), 0);
}

#[tokio::test]
async fn test_empty_source_reports_zeros() {
    let (engine, source) = engine_for(TripDataset::new(Vec::new()), KpiSettings::default());
    let envelope = january(&engine).await;

    assert!(envelope.success);
    assert_eq!(source.fetch_count(), 1);
    assert_eq!(envelope.data.available_count(), 12);

    let data = data_json(&envelope);
    assert_eq!(data["turnaround_time"]["overall_avg_tat_hours"], 0.0);
    assert_eq!(data["on_time_arrival"]["on_time_rate_pct"], 0.0);
    assert_eq!(data["missed_deliveries"]["missed_delivery_rate_pct"], 0.0);
    assert_eq!(data["vehicle_utilization"]["vehicle_utilization"], Value::Array(Vec::new()));
    assert_eq!(data["trip_delays"]["max_arrival_delay_minutes"], Value::Null);
}

#[tokio::test]
async fn test_parallel_and_sequential_runs_agree() {
    let mut trips = Vec::new();
    for i in 0..10 {
        trips.push(TripRecord {
            planned_departure: Some(at("2024-01-10 05:45")),
            planned_arrival: Some(at("2024-01-10 10:00")),
            actual_arrival: Some(at(&format!("2024-01-10 10:{:02}", i * 5))),
            planned_distance_km: Some(100.0),
            actual_distance_km: Some(95.0 + i as f64),
            missed_delivery_flag: i % 4 == 0,
            ..trip(&format!("t{i}"))
        });
    }
    let data = dimensions(trips);

    let (parallel, _) = engine_for(data.clone(), KpiSettings::default());
    let (sequential, _) = engine_for(
        data,
        KpiSettings {
            parallel: false,
            ..Default::default()
        },
    );

    let first = data_json(&january(&parallel).await);
    let second = data_json(&january(&parallel).await);
    let inline = data_json(&january(&sequential).await);

    assert_eq!(first, second);
    assert_eq!(first, inline);
}

#[tokio::test]
async fn test_zero_planned_distance_is_excluded() {
    let trips = vec![
        TripRecord {
            planned_distance_km: Some(0.0),
            actual_distance_km: Some(40.0),
            ..trip("zero")
        },
        TripRecord {
            planned_distance_km: Some(100.0),
            actual_distance_km: Some(108.0),
            ..trip("ok")
        },
    ];
    let (engine, _) = engine_for(dimensions(trips), KpiSettings::default());
    let data = data_json(&january(&engine).await);

    assert_eq!(data["distance_variance"]["avg_abs_variance_pct"], 8.0);
    assert_eq!(data["distance_variance"]["zero_planned_distance"], 1);
    assert_eq!(data["distance_variance"]["excluded_rows"], 1);
}

#[tokio::test]
async fn test_on_time_boundary_is_inclusive() {
    let trips = vec![
        TripRecord {
            planned_arrival: Some(at("2024-01-10 10:00")),
            actual_arrival: Some(at("2024-01-10 10:15")),
            ..trip("edge")
        },
        TripRecord {
            planned_arrival: Some(at("2024-01-10 10:00")),
            actual_arrival: Some(at("2024-01-10 10:16")),
            ..trip("late")
        },
    ];
    let (engine, _) = engine_for(dimensions(trips), KpiSettings::default());
    let data = data_json(&january(&engine).await);

    assert_eq!(data["on_time_arrival"]["on_time_trips"], 1);
    assert_eq!(data["on_time_arrival"]["on_time_rate_pct"], 50.0);
}

#[tokio::test]
async fn test_single_vehicle_day_metrics() {
    let trips = vec![TripRecord {
        actual_departure: Some(at("2024-01-10 06:00")),
        actual_arrival: Some(at("2024-01-10 12:00")),
        planned_distance_km: Some(100.0),
        actual_distance_km: Some(108.0),
        ..trip("only")
    }];
    let (engine, _) = engine_for(dimensions(trips), KpiSettings::default());
    let data = data_json(&january(&engine).await);

    assert_eq!(data["vehicle_utilization"]["avg_utilization_pct"], 25.0);
    assert_eq!(data["distance_variance"]["avg_abs_variance_pct"], 8.0);
    assert_eq!(data["trip_count_per_vehicle"]["avg_trips_per_vehicle_per_day"], 1.0);
}

#[tokio::test]
async fn test_missed_delivery_rate() {
    let mut trips: Vec<TripRecord> = (0..4).map(|i| trip(&format!("ok{i}"))).collect();
    trips.push(TripRecord {
        missed_delivery_flag: true,
        missed_delivery_reason: Some("customer closed".into()),
        ..trip("missed")
    });
    let (engine, _) = engine_for(dimensions(trips), KpiSettings::default());
    let data = data_json(&january(&engine).await);

    assert_eq!(data["missed_deliveries"]["missed_delivery_rate_pct"], 20.0);
    assert_eq!(data["missed_deliveries"]["by_reason"]["customer closed"], 1);
}

#[tokio::test]
async fn test_missing_vehicle_table_only_affects_maintenance() {
    let trips = vec![TripRecord {
        maintenance_hours: Some(4.0),
        ..trip("1")
    }];
    let (engine, _) = engine_for(dimensions(trips).with_vehicles(None), KpiSettings::default());
    let envelope = january(&engine).await;

    assert!(envelope.success);
    assert_eq!(envelope.data.available_count(), 11);
    assert_eq!(envelope.data.unavailable_keys(), vec![MetricKey::MaintenanceDowntime]);

    let data = data_json(&envelope);
    assert_eq!(data["maintenance_downtime"]["unavailable"], true);
    assert!(data["maintenance_downtime"]["reason"].as_str().unwrap().contains("vehicle"));
    assert_eq!(data["trip_count_per_vehicle"]["vehicle_days"], 1);
}

#[tokio::test]
async fn test_trips_outside_range_and_undated_are_dropped() {
    let trips = vec![
        trip("in"),
        TripRecord {
            actual_departure: Some(at("2024-03-01 06:00")),
            ..trip("later")
        },
        TripRecord {
            actual_departure: None,
            ..trip("undated")
        },
    ];
    let (engine, _) = engine_for(dimensions(trips), KpiSettings::default());
    let report = engine.extract(Some(day("2024-01-01")), Some(day("2024-01-31"))).await.unwrap();

    assert_eq!(report.trips_in_range, 1);
    assert_eq!(report.undated_trips, 1);
}

#[tokio::test]
async fn test_unreachable_source_is_upstream_error() {
    let engine = KpiEngine::new(Arc::new(DownSource), KpiSettings::default());

    let err = engine.extract(None, None).await.unwrap_err();
    assert!(matches!(err, KpiError::UpstreamUnavailable { .. }));
    assert_eq!(err.status_code(), 503);
    assert!(engine.health().await.is_err());
}

#[tokio::test]
async fn test_slow_source_times_out() {
    let source = Arc::new(StubSource {
        dataset: TripDataset::default(),
        fetches: AtomicUsize::new(0),
        delay: Some(Duration::from_secs(30)),
    });
    let settings = KpiSettings {
        fetch_timeout_secs: 1,
        ..Default::default()
    };
    let engine = KpiEngine::new(source, settings);

    let err = engine.extract(None, None).await.unwrap_err();
    assert!(err.to_string().contains("timed out"));
}

#[tokio::test]
async fn test_csv_source_end_to_end() {
    let dir = std::env::temp_dir().join(format!("fleet_kpi_it_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();

    std::fs::write(
        dir.join("trips.csv"),
        "\
trip_id,vehicle_id,transporter_id,origin_type,destination_type,planned_arrival,actual_departure,actual_arrival,planned_distance_km,actual_distance_km,missed_delivery_flag,maintenance_hours
A,V1,T1,plant,Delivery Point,2024-01-05T12:00:00,2024-01-05T06:00:00,2024-01-05T12:00:00,100,108,false,2
B,V1,T1,warehouse,delivery_point,2024-01-06T12:00:00,2024-01-06T06:00:00,2024-01-06T14:00:00,50,50,true,
",
    )
    .unwrap();
    std::fs::write(dir.join("transporters.csv"), "transporter_id,name\nT1,Acme\n").unwrap();

    let engine = KpiEngine::new(Arc::new(CsvTripSource::new(&dir)), KpiSettings::default());
    let envelope = january(&engine).await;
    let data = data_json(&envelope);

    assert!(envelope.success);
    assert_eq!(data["on_time_arrival"]["on_time_rate_pct"], 50.0);
    assert_eq!(data["missed_deliveries"]["missed_delivery_rate_pct"], 50.0);
    assert_eq!(data["distance_variance"]["avg_abs_variance_pct"], 4.0);
    assert_eq!(data["transporter_performance"]["top_performers"][0]["name"], "Acme");
    assert_eq!(data["maintenance_downtime"]["unavailable"], true);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_malformed_csv_row_does_not_fail_the_request() {
    let dir = std::env::temp_dir().join(format!("fleet_kpi_it_bad_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();

    std::fs::write(
        dir.join("trips.csv"),
        "\
trip_id,vehicle_id,actual_departure,actual_arrival
A,V1,2024-01-05T06:00:00,2024-01-05T12:00:00
B,V1,2024-01-06 06:00:00,2024-01-06 12:00:00
",
    )
    .unwrap();

    let engine = KpiEngine::new(Arc::new(CsvTripSource::new(&dir)), KpiSettings::default());
    let report = engine
        .extract(Some(day("2024-01-01")), Some(day("2024-01-31")))
        .await
        .unwrap();

    assert_eq!(report.skipped_rows, 1);
    assert_eq!(report.trips_in_range, 1);
    // Only the two dimension-backed metrics are missing.
    assert_eq!(report.kpis.available_count(), 10);

    std::fs::remove_dir_all(&dir).unwrap();
}
