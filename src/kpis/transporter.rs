//! Transporter scorecard.
//!
//! Each transporter is scored on up to three components, each on a 0-100
//! scale:
//!
//! * on-time arrival rate (trips with both arrival times)
//! * distance adherence, `100 - mean |distance variance %|` clamped to 0-100
//! * delivery reliability, `100 - missed delivery rate`
//!
//! The score is the plain mean of whichever components have data. Trips
//! whose transporter is missing from the dimension table are not scored.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::KpiSettings;
use crate::dataset::{TripDataset, TripRecord};
use crate::error::MetricError;
use crate::kpis::distance::variance_pct;
use crate::kpis::grade::grade;
use crate::kpis::on_time::is_on_time;
use crate::kpis::utility::{asc_then, desc_then, mean, pct, round2};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransporterScore {
    pub transporter_id: String,
    pub name: Option<String>,
    pub total_trips: usize,
    pub on_time_rate_pct: Option<f64>,
    pub distance_score: Option<f64>,
    pub delivery_score: f64,
    pub performance_score: f64,
    pub grade: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransporterPerformanceKpi {
    pub avg_performance_score: f64,
    pub scored_transporters: usize,
    pub top_performers: Vec<TransporterScore>,
    pub bottom_performers: Vec<TransporterScore>,
    pub excluded_rows: usize,
}

/// Scores one transporter. Also returns the unrounded score.
fn score(
    transporter_id: &str,
    name: Option<&str>,
    trips: &[&TripRecord],
    settings: &KpiSettings,
) -> (TransporterScore, f64) {
    let arrivals: Vec<bool> = trips
        .iter()
        .filter_map(|t| is_on_time(t, settings.on_time_grace_minutes))
        .collect();
    let on_time_rate = (!arrivals.is_empty())
        .then(|| pct(arrivals.iter().filter(|ok| **ok).count(), arrivals.len()));

    let variances: Vec<f64> = trips
        .iter()
        .filter_map(|t| variance_pct(t.planned_distance_km, t.actual_distance_km))
        .map(f64::abs)
        .collect();
    let distance_score =
        (!variances.is_empty()).then(|| (100.0 - mean(&variances)).clamp(0.0, 100.0));

    let missed = trips.iter().filter(|t| t.missed_delivery_flag).count();
    let delivery_score = 100.0 - pct(missed, trips.len());

    let components: Vec<f64> = [on_time_rate, distance_score, Some(delivery_score)]
        .into_iter()
        .flatten()
        .collect();
    let performance_score = mean(&components);

    let scored = TransporterScore {
        transporter_id: transporter_id.to_string(),
        name: name.map(str::to_string),
        total_trips: trips.len(),
        on_time_rate_pct: on_time_rate.map(round2),
        distance_score: distance_score.map(round2),
        delivery_score: round2(delivery_score),
        performance_score: round2(performance_score),
        grade: grade(performance_score),
    };
    (scored, performance_score)
}

pub fn compute(
    data: &TripDataset,
    settings: &KpiSettings,
) -> Result<TransporterPerformanceKpi, MetricError> {
    let transporters = data
        .transporter_index()
        .ok_or_else(|| MetricError::data_unavailable("transporter table unavailable"))?;

    let mut trips_by_transporter: BTreeMap<&str, Vec<&TripRecord>> = BTreeMap::new();
    let mut excluded_rows = 0;
    for trip in &data.trips {
        match trip.transporter_id.as_deref().filter(|t| transporters.contains_key(t)) {
            Some(t) => trips_by_transporter.entry(t).or_default().push(trip),
            None => excluded_rows += 1,
        }
    }

    let (scores, overall): (Vec<TransporterScore>, Vec<f64>) = trips_by_transporter
        .iter()
        .map(|(id, trips)| {
            let name = transporters.get(id).and_then(|t| t.name.as_deref());
            score(id, name, trips, settings)
        })
        .unzip();

    let mut top_performers = scores.clone();
    top_performers.sort_by(|a, b| {
        desc_then(a.performance_score, b.performance_score, &a.transporter_id, &b.transporter_id)
    });
    top_performers.truncate(settings.top_n);

    let mut bottom_performers = scores.clone();
    bottom_performers.sort_by(|a, b| {
        asc_then(a.performance_score, b.performance_score, &a.transporter_id, &b.transporter_id)
    });
    bottom_performers.truncate(settings.top_n);

    Ok(TransporterPerformanceKpi {
        avg_performance_score: round2(mean(&overall)),
        scored_transporters: scores.len(),
        top_performers,
        bottom_performers,
        excluded_rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kpis::fixtures::{at, transporter, trip};

    fn haul(
        id: &str,
        transporter_id: &str,
        late: bool,
        variance_km: f64,
        missed: bool,
    ) -> TripRecord {
        TripRecord {
            transporter_id: Some(transporter_id.to_string()),
            planned_arrival: Some(at("2024-01-01 10:00")),
            actual_arrival: Some(at(if late { "2024-01-01 11:00" } else { "2024-01-01 10:00" })),
            planned_distance_km: Some(100.0),
            actual_distance_km: Some(100.0 + variance_km),
            missed_delivery_flag: missed,
            ..trip(id)
        }
    }

    #[test]
    fn test_requires_transporter_table() {
        let data =
            TripDataset::new(vec![haul("1", "T1", false, 0.0, false)]).with_transporters(None);
        let err = compute(&data, &KpiSettings::default()).unwrap_err();
        assert_eq!(err, MetricError::data_unavailable("transporter table unavailable"));
    }

    #[test]
    fn test_perfect_transporter_scores_full_marks() {
        let data = TripDataset::new(vec![haul("1", "T1", false, 0.0, false)])
            .with_transporters(Some(vec![transporter("T1", "Acme Haulage")]));
        let kpi = compute(&data, &KpiSettings::default()).unwrap();

        let t1 = &kpi.top_performers[0];
        assert_eq!(t1.name.as_deref(), Some("Acme Haulage"));
        assert_eq!(t1.performance_score, 100.0);
        assert_eq!(t1.grade, "A+");
        assert_eq!(kpi.avg_performance_score, 100.0);
    }

    #[test]
    fn test_components_are_equally_weighted() {
        // T2: on-time 50, distance 100 - mean(10, 30) = 80, delivery 100 - 50 = 50
        let data = TripDataset::new(vec![
            haul("1", "T1", false, 0.0, false),
            haul("2", "T2", false, 10.0, false),
            haul("3", "T2", true, -30.0, true),
        ])
        .with_transporters(Some(vec![transporter("T1", "Acme"), transporter("T2", "Slow")]));
        let kpi = compute(&data, &KpiSettings::default()).unwrap();

        let t2 = &kpi.bottom_performers[0];
        assert_eq!(t2.transporter_id, "T2");
        assert_eq!(t2.on_time_rate_pct, Some(50.0));
        assert_eq!(t2.distance_score, Some(80.0));
        assert_eq!(t2.delivery_score, 50.0);
        assert_eq!(t2.performance_score, 60.0);
        assert_eq!(t2.grade, "D");
        assert_eq!(kpi.avg_performance_score, 80.0);
    }

    #[test]
    fn test_missing_components_are_skipped() {
        let bare = TripRecord {
            transporter_id: Some("T1".into()),
            missed_delivery_flag: true,
            ..trip("1")
        };
        let ok = TripRecord {
            transporter_id: Some("T1".into()),
            ..trip("2")
        };
        let data = TripDataset::new(vec![bare, ok])
            .with_transporters(Some(vec![transporter("T1", "Acme")]));
        let kpi = compute(&data, &KpiSettings::default()).unwrap();

        let t1 = &kpi.top_performers[0];
        assert_eq!(t1.on_time_rate_pct, None);
        assert_eq!(t1.distance_score, None);
        assert_eq!(t1.performance_score, 50.0);
    }

    #[test]
    fn test_overall_mean_uses_unrounded_scores() {
        // Two transporters at 66.666..% delivery and one at 0%.
        let delivery = |id: &str, t: &str, missed: bool| TripRecord {
            transporter_id: Some(t.to_string()),
            missed_delivery_flag: missed,
            ..trip(id)
        };
        let data = TripDataset::new(vec![
            delivery("1", "T1", false),
            delivery("2", "T1", false),
            delivery("3", "T1", true),
            delivery("4", "T2", false),
            delivery("5", "T2", false),
            delivery("6", "T2", true),
            delivery("7", "T3", true),
        ])
        .with_transporters(Some(vec![
            transporter("T1", "A"),
            transporter("T2", "B"),
            transporter("T3", "C"),
        ]));
        let kpi = compute(&data, &KpiSettings::default()).unwrap();

        assert_eq!(kpi.top_performers[0].performance_score, 66.67);
        assert_eq!(kpi.avg_performance_score, 44.44);
    }

    #[test]
    fn test_unknown_transporters_are_excluded() {
        let mut orphan = haul("2", "T1", false, 0.0, false);
        orphan.transporter_id = None;
        let data = TripDataset::new(vec![haul("1", "T9", false, 0.0, false), orphan])
            .with_transporters(Some(vec![transporter("T1", "Acme")]));
        let kpi = compute(&data, &KpiSettings::default()).unwrap();

        assert_eq!(kpi.excluded_rows, 2);
        assert_eq!(kpi.scored_transporters, 0);
        assert_eq!(kpi.avg_performance_score, 0.0);
    }
}
