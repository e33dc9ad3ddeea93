use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::TripSource;
use crate::dataset::{DateRange, Transporter, TripDataset, TripRecord, Vehicle};
use crate::error::SourceError;

const TRIPS_FILE: &str = "trips.csv";
const VEHICLES_FILE: &str = "vehicles.csv";
const TRANSPORTERS_FILE: &str = "transporters.csv";

/// Reads trips from a directory of CSV exports.
///
/// `trips.csv` is required. `vehicles.csv` and `transporters.csv` are
/// optional; a missing or unreadable dimension file leaves that dimension
/// unavailable.
#[derive(Debug, Clone)]
pub struct CsvTripSource {
    dir: PathBuf,
}

impl CsvTripSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn trips_path(&self) -> PathBuf {
        self.dir.join(TRIPS_FILE)
    }
}

fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, SourceError> {
    let file = File::open(path)?;
    let mut rdr = csv::Reader::from_reader(file);
    let mut rows = Vec::new();

    for result in rdr.deserialize() {
        let record: T = result?;
        rows.push(record);
    }

    Ok(rows)
}

/// A malformed row, as opposed to a failure reading the file itself.
fn is_row_error(err: &csv::Error) -> bool {
    matches!(
        err.kind(),
        csv::ErrorKind::Deserialize { .. }
            | csv::ErrorKind::UnequalLengths { .. }
            | csv::ErrorKind::Utf8 { .. }
    )
}

/// Reads trip rows, skipping the ones that do not parse.
///
/// Returns the parsed rows and the number skipped.
fn read_trips(path: &Path) -> Result<(Vec<TripRecord>, usize), SourceError> {
    let file = File::open(path)?;
    let mut rdr = csv::Reader::from_reader(file);
    let mut rows = Vec::new();
    let mut skipped = 0;

    for result in rdr.deserialize() {
        match result {
            Ok(record) => rows.push(record),
            Err(e) if is_row_error(&e) => {
                warn!(path = %path.display(), error = %e, "Skipping unparseable trip row");
                skipped += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok((rows, skipped))
}

/// Reads an optional dimension table, degrading to `None` on any failure.
fn read_dimension<T: DeserializeOwned>(path: &Path) -> Option<Vec<T>> {
    if !path.exists() {
        warn!(path = %path.display(), "Dimension table missing");
        return None;
    }
    match read_rows(path) {
        Ok(rows) => Some(rows),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Dimension table unreadable");
            None
        }
    }
}

fn load(dir: &Path, range: DateRange) -> Result<TripDataset, SourceError> {
    let trips_path = dir.join(TRIPS_FILE);
    if !trips_path.exists() {
        return Err(SourceError::MissingTable {
            path: trips_path.display().to_string(),
        });
    }

    let (all, skipped) = read_trips(&trips_path)?;
    let total = all.len();
    // Undated rows are kept so the engine can count them.
    let trips: Vec<TripRecord> = all
        .into_iter()
        .filter(|t| t.reference_date().is_none_or(|day| range.contains(day)))
        .collect();
    debug!(total, kept = trips.len(), skipped, "Trips read from CSV");

    let vehicles: Option<Vec<Vehicle>> = read_dimension(&dir.join(VEHICLES_FILE));
    let transporters: Option<Vec<Transporter>> = read_dimension(&dir.join(TRANSPORTERS_FILE));

    Ok(TripDataset::new(trips)
        .with_vehicles(vehicles)
        .with_transporters(transporters)
        .with_skipped_rows(skipped))
}

#[async_trait]
impl TripSource for CsvTripSource {
    #[tracing::instrument(skip(self, range), fields(dir = %self.dir.display(), range = %range))]
    async fn fetch(&self, range: &DateRange) -> Result<TripDataset, SourceError> {
        let dir = self.dir.clone();
        let range = *range;
        let dataset = tokio::task::spawn_blocking(move || load(&dir, range)).await??;
        info!(trips = dataset.trips.len(), "CSV fetch complete");
        Ok(dataset)
    }

    async fn ping(&self) -> Result<(), SourceError> {
        let path = self.trips_path();
        if tokio::fs::try_exists(&path).await? {
            Ok(())
        } else {
            Err(SourceError::MissingTable {
                path: path.display().to_string(),
            })
        }
    }

    fn describe(&self) -> String {
        format!("csv:{}", self.dir.display())
    }
}
