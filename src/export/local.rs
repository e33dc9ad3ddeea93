//! Local snapshot files and log output for KPI envelopes.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::envelope::KpiEnvelope;

const SNAPSHOT_PREFIX: &str = "operations_kpis_";

/// Logs an envelope using Rust's debug pretty-print format.
pub fn print_pretty(envelope: &KpiEnvelope) {
    debug!("{:#?}", envelope);
}

/// Logs an envelope as pretty-printed JSON.
pub fn print_json(envelope: &KpiEnvelope) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(envelope)?);
    Ok(())
}

/// `operations_kpis_YYYYMMDD_HHMMSS.json`; names sort chronologically.
pub fn snapshot_file_name(at: DateTime<Utc>) -> String {
    format!("{SNAPSHOT_PREFIX}{}.json", at.format("%Y%m%d_%H%M%S"))
}

fn is_snapshot(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("json")
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(SNAPSHOT_PREFIX))
}

/// Writes `value` as pretty JSON into `dir`, creating the directory if needed.
pub fn write_snapshot(dir: &Path, value: &impl Serialize, at: DateTime<Utc>) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(snapshot_file_name(at));
    fs::write(&path, serde_json::to_vec_pretty(value)?)?;
    info!(path = %path.display(), "Snapshot written");
    Ok(path)
}

/// Deletes all but the newest `keep` snapshots in `dir`. Returns the removed paths.
pub fn prune_snapshots(dir: &Path, keep: usize) -> Result<Vec<PathBuf>> {
    let mut snapshots = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_snapshot(&path) {
            snapshots.push(path);
        }
    }
    snapshots.sort();

    let excess = snapshots.len().saturating_sub(keep);
    let removed: Vec<PathBuf> = snapshots.into_iter().take(excess).collect();
    for path in &removed {
        fs::remove_file(path)?;
        debug!(path = %path.display(), "Old snapshot removed");
    }
    Ok(removed)
}
