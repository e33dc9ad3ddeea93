//! Writing KPI snapshots to disk and S3.

pub mod local;
pub mod s3;

pub use local::{print_json, print_pretty, prune_snapshots, snapshot_file_name, write_snapshot};
pub use s3::write_json_to_s3;
