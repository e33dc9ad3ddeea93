pub mod charts;
pub mod config;
pub mod dataset;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod export;
pub mod kpis;
pub mod server;
pub mod source;
