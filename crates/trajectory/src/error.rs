//! Error types for drift runs and track export.

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrajectoryError {
    #[error("No release points configured")]
    NoReleasePoints,

    #[error("Invalid release point [{lat}, {lon}]")]
    InvalidReleasePoint { lat: f64, lon: f64 },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Release at {start} is outside the forcing window {first} .. {last}")]
    StartOutsideForcing {
        start: DateTime<Utc>,
        first: DateTime<Utc>,
        last: DateTime<Utc>,
    },

    #[error("Failed to write output: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode GeoJSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to write CSV: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, TrajectoryError>;
