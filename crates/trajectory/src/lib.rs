//! Reference particle-drift engine.
//!
//! The engine only consumes [`grid_harmonizer::FieldSampler`], so any
//! implementation of that interface (a stitched composite or a synthetic
//! field) can drive it.

pub mod error;
pub mod export;
pub mod params;
pub mod runner;

pub use error::{Result, TrajectoryError};
pub use export::{
    export_geojson, export_summary, TrackFeature, TrackFeatureCollection, TrackGeometry,
    TrackProperties,
};
pub use params::{ParticleParams, ReleaseConfig, Seed};
pub use runner::{haversine_km, DriftRunner, ParticleStatus, TrackSet, EARTH_RADIUS_M};
