//! Track export: GeoJSON positions and a CSV run summary.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::params::ParticleParams;
use crate::runner::TrackSet;

/// A GeoJSON FeatureCollection of particle positions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackFeatureCollection {
    /// Type identifier (always "FeatureCollection").
    #[serde(rename = "type")]
    pub type_: String,

    pub features: Vec<TrackFeature>,
}

impl TrackFeatureCollection {
    pub fn new() -> Self {
        Self {
            type_: "FeatureCollection".to_string(),
            features: Vec::new(),
        }
    }

    pub fn with_feature(mut self, feature: TrackFeature) -> Self {
        self.features.push(feature);
        self
    }

    /// One point per (instant, particle) with a known position.
    pub fn from_tracks(tracks: &TrackSet) -> Self {
        let mut collection = Self::new();
        for (step, t) in tracks.times.iter().enumerate() {
            let t = t.to_rfc3339_opts(SecondsFormat::Secs, true);
            for particle in 0..tracks.n_particles() {
                if let Some((lon, lat)) = tracks.position(step, particle) {
                    collection = collection.with_feature(TrackFeature::point(lon, lat, &t, particle));
                }
            }
        }
        collection
    }
}

impl Default for TrackFeatureCollection {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackFeature {
    /// Type identifier (always "Feature").
    #[serde(rename = "type")]
    pub type_: String,

    pub geometry: TrackGeometry,

    pub properties: TrackProperties,
}

impl TrackFeature {
    pub fn point(lon: f64, lat: f64, t: &str, id: usize) -> Self {
        Self {
            type_: "Feature".to_string(),
            geometry: TrackGeometry::Point {
                coordinates: [lon, lat],
            },
            properties: TrackProperties {
                t: t.to_string(),
                id,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum TrackGeometry {
    /// Coordinates as [longitude, latitude].
    Point { coordinates: [f64; 2] },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackProperties {
    /// Instant in RFC 3339.
    pub t: String,
    /// Particle index.
    pub id: usize,
}

pub fn export_geojson(tracks: &TrackSet, path: &Path) -> Result<()> {
    let collection = TrackFeatureCollection::from_tracks(tracks);
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(writer, &collection)?;
    info!(
        path = %path.display(),
        features = collection.features.len(),
        "Wrote track GeoJSON"
    );
    Ok(())
}

/// Write `metric,value` rows describing a run.
pub fn export_summary(
    tracks: &TrackSet,
    params: &ParticleParams,
    horizon_hours: u32,
    path: &Path,
) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["metric", "value"])?;

    let rows = [
        ("n_particles", tracks.n_particles().to_string()),
        ("horizon_hours", horizon_hours.to_string()),
        ("windage_pct", params.windage_pct.to_string()),
        ("use_stokes", u8::from(params.include_stokes).to_string()),
        ("n_deactivated", tracks.n_deactivated().to_string()),
        (
            "mean_displacement_km",
            format!("{:.3}", tracks.mean_displacement_km()),
        ),
    ];
    for (metric, value) in &rows {
        writer.write_record([*metric, value.as_str()])?;
    }
    writer.flush()?;

    info!(path = %path.display(), "Wrote run summary");
    Ok(())
}
