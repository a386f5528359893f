//! Coordinate normalization: canonical labels and longitude conventions.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::{HarmonizeError, Result};
use crate::types::{Axis, CoordinateAxis, GriddedField, SourceDataset, LAT, LON, TIME};

/// Canonical label for a raw coordinate name, with a rank: lower ranks win
/// when several labels map to the same canonical name.
fn canonical_label(name: &str, axis: &CoordinateAxis) -> Option<(&'static str, u8)> {
    let lower = name.to_ascii_lowercase();
    let spatial = |canonical: &'static str, long: &str, nav: &str, plain: &str| {
        if lower == canonical {
            Some((canonical, 0))
        } else if lower.contains(long) || lower == nav {
            Some((canonical, 1))
        } else if lower == plain {
            Some((canonical, 2))
        } else {
            None
        }
    };
    match axis {
        CoordinateAxis::Temporal(_) if lower == TIME => Some((TIME, 0)),
        CoordinateAxis::Temporal(_) if lower.contains("time") => Some((TIME, 1)),
        CoordinateAxis::Spatial(_) => spatial(LAT, "latitude", "nav_lat", "y")
            .or_else(|| spatial(LON, "longitude", "nav_lon", "x")),
        _ => None,
    }
}

/// Rename recognised coordinates to `time`, `lat` and `lon`.
///
/// Accepted spellings are `lat`, `*latitude*`, `nav_lat` and `y` for
/// latitude, the matching set for longitude, and anything containing `time`.
/// When several labels map to the same canonical name, the canonical spelling
/// wins, then the long and `nav_` forms, then `y`/`x`; ties go to the first in
/// label order. Normalizing twice is a no-op.
pub fn normalize_coords(source: &SourceDataset) -> Result<SourceDataset> {
    let mut ranked: BTreeMap<&'static str, (u8, &str)> = BTreeMap::new();
    for (label, axis) in source.coords() {
        let Some((canonical, rank)) = canonical_label(label, axis) else {
            continue;
        };
        match ranked.get(canonical) {
            Some((best, _)) if *best <= rank => {}
            _ => {
                ranked.insert(canonical, (rank, label.as_str()));
            }
        }
    }
    let chosen: BTreeMap<&'static str, &str> =
        ranked.into_iter().map(|(canonical, (_, label))| (canonical, label)).collect();

    for required in [TIME, LAT, LON] {
        if !chosen.contains_key(required) {
            return Err(HarmonizeError::missing_coordinate(required, source.source_id()));
        }
    }

    let mut coords = BTreeMap::new();
    for (label, axis) in source.coords() {
        let renamed = chosen
            .iter()
            .find(|(_, raw)| **raw == label.as_str())
            .map(|(canonical, _)| canonical.to_string());
        if let Some(canonical) = &renamed {
            if canonical != label {
                debug!(provider = %source.provenance.provider, from = %label, to = %canonical, "renamed coordinate");
            }
        }
        coords.insert(renamed.unwrap_or_else(|| label.clone()), axis.clone());
    }

    source.rebuild(coords, source.variables().cloned().collect())
}

/// Longitude numbering convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LonConvention {
    /// -180..180
    Signed,
    /// 0..360
    Positive,
}

impl LonConvention {
    /// Convention an axis is written in; `None` when both would read the same.
    pub fn of(axis: &Axis) -> Option<Self> {
        if axis.max() > 180.0 {
            Some(Self::Positive)
        } else if axis.min() < 0.0 {
            Some(Self::Signed)
        } else {
            None
        }
    }

    fn convert(&self, lon: f64) -> f64 {
        match self {
            Self::Signed => {
                let wrapped = (lon + 180.0).rem_euclid(360.0) - 180.0;
                if wrapped == -180.0 && lon > 0.0 {
                    180.0
                } else {
                    wrapped
                }
            }
            Self::Positive => lon.rem_euclid(360.0),
        }
    }
}

/// Express the longitude axis in `convention`, rolling every variable so the
/// axis comes out ascending. Duplicate longitudes after wrapping (e.g. 0 and
/// 360) keep the first column.
pub fn wrap_longitudes(source: &SourceDataset, convention: LonConvention) -> Result<SourceDataset> {
    let lon = source.lon()?;
    let shape = source.shape()?;

    let converted: Vec<f64> = lon.values().iter().map(|&v| convention.convert(v)).collect();
    if converted.as_slice() == lon.values() {
        return Ok(source.clone());
    }

    let mut order: Vec<usize> = (0..converted.len()).collect();
    order.sort_by(|&a, &b| converted[a].total_cmp(&converted[b]).then(a.cmp(&b)));
    order.dedup_by(|b, a| converted[*a] == converted[*b]);

    let new_lon = Axis::new(order.iter().map(|&i| converted[i]).collect())?;
    let width = new_lon.len();

    let fields: Vec<GriddedField> = source
        .variables()
        .map(|field| {
            let mut data = Vec::with_capacity(shape.time * shape.lat * width);
            for row in field.data.chunks(shape.lon) {
                data.extend(order.iter().map(|&i| row[i]));
            }
            field.with_data(data)
        })
        .collect();

    let mut coords = source.coords().clone();
    coords.insert(LON.to_string(), CoordinateAxis::Spatial(new_lon));
    debug!(provider = %source.provenance.provider, ?convention, "wrapped longitudes");
    source.rebuild(coords, fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Provenance, TimeAxis};
    use chrono::{TimeZone, Utc};

    fn dataset(labels: [&str; 3], lon: Vec<f64>, data: Vec<f32>) -> SourceDataset {
        let mut coords = BTreeMap::new();
        coords.insert(
            labels[0].to_string(),
            CoordinateAxis::Temporal(
                TimeAxis::new(vec![Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()]).unwrap(),
            ),
        );
        coords.insert(labels[1].to_string(), CoordinateAxis::Spatial(Axis::new(vec![10.0]).unwrap()));
        coords.insert(labels[2].to_string(), CoordinateAxis::Spatial(Axis::new(lon).unwrap()));
        SourceDataset::new(Provenance::new("gfs"), coords, vec![GriddedField::new("u10", data)]).unwrap()
    }

    #[test]
    fn test_renames_provider_labels() {
        let source = dataset(["valid_time", "Latitude", "longitude"], vec![1.0, 2.0], vec![0.0, 1.0]);
        let out = normalize_coords(&source).unwrap();
        let labels: Vec<&String> = out.coords().keys().collect();
        assert_eq!(labels, vec!["lat", "lon", "time"]);
        assert_eq!(out.lon().unwrap().values(), &[1.0, 2.0]);
        assert_eq!(out.variable("u10").unwrap().data, vec![0.0, 1.0]);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let source = dataset(["time_counter", "nav_latitude", "lon"], vec![1.0, 2.0], vec![0.0, 1.0]);
        let once = normalize_coords(&source).unwrap();
        let twice = normalize_coords(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_nemo_and_projected_spellings() {
        let source = dataset(["time_counter", "nav_lat", "nav_lon"], vec![1.0, 2.0], vec![0.0, 1.0]);
        let out = normalize_coords(&source).unwrap();
        assert!(out.lat().is_ok() && out.lon().is_ok());

        let source = dataset(["t_time", "y", "x"], vec![1.0, 2.0], vec![0.0, 1.0]);
        let out = normalize_coords(&source).unwrap();
        assert_eq!(out.lon().unwrap().values(), &[1.0, 2.0]);
        assert!(out.coordinate("x").is_none());
    }

    #[test]
    fn test_long_name_beats_plain_x() {
        let base = dataset(["time", "lat", "x"], vec![1.0, 2.0], vec![0.0, 1.0]);
        let mut coords = base.coords().clone();
        coords.insert(
            "longitude".to_string(),
            CoordinateAxis::Spatial(Axis::new(vec![5.0]).unwrap()),
        );
        let source = SourceDataset::new(Provenance::new("gfs"), coords, vec![]).unwrap();
        let out = normalize_coords(&source).unwrap();
        assert_eq!(out.lon().unwrap().values(), &[5.0]);
        assert!(out.coordinate("x").is_some());
    }

    #[test]
    fn test_missing_time_is_fatal() {
        let mut coords = BTreeMap::new();
        coords.insert("lat".to_string(), CoordinateAxis::Spatial(Axis::new(vec![0.0]).unwrap()));
        coords.insert("lon".to_string(), CoordinateAxis::Spatial(Axis::new(vec![0.0]).unwrap()));
        coords.insert("step".to_string(), CoordinateAxis::Spatial(Axis::new(vec![0.0]).unwrap()));
        let source = SourceDataset::new(Provenance::new("odd"), coords, vec![]).unwrap();
        let err = normalize_coords(&source).unwrap_err();
        assert!(matches!(err, HarmonizeError::MissingCoordinate { ref coordinate, .. } if coordinate == "time"));
    }

    #[test]
    fn test_wrap_to_signed_rolls_data() {
        let source = normalize_coords(&dataset(
            ["time", "lat", "lon"],
            vec![0.0, 90.0, 180.0, 270.0],
            vec![0.0, 1.0, 2.0, 3.0],
        ))
        .unwrap();
        assert_eq!(LonConvention::of(source.lon().unwrap()), Some(LonConvention::Positive));

        let out = wrap_longitudes(&source, LonConvention::Signed).unwrap();
        assert_eq!(out.lon().unwrap().values(), &[-90.0, 0.0, 90.0, 180.0]);
        assert_eq!(out.variable("u10").unwrap().data, vec![3.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_wrap_drops_seam_duplicate() {
        let source = normalize_coords(&dataset(
            ["time", "lat", "lon"],
            vec![-180.0, 0.0, 180.0],
            vec![1.0, 2.0, 3.0],
        ))
        .unwrap();
        let out = wrap_longitudes(&source, LonConvention::Positive).unwrap();
        assert_eq!(out.lon().unwrap().values(), &[0.0, 180.0]);
        assert_eq!(out.variable("u10").unwrap().data, vec![2.0, 1.0]);
    }
}
