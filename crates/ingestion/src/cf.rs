//! CF-convention decoding shared by the array-file loaders.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use field_common::CfTimeUnits;
use grid_harmonizer::{
    Axis, CoordinateAxis, DriverVariable, GriddedField, Provenance, SourceDataset, TimeAxis,
};
use tracing::debug;

use crate::error::{IngestionError, Result};

/// `scale_factor` / `add_offset` / `_FillValue` of one variable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct CfPacking {
    pub scale: f64,
    pub offset: f64,
    pub fill: Option<f64>,
}

impl Default for CfPacking {
    fn default() -> Self {
        Self {
            scale: 1.0,
            offset: 0.0,
            fill: None,
        }
    }
}

impl CfPacking {
    /// Read the packing attributes through `attr`; `missing_value` stands in for `_FillValue`.
    pub fn from_attrs(attr: impl Fn(&str) -> Option<f64>) -> Self {
        Self {
            scale: attr("scale_factor").unwrap_or(1.0),
            offset: attr("add_offset").unwrap_or(0.0),
            fill: attr("_FillValue").or_else(|| attr("missing_value")),
        }
    }

    pub fn unpack(&self, raw: &[f64]) -> Vec<f32> {
        raw.iter()
            .map(|&v| match self.fill {
                Some(fill) if v == fill => f32::NAN,
                _ if v.is_nan() => f32::NAN,
                _ => (v * self.scale + self.offset) as f32,
            })
            .collect()
    }
}

/// Decode a time coordinate. Without units, integers are seconds since the epoch.
pub(crate) fn decode_times(
    label: &str,
    values: &[f64],
    units: Option<&str>,
    integral: bool,
) -> Result<Vec<DateTime<Utc>>> {
    let units = match units {
        Some(units) => CfTimeUnits::parse(units).map_err(|e| {
            IngestionError::MissingMetadata(format!("time coordinate '{}': {}", label, e))
        })?,
        None if integral => CfTimeUnits::epoch_seconds(),
        None => {
            return Err(IngestionError::MissingMetadata(format!(
                "time coordinate '{}' has no units",
                label
            )))
        }
    };

    values
        .iter()
        .map(|&v| {
            units.decode(v).ok_or_else(|| {
                IngestionError::MissingMetadata(format!(
                    "time coordinate '{}' holds undecodable value {}",
                    label, v
                ))
            })
        })
        .collect()
}

/// Keep level 0 of a `[time, level, lat, lon]` array.
pub(crate) fn surface_level(data: Vec<f32>, shape: &[usize]) -> Vec<f32> {
    match shape {
        [nt, nlev, nlat, nlon] if *nlev > 1 => {
            let frame = nlat * nlon;
            let mut out = Vec::with_capacity(nt * frame);
            for t in 0..*nt {
                let start = t * nlev * frame;
                out.extend_from_slice(&data[start..start + frame]);
            }
            out
        }
        _ => data,
    }
}

/// A decoded variable with its dimension labels.
#[derive(Debug, Clone)]
pub(crate) struct RawVariable {
    pub name: String,
    pub dims: Vec<String>,
    pub units: Option<String>,
    pub data: Vec<f32>,
}

/// Labels of the (time, lat, lon) dimensions of a `[time, (level,) lat, lon]` variable.
pub(crate) fn layout(dims: &[String]) -> Option<[String; 3]> {
    match dims {
        [t, y, x] | [t, _, y, x] => Some([t.clone(), y.clone(), x.clone()]),
        _ => None,
    }
}

/// Assemble a source dataset under the provider's own labels.
pub(crate) fn build_source(
    provenance: Provenance,
    claimed: Vec<DriverVariable>,
    labels: &[String; 3],
    times: Vec<DateTime<Utc>>,
    lats: Vec<f64>,
    lons: Vec<f64>,
    variables: Vec<RawVariable>,
) -> Result<SourceDataset> {
    let mut coords = BTreeMap::new();
    coords.insert(labels[0].clone(), CoordinateAxis::Temporal(TimeAxis::new(times)?));
    coords.insert(labels[1].clone(), CoordinateAxis::Spatial(Axis::new(lats)?));
    coords.insert(labels[2].clone(), CoordinateAxis::Spatial(Axis::new(lons)?));

    let fields = variables
        .into_iter()
        .map(|v| {
            debug!(variable = %v.name, dims = ?v.dims, "decoded variable");
            let field = GriddedField::new(v.name, v.data);
            match v.units {
                Some(units) => field.with_units(units),
                None => field,
            }
        })
        .collect();

    Ok(SourceDataset::new(provenance, coords, fields)?.with_claims(claimed))
}
