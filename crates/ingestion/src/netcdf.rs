//! NetCDF source loader (feature `netcdf`).
//!
//! Mirrors the Zarr loader: 1-D variables are coordinates, 3-D/4-D
//! variables are `[time, (level,) lat, lon]`. Values are read as f64 and CF
//! packing attributes are applied.

use std::path::Path;

use grid_harmonizer::{DriverVariable, HarmonizeError, Provenance, SourceDataset};
use tracing::{info, warn};

use crate::cf::{self, CfPacking, RawVariable};
use crate::error::{IngestionError, Result};

/// Load a NetCDF file as a source dataset under the provider's labels.
pub fn load_netcdf_source(
    path: &Path,
    provenance: Provenance,
    claimed: Vec<DriverVariable>,
) -> Result<SourceDataset> {
    let file = netcdf::open(path)
        .map_err(|e| IngestionError::NetcdfParse(format!("{}: {}", path.display(), e)))?;
    let source_id = provenance.to_string();

    let gridded: Vec<netcdf::Variable> = file
        .variables()
        .filter(|v| matches!(v.dimensions().len(), 3 | 4))
        .collect();
    let first = gridded.first().ok_or_else(|| {
        IngestionError::MissingMetadata(format!("{}: no gridded variables", path.display()))
    })?;
    let labels = cf::layout(&dimension_names(first)).ok_or_else(|| {
        IngestionError::MissingMetadata(format!("{}: unexpected layout", path.display()))
    })?;

    let coordinate = |label: &str| {
        file.variable(label)
            .filter(|v| v.dimensions().len() == 1)
            .ok_or_else(|| IngestionError::from(HarmonizeError::missing_coordinate(label, source_id.clone())))
    };

    let time_var = coordinate(&labels[0])?;
    let raw_times = read_f64(&time_var)?;
    let integral = raw_times.iter().all(|v| v.fract() == 0.0);
    let times = cf::decode_times(
        &labels[0],
        &raw_times,
        get_string_attr(&time_var, "units").as_deref(),
        integral,
    )?;
    let lats = read_f64(&coordinate(&labels[1])?)?;
    let lons = read_f64(&coordinate(&labels[2])?)?;

    let mut variables = Vec::with_capacity(gridded.len());
    for var in &gridded {
        let dims = dimension_names(var);
        if cf::layout(&dims).as_ref() != Some(&labels) {
            warn!(variable = %var.name(), dims = ?dims, "skipping variable with a different layout");
            continue;
        }
        let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
        let packing = CfPacking::from_attrs(|name| get_f64_attr(var, name));
        let data = packing.unpack(&read_f64(var)?);
        variables.push(RawVariable {
            name: var.name(),
            dims,
            units: get_string_attr(var, "units"),
            data: cf::surface_level(data, &shape),
        });
    }

    info!(
        provider = %provenance.provider,
        path = %path.display(),
        variables = variables.len(),
        time_steps = times.len(),
        "loaded netcdf source"
    );

    cf::build_source(
        provenance.with_path(path),
        claimed,
        &labels,
        times,
        lats,
        lons,
        variables,
    )
}

fn dimension_names(var: &netcdf::Variable) -> Vec<String> {
    var.dimensions().iter().map(|d| d.name()).collect()
}

fn read_f64(var: &netcdf::Variable) -> Result<Vec<f64>> {
    var.get_values::<f64, _>(..)
        .map_err(|e| IngestionError::NetcdfParse(format!("{}: {}", var.name(), e)))
}

/// Check if a variable has an attribute with the given name.
/// Avoids HDF5 error output when probing optional attributes.
fn has_attr(var: &netcdf::Variable, name: &str) -> bool {
    var.attributes().any(|attr| attr.name() == name)
}

fn get_f64_attr(var: &netcdf::Variable, name: &str) -> Option<f64> {
    if !has_attr(var, name) {
        return None;
    }
    let attr_value = var.attribute_value(name)?.ok()?;
    f64::try_from(attr_value).ok()
}

fn get_string_attr(var: &netcdf::Variable, name: &str) -> Option<String> {
    if !has_attr(var, name) {
        return None;
    }
    match var.attribute_value(name)?.ok()? {
        netcdf::AttributeValue::Str(s) => Some(s),
        _ => None,
    }
}
