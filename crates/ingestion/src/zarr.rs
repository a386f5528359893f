//! Zarr V3 source loader.
//!
//! A provider archive is a Zarr group whose 1-D arrays are coordinates and
//! whose 3-D or 4-D arrays are variables laid out `[time, (level,) lat, lon]`.
//! Dimension labels come from `dimension_names` or the `_ARRAY_DIMENSIONS`
//! attribute.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use grid_harmonizer::{DriverVariable, HarmonizeError, Provenance, SourceDataset};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use zarrs::array::{Array, ElementOwned};
use zarrs::array_subset::ArraySubset;
use zarrs_filesystem::FilesystemStore;

use crate::cf::{self, CfPacking, RawVariable};
use crate::error::{IngestionError, Result};

/// The parts of an array's `zarr.json` the loader needs.
#[derive(Debug, Deserialize)]
struct ArrayMetadata {
    node_type: String,
    #[serde(default)]
    shape: Vec<u64>,
    #[serde(default)]
    data_type: Value,
    #[serde(default)]
    dimension_names: Option<Vec<Option<String>>>,
    #[serde(default)]
    attributes: Map<String, Value>,
}

#[derive(Debug)]
struct ArrayNode {
    name: String,
    shape: Vec<usize>,
    data_type: String,
    dims: Option<Vec<String>>,
    attributes: Map<String, Value>,
}

impl ArrayNode {
    fn attr_f64(&self, name: &str) -> Option<f64> {
        self.attributes.get(name).and_then(Value::as_f64)
    }

    fn attr_str(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(Value::as_str)
    }

    fn is_integral(&self) -> bool {
        self.data_type.starts_with("int") || self.data_type.starts_with("uint")
    }
}

/// Load a Zarr V3 group as a source dataset under the provider's labels.
pub fn load_zarr_source(
    path: &Path,
    provenance: Provenance,
    claimed: Vec<DriverVariable>,
) -> Result<SourceDataset> {
    let nodes = list_arrays(path)?;
    let source_id = provenance.to_string();

    let gridded: Vec<&ArrayNode> = nodes
        .iter()
        .filter(|n| matches!(n.shape.len(), 3 | 4))
        .collect();
    let first = gridded.first().ok_or_else(|| {
        IngestionError::MissingMetadata(format!("{}: no gridded variables", path.display()))
    })?;
    let labels = first
        .dims
        .as_deref()
        .and_then(cf::layout)
        .ok_or_else(|| {
            IngestionError::MissingMetadata(format!(
                "{}: variable '{}' has no dimension names",
                path.display(),
                first.name
            ))
        })?;

    let store = Arc::new(
        FilesystemStore::new(path).map_err(|e| IngestionError::ZarrRead(e.to_string()))?,
    );

    let time_node = find_coordinate(&nodes, &labels[0], &source_id)?;
    let raw_times = read_as_f64(&store, time_node)?;
    let times = cf::decode_times(
        &time_node.name,
        &raw_times,
        time_node.attr_str("units"),
        time_node.is_integral(),
    )?;
    let lats = read_as_f64(&store, find_coordinate(&nodes, &labels[1], &source_id)?)?;
    let lons = read_as_f64(&store, find_coordinate(&nodes, &labels[2], &source_id)?)?;

    let mut variables = Vec::with_capacity(gridded.len());
    for node in gridded {
        let dims = node.dims.clone().unwrap_or_default();
        if cf::layout(&dims).as_ref() != Some(&labels) {
            warn!(
                variable = %node.name,
                dims = ?dims,
                "skipping variable with a different layout"
            );
            continue;
        }
        let packing = CfPacking::from_attrs(|name| node.attr_f64(name));
        let data = packing.unpack(&read_as_f64(&store, node)?);
        if node.shape.len() == 4 && node.shape[1] > 1 {
            debug!(variable = %node.name, levels = node.shape[1], "keeping surface level");
        }
        variables.push(RawVariable {
            name: node.name.clone(),
            dims,
            units: node.attr_str("units").map(str::to_string),
            data: cf::surface_level(data, &node.shape),
        });
    }

    info!(
        provider = %provenance.provider,
        path = %path.display(),
        variables = variables.len(),
        time_steps = times.len(),
        "loaded zarr source"
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

fn find_coordinate<'a>(nodes: &'a [ArrayNode], label: &str, source_id: &str) -> Result<&'a ArrayNode> {
    nodes
        .iter()
        .find(|n| n.name == label && n.shape.len() == 1)
        .ok_or_else(|| HarmonizeError::missing_coordinate(label, source_id).into())
}

/// Every array directly under the group root, sorted by name.
fn list_arrays(path: &Path) -> Result<Vec<ArrayNode>> {
    if !path.join("zarr.json").is_file() {
        return Err(IngestionError::ZarrRead(format!(
            "{} is not a Zarr V3 group",
            path.display()
        )));
    }

    let mut nodes = Vec::new();
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let meta_path = entry.path().join("zarr.json");
        if !meta_path.is_file() {
            continue;
        }
        let meta: ArrayMetadata = serde_json::from_slice(&fs::read(&meta_path)?)
            .map_err(|e| IngestionError::ZarrRead(format!("{}: {}", meta_path.display(), e)))?;
        if meta.node_type != "array" {
            continue;
        }

        let dims = meta
            .dimension_names
            .and_then(|names| names.into_iter().collect::<Option<Vec<String>>>())
            .or_else(|| {
                meta.attributes
                    .get("_ARRAY_DIMENSIONS")
                    .and_then(|v| serde_json::from_value::<Vec<String>>(v.clone()).ok())
            });

        nodes.push(ArrayNode {
            name: entry.file_name().to_string_lossy().into_owned(),
            shape: meta.shape.iter().map(|&d| d as usize).collect(),
            data_type: meta.data_type.as_str().unwrap_or("unsupported").to_string(),
            dims,
            attributes: meta.attributes,
        });
    }
    nodes.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(nodes)
}

fn read_as_f64(store: &Arc<FilesystemStore>, node: &ArrayNode) -> Result<Vec<f64>> {
    let array = Array::open(store.clone(), &format!("/{}", node.name))
        .map_err(|e| IngestionError::ZarrRead(format!("{}: {}", node.name, e)))?;

    Ok(match node.data_type.as_str() {
        "float64" => retrieve::<f64>(&array, &node.name)?,
        "float32" => widen(retrieve::<f32>(&array, &node.name)?),
        "int64" => retrieve::<i64>(&array, &node.name)?
            .into_iter()
            .map(|v| v as f64)
            .collect(),
        "int32" => widen(retrieve::<i32>(&array, &node.name)?),
        "int16" => widen(retrieve::<i16>(&array, &node.name)?),
        other => {
            return Err(IngestionError::ZarrRead(format!(
                "{}: unsupported data type {}",
                node.name, other
            )))
        }
    })
}

fn retrieve<T: ElementOwned>(array: &Array<FilesystemStore>, name: &str) -> Result<Vec<T>> {
    let subset = ArraySubset::new_with_shape(array.shape().to_vec());
    array
        .retrieve_array_subset_elements::<T>(&subset)
        .map_err(|e| IngestionError::ZarrRead(format!("{}: {}", name, e)))
}

fn widen<T: Into<f64>>(values: Vec<T>) -> Vec<f64> {
    values.into_iter().map(Into::into).collect()
}
