//! Reading persisted composites back into memory.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use serde_json::Value;
use tracing::info;
use zarrs::array::{Array, ElementOwned};
use zarrs::array_subset::ArraySubset;
use zarrs::group::Group;
use zarrs_filesystem::FilesystemStore;

use crate::composite::{CompositeAttributes, DriverComposite};
use crate::error::{HarmonizeError, Result};
use crate::types::{Axis, DriverVariable, GriddedField, ReferenceGrid, TimeAxis, LAT, LON, TIME};

pub struct CompositeReader;

impl CompositeReader {
    /// Load a composite written by `CompositeWriter`.
    pub fn open(path: &Path) -> Result<DriverComposite> {
        if !path.is_dir() {
            return Err(HarmonizeError::storage(format!(
                "{} is not a composite directory",
                path.display()
            )));
        }
        let store = Arc::new(
            FilesystemStore::new(path).map_err(|e| HarmonizeError::storage(e.to_string()))?,
        );

        let group = Group::open(store.clone(), "/").map_err(|e| HarmonizeError::zarr(e.to_string()))?;
        let attrs = group.attributes();
        let text = |key: &str| attrs.get(key).and_then(Value::as_str).unwrap_or_default().to_string();
        let attributes = CompositeAttributes {
            title: text("title"),
            notes: text("notes"),
            sources: attrs
                .get("sources")
                .and_then(Value::as_array)
                .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
                .unwrap_or_default(),
        };

        let (_, seconds) = read_all::<i64>(&store, TIME)?;
        let instants = seconds
            .iter()
            .map(|&s| {
                Utc.timestamp_opt(s, 0).single().ok_or_else(|| {
                    HarmonizeError::zarr(format!("time value {} is out of range", s))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let time = TimeAxis::new(instants)?;

        let (_, lat) = read_all::<f64>(&store, LAT)?;
        let (_, lon) = read_all::<f64>(&store, LON)?;
        let grid = ReferenceGrid::new(Axis::new(lat)?, Axis::new(lon)?);

        let mut fields = BTreeMap::new();
        for var in DriverVariable::ALL {
            let (array_attrs, data) = read_all::<f32>(&store, var.name())?;
            let units = array_attrs
                .get("units")
                .and_then(Value::as_str)
                .map(str::to_string);
            fields.insert(
                var,
                GriddedField {
                    name: var.name().to_string(),
                    units,
                    data,
                },
            );
        }

        let composite = DriverComposite::new(time, grid, fields, attributes)?;
        info!(path = %path.display(), shape = %composite.shape(), "opened composite");
        Ok(composite)
    }
}

fn read_all<T: ElementOwned>(
    store: &Arc<FilesystemStore>,
    name: &str,
) -> Result<(serde_json::Map<String, Value>, Vec<T>)> {
    let array = Array::open(store.clone(), &format!("/{}", name))
        .map_err(|e| HarmonizeError::zarr(format!("{}: {}", name, e)))?;
    let subset = ArraySubset::new_with_shape(array.shape().to_vec());
    let data = array
        .retrieve_array_subset_elements::<T>(&subset)
        .map_err(|e| HarmonizeError::zarr(format!("{}: {}", name, e)))?;
    Ok((array.attributes().clone(), data))
}
