//! Zarr V3 fixtures in the layout provider archives use.

use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Map, Value};
use zarrs::array::{ArrayBuilder, DataType, Element, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs::group::GroupBuilder;
use zarrs_filesystem::FilesystemStore;

use crate::generators::SourceBuilder;

/// How the time coordinate is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeEncoding {
    /// int64 seconds since the Unix epoch, no units attribute.
    EpochSeconds,
    /// float64 hours with a CF `hours since 1970-01-01 00:00:00` units attribute.
    CfHours,
}

/// Options for [`write_source_zarr`].
#[derive(Debug, Clone, Copy)]
pub struct ZarrSourceOptions {
    pub time_encoding: TimeEncoding,
    /// Insert a depth axis of this many levels after time. Level 0 holds the
    /// builder's values, deeper levels are offset by 100.
    pub depth_levels: Option<usize>,
}

impl Default for ZarrSourceOptions {
    fn default() -> Self {
        Self {
            time_encoding: TimeEncoding::EpochSeconds,
            depth_levels: None,
        }
    }
}

/// Write the builder's dataset as a Zarr V3 group at `dir`.
pub fn write_source_zarr(dir: &Path, source: &SourceBuilder, options: ZarrSourceOptions) {
    std::fs::create_dir_all(dir).expect("create zarr dir");
    let store = Arc::new(FilesystemStore::new(dir).expect("open filesystem store"));

    let mut attrs = Map::new();
    attrs.insert("title".to_string(), json!("synthetic provider output"));
    GroupBuilder::new()
        .attributes(attrs)
        .build(store.clone(), "/")
        .expect("build group")
        .store_metadata()
        .expect("store group metadata");

    let [time_label, lat_label, lon_label] = source.coordinate_labels().clone();
    let times = source.time_labels();
    let lats = source.latitudes();
    let lons = source.longitudes();

    match options.time_encoding {
        TimeEncoding::EpochSeconds => {
            let seconds: Vec<i64> = times.iter().map(|t| t.timestamp()).collect();
            store_1d(&store, &time_label, DataType::Int64, FillValue::from(i64::MIN), None, &seconds);
        }
        TimeEncoding::CfHours => {
            let hours: Vec<f64> = times.iter().map(|t| t.timestamp() as f64 / 3600.0).collect();
            store_1d(
                &store,
                &time_label,
                DataType::Float64,
                FillValue::from(f64::NAN),
                Some("hours since 1970-01-01 00:00:00"),
                &hours,
            );
        }
    }
    store_1d(&store, &lat_label, DataType::Float64, FillValue::from(f64::NAN), Some("degrees_north"), lats);
    store_1d(&store, &lon_label, DataType::Float64, FillValue::from(f64::NAN), Some("degrees_east"), lons);

    let mut dims = vec![time_label.clone()];
    let mut shape = vec![times.len() as u64];
    if let Some(levels) = options.depth_levels {
        let depths: Vec<f64> = (0..levels).map(|k| k as f64 * 10.0).collect();
        store_1d(&store, "depth", DataType::Float64, FillValue::from(f64::NAN), Some("m"), &depths);
        dims.push("depth".to_string());
        shape.push(levels as u64);
    }
    dims.push(lat_label);
    dims.push(lon_label);
    shape.push(lats.len() as u64);
    shape.push(lons.len() as u64);

    let frame = lats.len() * lons.len();
    for (name, units, data) in source.field_values() {
        let data = match options.depth_levels {
            None => data,
            Some(levels) => {
                let mut out = Vec::with_capacity(data.len() * levels);
                for slab in data.chunks(frame) {
                    for level in 0..levels {
                        out.extend(slab.iter().map(|v| v + 100.0 * level as f32));
                    }
                }
                out
            }
        };
        let mut attrs = Map::new();
        if let Some(units) = units {
            attrs.insert("units".to_string(), json!(units));
        }
        attrs.insert("_ARRAY_DIMENSIONS".to_string(), json!(dims));
        store_array(&store, &name, shape.clone(), DataType::Float32, FillValue::from(f32::NAN), attrs, &data);
    }
}

fn store_1d<T: Element>(
    store: &Arc<FilesystemStore>,
    name: &str,
    data_type: DataType,
    fill_value: FillValue,
    units: Option<&str>,
    data: &[T],
) {
    let mut attrs = Map::new();
    if let Some(units) = units {
        attrs.insert("units".to_string(), json!(units));
    }
    attrs.insert("_ARRAY_DIMENSIONS".to_string(), json!([name]));
    store_array(store, name, vec![data.len() as u64], data_type, fill_value, attrs, data);
}

fn store_array<T: Element>(
    store: &Arc<FilesystemStore>,
    name: &str,
    shape: Vec<u64>,
    data_type: DataType,
    fill_value: FillValue,
    attrs: Map<String, Value>,
    data: &[T],
) {
    let chunk_grid: zarrs::array::ChunkGrid = shape.clone().try_into().expect("chunk grid");
    let array = ArrayBuilder::new(shape.clone(), data_type, chunk_grid, fill_value)
        .attributes(attrs)
        .build(store.clone(), &format!("/{}", name))
        .expect("build array");
    array.store_metadata().expect("store array metadata");
    array
        .store_array_subset_elements(&ArraySubset::new_with_shape(shape), data)
        .expect("store array data");
}
