//! Zarr V3 writer for driver composites.
//!
//! Layout under the composite root:
//!
//! ```text
//! zarr.json            group: title, notes, sources, history
//! time/                int64 seconds since the Unix epoch
//! lat/, lon/           float64 degrees
//! u_curr/ ... v_wind/  float32 [time, lat, lon], NaN fill
//! ```
//!
//! Everything is written to a hidden staging sibling, verified, and then
//! renamed over the destination, so a failed run never leaves a partial
//! composite at the final path.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zarrs::array::codec::bytes_to_bytes::blosc::{
    BloscCodec, BloscCompressionLevel, BloscCompressor, BloscShuffleMode,
};
use zarrs::array::{Array, ArrayBuilder, DataType, Element, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs::group::GroupBuilder;
use zarrs_filesystem::FilesystemStore;

use crate::composite::DriverComposite;
use crate::config::{CompositeConfig, ZarrCompression};
use crate::error::{HarmonizeError, Result};
use crate::types::{LAT, LON, TIME};

/// Units attribute of the `time` array.
pub const TIME_UNITS: &str = "seconds since 1970-01-01T00:00:00Z";

/// Outcome of a successful write.
#[derive(Debug, Clone)]
pub struct WriteReport {
    pub path: PathBuf,
    /// Array names, coordinates first.
    pub arrays: Vec<String>,
    /// Bytes on disk under the composite root.
    pub bytes_written: u64,
}

/// Writes `DriverComposite`s to local Zarr V3 stores.
pub struct CompositeWriter {
    config: CompositeConfig,
}

impl CompositeWriter {
    pub fn new(config: CompositeConfig) -> Result<Self> {
        config.validate().map_err(HarmonizeError::InvalidConfig)?;
        Ok(Self { config })
    }

    /// Write `composite` to `path`.
    ///
    /// An existing target is only replaced when it is itself a composite
    /// group; any other file or directory is left alone and the write fails.
    pub fn write(&self, composite: &DriverComposite, path: &Path) -> Result<WriteReport> {
        check_replaceable(path)?;
        let staging = staging_path(path)?;
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;

        let written = self
            .write_tree(composite, &staging)
            .and_then(|arrays| verify(composite, &staging, path, &arrays).map(|_| arrays));
        let arrays = match written {
            Ok(arrays) => arrays,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "composite write failed, discarding staging");
                if let Err(cleanup) = fs::remove_dir_all(&staging) {
                    warn!(path = %staging.display(), error = %cleanup, "could not remove staging directory");
                }
                return Err(e);
            }
        };

        if path.exists() {
            fs::remove_dir_all(path)?;
        }
        if let Err(e) = fs::rename(&staging, path) {
            let _ = fs::remove_dir_all(&staging);
            return Err(HarmonizeError::IncompleteWrite {
                path: path.display().to_string(),
                reason: format!("rename from staging failed: {}", e),
            });
        }

        let bytes_written = WalkDir::new(path)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.metadata().ok())
            .filter(|meta| meta.is_file())
            .map(|meta| meta.len())
            .sum();

        info!(
            path = %path.display(),
            shape = %composite.shape(),
            compression = %self.config.compression,
            bytes_written,
            "wrote composite"
        );

        Ok(WriteReport {
            path: path.to_path_buf(),
            arrays,
            bytes_written,
        })
    }

    fn write_tree(&self, composite: &DriverComposite, dir: &Path) -> Result<Vec<String>> {
        let store = Arc::new(
            FilesystemStore::new(dir).map_err(|e| HarmonizeError::storage(e.to_string()))?,
        );

        let attrs = &composite.attributes;
        let mut group_attrs = Map::new();
        group_attrs.insert("title".to_string(), json!(attrs.title));
        group_attrs.insert("notes".to_string(), json!(attrs.notes));
        group_attrs.insert("sources".to_string(), json!(attrs.sources));
        group_attrs.insert(
            "history".to_string(),
            json!(format!(
                "{} written by {} {}",
                Utc::now().to_rfc3339(),
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            )),
        );
        let group = GroupBuilder::new()
            .attributes(group_attrs)
            .build(store.clone(), "/")
            .map_err(|e| HarmonizeError::zarr(e.to_string()))?;
        group
            .store_metadata()
            .map_err(|e| HarmonizeError::zarr(e.to_string()))?;

        let shape = composite.shape();
        let mut arrays = Vec::new();

        let seconds: Vec<i64> = composite.time.instants().iter().map(|t| t.timestamp()).collect();
        self.store_array(
            &store,
            TIME,
            vec![shape.time as u64],
            vec![shape.time as u64],
            DataType::Int64,
            FillValue::from(i64::MIN),
            coordinate_attrs(TIME, TIME_UNITS, "time"),
            &seconds,
            8,
        )?;
        arrays.push(TIME.to_string());

        for (label, axis, units, standard_name) in [
            (LAT, &composite.grid.lat, "degrees_north", "latitude"),
            (LON, &composite.grid.lon, "degrees_east", "longitude"),
        ] {
            self.store_array(
                &store,
                label,
                vec![axis.len() as u64],
                vec![axis.len() as u64],
                DataType::Float64,
                FillValue::from(f64::NAN),
                coordinate_attrs(label, units, standard_name),
                axis.values(),
                8,
            )?;
            arrays.push(label.to_string());
        }

        let chunk = vec![
            self.config.chunk_time.min(shape.time) as u64,
            self.config.chunk_space.min(shape.lat) as u64,
            self.config.chunk_space.min(shape.lon) as u64,
        ];
        for (var, field) in composite.fields() {
            let mut attrs = Map::new();
            attrs.insert(
                "units".to_string(),
                json!(field.units.as_deref().unwrap_or(var.units())),
            );
            attrs.insert("long_name".to_string(), json!(var.long_name()));
            attrs.insert("_ARRAY_DIMENSIONS".to_string(), json!([TIME, LAT, LON]));

            self.store_array(
                &store,
                var.name(),
                vec![shape.time as u64, shape.lat as u64, shape.lon as u64],
                chunk.clone(),
                DataType::Float32,
                FillValue::from(f32::NAN),
                attrs,
                &field.data,
                4,
            )?;
            debug!(variable = var.name(), "stored driver array");
            arrays.push(var.name().to_string());
        }

        Ok(arrays)
    }

    #[allow(clippy::too_many_arguments)]
    fn store_array<T: Element>(
        &self,
        store: &Arc<FilesystemStore>,
        name: &str,
        shape: Vec<u64>,
        chunk: Vec<u64>,
        data_type: DataType,
        fill_value: FillValue,
        attrs: Map<String, Value>,
        data: &[T],
        typesize: usize,
    ) -> Result<()> {
        let chunk_grid: zarrs::array::ChunkGrid = chunk
            .try_into()
            .map_err(|e| HarmonizeError::InvalidConfig(format!("{:?}", e)))?;

        let mut binding = ArrayBuilder::new(shape.clone(), data_type, chunk_grid, fill_value);
        let mut builder = binding.attributes(attrs);
        if self.config.compression != ZarrCompression::None {
            builder = builder.bytes_to_bytes_codecs(vec![self.create_compression_codec(typesize)?]);
        }

        let path = format!("/{}", name);
        let array = builder
            .build(store.clone(), &path)
            .map_err(|e| HarmonizeError::zarr(e.to_string()))?;
        array
            .store_metadata()
            .map_err(|e| HarmonizeError::zarr(e.to_string()))?;

        let subset = ArraySubset::new_with_shape(shape);
        array
            .store_array_subset_elements(&subset, data)
            .map_err(|e| HarmonizeError::zarr(e.to_string()))?;
        Ok(())
    }

    /// Create the compression codec based on configuration.
    fn create_compression_codec(
        &self,
        typesize: usize,
    ) -> Result<Arc<dyn zarrs::array::codec::BytesToBytesCodecTraits>> {
        let level = BloscCompressionLevel::try_from(self.config.compression_level)
            .map_err(|_| HarmonizeError::InvalidConfig("Invalid compression level".to_string()))?;

        let shuffle = if self.config.shuffle {
            BloscShuffleMode::Shuffle
        } else {
            BloscShuffleMode::NoShuffle
        };

        // typesize is required when shuffle is enabled
        let typesize = self.config.shuffle.then_some(typesize);

        let compressor = match self.config.compression {
            ZarrCompression::None => {
                return Err(HarmonizeError::InvalidConfig(
                    "No compression configured".to_string(),
                ))
            }
            ZarrCompression::Lz4 | ZarrCompression::BloscLz4 => BloscCompressor::LZ4,
            ZarrCompression::Zstd | ZarrCompression::BloscZstd => BloscCompressor::Zstd,
        };

        let codec = BloscCodec::new(compressor, level, None, shuffle, typesize)
            .map_err(|e| HarmonizeError::InvalidConfig(e.to_string()))?;

        Ok(Arc::new(codec))
    }
}

fn coordinate_attrs(label: &str, units: &str, standard_name: &str) -> Map<String, Value> {
    let mut attrs = Map::new();
    attrs.insert("units".to_string(), json!(units));
    attrs.insert("standard_name".to_string(), json!(standard_name));
    attrs.insert("_ARRAY_DIMENSIONS".to_string(), json!([label]));
    attrs
}

/// An absent target, or a Zarr group carrying composite attributes.
fn check_replaceable(path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    let refuse = |reason: &str| HarmonizeError::RefusedOverwrite {
        path: path.display().to_string(),
        reason: reason.to_string(),
    };
    if !path.is_dir() {
        return Err(refuse("target is a file"));
    }

    let raw = match fs::read(path.join("zarr.json")) {
        Ok(raw) => raw,
        Err(_) => return Err(refuse("no zarr.json, not a Zarr group")),
    };
    let metadata: Value =
        serde_json::from_slice(&raw).map_err(|_| refuse("zarr.json is not valid JSON"))?;
    if metadata.get("node_type").and_then(Value::as_str) != Some("group") {
        return Err(refuse("zarr.json does not describe a group"));
    }
    let attrs = metadata.get("attributes");
    let has_title = attrs.and_then(|a| a.get("title")).is_some_and(Value::is_string);
    let has_sources = attrs.and_then(|a| a.get("sources")).is_some_and(Value::is_array);
    if !(has_title && has_sources) {
        return Err(refuse("group has no composite title or sources"));
    }
    Ok(())
}

/// `.<name>.staging` next to the destination.
fn staging_path(path: &Path) -> Result<PathBuf> {
    let name = path.file_name().ok_or_else(|| {
        HarmonizeError::storage(format!("{} has no file name", path.display()))
    })?;
    let staging = format!(".{}.staging", name.to_string_lossy());
    Ok(match path.parent() {
        Some(parent) => parent.join(staging),
        None => PathBuf::from(staging),
    })
}

/// Check that every node has metadata on disk and every array reads back with its shape.
fn verify(composite: &DriverComposite, dir: &Path, final_path: &Path, arrays: &[String]) -> Result<()> {
    let incomplete = |reason: String| HarmonizeError::IncompleteWrite {
        path: final_path.display().to_string(),
        reason,
    };

    let mut nodes = vec![dir.join("zarr.json")];
    nodes.extend(arrays.iter().map(|name| dir.join(name).join("zarr.json")));
    for node in &nodes {
        match fs::metadata(node) {
            Ok(meta) if meta.len() > 0 => {}
            _ => return Err(incomplete(format!("missing or empty {}", node.display()))),
        }
    }

    let shape = composite.shape();
    let store = Arc::new(
        FilesystemStore::new(dir).map_err(|e| incomplete(e.to_string()))?,
    );
    for name in arrays {
        let expected: Vec<u64> = match name.as_str() {
            TIME => vec![shape.time as u64],
            LAT => vec![shape.lat as u64],
            LON => vec![shape.lon as u64],
            _ => vec![shape.time as u64, shape.lat as u64, shape.lon as u64],
        };
        let array = Array::open(store.clone(), &format!("/{}", name))
            .map_err(|e| incomplete(format!("{}: {}", name, e)))?;
        if array.shape() != expected.as_slice() {
            return Err(incomplete(format!(
                "{} reads back as {:?}, expected {:?}",
                name,
                array.shape(),
                expected
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staging_is_hidden_sibling() {
        let staging = staging_path(Path::new("/data/out/drivers.zarr")).unwrap();
        assert_eq!(staging, PathBuf::from("/data/out/.drivers.zarr.staging"));
        assert!(staging_path(Path::new("/")).is_err());
    }

    #[test]
    fn test_replaceable_targets() {
        let dir = tempfile::tempdir().unwrap();
        assert!(check_replaceable(&dir.path().join("absent.zarr")).is_ok());

        let file = dir.path().join("notes.txt");
        fs::write(&file, "keep me").unwrap();
        assert!(matches!(
            check_replaceable(&file),
            Err(HarmonizeError::RefusedOverwrite { .. })
        ));

        let plain_group = dir.path().join("plain.zarr");
        fs::create_dir(&plain_group).unwrap();
        fs::write(
            plain_group.join("zarr.json"),
            r#"{"zarr_format":3,"node_type":"group","attributes":{}}"#,
        )
        .unwrap();
        assert!(check_replaceable(&plain_group).is_err());

        let composite = dir.path().join("drivers.zarr");
        fs::create_dir(&composite).unwrap();
        fs::write(
            composite.join("zarr.json"),
            r#"{"zarr_format":3,"node_type":"group","attributes":{"title":"t","sources":["a"]}}"#,
        )
        .unwrap();
        assert!(check_replaceable(&composite).is_ok());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = CompositeConfig {
            chunk_space: 0,
            ..Default::default()
        };
        assert!(matches!(
            CompositeWriter::new(config),
            Err(HarmonizeError::InvalidConfig(_))
        ));
    }
}
