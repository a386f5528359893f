//! GRIB2 wind loader.
//!
//! Each file holds 10 m UGRD/VGRD fields for one or more valid times. Fields
//! become one-instant datasets under GRIB-style labels (`valid_time`,
//! `latitude`, `longitude`), which are then merged along time in file order.
//! Directories are ordered by cycle and lead with [`sort_by_cycle`] first, so
//! the newest cycle wins wherever valid times overlap.
//!
//! [`sort_by_cycle`]: crate::metadata::sort_by_cycle

use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use grib2_parser::{Grib2Message, Grib2Reader, Grib2Tables};
use grid_harmonizer::{merge_valid_times, DriverVariable, HarmonizeError, Provenance, SourceDataset};
use tracing::{debug, info, warn};

use crate::cf::{self, RawVariable};
use crate::config::{wind_parameters, ParameterSpec};
use crate::error::{IngestionError, Result};
use crate::metadata::{detect_file_type, extract_cycle, FileType};

/// Coordinate labels of datasets produced from GRIB2.
pub const GRIB_LABELS: [&str; 3] = ["valid_time", "latitude", "longitude"];

/// One decoded wind component.
#[derive(Debug, Clone)]
struct WindField {
    name: &'static str,
    reference_time: DateTime<Utc>,
    valid_time: DateTime<Utc>,
    lats: Vec<f64>,
    lons: Vec<f64>,
    data: Vec<f32>,
}

/// Load 10 m winds from GRIB2 files (plain or gzipped).
///
/// Files are taken in the given order; when two files carry the same valid
/// time the later one wins. Provenance records the latest cycle seen.
pub fn load_grib2_winds(files: &[PathBuf], provenance: Provenance) -> Result<SourceDataset> {
    if files.is_empty() {
        return Err(IngestionError::NoSourceFiles(format!(
            "{} winds",
            provenance.provider
        )));
    }

    let tables = Grib2Tables::surface_winds();
    let specs = wind_parameters();

    let mut parts = Vec::new();
    let mut cycle: Option<DateTime<Utc>> = None;
    for path in files {
        let fields = read_wind_fields(path, &tables, &specs)?;
        if fields.is_empty() {
            warn!(path = %path.display(), "no 10 m wind fields in file");
            continue;
        }
        let file_cycle = fields.iter().map(|f| f.reference_time).max();
        if let (Some(named), Some(decoded)) = (extract_cycle(path), file_cycle) {
            if named != decoded {
                warn!(
                    path = %path.display(),
                    named = %named.to_rfc3339(),
                    decoded = %decoded.to_rfc3339(),
                    "file name cycle differs from message reference time"
                );
            }
        }
        cycle = cycle.max(file_cycle);
        parts.extend(instants_from_file(path, fields, &provenance)?);
    }

    if parts.is_empty() {
        return Err(IngestionError::NoSourceFiles(format!(
            "{}: none of {} files holds 10 m winds",
            provenance.provider,
            files.len()
        )));
    }

    let mut merged = merge_valid_times(parts)?;
    merged.provenance.cycle = cycle.or(merged.provenance.cycle);
    merged.provenance.path = provenance.path.clone();
    merged.claimed = vec![DriverVariable::UWind, DriverVariable::VWind];

    info!(
        provider = %merged.provenance.provider,
        files = files.len(),
        time_steps = merged.shape()?.time,
        "loaded grib2 winds"
    );
    Ok(merged)
}

fn read_bytes(path: &Path) -> Result<Bytes> {
    let raw = fs::read(path)?;
    if detect_file_type(path) != FileType::Grib2Gz {
        return Ok(Bytes::from(raw));
    }
    let mut decoded = Vec::new();
    GzDecoder::new(raw.as_slice())
        .read_to_end(&mut decoded)
        .map_err(|e| IngestionError::Decompression(format!("{}: {}", path.display(), e)))?;
    Ok(Bytes::from(decoded))
}

fn read_wind_fields(
    path: &Path,
    tables: &Grib2Tables,
    specs: &[ParameterSpec],
) -> Result<Vec<WindField>> {
    let mut reader = Grib2Reader::new(read_bytes(path)?);
    let mut fields = Vec::new();

    while let Some(message) = reader.next_message()? {
        let product = &message.product;
        let Some(spec) = specs.iter().find(|s| {
            s.matches(
                message.indicator.discipline,
                product.parameter_category,
                product.parameter_number,
                product.level_type,
                product.level_value,
            )
        }) else {
            debug!(
                parameter = %message.parameter(tables),
                level = %message.level(tables),
                "skipping field"
            );
            continue;
        };

        let valid_time = message
            .valid_time()
            .ok_or_else(|| {
                IngestionError::MissingMetadata(format!(
                    "{}: {} has unsupported time unit {}",
                    path.display(),
                    spec.name,
                    product.time_unit
                ))
            })?
            .valid_datetime();

        fields.push(decode_field(&message, spec.name, valid_time)?);
    }

    debug!(path = %path.display(), fields = fields.len(), "read grib2 file");
    Ok(fields)
}

fn decode_field(
    message: &Grib2Message,
    name: &'static str,
    valid_time: DateTime<Utc>,
) -> Result<WindField> {
    let grid = &message.grid;
    let (rows, cols) = message.grid_dims();
    let values = message.unpack_data()?;

    // Column-major grids are transposed to rows of constant latitude.
    let data = if grid.j_consecutive() {
        let mut out = vec![f32::NAN; values.len()];
        for i in 0..cols {
            for j in 0..rows {
                out[j * cols + i] = values[i * rows + j];
            }
        }
        out
    } else {
        values
    };

    Ok(WindField {
        name,
        reference_time: message.reference_time(),
        valid_time,
        lats: grid.latitudes(),
        lons: grid.longitudes(),
        data,
    })
}

/// One dataset per valid time found in a file, each holding UGRD and VGRD.
fn instants_from_file(
    path: &Path,
    fields: Vec<WindField>,
    provenance: &Provenance,
) -> Result<Vec<SourceDataset>> {
    let mut by_time: BTreeMap<DateTime<Utc>, BTreeMap<&'static str, WindField>> = BTreeMap::new();
    for field in fields {
        if let Some(previous) = by_time
            .entry(field.valid_time)
            .or_default()
            .insert(field.name, field)
        {
            debug!(variable = previous.name, "later field replaces duplicate");
        }
    }

    let labels = GRIB_LABELS.map(String::from);
    let mut parts = Vec::with_capacity(by_time.len());
    for (valid_time, components) in by_time {
        let (Some(u), Some(v)) = (components.get("UGRD"), components.get("VGRD")) else {
            let present: Vec<&str> = components.keys().copied().collect();
            return Err(IngestionError::Grib2Parse(format!(
                "{}: valid time {} has {:?} but needs UGRD and VGRD",
                path.display(),
                valid_time.to_rfc3339(),
                present
            )));
        };
        if u.lats != v.lats || u.lons != v.lons {
            return Err(HarmonizeError::axis_mismatch(format!(
                "{}: UGRD and VGRD grids differ",
                path.display()
            ))
            .into());
        }

        let variables = [u, v]
            .into_iter()
            .map(|field| RawVariable {
                name: field.name.to_string(),
                dims: labels.to_vec(),
                units: Some("m s-1".to_string()),
                data: field.data.clone(),
            })
            .collect();
        let mut part_provenance = provenance.clone().with_path(path);
        part_provenance.cycle = part_provenance.cycle.or(Some(u.reference_time));
        parts.push(cf::build_source(
            part_provenance,
            Vec::new(),
            &labels,
            vec![valid_time],
            u.lats.clone(),
            u.lons.clone(),
            variables,
        )?);
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_files_is_an_error() {
        let err = load_grib2_winds(&[], Provenance::new("gfs")).unwrap_err();
        assert!(matches!(err, IngestionError::NoSourceFiles(_)));
    }

    #[test]
    fn test_file_without_grib_messages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.grib2");
        std::fs::write(&path, b"not a grib file").unwrap();
        let err = load_grib2_winds(&[path], Provenance::new("gfs")).unwrap_err();
        assert!(matches!(err, IngestionError::NoSourceFiles(_)));
    }
}
