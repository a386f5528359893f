//! File discovery and metadata extraction for provider files.
//!
//! File types are recognised by extension first and by magic bytes when the
//! extension says nothing; cycle and lead can be read back from GFS-style
//! file names such as `gfs_20250601_00_f003_10m_uv.grib2`.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use walkdir::WalkDir;

use crate::error::{IngestionError, Result};

/// Detected file type based on extension and content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// Zarr V3 group (a directory)
    Zarr,
    /// GRIB2 format
    Grib2,
    /// Gzip-compressed GRIB2
    Grib2Gz,
    /// NetCDF (classic or HDF5-based)
    NetCdf,
    /// Unknown format
    Unknown,
}

/// Detect file type from path, falling back to the first bytes of the file.
pub fn detect_file_type(path: &Path) -> FileType {
    if path.is_dir() {
        return if path.join("zarr.json").is_file() || has_extension(path, &[".zarr"]) {
            FileType::Zarr
        } else {
            FileType::Unknown
        };
    }

    let lower = path.to_string_lossy().to_lowercase();
    if lower.ends_with(".grib2.gz") || lower.ends_with(".grb2.gz") {
        FileType::Grib2Gz
    } else if lower.ends_with(".grib2") || lower.ends_with(".grb2") || lower.ends_with(".grib") {
        FileType::Grib2
    } else if lower.ends_with(".nc") || lower.ends_with(".nc4") || lower.ends_with(".netcdf") {
        FileType::NetCdf
    } else {
        sniff(path).unwrap_or(FileType::Unknown)
    }
}

/// Like [`detect_file_type`], but unknown files are an error.
pub fn require_file_type(path: &Path) -> Result<FileType> {
    match detect_file_type(path) {
        FileType::Unknown => Err(IngestionError::UnknownFileType(path.display().to_string())),
        known => Ok(known),
    }
}

fn sniff(path: &Path) -> Option<FileType> {
    let mut magic = [0u8; 4];
    File::open(path).ok()?.read_exact(&mut magic).ok()?;
    match &magic {
        b"GRIB" => Some(FileType::Grib2),
        [0x1f, 0x8b, _, _] => Some(FileType::Grib2Gz),
        [b'C', b'D', b'F', _] | [0x89, b'H', b'D', b'F'] => Some(FileType::NetCdf),
        _ => None,
    }
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    let lower = path.to_string_lossy().to_lowercase();
    extensions.iter().any(|ext| lower.ends_with(&ext.to_lowercase()))
}

/// Regular files under `dir` whose names end in one of `extensions`, sorted by path.
pub fn discover_files(dir: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(IngestionError::NoSourceFiles(format!(
            "{} is not a directory",
            dir.display()
        )));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = entry.map_err(|e| IngestionError::FileRead(e.into()))?;
        if entry.file_type().is_file() && has_extension(entry.path(), extensions) {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/// Order files oldest cycle first, then by lead, then by path.
///
/// Files whose names carry no cycle or lead sort before those that do.
pub fn sort_by_cycle(files: &mut [PathBuf]) {
    files.sort_by_cached_key(|p| (extract_cycle(p), extract_forecast_hour(p), p.clone()));
}

/// Extract forecast hour from filename.
///
/// Supports `_f###` (e.g. `gfs_20250601_00_f003_10m_uv.grib2`) and
/// `z_f###` at the end of the stem.
pub fn extract_forecast_hour(path: &Path) -> Option<u32> {
    let filename = path.file_stem().and_then(|s| s.to_str())?;

    if let Some(pos) = filename.rfind("_f") {
        let rest = &filename[pos + 2..];
        if let Some(hour) = rest.get(..3).and_then(|s| s.parse::<u32>().ok()) {
            return Some(hour);
        }
    }

    if let Some(pos) = filename.find("z_f") {
        if let Ok(hour) = filename[pos + 3..].parse::<u32>() {
            return Some(hour);
        }
    }

    None
}

/// Extract the forecast cycle from a `_YYYYMMDD_HH` (or `_HHz`) filename segment.
pub fn extract_cycle(path: &Path) -> Option<DateTime<Utc>> {
    let filename = path.file_name().and_then(|s| s.to_str())?;
    let parts: Vec<&str> = filename.split(['_', '.']).collect();

    parts.windows(2).find_map(|pair| {
        let (date, hour) = (pair[0], pair[1].trim_end_matches(['z', 'Z']));
        if date.len() != 8 || hour.len() != 2 {
            return None;
        }
        let date = NaiveDate::parse_from_str(date, "%Y%m%d").ok()?;
        let hour: u32 = hour.parse().ok()?;
        let naive = date.and_hms_opt(hour, 0, 0)?;
        Some(Utc.from_utc_datetime(&naive))
    })
}
