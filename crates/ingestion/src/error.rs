//! Errors raised while loading provider sources.

use grid_harmonizer::HarmonizeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("I/O error reading source: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("GRIB2 decode failed: {0}")]
    Grib2Parse(String),

    #[error("NetCDF read failed: {0}")]
    NetcdfParse(String),

    #[error("Zarr read failed: {0}")]
    ZarrRead(String),

    #[error("Unrecognized source format: {0}")]
    UnknownFileType(String),

    #[error("No source files found under {0}")]
    NoSourceFiles(String),

    #[error("Source lacks required metadata: {0}")]
    MissingMetadata(String),

    #[error("Could not decompress {0}")]
    Decompression(String),

    #[error(transparent)]
    Harmonize(#[from] HarmonizeError),
}

impl From<grib2_parser::Grib2Error> for IngestionError {
    fn from(e: grib2_parser::Grib2Error) -> Self {
        IngestionError::Grib2Parse(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, IngestionError>;
