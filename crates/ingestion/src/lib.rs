//! Source loading and driver stitching.
//!
//! Turns provider output into [`grid_harmonizer::SourceDataset`]s and runs
//! the harmonization stages over them:
//!
//! - Zarr V3 groups (ocean physics, waves)
//! - GRIB2 10 m wind files, plain or gzipped (atmospheric models)
//! - NetCDF files, behind the `netcdf` feature
//!
//! [`Stitcher`] ties the loaders to the core stages and writes the composite.

mod cf;
pub mod config;
pub mod error;
mod grib2;
pub mod metadata;
#[cfg(feature = "netcdf")]
mod netcdf;
mod stitcher;
mod zarr;

// Re-exports
pub use config::{level_types, wind_parameters, ParameterSpec, ProviderAliases};
pub use error::{IngestionError, Result};
pub use grib2::{load_grib2_winds, GRIB_LABELS};
pub use metadata::{
    detect_file_type, discover_files, extract_cycle, extract_forecast_hour, require_file_type,
    sort_by_cycle, FileType,
};
#[cfg(feature = "netcdf")]
pub use netcdf::load_netcdf_source;
pub use stitcher::{load_source, SourceSpec, StitchReport, StitchRequest, Stitcher, GRIB_EXTENSIONS};
pub use zarr::load_zarr_source;
