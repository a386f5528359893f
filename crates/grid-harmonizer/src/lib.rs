//! Driver harmonization: reconciles currents, Stokes drift and winds from
//! different providers onto one hourly axis and one lat/lon grid.
//!
//! The stages are plain functions over immutable [`SourceDataset`]s:
//!
//! 1. [`AliasTable::select_and_rename`] picks each provider's spelling of a driver.
//! 2. [`normalize_coords`] renames coordinates to `time`, `lat`, `lon`.
//! 3. [`regrid_to_reference`] interpolates onto the reference (currents) grid.
//! 4. [`resample_to_axis`] interpolates onto the canonical hourly axis.
//! 5. [`compose`] gathers the six drivers into a [`DriverComposite`], which
//!    [`CompositeWriter`] persists and [`FieldSampler`] exposes to drift engines.
//!
//! Nothing is ever extrapolated: uncovered cells are NaN and are reported
//! through [`NanCoverage`].

pub mod composite;
pub mod config;
pub mod coords;
pub mod diagnostics;
pub mod error;
pub mod interpolation;
pub mod reader;
pub mod regrid;
pub mod resample;
pub mod resolver;
pub mod sampling;
pub mod types;
pub mod writer;

pub use composite::{compose, CompositeAttributes, DriverComposite, DEFAULT_TITLE};
pub use config::{CompositeConfig, ZarrCompression};
pub use coords::{normalize_coords, wrap_longitudes, LonConvention};
pub use diagnostics::{
    CollectingSink, DiagnosticEvent, DiagnosticsSink, NanCoverage, TracingSink,
    DEFAULT_NAN_WARN_RATIO,
};
pub use error::{HarmonizeError, Result};
pub use reader::CompositeReader;
pub use regrid::regrid_to_reference;
pub use resample::{build_hourly_axis, merge_valid_times, resample_to_axis};
pub use resolver::{resolve, AliasTable, VariableAlias};
pub use sampling::{DriverSample, FieldSampler, Vector2};
pub use types::{
    Axis, CoordinateAxis, DriverVariable, GridShape, GriddedField, Provenance, ReferenceGrid,
    SourceDataset, TimeAxis, TimeBracket, EXTENT_TOLERANCE_DEG, LAT, LON, TIME,
};
pub use writer::{CompositeWriter, WriteReport, TIME_UNITS};
