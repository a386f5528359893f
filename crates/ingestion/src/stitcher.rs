//! The driver stitching pipeline.
//!
//! Loads the three provider sources, runs them through the harmonization
//! stages and writes one composite. Every stage fails fast, and the write is
//! the last step, so a failed run leaves no artifact behind.

use std::path::{Path, PathBuf};

use field_common::BoundingBox;
use grid_harmonizer::{
    build_hourly_axis, compose, normalize_coords, regrid_to_reference, resample_to_axis,
    wrap_longitudes, CompositeAttributes, CompositeWriter, DiagnosticEvent, DiagnosticsSink,
    DriverVariable, LonConvention, NanCoverage, Provenance, ReferenceGrid, SourceDataset, TimeAxis,
    DEFAULT_TITLE,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ProviderAliases;
use crate::error::{IngestionError, Result};
use crate::grib2::load_grib2_winds;
use crate::metadata::{discover_files, require_file_type, sort_by_cycle, FileType};
use crate::zarr::load_zarr_source;

/// File extensions picked up when a wind source is a directory.
pub const GRIB_EXTENSIONS: [&str; 4] = [".grib2", ".grb2", ".grib2.gz", ".grb2.gz"];

/// Where one provider's data lives and how it names things.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub provider: String,
    /// Zarr group, NetCDF file, GRIB2 file, or directory of GRIB2 files.
    pub path: PathBuf,
    #[serde(default, flatten)]
    pub aliases: ProviderAliases,
}

impl SourceSpec {
    pub fn new(provider: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            provider: provider.into(),
            path: path.into(),
            aliases: ProviderAliases::default(),
        }
    }

    pub fn with_aliases(mut self, aliases: ProviderAliases) -> Self {
        self.aliases = aliases;
        self
    }
}

/// Inputs of one stitching run.
#[derive(Debug, Clone)]
pub struct StitchRequest {
    pub currents: SourceSpec,
    pub stokes: SourceSpec,
    pub winds: SourceSpec,
    pub output: PathBuf,
    pub title: Option<String>,
    /// Area the composite is expected to cover; only checked, never cropped to.
    pub bbox: Option<BoundingBox>,
}

/// What a stitching run produced.
#[derive(Debug, Clone, Serialize)]
pub struct StitchReport {
    pub output: PathBuf,
    pub variables: Vec<String>,
    pub time_steps: usize,
    /// (lat, lon)
    pub grid_shape: (usize, usize),
    pub nan_coverage: Vec<NanCoverage>,
    pub bytes_written: u64,
}

/// Runs the stages in order against explicit writer and diagnostics.
pub struct Stitcher<'a> {
    writer: CompositeWriter,
    sink: &'a dyn DiagnosticsSink,
}

/// The role a source plays and the drivers it must supply.
#[derive(Debug, Clone, Copy)]
enum Role {
    Currents,
    Stokes,
    Winds,
}

impl Role {
    fn drivers(self) -> [DriverVariable; 2] {
        match self {
            Role::Currents => [DriverVariable::UCurr, DriverVariable::VCurr],
            Role::Stokes => [DriverVariable::UStokes, DriverVariable::VStokes],
            Role::Winds => [DriverVariable::UWind, DriverVariable::VWind],
        }
    }
}

impl<'a> Stitcher<'a> {
    pub fn new(writer: CompositeWriter, sink: &'a dyn DiagnosticsSink) -> Self {
        Self { writer, sink }
    }

    pub fn run(&self, request: &StitchRequest) -> Result<StitchReport> {
        let currents = self.prepare(&request.currents, Role::Currents)?;
        let stokes = self.prepare(&request.stokes, Role::Stokes)?;
        let winds = self.prepare(&request.winds, Role::Winds)?;

        let grid = ReferenceGrid::from_source(&currents)?;
        if let Some(bbox) = &request.bbox {
            check_coverage(&grid, bbox);
        }
        let convention = LonConvention::of(&grid.lon);
        let axis = build_hourly_axis(currents.time()?)?;
        info!(
            steps = axis.len(),
            start = %axis.first().to_rfc3339(),
            end = %axis.last().to_rfc3339(),
            lat = grid.lat.len(),
            lon = grid.lon.len(),
            "reference grid and hourly axis"
        );

        let mut parts = Vec::with_capacity(3);
        let mut sources = Vec::with_capacity(3);
        let mut applied = Vec::with_capacity(3);
        for source in [currents, stokes, winds] {
            let id = source.source_id();
            let (aligned, stages) = self.align(source, convention, &grid, &axis)?;
            applied.push(format!("{}: {}", id, stages.join(", ")));
            sources.push(id);
            parts.push(aligned);
        }

        let attributes = CompositeAttributes {
            title: request.title.clone().unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            notes: describe(&sources, &applied, &grid, &axis),
            sources,
        };
        let composite = compose(&parts, &grid, &axis, attributes)?;

        let nan_coverage = composite.nan_report();
        for coverage in &nan_coverage {
            self.sink.record(DiagnosticEvent::coverage(coverage.clone()));
        }

        let written = self.writer.write(&composite, &request.output)?;
        self.sink.record(DiagnosticEvent::stage(
            "write",
            "composite",
            format!("{} ({} bytes)", written.path.display(), written.bytes_written),
        ));

        let shape = composite.shape();
        Ok(StitchReport {
            output: written.path,
            variables: DriverVariable::ALL.iter().map(|v| v.name().to_string()).collect(),
            time_steps: shape.time,
            grid_shape: (shape.lat, shape.lon),
            nan_coverage,
            bytes_written: written.bytes_written,
        })
    }

    /// Load, resolve and normalize one source.
    fn prepare(&self, spec: &SourceSpec, role: Role) -> Result<SourceDataset> {
        let drivers = role.drivers();
        let loaded = load_source(spec, &drivers)?;
        let table = spec.aliases.alias_table();
        for alias in table.aliases().iter().filter(|a| drivers.contains(&a.logical)) {
            debug!(
                provider = %spec.provider,
                logical = alias.logical.name(),
                candidates = ?alias.candidates,
                "resolving driver"
            );
        }
        let detail = format!(
            "{} from {}",
            loaded.variable_names().join(","),
            spec.path.display()
        );
        self.record("load", &loaded, detail);

        let selected = table.select_and_rename(&loaded, &drivers)?;
        let normalized = normalize_coords(&selected)?;
        self.record("resolve", &normalized, format!("{:?}", role));
        Ok(normalized)
    }

    /// Bring a normalized source onto the reference grid and hourly axis.
    ///
    /// Also returns a short description of what each stage did.
    fn align(
        &self,
        source: SourceDataset,
        convention: Option<LonConvention>,
        grid: &ReferenceGrid,
        axis: &TimeAxis,
    ) -> Result<(SourceDataset, Vec<String>)> {
        let mut stages = Vec::new();
        let source = match (convention, LonConvention::of(source.lon()?)) {
            (Some(target), Some(own)) if target != own => {
                let wrapped = wrap_longitudes(&source, target)?;
                self.record("wrap", &wrapped, format!("{:?} -> {:?}", own, target));
                stages.push(format!("longitudes wrapped to {:?}", target));
                wrapped
            }
            _ => source,
        };

        if grid.matches(&source)? {
            stages.push("already on the reference grid".to_string());
        } else {
            stages.push("bilinearly regridded".to_string());
        }
        let regridded = regrid_to_reference(&source, grid)?;

        if regridded.time()? == axis {
            stages.push("already on the hourly axis".to_string());
        } else {
            stages.push("linearly interpolated in time".to_string());
        }
        let resampled = resample_to_axis(&regridded, axis)?;
        self.record("align", &resampled, format!("shape {}", resampled.shape()?));
        Ok((resampled, stages))
    }

    fn record(&self, stage: &str, source: &SourceDataset, detail: String) {
        self.sink
            .record(DiagnosticEvent::stage(stage, source.provenance.provider.clone(), detail));
    }
}

/// Load a provider source according to its file type.
///
/// A plain directory is read as a set of GRIB2 wind files, and only when
/// `claimed` includes the wind drivers.
pub fn load_source(spec: &SourceSpec, claimed: &[DriverVariable]) -> Result<SourceDataset> {
    let provenance = Provenance::new(spec.provider.clone());
    let path = spec.path.as_path();

    if path.is_dir() && !path.join("zarr.json").is_file() {
        if !claimed.contains(&DriverVariable::UWind) {
            return Err(IngestionError::UnknownFileType(format!(
                "{} is a directory but not a Zarr store (no zarr.json)",
                path.display()
            )));
        }
        let mut files = discover_files(path, &GRIB_EXTENSIONS)?;
        sort_by_cycle(&mut files);
        return load_grib2_winds(&files, provenance.with_path(path));
    }

    match require_file_type(path)? {
        FileType::Zarr => load_zarr_source(path, provenance, claimed.to_vec()),
        FileType::Grib2 | FileType::Grib2Gz => {
            load_grib2_winds(&[path.to_path_buf()], provenance.with_path(path))
        }
        FileType::NetCdf => load_netcdf(path, provenance, claimed),
        FileType::Unknown => Err(IngestionError::UnknownFileType(path.display().to_string())),
    }
}

#[cfg(feature = "netcdf")]
fn load_netcdf(path: &Path, provenance: Provenance, claimed: &[DriverVariable]) -> Result<SourceDataset> {
    crate::netcdf::load_netcdf_source(path, provenance, claimed.to_vec())
}

#[cfg(not(feature = "netcdf"))]
fn load_netcdf(path: &Path, _provenance: Provenance, _claimed: &[DriverVariable]) -> Result<SourceDataset> {
    Err(IngestionError::UnknownFileType(format!(
        "{} is NetCDF, but NetCDF support was not compiled in (enable the `netcdf` feature)",
        path.display()
    )))
}

fn check_coverage(grid: &ReferenceGrid, bbox: &BoundingBox) {
    match grid.bbox() {
        Some(extent)
            if extent.lon_min <= bbox.lon_min
                && extent.lon_max >= bbox.lon_max
                && extent.lat_min <= bbox.lat_min
                && extent.lat_max >= bbox.lat_max => {}
        extent => warn!(
            requested = %bbox,
            covered = ?extent.map(|e| e.to_string()),
            "reference grid does not cover the requested area"
        ),
    }
}

fn describe(sources: &[String], applied: &[String], grid: &ReferenceGrid, axis: &TimeAxis) -> String {
    format!(
        "Grid and hourly axis ({} to {}, {} steps, {}x{} lat/lon) taken from {}. \
         {}. \
         Cells outside a source's extent or time span are NaN; nothing is extrapolated.",
        axis.first().to_rfc3339(),
        axis.last().to_rfc3339(),
        axis.len(),
        grid.lat.len(),
        grid.lon.len(),
        sources.first().map(String::as_str).unwrap_or("currents"),
        applied.join(". ")
    )
}
