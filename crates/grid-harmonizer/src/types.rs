//! Core data model: axes, gridded fields and source datasets.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use field_common::BoundingBox;
use serde::{Deserialize, Serialize};

use crate::error::{HarmonizeError, Result};

/// Slack, in degrees, on the covered-extent test for spatial axes.
pub const EXTENT_TOLERANCE_DEG: f64 = 1e-6;

/// Canonical coordinate labels.
pub const LAT: &str = "lat";
pub const LON: &str = "lon";
pub const TIME: &str = "time";

/// A strictly monotonic spatial coordinate vector (degrees).
#[derive(Debug, Clone, PartialEq)]
pub struct Axis {
    values: Vec<f64>,
}

impl Axis {
    /// Validate and wrap coordinate values; ascending or descending.
    pub fn new(values: Vec<f64>) -> Result<Self> {
        if values.is_empty() {
            return Err(HarmonizeError::invalid_axis("axis is empty"));
        }
        if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
            return Err(HarmonizeError::invalid_axis(format!(
                "axis contains non-finite value {}",
                bad
            )));
        }
        if values.len() > 1 {
            let ascending = values[1] > values[0];
            let monotonic = values.windows(2).all(|w| {
                if ascending {
                    w[1] > w[0]
                } else {
                    w[1] < w[0]
                }
            });
            if !monotonic {
                return Err(HarmonizeError::invalid_axis(
                    "axis is not strictly monotonic",
                ));
            }
        }
        Ok(Self { values })
    }

    /// `count` points from `start` spaced by `step`.
    pub fn regular(start: f64, step: f64, count: usize) -> Result<Self> {
        Self::new((0..count).map(|i| start + step * i as f64).collect())
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_ascending(&self) -> bool {
        self.values.len() < 2 || self.values[1] > self.values[0]
    }

    pub fn min(&self) -> f64 {
        if self.is_ascending() {
            self.values[0]
        } else {
            self.values[self.values.len() - 1]
        }
    }

    pub fn max(&self) -> f64 {
        if self.is_ascending() {
            self.values[self.values.len() - 1]
        } else {
            self.values[0]
        }
    }

    /// Position of `x` in index space (e.g. 2.5 is halfway between points 2
    /// and 3), or `None` if `x` lies outside the covered extent.
    pub fn fractional_index(&self, x: f64) -> Option<f64> {
        if !x.is_finite() {
            return None;
        }
        let v = &self.values;
        let n = v.len();
        if n == 1 {
            return ((x - v[0]).abs() <= EXTENT_TOLERANCE_DEG).then_some(0.0);
        }
        if x < self.min() - EXTENT_TOLERANCE_DEG || x > self.max() + EXTENT_TOLERANCE_DEG {
            return None;
        }

        let x = x.clamp(self.min(), self.max());
        let (i, frac) = if self.is_ascending() {
            let i = (v.partition_point(|&p| p <= x) - 1).min(n - 2);
            (i, (x - v[i]) / (v[i + 1] - v[i]))
        } else {
            let i = (v.partition_point(|&p| p >= x) - 1).min(n - 2);
            (i, (v[i] - x) / (v[i] - v[i + 1]))
        };
        Some(i as f64 + frac)
    }
}

/// A pair of neighbouring time steps and the weight of the later one.
///
/// An exact hit has `lo == hi` and `weight == 0.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeBracket {
    pub lo: usize,
    pub hi: usize,
    pub weight: f64,
}

/// A strictly increasing sequence of instants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeAxis {
    instants: Vec<DateTime<Utc>>,
}

impl TimeAxis {
    pub fn new(instants: Vec<DateTime<Utc>>) -> Result<Self> {
        if instants.is_empty() {
            return Err(HarmonizeError::invalid_axis("time axis is empty"));
        }
        if let Some(w) = instants.windows(2).find(|w| w[1] <= w[0]) {
            return Err(HarmonizeError::invalid_axis(format!(
                "time axis is not strictly increasing at {}",
                w[1].to_rfc3339()
            )));
        }
        Ok(Self { instants })
    }

    pub fn instants(&self) -> &[DateTime<Utc>] {
        &self.instants
    }

    pub fn len(&self) -> usize {
        self.instants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instants.is_empty()
    }

    pub fn first(&self) -> DateTime<Utc> {
        self.instants[0]
    }

    pub fn last(&self) -> DateTime<Utc> {
        self.instants[self.instants.len() - 1]
    }

    /// Locate `t`, or `None` outside `[first, last]`.
    pub fn bracket(&self, t: DateTime<Utc>) -> Option<TimeBracket> {
        if t < self.first() || t > self.last() {
            return None;
        }
        let i = self.instants.partition_point(|&p| p <= t) - 1;
        if self.instants[i] == t {
            return Some(TimeBracket {
                lo: i,
                hi: i,
                weight: 0.0,
            });
        }
        let span = (self.instants[i + 1] - self.instants[i]).num_milliseconds() as f64;
        let offset = (t - self.instants[i]).num_milliseconds() as f64;
        Some(TimeBracket {
            lo: i,
            hi: i + 1,
            weight: offset / span,
        })
    }
}

/// A labelled coordinate of a source dataset.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinateAxis {
    Spatial(Axis),
    Temporal(TimeAxis),
}

impl CoordinateAxis {
    pub fn len(&self) -> usize {
        match self {
            Self::Spatial(axis) => axis.len(),
            Self::Temporal(axis) => axis.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, Self::Temporal(_))
    }
}

/// Dimension sizes of a `[time][lat][lon]` block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GridShape {
    pub time: usize,
    pub lat: usize,
    pub lon: usize,
}

impl GridShape {
    pub fn new(time: usize, lat: usize, lon: usize) -> Self {
        Self { time, lat, lon }
    }

    pub fn len(&self) -> usize {
        self.time * self.lat * self.lon
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Values per time step.
    pub fn frame_len(&self) -> usize {
        self.lat * self.lon
    }

    pub fn index(&self, t: usize, j: usize, i: usize) -> usize {
        (t * self.lat + j) * self.lon + i
    }
}

impl fmt::Display for GridShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.time, self.lat, self.lon)
    }
}

/// A named physical quantity stored `[time][lat][lon]`, NaN where undefined.
#[derive(Debug, Clone, PartialEq)]
pub struct GriddedField {
    pub name: String,
    pub units: Option<String>,
    pub data: Vec<f32>,
}

impl GriddedField {
    pub fn new(name: impl Into<String>, data: Vec<f32>) -> Self {
        Self {
            name: name.into(),
            units: None,
            data,
        }
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }

    /// Same metadata, new values.
    pub fn with_data(&self, data: Vec<f32>) -> Self {
        Self {
            name: self.name.clone(),
            units: self.units.clone(),
            data,
        }
    }

    pub fn nan_count(&self) -> usize {
        self.data.iter().filter(|v| v.is_nan()).count()
    }
}

/// Where a source dataset came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    pub provider: String,
    pub cycle: Option<DateTime<Utc>>,
    pub path: Option<PathBuf>,
}

impl Provenance {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            cycle: None,
            path: None,
        }
    }

    pub fn with_cycle(mut self, cycle: DateTime<Utc>) -> Self {
        self.cycle = Some(cycle);
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cycle {
            Some(cycle) => write!(f, "{}@{}", self.provider, cycle.format("%Y-%m-%dT%H:%MZ")),
            None => write!(f, "{}", self.provider),
        }
    }
}

/// The six logical variables of a drift composite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverVariable {
    UCurr,
    VCurr,
    UStokes,
    VStokes,
    UWind,
    VWind,
}

impl DriverVariable {
    pub const ALL: [DriverVariable; 6] = [
        Self::UCurr,
        Self::VCurr,
        Self::UStokes,
        Self::VStokes,
        Self::UWind,
        Self::VWind,
    ];

    /// Canonical variable name in composites.
    pub fn name(&self) -> &'static str {
        match self {
            Self::UCurr => "u_curr",
            Self::VCurr => "v_curr",
            Self::UStokes => "u_stokes",
            Self::VStokes => "v_stokes",
            Self::UWind => "u_wind",
            Self::VWind => "v_wind",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.name() == name)
    }

    pub fn long_name(&self) -> &'static str {
        match self {
            Self::UCurr => "eastward surface sea water velocity",
            Self::VCurr => "northward surface sea water velocity",
            Self::UStokes => "eastward surface Stokes drift",
            Self::VStokes => "northward surface Stokes drift",
            Self::UWind => "eastward wind at 10 m",
            Self::VWind => "northward wind at 10 m",
        }
    }

    pub fn units(&self) -> &'static str {
        "m s-1"
    }
}

impl fmt::Display for DriverVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One provider's gridded data, as loaded.
///
/// Variables are laid out `[time][lat][lon]` whatever the coordinate labels
/// are called; the coordinate map holds exactly the three dimension axes.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDataset {
    pub provenance: Provenance,
    coords: BTreeMap<String, CoordinateAxis>,
    variables: BTreeMap<String, GriddedField>,
    /// Driver variables this source is expected to supply.
    pub claimed: Vec<DriverVariable>,
}

impl SourceDataset {
    pub fn new(
        provenance: Provenance,
        coords: BTreeMap<String, CoordinateAxis>,
        variables: Vec<GriddedField>,
    ) -> Result<Self> {
        let variables = variables.into_iter().map(|v| (v.name.clone(), v)).collect();
        let dataset = Self {
            provenance,
            coords,
            variables,
            claimed: Vec::new(),
        };
        dataset.check_lengths()?;
        Ok(dataset)
    }

    pub fn with_claims(mut self, claimed: Vec<DriverVariable>) -> Self {
        self.claimed = claimed;
        self
    }

    fn check_lengths(&self) -> Result<()> {
        let expected: usize = self.coords.values().map(CoordinateAxis::len).product();
        for field in self.variables.values() {
            if field.data.len() != expected {
                return Err(HarmonizeError::ShapeMismatch {
                    variable: field.name.clone(),
                    expected,
                    actual: field.data.len(),
                });
            }
        }
        Ok(())
    }

    /// Same provenance and claims with new coordinates and variables.
    pub(crate) fn rebuild(
        &self,
        coords: BTreeMap<String, CoordinateAxis>,
        variables: Vec<GriddedField>,
    ) -> Result<Self> {
        Ok(Self::new(self.provenance.clone(), coords, variables)?.with_claims(self.claimed.clone()))
    }

    pub fn source_id(&self) -> String {
        self.provenance.to_string()
    }

    pub fn coords(&self) -> &BTreeMap<String, CoordinateAxis> {
        &self.coords
    }

    pub fn coordinate(&self, label: &str) -> Option<&CoordinateAxis> {
        self.coords.get(label)
    }

    pub fn variables(&self) -> impl Iterator<Item = &GriddedField> {
        self.variables.values()
    }

    pub fn variable(&self, name: &str) -> Option<&GriddedField> {
        self.variables.get(name)
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn variable_names(&self) -> Vec<String> {
        self.variables.keys().cloned().collect()
    }

    pub fn lat(&self) -> Result<&Axis> {
        self.spatial(LAT)
    }

    pub fn lon(&self) -> Result<&Axis> {
        self.spatial(LON)
    }

    pub fn time(&self) -> Result<&TimeAxis> {
        match self.coords.get(TIME) {
            Some(CoordinateAxis::Temporal(axis)) => Ok(axis),
            _ => Err(HarmonizeError::missing_coordinate(TIME, self.source_id())),
        }
    }

    fn spatial(&self, label: &str) -> Result<&Axis> {
        match self.coords.get(label) {
            Some(CoordinateAxis::Spatial(axis)) => Ok(axis),
            _ => Err(HarmonizeError::missing_coordinate(label, self.source_id())),
        }
    }

    /// Shape under canonical labels.
    pub fn shape(&self) -> Result<GridShape> {
        Ok(GridShape::new(
            self.time()?.len(),
            self.lat()?.len(),
            self.lon()?.len(),
        ))
    }
}

/// The lat/lon grid every driver is reconciled onto.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceGrid {
    pub lat: Axis,
    pub lon: Axis,
}

impl ReferenceGrid {
    pub fn new(lat: Axis, lon: Axis) -> Self {
        Self { lat, lon }
    }

    /// The grid of a normalized source (by convention the currents).
    pub fn from_source(source: &SourceDataset) -> Result<Self> {
        Ok(Self {
            lat: source.lat()?.clone(),
            lon: source.lon()?.clone(),
        })
    }

    /// Elementwise-equal lat and lon.
    pub fn matches(&self, source: &SourceDataset) -> Result<bool> {
        Ok(source.lat()? == &self.lat && source.lon()? == &self.lon)
    }

    pub fn bbox(&self) -> Option<BoundingBox> {
        BoundingBox::new(self.lon.min(), self.lon.max(), self.lat.min(), self.lat.max()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn hour(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, h, 0, 0).unwrap()
    }

    #[test]
    fn test_axis_validation() {
        assert!(Axis::new(vec![]).is_err());
        assert!(Axis::new(vec![0.0, 1.0, 1.0]).is_err());
        assert!(Axis::new(vec![0.0, 2.0, 1.0]).is_err());
        assert!(Axis::new(vec![0.0, f64::NAN]).is_err());
        assert!(Axis::new(vec![3.0, 2.0, 1.0]).is_ok());
        assert!(Axis::new(vec![7.0]).is_ok());
    }

    #[test]
    fn test_fractional_index_ascending() {
        let axis = Axis::regular(10.0, 0.5, 5).unwrap();
        assert_eq!(axis.fractional_index(10.0), Some(0.0));
        assert_eq!(axis.fractional_index(11.25), Some(2.5));
        assert_eq!(axis.fractional_index(12.0), Some(4.0));
        assert_eq!(axis.fractional_index(12.0 + 1e-9), Some(4.0));
        assert_eq!(axis.fractional_index(12.1), None);
        assert_eq!(axis.fractional_index(9.9), None);
    }

    #[test]
    fn test_fractional_index_descending() {
        let axis = Axis::new(vec![40.0, 39.0, 38.0]).unwrap();
        assert_eq!(axis.min(), 38.0);
        assert_eq!(axis.max(), 40.0);
        assert_eq!(axis.fractional_index(40.0), Some(0.0));
        assert_eq!(axis.fractional_index(38.5), Some(1.5));
        assert_eq!(axis.fractional_index(38.0), Some(2.0));
        assert_eq!(axis.fractional_index(41.0), None);
    }

    #[test]
    fn test_single_point_axis() {
        let axis = Axis::new(vec![5.0]).unwrap();
        assert_eq!(axis.fractional_index(5.0), Some(0.0));
        assert_eq!(axis.fractional_index(5.1), None);
    }

    #[test]
    fn test_time_bracket() {
        let axis = TimeAxis::new(vec![hour(0), hour(3), hour(6)]).unwrap();
        assert_eq!(
            axis.bracket(hour(3)),
            Some(TimeBracket { lo: 1, hi: 1, weight: 0.0 })
        );
        let b = axis.bracket(hour(4)).unwrap();
        assert_eq!((b.lo, b.hi), (1, 2));
        assert!((b.weight - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(axis.bracket(hour(6)).map(|b| (b.lo, b.hi)), Some((2, 2)));
        assert_eq!(axis.bracket(hour(7)), None);

        assert!(TimeAxis::new(vec![hour(1), hour(1)]).is_err());
        assert!(TimeAxis::new(vec![]).is_err());
    }

    #[test]
    fn test_dataset_rejects_bad_lengths() {
        let mut coords = BTreeMap::new();
        coords.insert(TIME.to_string(), CoordinateAxis::Temporal(TimeAxis::new(vec![hour(0)]).unwrap()));
        coords.insert(LAT.to_string(), CoordinateAxis::Spatial(Axis::regular(0.0, 1.0, 2).unwrap()));
        coords.insert(LON.to_string(), CoordinateAxis::Spatial(Axis::regular(0.0, 1.0, 3).unwrap()));

        let ok = SourceDataset::new(
            Provenance::new("test"),
            coords.clone(),
            vec![GriddedField::new("uo", vec![0.0; 6])],
        )
        .unwrap();
        assert_eq!(ok.shape().unwrap(), GridShape::new(1, 2, 3));

        let err = SourceDataset::new(
            Provenance::new("test"),
            coords,
            vec![GriddedField::new("uo", vec![0.0; 5])],
        )
        .unwrap_err();
        assert!(matches!(err, HarmonizeError::ShapeMismatch { expected: 6, actual: 5, .. }));
    }

    #[test]
    fn test_driver_names_round_trip() {
        for var in DriverVariable::ALL {
            assert_eq!(DriverVariable::from_name(var.name()), Some(var));
        }
        let parsed: DriverVariable = serde_json::from_str("\"u_stokes\"").unwrap();
        assert_eq!(parsed, DriverVariable::UStokes);
    }

    #[test]
    fn test_provenance_display() {
        let p = Provenance::new("gfs").with_cycle(hour(6));
        assert_eq!(p.to_string(), "gfs@2025-01-01T06:00Z");
        assert_eq!(Provenance::new("cmems").to_string(), "cmems");
    }
}
