//! The harmonized driver composite and its assembly.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::diagnostics::NanCoverage;
use crate::error::{HarmonizeError, Result};
use crate::types::{DriverVariable, GridShape, GriddedField, ReferenceGrid, SourceDataset, TimeAxis};

pub const DEFAULT_TITLE: &str = "Surface Drift Drivers";

/// Descriptive metadata persisted with a composite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeAttributes {
    pub title: String,
    /// What interpolation and regridding was applied.
    pub notes: String,
    /// `provider@cycle` of every contributing source.
    pub sources: Vec<String>,
}

impl Default for CompositeAttributes {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            notes: String::new(),
            sources: Vec::new(),
        }
    }
}

/// Six co-located driver fields on one hourly axis and one lat/lon grid.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverComposite {
    pub time: TimeAxis,
    pub grid: ReferenceGrid,
    pub(crate) fields: BTreeMap<DriverVariable, GriddedField>,
    pub attributes: CompositeAttributes,
}

impl DriverComposite {
    /// Assemble a composite, checking every field against the axes.
    pub fn new(
        time: TimeAxis,
        grid: ReferenceGrid,
        fields: BTreeMap<DriverVariable, GriddedField>,
        attributes: CompositeAttributes,
    ) -> Result<Self> {
        let available: Vec<String> = fields.keys().map(|v| v.name().to_string()).collect();
        if let Some(missing) = DriverVariable::ALL.iter().find(|v| !fields.contains_key(*v)) {
            return Err(HarmonizeError::MissingDriver {
                variable: missing.name().to_string(),
                available,
            });
        }

        let expected = GridShape::new(time.len(), grid.lat.len(), grid.lon.len()).len();
        for (var, field) in &fields {
            if field.data.len() != expected {
                return Err(HarmonizeError::ShapeMismatch {
                    variable: var.name().to_string(),
                    expected,
                    actual: field.data.len(),
                });
            }
        }

        Ok(Self {
            time,
            grid,
            fields,
            attributes,
        })
    }

    pub fn shape(&self) -> GridShape {
        GridShape::new(self.time.len(), self.grid.lat.len(), self.grid.lon.len())
    }

    pub fn field(&self, var: DriverVariable) -> &GriddedField {
        // Presence of all six is checked in `new`.
        &self.fields[&var]
    }

    pub fn fields(&self) -> impl Iterator<Item = (DriverVariable, &GriddedField)> {
        self.fields.iter().map(|(var, field)| (*var, field))
    }

    /// NaN coverage per driver variable.
    pub fn nan_report(&self) -> Vec<NanCoverage> {
        self.fields
            .iter()
            .map(|(var, field)| NanCoverage::of(var.name(), &field.data))
            .collect()
    }
}

/// Gather the six drivers from prepared sources.
///
/// Every source must already sit on `grid` and `time`. A driver offered by
/// no source or by more than one is an error.
pub fn compose(
    sources: &[SourceDataset],
    grid: &ReferenceGrid,
    time: &TimeAxis,
    attributes: CompositeAttributes,
) -> Result<DriverComposite> {
    for source in sources {
        if !grid.matches(source)? {
            return Err(HarmonizeError::axis_mismatch(format!(
                "{} is not on the reference grid",
                source.source_id()
            )));
        }
        if source.time()? != time {
            return Err(HarmonizeError::axis_mismatch(format!(
                "{} is not on the canonical time axis",
                source.source_id()
            )));
        }
    }

    let mut fields = BTreeMap::new();
    for var in DriverVariable::ALL {
        let offering: Vec<&SourceDataset> =
            sources.iter().filter(|s| s.has_variable(var.name())).collect();
        match offering.as_slice() {
            [] => {
                return Err(HarmonizeError::MissingDriver {
                    variable: var.name().to_string(),
                    available: sources.iter().flat_map(|s| s.variable_names()).collect(),
                })
            }
            [single] => {
                if let Some(field) = single.variable(var.name()) {
                    let mut field = field.clone();
                    if field.units.is_none() {
                        field.units = Some(var.units().to_string());
                    }
                    fields.insert(var, field);
                }
            }
            many => {
                return Err(HarmonizeError::DuplicateDriver {
                    variable: var.name().to_string(),
                    sources: many.iter().map(|s| s.source_id()).collect(),
                })
            }
        }
    }

    let composite = DriverComposite::new(time.clone(), grid.clone(), fields, attributes)?;
    info!(shape = %composite.shape(), "composed drivers");
    Ok(composite)
}
