//! Variable resolution: maps provider spellings onto logical driver names.
//!
//! Candidate order is the priority. A source that offers none of the
//! candidates fails the run; nothing is ever defaulted to zero or NaN.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::{HarmonizeError, Result};
use crate::types::{DriverVariable, SourceDataset};

/// Return the first candidate present in `source`.
pub fn resolve<S: AsRef<str>>(source: &SourceDataset, logical: &str, candidates: &[S]) -> Result<String> {
    candidates
        .iter()
        .map(AsRef::as_ref)
        .find(|name| source.has_variable(name))
        .map(str::to_string)
        .ok_or_else(|| HarmonizeError::MissingVariable {
            logical: logical.to_string(),
            source_id: source.source_id(),
            tried: candidates.iter().map(|c| c.as_ref().to_string()).collect(),
        })
}

/// Ordered candidate spellings for one logical variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableAlias {
    pub logical: DriverVariable,
    pub candidates: Vec<String>,
}

/// Candidate lists for every driver variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasTable {
    entries: BTreeMap<DriverVariable, Vec<String>>,
}

impl Default for AliasTable {
    fn default() -> Self {
        Self::defaults()
    }
}

impl AliasTable {
    /// Spellings seen across ocean-physics, wave and atmospheric providers.
    pub fn defaults() -> Self {
        let table: [(DriverVariable, &[&str]); 6] = [
            (
                DriverVariable::UCurr,
                &["uo", "u_curr", "eastward_sea_water_velocity", "u"],
            ),
            (
                DriverVariable::VCurr,
                &["vo", "v_curr", "northward_sea_water_velocity", "v"],
            ),
            (
                DriverVariable::UStokes,
                &["ustokes", "uuss", "us", "VSDX", "vsdx", "u_stokes"],
            ),
            (
                DriverVariable::VStokes,
                &["vstokes", "vvss", "vs", "VSDY", "vsdy", "v_stokes"],
            ),
            (
                DriverVariable::UWind,
                &["u_wind", "u10", "10u", "UGRD", "eastward_wind", "x_wind"],
            ),
            (
                DriverVariable::VWind,
                &["v_wind", "v10", "10v", "VGRD", "northward_wind", "y_wind"],
            ),
        ];

        Self {
            entries: table
                .into_iter()
                .map(|(var, names)| (var, names.iter().map(|n| n.to_string()).collect()))
                .collect(),
        }
    }

    /// Put provider-specific spellings ahead of the existing candidates.
    pub fn with_overrides<I, S>(mut self, logical: DriverVariable, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut merged: Vec<String> = names.into_iter().map(Into::into).collect();
        let existing = self.entries.remove(&logical).unwrap_or_default();
        merged.extend(existing);

        let mut seen = std::collections::HashSet::new();
        merged.retain(|name| seen.insert(name.clone()));
        self.entries.insert(logical, merged);
        self
    }

    pub fn candidates(&self, logical: DriverVariable) -> &[String] {
        self.entries.get(&logical).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn aliases(&self) -> Vec<VariableAlias> {
        self.entries
            .iter()
            .map(|(logical, candidates)| VariableAlias {
                logical: *logical,
                candidates: candidates.clone(),
            })
            .collect()
    }

    pub fn resolve(&self, source: &SourceDataset, logical: DriverVariable) -> Result<String> {
        resolve(source, logical.name(), self.candidates(logical))
    }

    /// New dataset holding only `logicals`, renamed to their canonical names.
    pub fn select_and_rename(
        &self,
        source: &SourceDataset,
        logicals: &[DriverVariable],
    ) -> Result<SourceDataset> {
        let mut fields = Vec::with_capacity(logicals.len());
        for &logical in logicals {
            let found = self.resolve(source, logical)?;
            debug!(
                provider = %source.provenance.provider,
                logical = logical.name(),
                variable = %found,
                "resolved variable"
            );
            if let Some(field) = source.variable(&found) {
                let mut field = field.clone();
                field.name = logical.name().to_string();
                fields.push(field);
            }
        }
        source.rebuild(source.coords().clone(), fields)
    }
}
