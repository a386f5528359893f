//! Short names for the GRIB2 codes the wind readers meet.
//!
//! Only the near-surface momentum fields are known out of the box; anything
//! else is named by its raw codes, and callers may register more.

use std::collections::BTreeMap;

/// Discipline 0 (meteorological), category 2 (momentum).
const MOMENTUM: [(u8, &str); 4] = [(1, "WIND"), (2, "UGRD"), (3, "VGRD"), (22, "GUST")];

#[derive(Debug, Clone, Default)]
pub struct Grib2Tables {
    parameters: BTreeMap<(u8, u8, u8), String>,
}

impl Grib2Tables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tables covering the 10 m wind components.
    pub fn surface_winds() -> Self {
        MOMENTUM
            .iter()
            .fold(Self::new(), |tables, &(number, name)| tables.with_parameter(0, 2, number, name))
    }

    pub fn with_parameter(mut self, discipline: u8, category: u8, number: u8, name: &str) -> Self {
        self.parameters
            .insert((discipline, category, number), name.to_string());
        self
    }

    /// Short name such as `UGRD`, or `P{discipline}_{category}_{number}` when unknown.
    pub fn parameter_name(&self, discipline: u8, category: u8, number: u8) -> String {
        match self.parameters.get(&(discipline, category, number)) {
            Some(name) => name.clone(),
            None => format!("P{}_{}_{}", discipline, category, number),
        }
    }

    /// Human-readable fixed surface (code table 4.5).
    pub fn level_name(&self, level_type: u8, value: f64) -> String {
        match level_type {
            1 => "surface".to_string(),
            101 => "mean sea level".to_string(),
            103 => format!("{} m above ground", trim_level(value)),
            other => format!("level type {} at {}", other, trim_level(value)),
        }
    }
}

fn trim_level(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e12 {
        (value as i64).to_string()
    } else {
        value.to_string()
    }
}
