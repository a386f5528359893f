//! Ingestion configuration: which GRIB2 fields are winds, and how each
//! provider spells the driver variables.

use std::collections::BTreeMap;

use grid_harmonizer::{AliasTable, DriverVariable};
use serde::{Deserialize, Serialize};

/// GRIB2 level type codes.
pub mod level_types {
    /// Height above ground
    pub const HEIGHT_ABOVE_GROUND: u8 = 103;
}

/// A GRIB2 field to extract.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpec {
    /// Parameter short name (e.g., "UGRD")
    pub name: &'static str,
    pub discipline: u8,
    pub category: u8,
    pub number: u8,
    /// Accepted level: (level_type, level_value)
    pub level: (u8, f64),
}

impl ParameterSpec {
    pub fn matches(&self, discipline: u8, category: u8, number: u8, level_type: u8, level_value: f64) -> bool {
        self.discipline == discipline
            && self.category == category
            && self.number == number
            && self.level.0 == level_type
            && (self.level.1 - level_value).abs() < 1e-9
    }
}

/// 10 m eastward and northward wind.
pub fn wind_parameters() -> Vec<ParameterSpec> {
    use level_types::HEIGHT_ABOVE_GROUND;

    vec![
        ParameterSpec {
            name: "UGRD",
            discipline: 0,
            category: 2,
            number: 2,
            level: (HEIGHT_ABOVE_GROUND, 10.0),
        },
        ParameterSpec {
            name: "VGRD",
            discipline: 0,
            category: 2,
            number: 3,
            level: (HEIGHT_ABOVE_GROUND, 10.0),
        },
    ]
}

/// Per-provider spellings, keyed by logical variable name:
///
/// ```yaml
/// aliases:
///   u_stokes: [VSDX]
///   v_stokes: [VSDY]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderAliases {
    #[serde(default)]
    pub aliases: BTreeMap<DriverVariable, Vec<String>>,
}

impl ProviderAliases {
    /// The default alias table with this provider's spellings tried first.
    pub fn alias_table(&self) -> AliasTable {
        self.aliases
            .iter()
            .fold(AliasTable::defaults(), |table, (logical, names)| {
                table.with_overrides(*logical, names.iter().cloned())
            })
    }
}
