//! Error types for driver harmonization.

use thiserror::Error;

/// Errors that can occur while harmonizing sources into a composite.
///
/// Every variant is fatal for the run. Targets outside a source's coverage
/// are not errors; they are NaN in the data and show up in NaN coverage.
#[derive(Error, Debug)]
pub enum HarmonizeError {
    /// None of the candidate names exist in the source.
    #[error("{source_id}: no variable for '{logical}' (tried: {})", tried.join(", "))]
    MissingVariable {
        logical: String,
        source_id: String,
        tried: Vec<String>,
    },

    /// A required coordinate could not be identified.
    #[error("{source_id}: missing coordinate '{coordinate}'")]
    MissingCoordinate {
        coordinate: String,
        source_id: String,
    },

    /// The composite lacks a driver variable.
    #[error("composite is missing driver '{variable}' (available: {})", available.join(", "))]
    MissingDriver {
        variable: String,
        available: Vec<String>,
    },

    /// More than one source supplies the same driver.
    #[error("driver '{variable}' is supplied by more than one source: {}", sources.join(", "))]
    DuplicateDriver {
        variable: String,
        sources: Vec<String>,
    },

    /// Axes disagree where they must match.
    #[error("axis mismatch: {0}")]
    AxisMismatch(String),

    /// Empty, non-finite or non-monotonic axis.
    #[error("invalid axis: {0}")]
    InvalidAxis(String),

    /// Data length does not match the product of the axis lengths.
    #[error("variable '{variable}' has {actual} values, axes imply {expected}")]
    ShapeMismatch {
        variable: String,
        expected: usize,
        actual: usize,
    },

    /// The composite artifact failed post-write verification.
    #[error("incomplete write to {path}: {reason}")]
    IncompleteWrite { path: String, reason: String },

    /// The write target exists and is not a composite.
    #[error("refusing to replace {path}: {reason}")]
    RefusedOverwrite { path: String, reason: String },

    /// Storage/IO error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Zarr format error.
    #[error("Zarr format error: {0}")]
    Zarr(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    InvalidConfig(String),
}

impl HarmonizeError {
    pub fn missing_coordinate(coordinate: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self::MissingCoordinate {
            coordinate: coordinate.into(),
            source_id: source_id.into(),
        }
    }

    pub fn axis_mismatch(msg: impl Into<String>) -> Self {
        Self::AxisMismatch(msg.into())
    }

    pub fn invalid_axis(msg: impl Into<String>) -> Self {
        Self::InvalidAxis(msg.into())
    }

    pub fn zarr(msg: impl Into<String>) -> Self {
        Self::Zarr(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }
}

impl From<std::io::Error> for HarmonizeError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Result type for harmonization operations.
pub type Result<T> = std::result::Result<T, HarmonizeError>;
