//! Common types and utilities shared across the drift-driver crates.

pub mod bbox;
pub mod time;

pub use bbox::{BboxParseError, BoundingBox};
pub use time::{ceil_hour, floor_hour, hourly_range, CfTimeUnits, TimeParseError, ValidTime};
