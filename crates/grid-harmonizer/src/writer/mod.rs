//! Persisting composites as Zarr V3 hierarchies.

mod zarr_writer;

pub use zarr_writer::{CompositeWriter, WriteReport, TIME_UNITS};
