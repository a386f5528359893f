//! Spatial reconciliation onto the reference grid.

use tracing::{debug, info};

use crate::error::Result;
use crate::interpolation::bilinear_interpolate;
use crate::types::{CoordinateAxis, GriddedField, ReferenceGrid, SourceDataset, LAT, LON};

/// Bilinearly interpolate every variable of a normalized source onto `reference`.
///
/// A source already on the reference grid (elementwise-equal lat and lon) is
/// returned unchanged. Reference points outside the source's covered extent
/// become NaN. The time axis is untouched.
pub fn regrid_to_reference(source: &SourceDataset, reference: &ReferenceGrid) -> Result<SourceDataset> {
    if reference.matches(source)? {
        debug!(provider = %source.provenance.provider, "already on reference grid");
        return Ok(source.clone());
    }

    let src_lat = source.lat()?;
    let src_lon = source.lon()?;
    let shape = source.shape()?;

    // Fractional source indices for every reference row and column.
    let rows: Vec<Option<f64>> = reference
        .lat
        .values()
        .iter()
        .map(|&lat| src_lat.fractional_index(lat))
        .collect();
    let cols: Vec<Option<f64>> = reference
        .lon
        .values()
        .iter()
        .map(|&lon| src_lon.fractional_index(lon))
        .collect();

    let out_frame = rows.len() * cols.len();
    let fields: Vec<GriddedField> = source
        .variables()
        .map(|field| {
            let mut data = Vec::with_capacity(shape.time * out_frame);
            for frame in field.data.chunks(shape.frame_len()) {
                for row in &rows {
                    for col in &cols {
                        let value = match (row, col) {
                            (Some(y), Some(x)) => {
                                bilinear_interpolate(frame, shape.lon, shape.lat, *x, *y)
                            }
                            _ => f32::NAN,
                        };
                        data.push(value);
                    }
                }
            }
            field.with_data(data)
        })
        .collect();

    let mut coords = source.coords().clone();
    coords.insert(LAT.to_string(), CoordinateAxis::Spatial(reference.lat.clone()));
    coords.insert(LON.to_string(), CoordinateAxis::Spatial(reference.lon.clone()));

    info!(
        provider = %source.provenance.provider,
        from = %format!("{}x{}", shape.lat, shape.lon),
        to = %format!("{}x{}", reference.lat.len(), reference.lon.len()),
        "regridded to reference"
    );
    source.rebuild(coords, fields)
}
