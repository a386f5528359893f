//! GRIB2 simple packing (Data Representation Template 5.0).

use crate::sections::{Bitmap, DataRepresentation};
use crate::{Grib2Error, Result};

/// Unpack simple-packed data onto the full grid.
///
/// value = (R + X * 2^E) * 10^(-D). Only points flagged present in the bitmap
/// are packed; absent points come back as NaN.
pub fn unpack_simple(
    packed_data: &[u8],
    num_points: usize,
    repr: &DataRepresentation,
    bitmap: Option<&Bitmap>,
) -> Result<Vec<f32>> {
    let reference = f64::from(repr.reference_value);
    let binary_scale = 2.0_f64.powi(i32::from(repr.binary_scale_factor));
    let decimal_scale = 10.0_f64.powi(-i32::from(repr.decimal_scale_factor));
    let bits_per_value = repr.bits_per_value as usize;

    let present = |i: usize| bitmap.map(|bm| bm.is_present(i)).unwrap_or(true);
    let packed_count = (0..num_points).filter(|&i| present(i)).count();
    if packed_count != repr.num_data_points as usize {
        return Err(Grib2Error::UnpackingError(format!(
            "section 5 declares {} packed values, bitmap leaves {}",
            repr.num_data_points, packed_count
        )));
    }

    let mut values = Vec::with_capacity(num_points);
    let mut bit_position = 0;

    for i in 0..num_points {
        if !present(i) {
            values.push(f32::NAN);
            continue;
        }

        let packed_value = if bits_per_value == 0 {
            0
        } else {
            let v = extract_bits(packed_data, bit_position, bits_per_value)?;
            bit_position += bits_per_value;
            v
        };

        let value = (reference + f64::from(packed_value) * binary_scale) * decimal_scale;
        values.push(value as f32);
    }

    Ok(values)
}

/// Read `num_bits` (MSB first) starting at `start_bit`.
fn extract_bits(data: &[u8], start_bit: usize, num_bits: usize) -> Result<u32> {
    if num_bits > 32 {
        return Err(Grib2Error::UnpackingError(format!(
            "Invalid number of bits: {}",
            num_bits
        )));
    }

    let mut result = 0u32;
    for i in 0..num_bits {
        let absolute_bit = start_bit + i;
        let byte = data.get(absolute_bit / 8).ok_or_else(|| {
            Grib2Error::UnpackingError("Not enough data to extract bits".to_string())
        })?;
        let bit = (byte >> (7 - (absolute_bit % 8))) & 1;
        result = (result << 1) | u32::from(bit);
    }

    Ok(result)
}
