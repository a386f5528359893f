//! Interpolation kernels shared by regridding, resampling and sampling.

use num_traits::Float;

/// `a + (b - a) * t`; returns `a` exactly when `a == b`.
pub fn lerp<T: Float>(a: T, b: T, t: T) -> T {
    a + (b - a) * t
}

/// Bilinear interpolation on one `[lat][lon]` frame.
///
/// `x` and `y` are fractional column/row indices. If any of the four
/// surrounding points is NaN the result is NaN.
pub fn bilinear_interpolate(data: &[f32], width: usize, height: usize, x: f64, y: f64) -> f32 {
    if width == 0 || height == 0 || x < 0.0 || y < 0.0 {
        return f32::NAN;
    }

    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    if x0 >= width || y0 >= height {
        return f32::NAN;
    }
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);

    let xf = (x - x0 as f64) as f32;
    let yf = (y - y0 as f64) as f32;

    let v00 = data[y0 * width + x0];
    let v10 = data[y0 * width + x1];
    let v01 = data[y1 * width + x0];
    let v11 = data[y1 * width + x1];

    if v00.is_nan() || v10.is_nan() || v01.is_nan() || v11.is_nan() {
        return f32::NAN;
    }

    let top = lerp(v00, v10, xf);
    let bottom = lerp(v01, v11, xf);
    lerp(top, bottom, yf)
}
