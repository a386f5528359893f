//! Shared test utilities for the drift-driver workspace.
//!
//! - [`SourceBuilder`] for synthetic provider datasets
//! - [`WindGribBuilder`] for GRIB2 wind messages
//! - Zarr fixture writers in [`zarr`]
//! - Scenario constants in [`fixtures`]
//!
//! Use only from integration tests (`tests/`): the types here come from the
//! library build of `grid-harmonizer`, not its unit-test build.

pub mod fixtures;
pub mod generators;
pub mod grib;
pub mod zarr;

pub use fixtures::*;
pub use generators::*;
pub use grib::*;
pub use zarr::*;

/// Assert `|left - right| <= eps` after casting all three to `f64`. NaN never passes.
///
/// ```ignore
/// assert_approx_eq!(field.data[0], 1.0, 1e-6);
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $eps:expr) => {{
        let (left, right, eps) = ($left as f64, $right as f64, $eps as f64);
        let diff = (left - right).abs();
        if !(diff <= eps) {
            panic!(
                "values differ: {:?} vs {:?} (|diff| {:?} exceeds {:?})",
                left, right, diff, eps
            );
        }
    }};
}

/// Assert that every value of a slice is approximately `expected`.
#[macro_export]
macro_rules! assert_all_approx {
    ($values:expr, $expected:expr, $epsilon:expr) => {{
        for (i, v) in $values.iter().enumerate() {
            let v: f64 = *v as f64;
            if !((v - ($expected as f64)).abs() <= ($epsilon as f64)) {
                panic!("value {} at index {} is not within {} of {}", v, i, $epsilon, $expected);
            }
        }
    }};
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_assert_approx_eq_within_tolerance() {
        assert_approx_eq!(0.1f32, 0.1f64, 1e-7);
        assert_approx_eq!(-2.0, -2.000001, 1e-5);
    }

    #[test]
    #[should_panic(expected = "values differ")]
    fn test_assert_approx_eq_rejects_nan() {
        assert_approx_eq!(f64::NAN, 1.0, 0.001);
    }

    #[test]
    fn test_assert_all_approx() {
        assert_all_approx!([1.0f32, 1.00001, 0.99999], 1.0, 1e-4);
    }
}
