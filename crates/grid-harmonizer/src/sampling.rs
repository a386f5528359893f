//! Field-sampling interface used by drift engines.
//!
//! Engines only see `FieldSampler`; they never touch files or grids.

use std::ops::{Add, Mul};

use chrono::{DateTime, Utc};
use field_common::BoundingBox;

use crate::composite::DriverComposite;
use crate::interpolation::{bilinear_interpolate, lerp};
use crate::types::{DriverVariable, TimeBracket};

/// An eastward/northward vector in m/s.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vector2 {
    pub u: f64,
    pub v: f64,
}

impl Vector2 {
    pub const ZERO: Self = Self { u: 0.0, v: 0.0 };
    pub const NAN: Self = Self {
        u: f64::NAN,
        v: f64::NAN,
    };

    pub fn new(u: f64, v: f64) -> Self {
        Self { u, v }
    }

    pub fn is_valid(&self) -> bool {
        self.u.is_finite() && self.v.is_finite()
    }

    pub fn speed(&self) -> f64 {
        self.u.hypot(self.v)
    }
}

impl Add for Vector2 {
    type Output = Vector2;

    fn add(self, rhs: Vector2) -> Vector2 {
        Vector2::new(self.u + rhs.u, self.v + rhs.v)
    }
}

impl Mul<f64> for Vector2 {
    type Output = Vector2;

    fn mul(self, k: f64) -> Vector2 {
        Vector2::new(self.u * k, self.v * k)
    }
}

/// All drivers at one point and instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriverSample {
    pub current: Vector2,
    pub wind: Vector2,
    pub stokes: Vector2,
}

impl DriverSample {
    pub const NAN: Self = Self {
        current: Vector2::NAN,
        wind: Vector2::NAN,
        stokes: Vector2::NAN,
    };

    pub fn is_valid(&self) -> bool {
        self.current.is_valid() && self.wind.is_valid() && self.stokes.is_valid()
    }
}

/// Point sampling of the driver fields.
///
/// Points or instants outside the covered extent yield NaN components;
/// implementations never extrapolate.
pub trait FieldSampler {
    fn sample(&self, t: DateTime<Utc>, lon: f64, lat: f64) -> DriverSample;

    /// Sample many `(lon, lat)` points at one instant.
    fn sample_many(&self, t: DateTime<Utc>, points: &[(f64, f64)]) -> Vec<DriverSample> {
        points.iter().map(|&(lon, lat)| self.sample(t, lon, lat)).collect()
    }

    /// First and last covered instants.
    fn time_range(&self) -> (DateTime<Utc>, DateTime<Utc>);

    fn bbox(&self) -> Option<BoundingBox>;
}

impl DriverComposite {
    fn sample_at(&self, bracket: Option<TimeBracket>, lon: f64, lat: f64) -> DriverSample {
        let (Some(b), Some(x), Some(y)) = (
            bracket,
            self.grid.lon.fractional_index(lon),
            self.grid.lat.fractional_index(lat),
        ) else {
            return DriverSample::NAN;
        };

        let shape = self.shape();
        let frame_len = shape.frame_len();
        let value = |var: DriverVariable| -> f64 {
            let data = &self.field(var).data;
            let at = |step: usize| {
                let frame = &data[step * frame_len..(step + 1) * frame_len];
                bilinear_interpolate(frame, shape.lon, shape.lat, x, y)
            };
            let before = at(b.lo);
            if b.lo == b.hi {
                f64::from(before)
            } else {
                lerp(f64::from(before), f64::from(at(b.hi)), b.weight)
            }
        };

        DriverSample {
            current: Vector2::new(value(DriverVariable::UCurr), value(DriverVariable::VCurr)),
            wind: Vector2::new(value(DriverVariable::UWind), value(DriverVariable::VWind)),
            stokes: Vector2::new(value(DriverVariable::UStokes), value(DriverVariable::VStokes)),
        }
    }
}

impl FieldSampler for DriverComposite {
    fn sample(&self, t: DateTime<Utc>, lon: f64, lat: f64) -> DriverSample {
        self.sample_at(self.time.bracket(t), lon, lat)
    }

    fn sample_many(&self, t: DateTime<Utc>, points: &[(f64, f64)]) -> Vec<DriverSample> {
        let bracket = self.time.bracket(t);
        points
            .iter()
            .map(|&(lon, lat)| self.sample_at(bracket, lon, lat))
            .collect()
    }

    fn time_range(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        (self.time.first(), self.time.last())
    }

    fn bbox(&self) -> Option<BoundingBox> {
        self.grid.bbox()
    }
}
