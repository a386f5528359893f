//! Scenario constants shared by the integration tests.

use chrono::{DateTime, TimeZone, Utc};

/// Cycle / first valid time of the reference scenario.
pub fn scenario_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
}

/// Currents: 0.1 degree, 11 x 11 points over lon 29-30, lat 32-33.
pub const CURRENTS_GRID: GridDef = GridDef {
    lat0: 32.0,
    dlat: 0.1,
    nlat: 11,
    lon0: 29.0,
    dlon: 0.1,
    nlon: 11,
};

/// Stokes: 0.25 degree, covering the currents grid with margin.
pub const STOKES_GRID: GridDef = GridDef {
    lat0: 31.75,
    dlat: 0.25,
    nlat: 7,
    lon0: 28.75,
    dlon: 0.25,
    nlon: 7,
};

/// Winds: 0.25 degree scanned north to south, as GFS does.
pub const WIND_GRID: GridDef = GridDef {
    lat0: 33.5,
    dlat: -0.25,
    nlat: 9,
    lon0: 28.5,
    dlon: 0.25,
    nlon: 9,
};

/// A regular lat/lon grid description.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridDef {
    pub lat0: f64,
    pub dlat: f64,
    pub nlat: usize,
    pub lon0: f64,
    pub dlon: f64,
    pub nlon: usize,
}

impl GridDef {
    pub fn lats(&self) -> Vec<f64> {
        (0..self.nlat).map(|j| self.lat0 + self.dlat * j as f64).collect()
    }

    pub fn lons(&self) -> Vec<f64> {
        (0..self.nlon).map(|i| self.lon0 + self.dlon * i as f64).collect()
    }

    pub fn len(&self) -> usize {
        self.nlat * self.nlon
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
