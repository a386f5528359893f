//! Synthetic GRIB2 wind messages.
//!
//! Produces structurally valid GRIB2 edition 2 messages on a regular lat/lon
//! grid (template 3.0), analysis/forecast products (template 4.0) and simple
//! packing (template 5.0). Signed quantities use GRIB2 sign-magnitude
//! encoding.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Timelike, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::fixtures::GridDef;

/// GRIB2 parameter number of the eastward wind (discipline 0, category 2).
pub const UGRD: u8 = 2;
/// GRIB2 parameter number of the northward wind (discipline 0, category 2).
pub const VGRD: u8 = 3;

/// Builds one GRIB2 field on a regular lat/lon grid.
#[derive(Debug, Clone)]
pub struct WindGribBuilder {
    discipline: u8,
    center: u16,
    reference_time: DateTime<Utc>,
    grid: GridDef,
    param_category: u8,
    param_number: u8,
    level_type: u8,
    level_value: u32,
    forecast_hour: u32,
    /// Row-major in scan order: rows follow `grid.dlat`, columns `grid.dlon`.
    data_values: Vec<f32>,
}

impl WindGribBuilder {
    /// 10 m eastward wind, all zero, analysis of `reference_time`.
    pub fn new(reference_time: DateTime<Utc>, grid: GridDef) -> Self {
        Self {
            discipline: 0,
            center: 7,
            reference_time,
            grid,
            param_category: 2,
            param_number: UGRD,
            level_type: 103,
            level_value: 10,
            forecast_hour: 0,
            data_values: vec![0.0; grid.len()],
        }
    }

    pub fn with_parameter(mut self, category: u8, number: u8) -> Self {
        self.param_category = category;
        self.param_number = number;
        self
    }

    pub fn with_level(mut self, level_type: u8, level_value: u32) -> Self {
        self.level_type = level_type;
        self.level_value = level_value;
        self
    }

    pub fn with_forecast_hour(mut self, hour: u32) -> Self {
        self.forecast_hour = hour;
        self
    }

    pub fn with_constant_value(mut self, value: f32) -> Self {
        self.data_values = vec![value; self.grid.len()];
        self
    }

    /// Values from `f(lat, lon)` in scan order.
    pub fn with_fn(mut self, f: impl Fn(f64, f64) -> f32) -> Self {
        let lats = self.grid.lats();
        let lons = self.grid.lons();
        self.data_values = lats
            .iter()
            .flat_map(|&lat| lons.iter().map(move |&lon| (lat, lon)))
            .map(|(lat, lon)| f(lat, lon))
            .collect();
        self
    }

    /// Scan-order values; NaN entries are left out through a bitmap.
    pub fn with_data(mut self, data: Vec<f32>) -> Self {
        self.data_values = data;
        self
    }

    /// One complete message holding this field.
    pub fn build(&self) -> Vec<u8> {
        assemble(self, &[self])
    }

    /// One message repeating sections 4-7 for each field. Grids must match.
    pub fn build_multi(fields: &[&WindGribBuilder]) -> Vec<u8> {
        assemble(fields[0], fields)
    }

    fn section1(&self) -> Vec<u8> {
        let t = self.reference_time;
        let mut section = Vec::with_capacity(21);
        section.extend_from_slice(&21u32.to_be_bytes());
        section.push(1);
        section.extend_from_slice(&self.center.to_be_bytes());
        section.extend_from_slice(&0u16.to_be_bytes()); // sub-centre
        section.push(2); // master tables
        section.push(1); // local tables
        section.push(1); // start of forecast
        section.extend_from_slice(&(t.year() as u16).to_be_bytes());
        section.push(t.month() as u8);
        section.push(t.day() as u8);
        section.push(t.hour() as u8);
        section.push(t.minute() as u8);
        section.push(t.second() as u8);
        section.push(0); // operational
        section.push(1); // forecast
        section
    }

    fn section3(&self) -> Vec<u8> {
        let g = &self.grid;
        let micro = |deg: f64| (deg * 1e6).round() as i64;
        let la1 = micro(g.lat0);
        let lo1 = micro(g.lon0);
        let la2 = micro(g.lat0 + g.dlat * (g.nlat as f64 - 1.0));
        let lo2 = micro(g.lon0 + g.dlon * (g.nlon as f64 - 1.0));

        let mut scanning_mode = 0u8;
        if g.dlon < 0.0 {
            scanning_mode |= 0x80;
        }
        if g.dlat > 0.0 {
            scanning_mode |= 0x40;
        }

        let mut section = Vec::with_capacity(72);
        section.extend_from_slice(&72u32.to_be_bytes());
        section.push(3);
        section.push(0); // source of grid definition
        section.extend_from_slice(&(g.len() as u32).to_be_bytes());
        section.push(0);
        section.push(0);
        section.extend_from_slice(&0u16.to_be_bytes()); // template 3.0
        section.push(6); // spherical earth, 6371229 m
        section.push(0);
        section.extend_from_slice(&0u32.to_be_bytes());
        section.push(0);
        section.extend_from_slice(&0u32.to_be_bytes());
        section.push(0);
        section.extend_from_slice(&0u32.to_be_bytes());
        section.extend_from_slice(&(g.nlon as u32).to_be_bytes()); // Ni
        section.extend_from_slice(&(g.nlat as u32).to_be_bytes()); // Nj
        section.extend_from_slice(&0u32.to_be_bytes()); // basic angle
        section.extend_from_slice(&0xFFFF_FFFFu32.to_be_bytes()); // subdivisions
        section.extend_from_slice(&sign_magnitude_u32(la1));
        section.extend_from_slice(&sign_magnitude_u32(lo1));
        section.push(48); // resolution and component flags
        section.extend_from_slice(&sign_magnitude_u32(la2));
        section.extend_from_slice(&sign_magnitude_u32(lo2));
        section.extend_from_slice(&(micro(g.dlon.abs()) as u32).to_be_bytes()); // Di
        section.extend_from_slice(&(micro(g.dlat.abs()) as u32).to_be_bytes()); // Dj
        section.push(scanning_mode);
        section
    }

    fn section4(&self) -> Vec<u8> {
        let mut section = Vec::with_capacity(34);
        section.extend_from_slice(&34u32.to_be_bytes());
        section.push(4);
        section.extend_from_slice(&0u16.to_be_bytes()); // coordinate values
        section.extend_from_slice(&0u16.to_be_bytes()); // template 4.0
        section.push(self.param_category);
        section.push(self.param_number);
        section.push(2); // forecast
        section.push(0);
        section.push(0);
        section.extend_from_slice(&0u16.to_be_bytes());
        section.push(0);
        section.push(1); // hours
        section.extend_from_slice(&self.forecast_hour.to_be_bytes());
        section.push(self.level_type);
        section.push(0); // scale factor
        section.extend_from_slice(&self.level_value.to_be_bytes());
        section.push(255); // no second surface
        section.push(0);
        section.extend_from_slice(&0u32.to_be_bytes());
        section
    }

    /// Sections 5, 6 and 7 for the present (non-NaN) values.
    fn data_sections(&self) -> Vec<u8> {
        let present: Vec<f32> = self.data_values.iter().copied().filter(|v| !v.is_nan()).collect();
        let has_missing = present.len() != self.data_values.len();

        let (min_val, max_val) = present
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let (reference, range) = if present.is_empty() {
            (0.0, 0.0)
        } else {
            (min_val, max_val - min_val)
        };
        let bits_per_value: u8 = if range == 0.0 { 0 } else { 16 };
        // value = R + X * 2^E with X < 2^16
        let binary_scale: i32 = if range == 0.0 {
            0
        } else {
            (f64::from(range) / 65535.0).log2().ceil() as i32
        };

        let mut out = Vec::new();

        out.extend_from_slice(&21u32.to_be_bytes());
        out.push(5);
        out.extend_from_slice(&(present.len() as u32).to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes()); // template 5.0
        out.extend_from_slice(&reference.to_be_bytes());
        out.extend_from_slice(&sign_magnitude_u16(binary_scale));
        out.extend_from_slice(&0u16.to_be_bytes()); // decimal scale
        out.push(bits_per_value);
        out.push(0); // floating point

        if has_missing {
            let mut bits = vec![0u8; self.data_values.len().div_ceil(8)];
            for (i, v) in self.data_values.iter().enumerate() {
                if !v.is_nan() {
                    bits[i / 8] |= 0x80 >> (i % 8);
                }
            }
            out.extend_from_slice(&(6 + bits.len() as u32).to_be_bytes());
            out.push(6);
            out.push(0);
            out.extend_from_slice(&bits);
        } else {
            out.extend_from_slice(&6u32.to_be_bytes());
            out.push(6);
            out.push(255);
        }

        let packed = pack_simple(&present, reference, binary_scale, bits_per_value);
        out.extend_from_slice(&(5 + packed.len() as u32).to_be_bytes());
        out.push(7);
        out.extend_from_slice(&packed);
        out
    }
}

fn assemble(head: &WindGribBuilder, fields: &[&WindGribBuilder]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&head.section1());
    body.extend_from_slice(&head.section3());
    for field in fields {
        body.extend_from_slice(&field.section4());
        body.extend_from_slice(&field.data_sections());
    }

    let total = 16 + body.len() + 4;
    let mut message = Vec::with_capacity(total);
    message.extend_from_slice(b"GRIB");
    message.extend_from_slice(&[0, 0]);
    message.push(head.discipline);
    message.push(2);
    message.extend_from_slice(&(total as u64).to_be_bytes());
    message.extend_from_slice(&body);
    message.extend_from_slice(b"7777");
    message
}

fn pack_simple(values: &[f32], reference: f32, binary_scale: i32, bits: u8) -> Vec<u8> {
    if bits == 0 {
        return Vec::new();
    }
    let scale = 2.0_f64.powi(binary_scale);
    let mut out = Vec::with_capacity(values.len() * 2);
    for v in values {
        let x = ((f64::from(*v) - f64::from(reference)) / scale).round().clamp(0.0, 65535.0) as u16;
        out.extend_from_slice(&x.to_be_bytes());
    }
    out
}

fn sign_magnitude_u32(value: i64) -> [u8; 4] {
    let magnitude = value.unsigned_abs() as u32 & 0x7FFF_FFFF;
    let raw = if value < 0 { magnitude | 0x8000_0000 } else { magnitude };
    raw.to_be_bytes()
}

fn sign_magnitude_u16(value: i32) -> [u8; 2] {
    let magnitude = value.unsigned_abs() as u16 & 0x7FFF;
    let raw = if value < 0 { magnitude | 0x8000 } else { magnitude };
    raw.to_be_bytes()
}

/// File name GFS-style wind extracts use: `gfs_20250601_00_f003_10m_uv.grib2`.
pub fn gfs_wind_file_name(cycle: DateTime<Utc>, forecast_hour: u32) -> String {
    format!(
        "gfs_{}_{:02}_f{:03}_10m_uv.grib2",
        cycle.format("%Y%m%d"),
        cycle.hour(),
        forecast_hour
    )
}

/// Write one file per forecast hour holding a UGRD and a VGRD field.
///
/// With `gzip`, files are compressed and get a `.gz` suffix.
pub fn write_gfs_wind_files(
    dir: &Path,
    cycle: DateTime<Utc>,
    hours: impl IntoIterator<Item = u32>,
    grid: GridDef,
    u: f32,
    v: f32,
    gzip: bool,
) -> Vec<PathBuf> {
    std::fs::create_dir_all(dir).expect("create grib dir");
    hours
        .into_iter()
        .map(|fh| {
            let ugrd = WindGribBuilder::new(cycle, grid)
                .with_forecast_hour(fh)
                .with_constant_value(u);
            let vgrd = ugrd.clone().with_parameter(2, VGRD).with_constant_value(v);
            let mut bytes = ugrd.build();
            bytes.extend_from_slice(&vgrd.build());

            let mut name = gfs_wind_file_name(cycle, fh);
            if gzip {
                name.push_str(".gz");
                let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
                encoder.write_all(&bytes).expect("gzip grib");
                bytes = encoder.finish().expect("finish gzip");
            }
            let path = dir.join(name);
            std::fs::write(&path, bytes).expect("write grib file");
            path
        })
        .collect()
}
