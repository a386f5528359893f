//! GRIB2 section parsing.
//!
//! Every section after the 16-byte indicator starts with a 4-byte big-endian
//! length and a 1-byte section number. Offsets below are 0-based from the
//! start of the section, i.e. one less than the WMO octet numbers.

use std::ops::Range;

use bytes::Bytes;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

use crate::{Grib2Error, Result};

/// Value of a missing 4-byte scaled field.
const MISSING_U32: u32 = u32::MAX;

/// Section 0: Indicator Section (16 bytes)
#[derive(Debug, Clone)]
pub struct Indicator {
    pub discipline: u8,
    pub edition: u8,
    pub message_length: u64,
}

/// Section 1: Identification Section
#[derive(Debug, Clone)]
pub struct Identification {
    pub center: u16,
    pub sub_center: u16,
    pub significance_of_reference_time: u8,
    pub reference_time: DateTime<Utc>,
    pub production_status: u8,
    pub data_type: u8,
}

/// Section 3: Grid Definition Section, template 3.0 (regular lat/lon).
///
/// Angles are converted to degrees.
#[derive(Debug, Clone)]
pub struct GridDefinition {
    pub template: u16,
    pub num_points: u32,
    /// Points along a parallel.
    pub ni: u32,
    /// Points along a meridian.
    pub nj: u32,
    pub first_latitude: f64,
    pub first_longitude: f64,
    pub last_latitude: f64,
    pub last_longitude: f64,
    pub i_increment: f64,
    pub j_increment: f64,
    pub scanning_mode: u8,
}

impl GridDefinition {
    /// Points scan in the -i direction (east to west).
    pub fn scans_westward(&self) -> bool {
        self.scanning_mode & 0x80 != 0
    }

    /// Points scan in the +j direction (south to north).
    pub fn scans_northward(&self) -> bool {
        self.scanning_mode & 0x40 != 0
    }

    /// Adjacent points in j are consecutive (column-major).
    pub fn j_consecutive(&self) -> bool {
        self.scanning_mode & 0x20 != 0
    }

    /// Latitude of each row, in scanning order.
    pub fn latitudes(&self) -> Vec<f64> {
        linspace(self.first_latitude, self.last_latitude, self.nj as usize)
    }

    /// Longitude of each column, in scanning order.
    ///
    /// The end point is unwrapped across the 0/360 seam so that the sequence
    /// follows the scanning direction.
    pub fn longitudes(&self) -> Vec<f64> {
        let mut last = self.last_longitude;
        if self.scans_westward() {
            if last > self.first_longitude {
                last -= 360.0;
            }
        } else if last < self.first_longitude {
            last += 360.0;
        }
        linspace(self.first_longitude, last, self.ni as usize)
    }
}

fn linspace(first: f64, last: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![first],
        _ => {
            let step = (last - first) / (n - 1) as f64;
            (0..n).map(|k| first + step * k as f64).collect()
        }
    }
}

/// Section 4: Product Definition Section, templates 4.0 and 4.1.
#[derive(Debug, Clone)]
pub struct ProductDefinition {
    pub template: u16,
    pub parameter_category: u8,
    pub parameter_number: u8,
    pub time_unit: u8,
    pub forecast_time: u32,
    pub level_type: u8,
    /// Level value after applying its scale factor.
    pub level_value: f64,
}

impl ProductDefinition {
    /// Forecast lead, per Code Table 4.4.
    pub fn lead(&self) -> Option<Duration> {
        let n = i64::from(self.forecast_time);
        match self.time_unit {
            0 => Some(Duration::minutes(n)),
            1 => Some(Duration::hours(n)),
            2 => Some(Duration::days(n)),
            10 => Some(Duration::hours(3 * n)),
            11 => Some(Duration::hours(6 * n)),
            12 => Some(Duration::hours(12 * n)),
            13 => Some(Duration::seconds(n)),
            _ => None,
        }
    }
}

/// Section 5: Data Representation Section
#[derive(Debug, Clone)]
pub struct DataRepresentation {
    /// Number of values actually packed in section 7.
    pub num_data_points: u32,
    pub template: u16,
    pub reference_value: f32,
    pub binary_scale_factor: i16,
    pub decimal_scale_factor: i16,
    pub bits_per_value: u8,
    pub original_data_type: u8,
}

/// Section 6: Bitmap Section. One bit per grid point, 1 = value present.
#[derive(Debug, Clone)]
pub struct Bitmap {
    pub data: Bytes,
}

impl Bitmap {
    pub fn is_present(&self, index: usize) -> bool {
        self.data
            .get(index / 8)
            .map(|byte| (byte >> (7 - (index % 8))) & 1 == 1)
            .unwrap_or(false)
    }
}

// ===== Parsing Functions =====

/// Parse Section 0 (Indicator) from start of message
pub fn parse_indicator(data: &[u8]) -> Result<Indicator> {
    if data.len() < 16 {
        return Err(Grib2Error::InvalidFormat(
            "Not enough data for indicator section".to_string(),
        ));
    }

    if &data[0..4] != b"GRIB" {
        return Err(Grib2Error::InvalidFormat(
            "Invalid GRIB magic bytes".to_string(),
        ));
    }

    let discipline = data[6];
    let edition = data[7];
    if edition != 2 {
        return Err(Grib2Error::InvalidFormat(format!(
            "Expected GRIB edition 2, got {}",
            edition
        )));
    }

    let message_length = read_u64(data, 8);
    if message_length < 16 + 4 {
        return Err(Grib2Error::InvalidFormat(format!(
            "message length {} is too short",
            message_length
        )));
    }

    Ok(Indicator {
        discipline,
        edition,
        message_length,
    })
}

/// Byte ranges of sections 1-7 within a whole message, in file order.
pub fn split_sections(message: &[u8]) -> Result<Vec<(u8, Range<usize>)>> {
    let mut sections = Vec::new();
    let mut offset = 16;

    loop {
        if message.len() >= offset + 4 && &message[offset..offset + 4] == b"7777" {
            return Ok(sections);
        }
        if message.len() < offset + 5 {
            return Err(Grib2Error::InvalidFormat(
                "message ended before end section".to_string(),
            ));
        }

        let length = read_u32(message, offset) as usize;
        let number = message[offset + 4];
        if length < 5 || offset + length > message.len() {
            return Err(Grib2Error::InvalidSection {
                section: number,
                reason: format!("bad length {} at offset {}", length, offset),
            });
        }

        sections.push((number, offset..offset + length));
        offset += length;
    }
}

/// Parse Section 1 (Identification)
pub fn parse_identification(sec: &[u8]) -> Result<Identification> {
    require_len(sec, 1, 21)?;

    let year = read_u16(sec, 12) as i32;
    let (month, day, hour, minute, second) = (sec[14], sec[15], sec[16], sec[17], sec[18]);
    let reference_time = NaiveDate::from_ymd_opt(year, month.into(), day.into())
        .and_then(|d| d.and_hms_opt(hour.into(), minute.into(), second.into()))
        .map(|ndt| Utc.from_utc_datetime(&ndt))
        .ok_or_else(|| Grib2Error::InvalidSection {
            section: 1,
            reason: format!(
                "invalid reference time {:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                year, month, day, hour, minute, second
            ),
        })?;

    Ok(Identification {
        center: read_u16(sec, 5),
        sub_center: read_u16(sec, 7),
        significance_of_reference_time: sec[11],
        reference_time,
        production_status: sec[19],
        data_type: sec[20],
    })
}

/// Parse Section 3 (Grid Definition). Only template 3.0 is supported.
pub fn parse_grid_definition(sec: &[u8]) -> Result<GridDefinition> {
    require_len(sec, 3, 14)?;
    let template = read_u16(sec, 12);
    if template != 0 {
        return Err(Grib2Error::UnsupportedTemplate {
            what: "grid definition",
            template,
        });
    }
    require_len(sec, 3, 72)?;

    let num_points = read_u32(sec, 6);
    let ni = read_u32(sec, 30);
    let nj = read_u32(sec, 34);
    if u64::from(ni) * u64::from(nj) != u64::from(num_points) {
        return Err(Grib2Error::InvalidSection {
            section: 3,
            reason: format!("{} x {} grid declares {} points", ni, nj, num_points),
        });
    }

    // Basic angle / subdivisions; missing or zero means microdegrees.
    let basic_angle = read_u32(sec, 38);
    let subdivisions = read_u32(sec, 42);
    let unit = if basic_angle == 0 || basic_angle == MISSING_U32 || subdivisions == MISSING_U32 {
        1e-6
    } else {
        f64::from(basic_angle) / f64::from(subdivisions)
    };

    Ok(GridDefinition {
        template,
        num_points,
        ni,
        nj,
        first_latitude: f64::from(read_i32_sm(sec, 46)) * unit,
        first_longitude: f64::from(read_i32_sm(sec, 50)) * unit,
        last_latitude: f64::from(read_i32_sm(sec, 55)) * unit,
        last_longitude: f64::from(read_i32_sm(sec, 59)) * unit,
        i_increment: f64::from(read_u32(sec, 63)) * unit,
        j_increment: f64::from(read_u32(sec, 67)) * unit,
        scanning_mode: sec[71],
    })
}

/// Parse Section 4 (Product Definition). Templates 4.0 and 4.1 share the layout read here.
pub fn parse_product_definition(sec: &[u8]) -> Result<ProductDefinition> {
    require_len(sec, 4, 9)?;
    let template = read_u16(sec, 7);
    if template != 0 && template != 1 {
        return Err(Grib2Error::UnsupportedTemplate {
            what: "product definition",
            template,
        });
    }
    require_len(sec, 4, 34)?;

    let scaled_value = read_u32(sec, 24);
    let level_value = if scaled_value == MISSING_U32 {
        f64::NAN
    } else if sec[23] == u8::MAX {
        f64::from(scaled_value)
    } else {
        f64::from(scaled_value) / 10f64.powi(i32::from(read_i8_sm(sec[23])))
    };

    Ok(ProductDefinition {
        template,
        parameter_category: sec[9],
        parameter_number: sec[10],
        time_unit: sec[17],
        forecast_time: read_u32(sec, 18),
        level_type: sec[22],
        level_value,
    })
}

/// Parse Section 5 (Data Representation).
///
/// Reference value and scale factors are read for templates 5.0-5.3, which
/// share those octets; other templates only need the point count here.
pub fn parse_data_representation(sec: &[u8]) -> Result<DataRepresentation> {
    require_len(sec, 5, 11)?;
    let template = read_u16(sec, 9);
    let num_data_points = read_u32(sec, 5);

    if template <= 3 || template == 40 || template == 41 {
        require_len(sec, 5, 21)?;
        Ok(DataRepresentation {
            num_data_points,
            template,
            reference_value: f32::from_be_bytes([sec[11], sec[12], sec[13], sec[14]]),
            binary_scale_factor: read_i16_sm(sec, 15),
            decimal_scale_factor: read_i16_sm(sec, 17),
            bits_per_value: sec[19],
            original_data_type: sec[20],
        })
    } else {
        Ok(DataRepresentation {
            num_data_points,
            template,
            reference_value: 0.0,
            binary_scale_factor: 0,
            decimal_scale_factor: 0,
            bits_per_value: 0,
            original_data_type: 0,
        })
    }
}

/// Parse Section 6 (Bitmap). Indicator 254 reuses the previous bitmap of the message.
pub fn parse_bitmap(section: Bytes, previous: Option<&Bitmap>) -> Result<Option<Bitmap>> {
    require_len(&section, 6, 6)?;
    match section[5] {
        255 => Ok(None),
        0 => Ok(Some(Bitmap {
            data: section.slice(6..),
        })),
        254 => previous.cloned().map(Some).ok_or_else(|| Grib2Error::InvalidSection {
            section: 6,
            reason: "bitmap indicator 254 without a previous bitmap".to_string(),
        }),
        other => Err(Grib2Error::UnsupportedTemplate {
            what: "predefined bitmap",
            template: u16::from(other),
        }),
    }
}

// ===== Byte helpers =====

fn require_len(sec: &[u8], section: u8, len: usize) -> Result<()> {
    if sec.len() < len {
        return Err(Grib2Error::InvalidSection {
            section,
            reason: format!("need {} bytes, have {}", len, sec.len()),
        });
    }
    Ok(())
}

fn read_u16(data: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([data[at], data[at + 1]])
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

fn read_u64(data: &[u8], at: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&data[at..at + 8]);
    u64::from_be_bytes(buf)
}

fn read_i8_sm(byte: u8) -> i8 {
    let magnitude = (byte & 0x7f) as i8;
    if byte & 0x80 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

/// GRIB2 signed integers use a sign bit, not two's complement.
fn read_i16_sm(data: &[u8], at: usize) -> i16 {
    let raw = read_u16(data, at);
    let magnitude = (raw & 0x7fff) as i16;
    if raw & 0x8000 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

fn read_i32_sm(data: &[u8], at: usize) -> i32 {
    let raw = read_u32(data, at);
    let magnitude = (raw & 0x7fff_ffff) as i32;
    if raw & 0x8000_0000 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_magnitude() {
        assert_eq!(read_i16_sm(&[0x80, 0x03], 0), -3);
        assert_eq!(read_i16_sm(&[0x00, 0x03], 0), 3);
        assert_eq!(read_i32_sm(&[0x81, 0x31, 0x2d, 0x00], 0), -20_000_000);
    }

    #[test]
    fn test_lead_units() {
        let mut product = ProductDefinition {
            template: 0,
            parameter_category: 2,
            parameter_number: 2,
            time_unit: 1,
            forecast_time: 6,
            level_type: 103,
            level_value: 10.0,
        };
        assert_eq!(product.lead(), Some(Duration::hours(6)));
        product.time_unit = 0;
        assert_eq!(product.lead(), Some(Duration::minutes(6)));
        product.time_unit = 11;
        assert_eq!(product.lead(), Some(Duration::hours(36)));
        product.time_unit = 200;
        assert_eq!(product.lead(), None);
    }

    #[test]
    fn test_longitudes_unwrap_across_seam() {
        let grid = GridDefinition {
            template: 0,
            num_points: 3,
            ni: 3,
            nj: 1,
            first_latitude: 0.0,
            first_longitude: 359.0,
            last_latitude: 0.0,
            last_longitude: 1.0,
            i_increment: 1.0,
            j_increment: 1.0,
            scanning_mode: 0,
        };
        assert_eq!(grid.longitudes(), vec![359.0, 360.0, 361.0]);
        assert_eq!(grid.latitudes(), vec![0.0]);
    }

    #[test]
    fn test_split_sections_requires_end_marker() {
        let mut msg = b"GRIB\0\0\0\x02".to_vec();
        msg.extend_from_slice(&30u64.to_be_bytes());
        msg.extend_from_slice(&[0, 0, 0, 6, 2, 0xAA]);
        assert!(split_sections(&msg).is_err());
        msg.extend_from_slice(b"7777");
        let sections = split_sections(&msg).unwrap();
        assert_eq!(sections, vec![(2, 16..22)]);
    }
}
