//! GRIB2 reader (WMO FM 92 GRIB Edition 2).
//!
//! Walks messages and their sections, decodes template 3.0 regular lat/lon
//! grids and template 4.0 products, and unpacks simple-packed values
//! (template 5.0). Other packings are handed to the `grib` crate decoder.

pub mod sections;
pub mod tables;
pub mod unpacking;

use std::collections::VecDeque;
use std::io::Cursor;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use field_common::ValidTime;
use tracing::debug;

pub use sections::{
    Bitmap, DataRepresentation, GridDefinition, Identification, Indicator, ProductDefinition,
};
pub use tables::Grib2Tables;

/// Errors raised while reading GRIB2 data.
#[derive(Debug, thiserror::Error)]
pub enum Grib2Error {
    #[error("invalid GRIB2 data: {0}")]
    InvalidFormat(String),

    #[error("invalid section {section}: {reason}")]
    InvalidSection { section: u8, reason: String },

    #[error("unsupported {what} template {template}")]
    UnsupportedTemplate { what: &'static str, template: u16 },

    #[error("unpacking failed: {0}")]
    UnpackingError(String),
}

pub type Result<T> = std::result::Result<T, Grib2Error>;

/// One decoded field (a GRIB2 submessage).
#[derive(Debug, Clone)]
pub struct Grib2Message {
    pub indicator: Indicator,
    pub identification: Identification,
    pub grid: GridDefinition,
    pub product: ProductDefinition,
    pub representation: DataRepresentation,
    pub bitmap: Option<Bitmap>,
    /// Section 7 payload, without the 5-byte header.
    pub data: Bytes,
    /// Bytes of the whole enclosing message.
    pub raw: Bytes,
    /// Position of this field inside the enclosing message.
    pub field_index: usize,
}

impl Grib2Message {
    pub fn reference_time(&self) -> DateTime<Utc> {
        self.identification.reference_time
    }

    /// Reference time plus forecast lead, when the lead is expressible.
    pub fn valid_time(&self) -> Option<ValidTime> {
        self.product
            .lead()
            .map(|lead| ValidTime::new(self.identification.reference_time, lead))
    }

    /// Short parameter name, e.g. "UGRD".
    pub fn parameter(&self, tables: &Grib2Tables) -> String {
        tables.parameter_name(
            self.indicator.discipline,
            self.product.parameter_category,
            self.product.parameter_number,
        )
    }

    pub fn level(&self, tables: &Grib2Tables) -> String {
        tables.level_name(self.product.level_type, self.product.level_value)
    }

    /// (rows, cols) of the grid.
    pub fn grid_dims(&self) -> (usize, usize) {
        (self.grid.nj as usize, self.grid.ni as usize)
    }

    /// Decode every grid point, row-major in scanning order. Missing points are NaN.
    pub fn unpack_data(&self) -> Result<Vec<f32>> {
        let expected = self.grid.num_points as usize;
        let values = match self.representation.template {
            0 => unpacking::unpack_simple(
                &self.data,
                expected,
                &self.representation,
                self.bitmap.as_ref(),
            )?,
            other => {
                debug!(template = other, "delegating unpack to grib decoder");
                self.unpack_with_grib_crate()?
            }
        };

        if values.len() != expected {
            return Err(Grib2Error::UnpackingError(format!(
                "decoded {} values, grid has {}",
                values.len(),
                expected
            )));
        }
        Ok(values)
    }

    fn unpack_with_grib_crate(&self) -> Result<Vec<f32>> {
        let grib2 = grib::from_reader(Cursor::new(self.raw.as_ref()))
            .map_err(|e| Grib2Error::UnpackingError(format!("{:?}", e)))?;
        let (_, submessage) = grib2
            .iter()
            .nth(self.field_index)
            .ok_or_else(|| Grib2Error::UnpackingError("submessage not found".to_string()))?;
        let decoder = grib::Grib2SubmessageDecoder::from(submessage)
            .map_err(|e| Grib2Error::UnpackingError(format!("{:?}", e)))?;
        let values = decoder
            .dispatch()
            .map_err(|e| Grib2Error::UnpackingError(format!("{:?}", e)))?;
        Ok(values.collect())
    }
}

/// Sequential reader over a buffer holding one or more GRIB2 messages.
pub struct Grib2Reader {
    data: Bytes,
    offset: usize,
    pending: VecDeque<Grib2Message>,
}

impl Grib2Reader {
    pub fn new(data: Bytes) -> Self {
        Self {
            data,
            offset: 0,
            pending: VecDeque::new(),
        }
    }

    /// Next field, or `None` at end of data.
    pub fn next_message(&mut self) -> Result<Option<Grib2Message>> {
        while self.pending.is_empty() {
            let Some(start) = find_magic(&self.data[self.offset..]).map(|p| p + self.offset) else {
                self.offset = self.data.len();
                return Ok(None);
            };

            let indicator = sections::parse_indicator(&self.data[start..])?;
            let length = usize::try_from(indicator.message_length)
                .map_err(|_| Grib2Error::InvalidFormat("message length overflows".to_string()))?;
            let end = start
                .checked_add(length)
                .filter(|end| *end <= self.data.len())
                .ok_or_else(|| {
                    Grib2Error::InvalidFormat(format!(
                        "message at offset {} claims {} bytes, {} available",
                        start,
                        length,
                        self.data.len() - start
                    ))
                })?;

            let raw = self.data.slice(start..end);
            self.offset = end;
            self.pending.extend(parse_message(indicator, raw)?);
        }
        Ok(self.pending.pop_front())
    }

    /// Read every remaining field.
    pub fn read_all(&mut self) -> Result<Vec<Grib2Message>> {
        let mut out = Vec::new();
        while let Some(msg) = self.next_message()? {
            out.push(msg);
        }
        Ok(out)
    }
}

fn find_magic(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|w| w == b"GRIB")
}

/// Split a message into fields; sections 2-7 may repeat.
fn parse_message(indicator: Indicator, raw: Bytes) -> Result<Vec<Grib2Message>> {
    let mut identification = None;
    let mut grid = None;
    let mut product = None;
    let mut representation = None;
    let mut bitmap: Option<Bitmap> = None;
    let mut fields = Vec::new();

    for (number, range) in sections::split_sections(&raw)? {
        let section = &raw[range.clone()];
        match number {
            1 => identification = Some(sections::parse_identification(section)?),
            2 => {}
            3 => grid = Some(sections::parse_grid_definition(section)?),
            4 => product = Some(sections::parse_product_definition(section)?),
            5 => representation = Some(sections::parse_data_representation(section)?),
            6 => bitmap = sections::parse_bitmap(raw.slice(range), bitmap.as_ref())?,
            7 => {
                let missing = |section: u8| Grib2Error::InvalidSection {
                    section: 7,
                    reason: format!("data section precedes section {}", section),
                };
                fields.push(Grib2Message {
                    indicator: indicator.clone(),
                    identification: identification.clone().ok_or_else(|| missing(1))?,
                    grid: grid.clone().ok_or_else(|| missing(3))?,
                    product: product.clone().ok_or_else(|| missing(4))?,
                    representation: representation.clone().ok_or_else(|| missing(5))?,
                    bitmap: bitmap.clone(),
                    data: raw.slice(range.start + 5..range.end),
                    raw: raw.clone(),
                    field_index: fields.len(),
                });
            }
            other => {
                return Err(Grib2Error::InvalidSection {
                    section: other,
                    reason: "unknown section number".to_string(),
                })
            }
        }
    }

    Ok(fields)
}
