//! Geographic bounding boxes.

use serde::{Deserialize, Serialize};

/// A lon/lat bounding box in degrees.
///
/// The textual and serialized order is `lon_min, lon_max, lat_min, lat_max`,
/// which is how forecast subsetting requests are usually expressed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    pub lon_min: f64,
    pub lon_max: f64,
    pub lat_min: f64,
    pub lat_max: f64,
}

impl BoundingBox {
    /// Create a new bounding box, rejecting inverted or non-finite corners.
    pub fn new(lon_min: f64, lon_max: f64, lat_min: f64, lat_max: f64) -> Result<Self, BboxParseError> {
        let bbox = Self {
            lon_min,
            lon_max,
            lat_min,
            lat_max,
        };
        bbox.check()?;
        Ok(bbox)
    }

    fn check(&self) -> Result<(), BboxParseError> {
        let corners = [self.lon_min, self.lon_max, self.lat_min, self.lat_max];
        if corners.iter().any(|v| !v.is_finite()) {
            return Err(BboxParseError::NotFinite);
        }
        if self.lon_min > self.lon_max || self.lat_min > self.lat_max {
            return Err(BboxParseError::Inverted(*self));
        }
        if self.lat_min < -90.0 || self.lat_max > 90.0 {
            return Err(BboxParseError::LatitudeRange(self.lat_min, self.lat_max));
        }
        Ok(())
    }

    /// Parse "lon_min,lon_max,lat_min,lat_max".
    pub fn parse(s: &str) -> Result<Self, BboxParseError> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(BboxParseError::InvalidFormat(s.to_string()));
        }

        let mut values = [0.0f64; 4];
        for (slot, part) in values.iter_mut().zip(&parts) {
            *slot = part
                .parse()
                .map_err(|_| BboxParseError::InvalidNumber(part.to_string()))?;
        }
        Self::new(values[0], values[1], values[2], values[3])
    }

    /// Width in degrees of longitude.
    pub fn width(&self) -> f64 {
        self.lon_max - self.lon_min
    }

    /// Height in degrees of latitude.
    pub fn height(&self) -> f64 {
        self.lat_max - self.lat_min
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.lon_min + self.lon_max) / 2.0,
            (self.lat_min + self.lat_max) / 2.0,
        )
    }

    /// Check if this bbox intersects another.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.lon_min <= other.lon_max
            && self.lon_max >= other.lon_min
            && self.lat_min <= other.lat_max
            && self.lat_max >= other.lat_min
    }

    /// Check if a point is contained within this bbox (edges inclusive).
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.lon_min && lon <= self.lon_max && lat >= self.lat_min && lat <= self.lat_max
    }
}

impl TryFrom<[f64; 4]> for BoundingBox {
    type Error = BboxParseError;

    fn try_from(v: [f64; 4]) -> Result<Self, Self::Error> {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.lon_min, b.lon_max, b.lat_min, b.lat_max]
    }
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.lon_min, self.lon_max, self.lat_min, self.lat_max
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BboxParseError {
    #[error("Invalid bbox format: {0}. Expected 'lon_min,lon_max,lat_min,lat_max'")]
    InvalidFormat(String),

    #[error("Invalid number in bbox: {0}")]
    InvalidNumber(String),

    #[error("bbox corners must be finite")]
    NotFinite,

    #[error("bbox is inverted: {0}")]
    Inverted(BoundingBox),

    #[error("latitude range {0}..{1} exceeds -90..90")]
    LatitudeRange(f64, f64),
}
