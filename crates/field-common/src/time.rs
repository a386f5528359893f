//! Time handling utilities for forecast data.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};

const SECONDS_PER_HOUR: i64 = 3600;

/// Valid time of a forecast field.
///
/// Combines the cycle issue time (model run) with the forecast lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValidTime {
    /// Model run/reference time
    pub reference_time: DateTime<Utc>,
    /// Offset from the reference time
    pub lead: Duration,
}

impl ValidTime {
    pub fn new(reference_time: DateTime<Utc>, lead: Duration) -> Self {
        Self {
            reference_time,
            lead,
        }
    }

    pub fn from_forecast_hour(reference_time: DateTime<Utc>, forecast_hour: u32) -> Self {
        Self::new(reference_time, Duration::hours(i64::from(forecast_hour)))
    }

    /// Create from analysis time (zero lead).
    pub fn analysis(reference_time: DateTime<Utc>) -> Self {
        Self::new(reference_time, Duration::zero())
    }

    /// The actual valid time (reference + lead).
    pub fn valid_datetime(&self) -> DateTime<Utc> {
        self.reference_time + self.lead
    }

    /// Lead in whole hours, if it is a whole number of hours.
    pub fn forecast_hour(&self) -> Option<u32> {
        let secs = self.lead.num_seconds();
        if secs % SECONDS_PER_HOUR != 0 {
            return None;
        }
        u32::try_from(secs / SECONDS_PER_HOUR).ok()
    }

    /// Parse from ISO 8601 string.
    pub fn from_iso8601(s: &str) -> Result<DateTime<Utc>, TimeParseError> {
        let s = s.trim();

        // Full datetime with timezone
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(dt.with_timezone(&Utc));
        }

        // Without timezone (assume UTC)
        for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"] {
            if let Ok(ndt) = NaiveDateTime::parse_from_str(s, fmt) {
                return Ok(Utc.from_utc_datetime(&ndt));
            }
        }

        // Date only
        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            if let Some(ndt) = date.and_hms_opt(0, 0, 0) {
                return Ok(Utc.from_utc_datetime(&ndt));
            }
        }

        Err(TimeParseError::InvalidFormat(s.to_string()))
    }
}

/// Truncate to the start of the containing hour.
pub fn floor_hour(t: DateTime<Utc>) -> DateTime<Utc> {
    let floored = t.timestamp().div_euclid(SECONDS_PER_HOUR) * SECONDS_PER_HOUR;
    Utc.timestamp_opt(floored, 0).single().unwrap_or(t)
}

/// Round up to the next whole hour; whole hours are returned unchanged.
pub fn ceil_hour(t: DateTime<Utc>) -> DateTime<Utc> {
    let floor = floor_hour(t);
    if floor == t {
        floor
    } else {
        floor + Duration::hours(1)
    }
}

/// Hourly instants from `floor_hour(start)` to `ceil_hour(end)` inclusive.
///
/// Returns an empty vector when `end < start`.
pub fn hourly_range(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<DateTime<Utc>> {
    if end < start {
        return Vec::new();
    }
    let first = floor_hour(start);
    let last = ceil_hour(end);
    let mut out = Vec::new();
    let mut t = first;
    while t <= last {
        out.push(t);
        t += Duration::hours(1);
    }
    out
}

/// CF-convention time units such as `hours since 1970-01-01 00:00:00`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CfTimeUnits {
    /// Length of one step in seconds.
    pub step_seconds: i64,
    pub epoch: DateTime<Utc>,
}

impl CfTimeUnits {
    pub fn parse(units: &str) -> Result<Self, TimeParseError> {
        let (unit, since) = units
            .split_once(" since ")
            .ok_or_else(|| TimeParseError::InvalidUnits(units.to_string()))?;

        let step_seconds = match unit.trim().to_ascii_lowercase().as_str() {
            "seconds" | "second" | "secs" | "sec" | "s" => 1,
            "minutes" | "minute" | "mins" | "min" => 60,
            "hours" | "hour" | "hrs" | "hr" | "h" => SECONDS_PER_HOUR,
            "days" | "day" | "d" => 24 * SECONDS_PER_HOUR,
            _ => return Err(TimeParseError::InvalidUnits(units.to_string())),
        };

        let since = since.trim();
        let since = since.strip_suffix("UTC").map(str::trim).unwrap_or(since);
        let epoch = ValidTime::from_iso8601(since)
            .map_err(|_| TimeParseError::InvalidUnits(units.to_string()))?;

        Ok(Self {
            step_seconds,
            epoch,
        })
    }

    /// Seconds since 1970-01-01T00:00:00Z.
    pub fn epoch_seconds() -> Self {
        Self {
            step_seconds: 1,
            epoch: DateTime::UNIX_EPOCH,
        }
    }

    /// Convert an encoded offset to an instant, rounded to the millisecond.
    pub fn decode(&self, value: f64) -> Option<DateTime<Utc>> {
        if !value.is_finite() {
            return None;
        }
        let millis = (value * self.step_seconds as f64 * 1000.0).round();
        if millis.abs() > i64::MAX as f64 {
            return None;
        }
        Some(self.epoch + Duration::milliseconds(millis as i64))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TimeParseError {
    #[error("Invalid time format: {0}")]
    InvalidFormat(String),

    #[error("Invalid CF time units: {0}")]
    InvalidUnits(String),
}
