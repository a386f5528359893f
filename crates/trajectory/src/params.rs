//! Particle and release configuration.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrajectoryError};

/// How a drifting object responds to its forcing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleParams {
    /// Share of the 10 m wind added to the drift velocity, in percent.
    pub windage_pct: f64,
    pub include_stokes: bool,
}

impl Default for ParticleParams {
    fn default() -> Self {
        Self {
            windage_pct: 2.0,
            include_stokes: true,
        }
    }
}

impl ParticleParams {
    pub fn validate(&self) -> Result<()> {
        if !self.windage_pct.is_finite() || !(0.0..=100.0).contains(&self.windage_pct) {
            return Err(TrajectoryError::InvalidParameter(format!(
                "windage_pct must be within 0..=100, got {}",
                self.windage_pct
            )));
        }
        Ok(())
    }

    pub fn windage_factor(&self) -> f64 {
        self.windage_pct / 100.0
    }
}

/// Where and when particles are released.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReleaseConfig {
    /// `[lat, lon]` pairs.
    pub points: Vec<[f64; 2]>,
    /// Particles per release point.
    pub members: usize,
    /// Members are released evenly over this many minutes.
    pub time_spread_min: u32,
    /// Defaults to the start of the forcing.
    pub start: Option<DateTime<Utc>>,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            points: Vec::new(),
            members: 20,
            time_spread_min: 0,
            start: None,
        }
    }
}

/// One particle's release.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Seed {
    pub lon: f64,
    pub lat: f64,
    pub time: DateTime<Utc>,
}

impl ReleaseConfig {
    /// Seeds in point-major order: every member of point 0, then point 1, ...
    pub fn seeds(&self, start: DateTime<Utc>) -> Result<Vec<Seed>> {
        if self.points.is_empty() {
            return Err(TrajectoryError::NoReleasePoints);
        }
        if self.members == 0 {
            return Err(TrajectoryError::InvalidParameter(
                "members must be at least 1".to_string(),
            ));
        }

        let spread_secs = i64::from(self.time_spread_min) * 60;
        let divisor = (self.members.max(2) - 1) as i64;

        let mut seeds = Vec::with_capacity(self.points.len() * self.members);
        for &[lat, lon] in &self.points {
            if !lat.is_finite() || !lon.is_finite() || lat.abs() > 90.0 {
                return Err(TrajectoryError::InvalidReleasePoint { lat, lon });
            }
            for k in 0..self.members as i64 {
                seeds.push(Seed {
                    lon,
                    lat,
                    time: start + Duration::seconds(k * spread_secs / divisor),
                });
            }
        }
        Ok(seeds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_no_points_is_an_error() {
        let err = ReleaseConfig::default().seeds(t0()).unwrap_err();
        assert!(matches!(err, TrajectoryError::NoReleasePoints));
    }

    #[test]
    fn test_seeds_spread_evenly() {
        let release = ReleaseConfig {
            points: vec![[32.5, 29.5], [32.6, 29.4]],
            members: 5,
            time_spread_min: 60,
            start: None,
        };
        let seeds = release.seeds(t0()).unwrap();
        assert_eq!(seeds.len(), 10);
        assert_eq!(seeds[0].time, t0());
        assert_eq!(seeds[1].time, t0() + Duration::minutes(15));
        assert_eq!(seeds[4].time, t0() + Duration::minutes(60));
        assert_eq!((seeds[5].lat, seeds[5].lon), (32.6, 29.4));
        assert_eq!(seeds[5].time, t0());
    }

    #[test]
    fn test_single_member_releases_at_start() {
        let release = ReleaseConfig {
            points: vec![[0.0, 0.0]],
            members: 1,
            time_spread_min: 30,
            start: None,
        };
        assert_eq!(release.seeds(t0()).unwrap()[0].time, t0());
    }

    #[test]
    fn test_invalid_inputs() {
        let release = ReleaseConfig {
            points: vec![[95.0, 0.0]],
            ..ReleaseConfig::default()
        };
        assert!(matches!(
            release.seeds(t0()),
            Err(TrajectoryError::InvalidReleasePoint { .. })
        ));

        let params = ParticleParams {
            windage_pct: -1.0,
            include_stokes: false,
        };
        assert!(params.validate().is_err());
        assert!(ParticleParams::default().validate().is_ok());
        assert_eq!(ParticleParams::default().windage_factor(), 0.02);
    }

    #[test]
    fn test_release_defaults_from_json() {
        let release: ReleaseConfig = serde_json::from_str(r#"{"points": [[32.5, 29.5]]}"#).unwrap();
        assert_eq!(release.members, 20);
        assert_eq!(release.time_spread_min, 0);
        assert!(release.start.is_none());
    }
}
