//! Forward integration of particles through a `FieldSampler`.

use chrono::{DateTime, Duration, Utc};
use field_common::floor_hour;
use grid_harmonizer::{DriverSample, FieldSampler, Vector2};
use tracing::{debug, info};

use crate::error::{Result, TrajectoryError};
use crate::params::{ParticleParams, ReleaseConfig, Seed};

/// Spherical Earth radius in metres.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Particles are held inside this latitude band so the longitude step stays finite.
pub const MAX_ABS_LAT: f64 = 89.9;

/// Particle state at the end of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParticleStatus {
    /// Seed time lies after the last output instant.
    Unreleased,
    Active,
    /// Forcing went missing at `at`; the track stops at the last valid position.
    Deactivated { at: DateTime<Utc> },
}

/// Particle positions on the output time axis.
///
/// `lon[t][i]` and `lat[t][i]` are NaN before particle `i` is released and
/// after it has been deactivated.
#[derive(Debug, Clone)]
pub struct TrackSet {
    pub times: Vec<DateTime<Utc>>,
    pub lon: Vec<Vec<f64>>,
    pub lat: Vec<Vec<f64>>,
    pub status: Vec<ParticleStatus>,
    pub seeds: Vec<Seed>,
}

impl TrackSet {
    pub fn n_particles(&self) -> usize {
        self.seeds.len()
    }

    pub fn n_deactivated(&self) -> usize {
        self.status
            .iter()
            .filter(|s| matches!(s, ParticleStatus::Deactivated { .. }))
            .count()
    }

    pub fn position(&self, step: usize, particle: usize) -> Option<(f64, f64)> {
        let lon = *self.lon.get(step)?.get(particle)?;
        let lat = self.lat[step][particle];
        (lon.is_finite() && lat.is_finite()).then_some((lon, lat))
    }

    /// Last recorded position of a particle, if it was ever on the output axis.
    pub fn last_position(&self, particle: usize) -> Option<(f64, f64)> {
        (0..self.times.len())
            .rev()
            .find_map(|step| self.position(step, particle))
    }

    /// Great-circle distance from the seed to the last recorded position.
    pub fn displacement_km(&self, particle: usize) -> Option<f64> {
        let seed = self.seeds.get(particle)?;
        let (lon, lat) = self.last_position(particle)?;
        Some(haversine_km(seed.lon, seed.lat, lon, lat))
    }

    /// Mean displacement over the particles that were released; NaN if none were.
    pub fn mean_displacement_km(&self) -> f64 {
        let distances: Vec<f64> = (0..self.n_particles())
            .filter_map(|i| self.displacement_km(i))
            .collect();
        if distances.is_empty() {
            return f64::NAN;
        }
        distances.iter().sum::<f64>() / distances.len() as f64
    }
}

pub fn haversine_km(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let dphi = phi2 - phi1;
    let dlambda = (lon2 - lon1).to_radians();
    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().asin() / 1000.0
}

/// Displace `(lon, lat)` by velocity `vel` for `dt` seconds.
fn advance(lon: f64, lat: f64, vel: Vector2, dt: f64) -> (f64, f64) {
    let lat = lat.clamp(-MAX_ABS_LAT, MAX_ABS_LAT);
    let dlat = (vel.v * dt / EARTH_RADIUS_M).to_degrees();
    let dlon = (vel.u * dt / (EARTH_RADIUS_M * lat.to_radians().cos())).to_degrees();
    (lon + dlon, (lat + dlat).clamp(-MAX_ABS_LAT, MAX_ABS_LAT))
}

/// Midpoint (RK2) drift engine.
#[derive(Debug, Clone, Copy)]
pub struct DriftRunner {
    step_secs: u32,
}

impl DriftRunner {
    pub const DEFAULT_STEP_SECS: u32 = 3600;

    pub fn new(step_secs: u32) -> Result<Self> {
        if step_secs == 0 {
            return Err(TrajectoryError::InvalidParameter(
                "step_secs must be positive".to_string(),
            ));
        }
        Ok(Self { step_secs })
    }

    pub fn step_secs(&self) -> u32 {
        self.step_secs
    }

    /// Drift every seed of `release` for `horizon_hours` after the release start.
    ///
    /// Output instants are spaced by the runner's step; the last one is the
    /// horizon even when the step does not divide it.
    pub fn run<S: FieldSampler + ?Sized>(
        &self,
        sampler: &S,
        params: &ParticleParams,
        release: &ReleaseConfig,
        horizon_hours: u32,
    ) -> Result<TrackSet> {
        params.validate()?;
        if horizon_hours == 0 {
            return Err(TrajectoryError::InvalidParameter(
                "horizon_hours must be positive".to_string(),
            ));
        }

        let (first, last) = sampler.time_range();
        let start = release.start.unwrap_or_else(|| floor_hour(first));
        if start < first || start > last {
            return Err(TrajectoryError::StartOutsideForcing { start, first, last });
        }

        let seeds = release.seeds(start)?;
        let times = self.output_times(start, horizon_hours);
        info!(
            particles = seeds.len(),
            steps = times.len(),
            start = %start,
            windage_pct = params.windage_pct,
            include_stokes = params.include_stokes,
            "Starting drift run"
        );

        let n = seeds.len();
        let mut status = vec![ParticleStatus::Unreleased; n];
        let mut position: Vec<Option<(f64, f64)>> = vec![None; n];
        let mut lon = Vec::with_capacity(times.len());
        let mut lat = Vec::with_capacity(times.len());

        for (k, &t) in times.iter().enumerate() {
            let prev = if k == 0 { t } else { times[k - 1] };
            for (i, seed) in seeds.iter().enumerate() {
                let from = match status[i] {
                    ParticleStatus::Active => prev,
                    ParticleStatus::Unreleased if seed.time <= t => {
                        status[i] = ParticleStatus::Active;
                        position[i] = Some((seed.lon, seed.lat));
                        seed.time
                    }
                    _ => continue,
                };
                let Some((x, y)) = position[i] else { continue };

                match self.integrate(sampler, params, x, y, from, t) {
                    Some(next) => position[i] = Some(next),
                    None => {
                        debug!(particle = i, at = %from, "Forcing unavailable, deactivating particle");
                        status[i] = ParticleStatus::Deactivated { at: from };
                        position[i] = None;
                    }
                }
            }

            lon.push(position.iter().map(|p| p.map_or(f64::NAN, |p| p.0)).collect());
            lat.push(position.iter().map(|p| p.map_or(f64::NAN, |p| p.1)).collect());
        }

        let tracks = TrackSet {
            times,
            lon,
            lat,
            status,
            seeds,
        };
        info!(
            particles = tracks.n_particles(),
            deactivated = tracks.n_deactivated(),
            mean_displacement_km = tracks.mean_displacement_km(),
            "Drift run complete"
        );
        Ok(tracks)
    }

    fn output_times(&self, start: DateTime<Utc>, horizon_hours: u32) -> Vec<DateTime<Utc>> {
        let end = start + Duration::hours(i64::from(horizon_hours));
        let step = Duration::seconds(i64::from(self.step_secs));
        let mut times = Vec::new();
        let mut t = start;
        while t < end {
            times.push(t);
            t += step;
        }
        times.push(end);
        times
    }

    /// Integrate from `from` to `to` in sub-steps no longer than the runner's step.
    fn integrate<S: FieldSampler + ?Sized>(
        &self,
        sampler: &S,
        params: &ParticleParams,
        lon: f64,
        lat: f64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Option<(f64, f64)> {
        let (mut x, mut y) = (lon, lat);
        let mut t = from;
        // A release exactly on an output instant still needs forcing there.
        if from == to {
            velocity(&sampler.sample(t, x, y), params)?;
        }
        while t < to {
            let dt = (to - t).num_milliseconds().min(i64::from(self.step_secs) * 1000);
            let dt_s = dt as f64 / 1000.0;

            let k1 = velocity(&sampler.sample(t, x, y), params)?;
            let (mx, my) = advance(x, y, k1, dt_s / 2.0);
            let mid = t + Duration::milliseconds(dt / 2);
            let k2 = velocity(&sampler.sample(mid, mx, my), params)?;
            (x, y) = advance(x, y, k2, dt_s);
            t += Duration::milliseconds(dt);
        }
        Some((x, y))
    }
}

impl Default for DriftRunner {
    fn default() -> Self {
        Self {
            step_secs: Self::DEFAULT_STEP_SECS,
        }
    }
}

/// Drift velocity, or `None` when a required driver is NaN.
fn velocity(sample: &DriverSample, params: &ParticleParams) -> Option<Vector2> {
    if !sample.current.is_valid() || !sample.wind.is_valid() {
        return None;
    }
    let mut vel = sample.current + sample.wind * params.windage_factor();
    if params.include_stokes {
        if !sample.stokes.is_valid() {
            return None;
        }
        vel = vel + sample.stokes;
    }
    Some(vel)
}
