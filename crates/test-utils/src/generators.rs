//! Synthetic provider datasets.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use grid_harmonizer::{
    Axis, CoordinateAxis, DriverVariable, GriddedField, Provenance, SourceDataset, TimeAxis,
};

use crate::fixtures::GridDef;

type FieldFn = Box<dyn Fn(usize, f64, f64) -> f32>;

/// Hourly (or `step_hours`) instants starting at `start`.
pub fn hourly_times(start: DateTime<Utc>, count: usize, step_hours: i64) -> Vec<DateTime<Utc>> {
    (0..count)
        .map(|k| start + Duration::hours(k as i64 * step_hours))
        .collect()
}

/// Builder for a [`SourceDataset`] laid out `[time][lat][lon]`.
///
/// Coordinate labels default to `time`/`lat`/`lon`; override them to mimic
/// provider files that use `valid_time`/`latitude`/`longitude`.
pub struct SourceBuilder {
    provider: String,
    cycle: Option<DateTime<Utc>>,
    labels: [String; 3],
    times: Vec<DateTime<Utc>>,
    lats: Vec<f64>,
    lons: Vec<f64>,
    fields: Vec<(String, Option<String>, FieldFn)>,
    claims: Vec<DriverVariable>,
}

impl SourceBuilder {
    pub fn new(provider: &str) -> Self {
        Self {
            provider: provider.to_string(),
            cycle: None,
            labels: ["time".into(), "lat".into(), "lon".into()],
            times: Vec::new(),
            lats: Vec::new(),
            lons: Vec::new(),
            fields: Vec::new(),
            claims: Vec::new(),
        }
    }

    pub fn cycle(mut self, cycle: DateTime<Utc>) -> Self {
        self.cycle = Some(cycle);
        self
    }

    pub fn labels(mut self, time: &str, lat: &str, lon: &str) -> Self {
        self.labels = [time.to_string(), lat.to_string(), lon.to_string()];
        self
    }

    pub fn times(mut self, times: Vec<DateTime<Utc>>) -> Self {
        self.times = times;
        self
    }

    pub fn hourly(self, start: DateTime<Utc>, count: usize, step_hours: i64) -> Self {
        self.times(hourly_times(start, count, step_hours))
    }

    pub fn grid(mut self, grid: GridDef) -> Self {
        self.lats = grid.lats();
        self.lons = grid.lons();
        self
    }

    pub fn lats(mut self, lats: Vec<f64>) -> Self {
        self.lats = lats;
        self
    }

    pub fn lons(mut self, lons: Vec<f64>) -> Self {
        self.lons = lons;
        self
    }

    pub fn constant(self, name: &str, value: f32) -> Self {
        self.field(name, move |_, _, _| value)
    }

    /// Field defined by `f(time_index, lat, lon)`.
    pub fn field(mut self, name: &str, f: impl Fn(usize, f64, f64) -> f32 + 'static) -> Self {
        self.fields.push((name.to_string(), None, Box::new(f)));
        self
    }

    pub fn units(mut self, units: &str) -> Self {
        if let Some(last) = self.fields.last_mut() {
            last.1 = Some(units.to_string());
        }
        self
    }

    pub fn claims(mut self, claims: Vec<DriverVariable>) -> Self {
        self.claims = claims;
        self
    }

    pub fn time_labels(&self) -> &[DateTime<Utc>] {
        &self.times
    }

    pub fn coordinate_labels(&self) -> &[String; 3] {
        &self.labels
    }

    pub fn latitudes(&self) -> &[f64] {
        &self.lats
    }

    pub fn longitudes(&self) -> &[f64] {
        &self.lons
    }

    /// Evaluate every field over the grid, `[time][lat][lon]`.
    pub fn field_values(&self) -> Vec<(String, Option<String>, Vec<f32>)> {
        self.fields
            .iter()
            .map(|(name, units, f)| {
                let mut data = Vec::with_capacity(self.times.len() * self.lats.len() * self.lons.len());
                for t in 0..self.times.len() {
                    for &lat in &self.lats {
                        for &lon in &self.lons {
                            data.push(f(t, lat, lon));
                        }
                    }
                }
                (name.clone(), units.clone(), data)
            })
            .collect()
    }

    pub fn build(&self) -> SourceDataset {
        let mut provenance = Provenance::new(self.provider.clone());
        if let Some(cycle) = self.cycle.or_else(|| self.times.first().copied()) {
            provenance = provenance.with_cycle(cycle);
        }

        let mut coords = BTreeMap::new();
        coords.insert(
            self.labels[0].clone(),
            CoordinateAxis::Temporal(TimeAxis::new(self.times.clone()).expect("valid time axis")),
        );
        coords.insert(
            self.labels[1].clone(),
            CoordinateAxis::Spatial(Axis::new(self.lats.clone()).expect("valid lat axis")),
        );
        coords.insert(
            self.labels[2].clone(),
            CoordinateAxis::Spatial(Axis::new(self.lons.clone()).expect("valid lon axis")),
        );

        let fields = self
            .field_values()
            .into_iter()
            .map(|(name, units, data)| {
                let field = GriddedField::new(name, data);
                match units {
                    Some(u) => field.with_units(u),
                    None => field,
                }
            })
            .collect();

        SourceDataset::new(provenance, coords, fields)
            .expect("consistent synthetic dataset")
            .with_claims(self.claims.clone())
    }
}
