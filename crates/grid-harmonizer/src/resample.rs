//! Temporal reconciliation onto the canonical hourly axis.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use field_common::hourly_range;
use tracing::{debug, info};

use crate::error::{HarmonizeError, Result};
use crate::interpolation::lerp;
use crate::types::{CoordinateAxis, GriddedField, SourceDataset, TimeAxis, TimeBracket, TIME};

/// Hourly instants from the floored first to the ceiled last reference time.
pub fn build_hourly_axis(reference: &TimeAxis) -> Result<TimeAxis> {
    TimeAxis::new(hourly_range(reference.first(), reference.last()))
}

/// Linearly interpolate every cell of a normalized source onto `axis`.
///
/// Instants outside the source's time span are NaN for every cell; instants
/// that coincide with a source step copy it verbatim.
pub fn resample_to_axis(source: &SourceDataset, axis: &TimeAxis) -> Result<SourceDataset> {
    let src_time = source.time()?;
    if src_time == axis {
        return Ok(source.clone());
    }

    let shape = source.shape()?;
    let frame = shape.frame_len();
    let brackets: Vec<Option<TimeBracket>> =
        axis.instants().iter().map(|&t| src_time.bracket(t)).collect();
    let uncovered = brackets.iter().filter(|b| b.is_none()).count();

    let fields: Vec<GriddedField> = source
        .variables()
        .map(|field| {
            let mut data = Vec::with_capacity(axis.len() * frame);
            for bracket in &brackets {
                match bracket {
                    None => data.extend(std::iter::repeat(f32::NAN).take(frame)),
                    Some(b) if b.lo == b.hi => {
                        data.extend_from_slice(&field.data[b.lo * frame..(b.lo + 1) * frame]);
                    }
                    Some(b) => {
                        let before = &field.data[b.lo * frame..(b.lo + 1) * frame];
                        let after = &field.data[b.hi * frame..(b.hi + 1) * frame];
                        let w = b.weight as f32;
                        data.extend(before.iter().zip(after).map(|(&a, &z)| lerp(a, z, w)));
                    }
                }
            }
            field.with_data(data)
        })
        .collect();

    let mut coords = source.coords().clone();
    coords.insert(TIME.to_string(), CoordinateAxis::Temporal(axis.clone()));

    info!(
        provider = %source.provenance.provider,
        source_steps = src_time.len(),
        target_steps = axis.len(),
        uncovered_steps = uncovered,
        "resampled to hourly axis"
    );
    source.rebuild(coords, fields)
}

/// Concatenate datasets along time, ordered by valid time.
///
/// Parts are taken in retrieval order; when two parts carry the same instant,
/// the later part wins. All parts must share coordinate labels, spatial
/// axes and variables.
pub fn merge_valid_times(parts: Vec<SourceDataset>) -> Result<SourceDataset> {
    let first = parts
        .first()
        .ok_or_else(|| HarmonizeError::invalid_axis("no datasets to merge"))?;

    let time_label = single_time_label(first)?;
    let names = first.variable_names();
    for part in &parts[1..] {
        check_compatible(first, part, &time_label, &names)?;
    }

    // (instant, part, step); stable sort keeps retrieval order among equals.
    let mut steps: Vec<(DateTime<Utc>, usize, usize)> = Vec::new();
    for (p, part) in parts.iter().enumerate() {
        if let Some(CoordinateAxis::Temporal(axis)) = part.coordinate(&time_label) {
            steps.extend(axis.instants().iter().enumerate().map(|(s, &t)| (t, p, s)));
        }
    }
    steps.sort_by_key(|(t, _, _)| *t);

    let mut kept: Vec<(DateTime<Utc>, usize, usize)> = Vec::with_capacity(steps.len());
    for step in steps {
        match kept.last_mut() {
            Some(last) if last.0 == step.0 => {
                debug!(instant = %step.0.to_rfc3339(), "later part replaces duplicate instant");
                *last = step;
            }
            _ => kept.push(step),
        }
    }

    let frame: usize = first
        .coords()
        .iter()
        .filter(|(label, _)| **label != time_label)
        .map(|(_, axis)| axis.len())
        .product();

    let mut fields = Vec::with_capacity(names.len());
    for name in &names {
        let mut data = Vec::with_capacity(kept.len() * frame);
        for &(_, p, s) in &kept {
            if let Some(field) = parts[p].variable(name) {
                data.extend_from_slice(&field.data[s * frame..(s + 1) * frame]);
            }
        }
        if let Some(template) = first.variable(name) {
            fields.push(template.with_data(data));
        }
    }

    let axis = TimeAxis::new(kept.iter().map(|(t, _, _)| *t).collect())?;
    let mut coords: BTreeMap<String, CoordinateAxis> = first.coords().clone();
    coords.insert(time_label, CoordinateAxis::Temporal(axis));
    first.rebuild(coords, fields)
}

fn single_time_label(source: &SourceDataset) -> Result<String> {
    let mut temporal = source
        .coords()
        .iter()
        .filter(|(_, axis)| axis.is_temporal())
        .map(|(label, _)| label.clone());
    match (temporal.next(), temporal.next()) {
        (Some(label), None) => Ok(label),
        _ => Err(HarmonizeError::axis_mismatch(format!(
            "{}: expected exactly one time coordinate",
            source.source_id()
        ))),
    }
}

fn check_compatible(
    first: &SourceDataset,
    part: &SourceDataset,
    time_label: &str,
    names: &[String],
) -> Result<()> {
    let labels = |s: &SourceDataset| s.coords().keys().cloned().collect::<Vec<_>>();
    if labels(first) != labels(part) {
        return Err(HarmonizeError::axis_mismatch(format!(
            "{}: coordinate labels differ from {}",
            part.source_id(),
            first.source_id()
        )));
    }
    for (label, axis) in first.coords() {
        if label != time_label && part.coordinate(label) != Some(axis) {
            return Err(HarmonizeError::axis_mismatch(format!(
                "{}: coordinate '{}' differs between parts",
                part.source_id(),
                label
            )));
        }
    }
    if part.variable_names() != names {
        return Err(HarmonizeError::axis_mismatch(format!(
            "{}: variables {:?} differ from {:?}",
            part.source_id(),
            part.variable_names(),
            names
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Axis, Provenance, LAT, LON};
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn series(times: &[i64], values: &[f32], time_label: &str) -> SourceDataset {
        let mut coords = BTreeMap::new();
        coords.insert(
            time_label.to_string(),
            CoordinateAxis::Temporal(
                TimeAxis::new(times.iter().map(|h| t0() + Duration::hours(*h)).collect()).unwrap(),
            ),
        );
        coords.insert(LAT.to_string(), CoordinateAxis::Spatial(Axis::new(vec![0.0]).unwrap()));
        coords.insert(LON.to_string(), CoordinateAxis::Spatial(Axis::new(vec![0.0]).unwrap()));
        SourceDataset::new(
            Provenance::new("src"),
            coords,
            vec![GriddedField::new("f", values.to_vec())],
        )
        .unwrap()
    }

    fn hourly(n: i64) -> TimeAxis {
        TimeAxis::new((0..n).map(|h| t0() + Duration::hours(h)).collect()).unwrap()
    }

    #[test]
    fn test_hourly_axis_floors_and_ceils() {
        let reference = TimeAxis::new(vec![
            t0() + Duration::minutes(30),
            t0() + Duration::minutes(150),
        ])
        .unwrap();
        let axis = build_hourly_axis(&reference).unwrap();
        assert_eq!(axis.first(), t0());
        assert_eq!(axis.last(), t0() + Duration::hours(3));
        assert_eq!(axis.len(), 4);
    }

    #[test]
    fn test_linear_between_steps_and_nan_outside() {
        let src = series(&[0, 3], &[0.0, 3.0], TIME);
        let out = resample_to_axis(&src, &hourly(5)).unwrap();
        let data = &out.variable("f").unwrap().data;
        assert_eq!(data[0], 0.0);
        assert!((data[1] - 1.0).abs() < 1e-6);
        assert!((data[2] - 2.0).abs() < 1e-6);
        assert_eq!(data[3], 3.0);
        assert!(data[4].is_nan());
    }

    #[test]
    fn test_single_instant_covers_only_itself() {
        let src = series(&[2], &[7.0], TIME);
        let out = resample_to_axis(&src, &hourly(4)).unwrap();
        let data = &out.variable("f").unwrap().data;
        assert!(data[1].is_nan());
        assert_eq!(data[2], 7.0);
        assert!(data[3].is_nan());
    }

    #[test]
    fn test_matching_axis_is_untouched() {
        let src = series(&[0, 1, 2], &[1.0, f32::NAN, 2.0], TIME);
        let out = resample_to_axis(&src, &hourly(3)).unwrap();
        assert_eq!(
            out.variable("f").unwrap().data.iter().map(|v| v.to_bits()).collect::<Vec<_>>(),
            src.variable("f").unwrap().data.iter().map(|v| v.to_bits()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_merge_sorts_and_later_part_wins() {
        let parts = vec![
            series(&[6], &[6.0], "valid_time"),
            series(&[0, 3], &[0.0, 3.0], "valid_time"),
            series(&[3], &[30.0], "valid_time"),
        ];
        let merged = merge_valid_times(parts).unwrap();
        let axis = match merged.coordinate("valid_time") {
            Some(CoordinateAxis::Temporal(axis)) => axis.clone(),
            other => panic!("unexpected coordinate {other:?}"),
        };
        assert_eq!(axis.len(), 3);
        assert_eq!(merged.variable("f").unwrap().data, vec![0.0, 30.0, 6.0]);
    }

    #[test]
    fn test_merge_rejects_mismatched_parts() {
        let a = series(&[0], &[0.0], TIME);
        let b = series(&[1], &[1.0], "valid_time");
        assert!(matches!(
            merge_valid_times(vec![a, b]),
            Err(HarmonizeError::AxisMismatch(_))
        ));
        assert!(merge_valid_times(vec![]).is_err());
    }
}
