//! CF NetCDF sources, as ocean providers ship them. Needs the `netcdf`
//! feature and libnetcdf on the host.
#![cfg(feature = "netcdf")]

use std::path::Path;

use chrono::Duration;
use grid_harmonizer::{normalize_coords, DriverVariable, LAT, LON, TIME};
use ingestion::{detect_file_type, load_source, FileType, SourceSpec};
use test_utils::{assert_approx_eq, scenario_start};

const NT: usize = 3;
const NDEPTH: usize = 2;
const NLAT: usize = 4;
const NLON: usize = 5;
const FILL: f64 = -9999.0;

fn packed(t: usize, j: usize, i: usize) -> f64 {
    1000.0 + (t * 100 + j * 10 + i) as f64
}

/// Currents on `[time, depth, latitude, longitude]`, `uo` packed with a fill
/// value in its first cell, time in hours since the scenario start.
fn write_currents(path: &Path) -> Result<(), netcdf::Error> {
    let mut file = netcdf::create(path)?;
    file.add_dimension("time", NT)?;
    file.add_dimension("depth", NDEPTH)?;
    file.add_dimension("latitude", NLAT)?;
    file.add_dimension("longitude", NLON)?;

    {
        let mut time = file.add_variable::<f64>("time", &["time"])?;
        time.put_attribute("units", "hours since 2025-06-01 00:00:00")?;
        time.put_attribute("calendar", "standard")?;
        time.put_values(&[0.0, 1.0, 2.0], ..)?;
    }
    {
        let mut depth = file.add_variable::<f64>("depth", &["depth"])?;
        depth.put_values(&[0.5, 10.0], ..)?;
    }
    {
        let mut lat = file.add_variable::<f64>("latitude", &["latitude"])?;
        lat.put_attribute("units", "degrees_north")?;
        let values: Vec<f64> = (0..NLAT).map(|j| 32.0 + 0.25 * j as f64).collect();
        lat.put_values(&values, ..)?;
    }
    {
        let mut lon = file.add_variable::<f64>("longitude", &["longitude"])?;
        lon.put_attribute("units", "degrees_east")?;
        let values: Vec<f64> = (0..NLON).map(|i| 29.0 + 0.25 * i as f64).collect();
        lon.put_values(&values, ..)?;
    }

    let dims = ["time", "depth", "latitude", "longitude"];
    {
        let mut uo = file.add_variable::<f64>("uo", &dims)?;
        uo.put_attribute("units", "m s-1")?;
        uo.put_attribute("scale_factor", 0.001f64)?;
        uo.put_attribute("add_offset", 0.5f64)?;
        uo.put_attribute("_FillValue", FILL)?;
        let mut values = Vec::with_capacity(NT * NDEPTH * NLAT * NLON);
        for t in 0..NT {
            for level in 0..NDEPTH {
                for j in 0..NLAT {
                    for i in 0..NLON {
                        values.push(if level > 0 { 5000.0 } else { packed(t, j, i) });
                    }
                }
            }
        }
        values[0] = FILL;
        uo.put_values(&values, ..)?;
    }
    {
        let mut vo = file.add_variable::<f32>("vo", &dims)?;
        vo.put_attribute("units", "m s-1")?;
        vo.put_values(&vec![0.25f32; NT * NDEPTH * NLAT * NLON], ..)?;
    }
    Ok(())
}

#[test]
fn test_cf_netcdf_currents_load_and_normalize() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cmems_currents.nc");
    write_currents(&path).unwrap();
    assert_eq!(detect_file_type(&path), FileType::NetCdf);

    let source = load_source(
        &SourceSpec::new("cmems", &path),
        &[DriverVariable::UCurr, DriverVariable::VCurr],
    )
    .unwrap();
    assert_eq!(source.variable_names(), vec!["uo", "vo"]);
    assert!(source.coordinate("latitude").is_some());
    assert!(source.coordinate("depth").is_none());
    assert_eq!(source.provenance.path.as_deref(), Some(path.as_path()));

    let normalized = normalize_coords(&source).unwrap();
    for label in [TIME, LAT, LON] {
        assert!(normalized.coordinate(label).is_some(), "missing {label}");
    }
    let time = normalized.time().unwrap();
    assert_eq!(time.first(), scenario_start());
    assert_eq!(time.last(), scenario_start() + Duration::hours(2));
    assert_eq!(normalized.lat().unwrap().values()[1], 32.25);

    let shape = normalized.shape().unwrap();
    assert_eq!((shape.time, shape.lat, shape.lon), (NT, NLAT, NLON));

    let uo = &normalized.variable("uo").unwrap().data;
    assert!(uo[0].is_nan());
    // Surface level only, unpacked with scale and offset.
    assert_approx_eq!(uo[shape.index(2, 3, 4)], 0.5 + packed(2, 3, 4) * 0.001, 1e-6);
    assert_approx_eq!(uo[shape.index(1, 0, 1)], 0.5 + packed(1, 0, 1) * 0.001, 1e-6);
    assert_eq!(uo.iter().filter(|v| v.is_nan()).count(), 1);
    assert_eq!(
        normalized.variable("uo").unwrap().units.as_deref(),
        Some("m s-1")
    );

    let vo = &normalized.variable("vo").unwrap().data;
    assert!(vo.iter().all(|&v| (v - 0.25).abs() < 1e-7));
}
