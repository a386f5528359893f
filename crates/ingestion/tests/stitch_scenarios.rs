//! End-to-end stitching from files on disk.

use std::path::Path;

use chrono::Duration;
use grid_harmonizer::{
    CollectingSink, CompositeConfig, CompositeReader, CompositeWriter, DiagnosticEvent,
    DriverVariable, FieldSampler, HarmonizeError, LAT, LON, TIME,
};
use ingestion::{
    load_grib2_winds, load_source, load_zarr_source, IngestionError, ProviderAliases, SourceSpec,
    StitchRequest, Stitcher,
};
use test_utils::{
    assert_all_approx, assert_approx_eq, scenario_start, write_gfs_wind_files, write_source_zarr,
    SourceBuilder, TimeEncoding, ZarrSourceOptions, CURRENTS_GRID, STOKES_GRID, WIND_GRID,
};

fn currents() -> SourceBuilder {
    SourceBuilder::new("cmems")
        .labels("time", "latitude", "longitude")
        .hourly(scenario_start(), 73, 1)
        .grid(CURRENTS_GRID)
        .constant("uo", 1.0)
        .units("m s-1")
        .constant("vo", 0.0)
        .units("m s-1")
}

fn stokes() -> SourceBuilder {
    SourceBuilder::new("waves")
        .hourly(scenario_start(), 25, 3)
        .grid(STOKES_GRID)
        .constant("VSDX", 0.1)
        .constant("VSDY", 0.0)
}

/// Currents (Zarr, depth levels), Stokes (Zarr, CF hours), winds for 0-24 h (GRIB2).
fn write_inputs(dir: &Path) {
    write_source_zarr(
        &dir.join("currents.zarr"),
        &currents(),
        ZarrSourceOptions {
            time_encoding: TimeEncoding::EpochSeconds,
            depth_levels: Some(3),
        },
    );
    write_source_zarr(
        &dir.join("stokes.zarr"),
        &stokes(),
        ZarrSourceOptions {
            time_encoding: TimeEncoding::CfHours,
            depth_levels: None,
        },
    );
    write_gfs_wind_files(
        &dir.join("winds"),
        scenario_start(),
        (0..=24).step_by(3),
        WIND_GRID,
        5.0,
        0.0,
        false,
    );
}

fn request(dir: &Path) -> StitchRequest {
    StitchRequest {
        currents: SourceSpec::new("cmems", dir.join("currents.zarr")),
        stokes: SourceSpec::new("waves", dir.join("stokes.zarr")),
        winds: SourceSpec::new("gfs", dir.join("winds")),
        output: dir.join("drivers.zarr"),
        title: Some("Scenario drivers".to_string()),
        bbox: None,
    }
}

#[test]
fn test_end_to_end_scenario() {
    let dir = tempfile::tempdir().unwrap();
    write_inputs(dir.path());

    let sink = CollectingSink::new();
    let writer = CompositeWriter::new(CompositeConfig::default()).unwrap();
    let report = Stitcher::new(writer, &sink).run(&request(dir.path())).unwrap();

    assert_eq!(report.time_steps, 73);
    assert_eq!(report.grid_shape, (11, 11));
    assert_eq!(report.variables.len(), 6);
    assert!(report.bytes_written > 0);

    let composite = CompositeReader::open(&dir.path().join("drivers.zarr")).unwrap();
    assert_eq!(composite.attributes.title, "Scenario drivers");
    assert_eq!(composite.attributes.sources.len(), 3);
    assert!(composite.attributes.notes.contains("NaN"));

    let frame = composite.shape().frame_len();
    assert_all_approx!(composite.field(DriverVariable::UCurr).data, 1.0, 1e-6);
    assert_all_approx!(composite.field(DriverVariable::UStokes).data, 0.1, 1e-6);

    let u_wind = &composite.field(DriverVariable::UWind).data;
    assert_all_approx!(&u_wind[..25 * frame], 5.0, 1e-4);
    assert!(u_wind[25 * frame..].iter().all(|v| v.is_nan()));

    let wind = report
        .nan_coverage
        .iter()
        .find(|c| c.variable == "u_wind")
        .unwrap();
    assert_eq!(wind.nan_cells, 48 * frame);

    let sample = composite.sample(scenario_start() + Duration::minutes(30), 29.5, 32.5);
    assert_approx_eq!(sample.wind.u, 5.0, 1e-4);
    assert_approx_eq!(sample.current.u, 1.0, 1e-6);

    let events = sink.events();
    assert!(events.iter().any(|e| matches!(e, DiagnosticEvent::Coverage(_))));
    assert!(events
        .iter()
        .any(|e| matches!(e, DiagnosticEvent::Stage { stage, .. } if stage == "write")));
}

#[test]
fn test_missing_variable_aborts_without_artifact() {
    let dir = tempfile::tempdir().unwrap();
    write_inputs(dir.path());
    // Waves provider that only ships significant wave height.
    let waves = SourceBuilder::new("waves")
        .hourly(scenario_start(), 25, 3)
        .grid(STOKES_GRID)
        .constant("VHM0", 1.5);
    write_source_zarr(&dir.path().join("hs.zarr"), &waves, ZarrSourceOptions::default());

    let mut req = request(dir.path());
    req.stokes = SourceSpec::new("waves", dir.path().join("hs.zarr"));

    let sink = CollectingSink::new();
    let writer = CompositeWriter::new(CompositeConfig::default()).unwrap();
    let err = Stitcher::new(writer, &sink).run(&req).unwrap_err();

    match err {
        IngestionError::Harmonize(HarmonizeError::MissingVariable {
            logical,
            source_id,
            tried,
        }) => {
            assert_eq!(logical, "u_stokes");
            assert!(source_id.starts_with("waves"));
            assert!(tried.iter().any(|n| n == "ustokes"));
            assert!(tried.iter().any(|n| n == "VSDX"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!dir.path().join("drivers.zarr").exists());
    assert!(!dir.path().join(".drivers.zarr.staging").exists());
}

#[test]
fn test_provider_aliases_reach_the_resolver() {
    let dir = tempfile::tempdir().unwrap();
    write_inputs(dir.path());
    let waves = SourceBuilder::new("waves")
        .hourly(scenario_start(), 25, 3)
        .grid(STOKES_GRID)
        .constant("stokes_x", 0.2)
        .constant("stokes_y", 0.0);
    write_source_zarr(&dir.path().join("custom.zarr"), &waves, ZarrSourceOptions::default());

    let aliases: ProviderAliases =
        serde_yaml::from_str("aliases:\n  u_stokes: [stokes_x]\n  v_stokes: [stokes_y]\n").unwrap();
    let mut req = request(dir.path());
    req.stokes = SourceSpec::new("waves", dir.path().join("custom.zarr")).with_aliases(aliases);

    let sink = CollectingSink::new();
    let writer = CompositeWriter::new(CompositeConfig::default()).unwrap();
    Stitcher::new(writer, &sink).run(&req).unwrap();

    let composite = CompositeReader::open(&req.output).unwrap();
    assert_all_approx!(composite.field(DriverVariable::UStokes).data, 0.2, 1e-6);
}

#[test]
fn test_zarr_loader_keeps_provider_labels_and_surface_level() {
    let dir = tempfile::tempdir().unwrap();
    write_inputs(dir.path());
    let source = load_zarr_source(
        &dir.path().join("currents.zarr"),
        grid_harmonizer::Provenance::new("cmems"),
        vec![DriverVariable::UCurr, DriverVariable::VCurr],
    )
    .unwrap();

    assert!(source.coordinate("latitude").is_some());
    assert!(source.coordinate(LAT).is_none());
    let shape = (
        source.coordinate("time").unwrap().len(),
        source.coordinate("latitude").unwrap().len(),
        source.coordinate("longitude").unwrap().len(),
    );
    assert_eq!(shape, (73, 11, 11));
    // Deeper levels carry +100; only the surface survives.
    assert_all_approx!(source.variable("uo").unwrap().data, 1.0, 0.0);
    assert_eq!(source.claimed.len(), 2);

    let stokes = load_source(&SourceSpec::new("waves", dir.path().join("stokes.zarr")), &[]).unwrap();
    let normalized = grid_harmonizer::normalize_coords(&stokes).unwrap();
    let time = normalized.time().unwrap();
    assert_eq!(time.first(), scenario_start());
    assert_eq!(time.last(), scenario_start() + Duration::hours(72));
    assert!(normalized.coordinate(LON).is_some());
    assert!(normalized.coordinate(TIME).is_some());
}

#[test]
fn test_grib_loader_merges_files_and_later_file_wins() {
    let dir = tempfile::tempdir().unwrap();
    let first = write_gfs_wind_files(
        &dir.path().join("a"),
        scenario_start(),
        [0, 3],
        WIND_GRID,
        5.0,
        -1.0,
        true,
    );
    // A later cycle re-issues hour 3 (lead 0) with a different value.
    let second = write_gfs_wind_files(
        &dir.path().join("b"),
        scenario_start() + Duration::hours(3),
        [0],
        WIND_GRID,
        7.0,
        -1.0,
        false,
    );
    let files: Vec<_> = first.into_iter().chain(second).collect();
    let winds = load_grib2_winds(&files, grid_harmonizer::Provenance::new("gfs")).unwrap();

    let time = match winds.coordinate("valid_time").unwrap() {
        grid_harmonizer::CoordinateAxis::Temporal(axis) => axis.clone(),
        other => panic!("unexpected axis {other:?}"),
    };
    assert_eq!(time.len(), 2);
    assert_eq!(
        winds.provenance.cycle,
        Some(scenario_start() + Duration::hours(3))
    );

    let frame = WIND_GRID.len();
    let ugrd = &winds.variable("UGRD").unwrap().data;
    assert_all_approx!(&ugrd[..frame], 5.0, 1e-4);
    assert_all_approx!(&ugrd[frame..], 7.0, 1e-4);
    assert_all_approx!(winds.variable("VGRD").unwrap().data, -1.0, 1e-4);
    assert_eq!(
        winds.claimed,
        vec![DriverVariable::UWind, DriverVariable::VWind]
    );
}

#[test]
fn test_varying_stokes_reaches_composite_interpolated() {
    let dir = tempfile::tempdir().unwrap();
    write_inputs(dir.path());
    let plane = |lat: f64, lon: f64| (lat * 10.0 + lon) as f32;
    let waves = SourceBuilder::new("waves")
        .hourly(scenario_start(), 25, 3)
        .grid(STOKES_GRID)
        .field("VSDX", move |_, lat, lon| plane(lat, lon))
        .constant("VSDY", 0.0);
    write_source_zarr(&dir.path().join("plane.zarr"), &waves, ZarrSourceOptions::default());

    let mut req = request(dir.path());
    req.stokes = SourceSpec::new("waves", dir.path().join("plane.zarr"));
    let sink = CollectingSink::new();
    let writer = CompositeWriter::new(CompositeConfig::default()).unwrap();
    Stitcher::new(writer, &sink).run(&req).unwrap();

    let composite = CompositeReader::open(&req.output).unwrap();
    let shape = composite.shape();
    let u = &composite.field(DriverVariable::UStokes).data;
    for (j, &lat) in composite.grid.lat.values().iter().enumerate() {
        for (i, &lon) in composite.grid.lon.values().iter().enumerate() {
            assert_approx_eq!(u[shape.index(0, j, i)], plane(lat, lon), 1e-3);
            // Between the 3-hourly steps the field is constant in time.
            assert_approx_eq!(u[shape.index(1, j, i)], plane(lat, lon), 1e-3);
        }
    }
    // lat 32.3, lon 29.3 sits between coarse nodes.
    let cell = u[shape.index(0, 3, 3)];
    assert_approx_eq!(cell, 352.3, 1e-3);
    assert!((cell - plane(32.25, 29.25)).abs() > 0.1);

    let notes = &composite.attributes.notes;
    assert!(notes.contains("already on the reference grid"), "{notes}");
    assert!(notes.contains("bilinearly regridded"), "{notes}");
    assert!(notes.contains("linearly interpolated in time"), "{notes}");
}

#[test]
fn test_notes_skip_regrid_when_grids_match() {
    let dir = tempfile::tempdir().unwrap();
    write_inputs(dir.path());
    let waves = SourceBuilder::new("waves")
        .hourly(scenario_start(), 73, 1)
        .grid(CURRENTS_GRID)
        .constant("VSDX", 0.1)
        .constant("VSDY", 0.0);
    write_source_zarr(&dir.path().join("aligned.zarr"), &waves, ZarrSourceOptions::default());

    let mut req = request(dir.path());
    req.stokes = SourceSpec::new("waves", dir.path().join("aligned.zarr"));
    let sink = CollectingSink::new();
    let writer = CompositeWriter::new(CompositeConfig::default()).unwrap();
    Stitcher::new(writer, &sink).run(&req).unwrap();

    let notes = CompositeReader::open(&req.output).unwrap().attributes.notes;
    // Only the winds needed regridding and time interpolation.
    assert_eq!(notes.matches("bilinearly regridded").count(), 1, "{notes}");
    assert_eq!(notes.matches("linearly interpolated in time").count(), 1, "{notes}");
    assert_eq!(notes.matches("already on the reference grid").count(), 2, "{notes}");
}

#[test]
fn test_plain_directory_is_only_read_as_winds() {
    let dir = tempfile::tempdir().unwrap();
    let plain = dir.path().join("currents");
    std::fs::create_dir(&plain).unwrap();

    let err = load_source(
        &SourceSpec::new("cmems", &plain),
        &[DriverVariable::UCurr, DriverVariable::VCurr],
    )
    .unwrap_err();
    match err {
        IngestionError::UnknownFileType(msg) => assert!(msg.contains("not a Zarr store"), "{msg}"),
        other => panic!("unexpected error: {other}"),
    }

    let err = load_source(
        &SourceSpec::new("gfs", &plain),
        &[DriverVariable::UWind, DriverVariable::VWind],
    )
    .unwrap_err();
    assert!(matches!(err, IngestionError::NoSourceFiles(_)));
}

#[test]
fn test_wind_directory_newest_cycle_wins_over_path_order() {
    let dir = tempfile::tempdir().unwrap();
    let winds = dir.path().join("winds");
    // Newer cycle under a/, older cycle under b/: both valid at hour 6.
    write_gfs_wind_files(
        &winds.join("a"),
        scenario_start() + Duration::hours(6),
        [0],
        WIND_GRID,
        9.0,
        0.0,
        false,
    );
    write_gfs_wind_files(&winds.join("b"), scenario_start(), [6], WIND_GRID, 4.0, 0.0, false);

    let source = load_source(
        &SourceSpec::new("gfs", &winds),
        &[DriverVariable::UWind, DriverVariable::VWind],
    )
    .unwrap();
    assert_all_approx!(source.variable("UGRD").unwrap().data, 9.0, 1e-4);
    assert_eq!(
        source.provenance.cycle,
        Some(scenario_start() + Duration::hours(6))
    );
}
