//! Drift runs over a composite harmonized from synthetic providers.

use chrono::Duration;
use grid_harmonizer::{
    build_hourly_axis, compose, normalize_coords, regrid_to_reference, resample_to_axis,
    AliasTable, CompositeAttributes, DriverComposite, DriverVariable, ReferenceGrid,
    SourceDataset,
};
use test_utils::{
    assert_approx_eq, scenario_start, SourceBuilder, CURRENTS_GRID, STOKES_GRID, WIND_GRID,
};
use trajectory::{
    export_geojson, export_summary, DriftRunner, ParticleParams, ParticleStatus, ReleaseConfig,
    TrackFeatureCollection, EARTH_RADIUS_M,
};

/// Currents 0..72 h, Stokes 0..72 h, winds 0..24 h only.
fn composite(current_u: f32) -> DriverComposite {
    let currents = SourceBuilder::new("currents")
        .labels("time", "latitude", "longitude")
        .hourly(scenario_start(), 73, 1)
        .grid(CURRENTS_GRID)
        .constant("uo", current_u)
        .constant("vo", 0.0)
        .build();
    let stokes = SourceBuilder::new("waves")
        .hourly(scenario_start(), 25, 3)
        .grid(STOKES_GRID)
        .constant("VSDX", 0.1)
        .constant("VSDY", 0.05)
        .build();
    let winds = SourceBuilder::new("gfs")
        .labels("valid_time", "latitude", "longitude")
        .hourly(scenario_start(), 9, 3)
        .grid(WIND_GRID)
        .constant("u10", 5.0)
        .constant("v10", 0.0)
        .build();

    let aliases = AliasTable::defaults();
    let prepare = |source: &SourceDataset, vars: &[DriverVariable]| {
        normalize_coords(&aliases.select_and_rename(source, vars).unwrap()).unwrap()
    };

    let reference = prepare(&currents, &[DriverVariable::UCurr, DriverVariable::VCurr]);
    let grid = ReferenceGrid::from_source(&reference).unwrap();
    let axis = build_hourly_axis(reference.time().unwrap()).unwrap();

    let parts: Vec<SourceDataset> = [
        reference.clone(),
        prepare(&stokes, &[DriverVariable::UStokes, DriverVariable::VStokes]),
        prepare(&winds, &[DriverVariable::UWind, DriverVariable::VWind]),
    ]
    .iter()
    .map(|part| {
        let on_grid = regrid_to_reference(part, &grid).unwrap();
        resample_to_axis(&on_grid, &axis).unwrap()
    })
    .collect();

    compose(&parts, &grid, &axis, CompositeAttributes::default()).unwrap()
}

fn release(lat: f64, lon: f64, members: usize) -> ReleaseConfig {
    ReleaseConfig {
        points: vec![[lat, lon]],
        members,
        time_spread_min: 0,
        start: None,
    }
}

#[test]
fn test_drift_follows_combined_velocity() {
    let composite = composite(1.0);
    let tracks = DriftRunner::default()
        .run(&composite, &ParticleParams::default(), &release(32.5, 29.05, 1), 12)
        .unwrap();

    assert_eq!(tracks.times.first(), Some(&scenario_start()));
    assert_eq!(tracks.times.len(), 13);
    assert_eq!(tracks.status[0], ParticleStatus::Active);

    // 1.0 current + 2% of 5.0 wind + 0.1 Stokes eastward, 0.05 Stokes northward.
    let (lon, lat) = tracks.position(12, 0).unwrap();
    let north_m = 0.05 * 12.0 * 3600.0;
    let east_m = 1.2 * 12.0 * 3600.0;
    let expected_lat = 32.5 + (north_m / EARTH_RADIUS_M).to_degrees();
    assert_approx_eq!(lat, expected_lat, 1e-6);
    let mid_lat = (32.5 + expected_lat) / 2.0;
    let expected_lon = 29.05 + (east_m / (EARTH_RADIUS_M * mid_lat.to_radians().cos())).to_degrees();
    assert_approx_eq!(lon, expected_lon, 1e-4);
}

#[test]
fn test_particles_stop_when_winds_end() {
    let composite = composite(0.0);
    let tracks = DriftRunner::default()
        .run(&composite, &ParticleParams::default(), &release(32.5, 29.5, 2), 48)
        .unwrap();

    let cutoff = scenario_start() + Duration::hours(24);
    for particle in 0..2 {
        assert_eq!(tracks.status[particle], ParticleStatus::Deactivated { at: cutoff });
        assert!(tracks.position(24, particle).is_some());
        assert!(tracks.position(25, particle).is_none());
    }
    assert_eq!(tracks.n_deactivated(), 2);
}

#[test]
fn test_leaving_the_grid_deactivates() {
    let composite = composite(1.0);
    let tracks = DriftRunner::default()
        .run(&composite, &ParticleParams::default(), &release(32.5, 29.9, 1), 12)
        .unwrap();

    assert!(matches!(tracks.status[0], ParticleStatus::Deactivated { .. }));
    // The last completed step may end just past the eastern edge.
    let (lon, _) = tracks.last_position(0).unwrap();
    assert!(lon > 29.9 && lon < 30.1);
    assert!(tracks.position(12, 0).is_none());
}

#[test]
fn test_exports_from_a_run() {
    let composite = composite(0.0);
    let params = ParticleParams::default();
    let tracks = DriftRunner::default()
        .run(&composite, &params, &release(32.5, 29.5, 2), 48)
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let geojson = dir.path().join("tracks.geojson");
    let summary = dir.path().join("summary.csv");
    export_geojson(&tracks, &geojson).unwrap();
    export_summary(&tracks, &params, 48, &summary).unwrap();

    let collection: TrackFeatureCollection =
        serde_json::from_str(&std::fs::read_to_string(&geojson).unwrap()).unwrap();
    // Hours 0..=24 for both members; nothing after deactivation.
    assert_eq!(collection.features.len(), 50);
    assert_eq!(collection.features[0].properties.t, "2025-06-01T00:00:00Z");
    assert_eq!(collection.features[1].properties.id, 1);

    let text = std::fs::read_to_string(&summary).unwrap();
    assert!(text.contains("n_particles,2"));
    assert!(text.contains("horizon_hours,48"));
    assert!(text.contains("n_deactivated,2"));
}
