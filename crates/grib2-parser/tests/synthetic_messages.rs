//! Decoding synthetic GRIB2 wind messages.

use bytes::Bytes;
use chrono::{Duration, TimeZone, Utc};
use grib2_parser::{sections, Grib2Reader, Grib2Tables};
use test_utils::{assert_approx_eq, GridDef, WindGribBuilder, VGRD, WIND_GRID};

fn reference_time() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 6, 0, 0).unwrap()
}

/// Small grid straddling the equator and the prime meridian.
const SOUTHWEST: GridDef = GridDef {
    lat0: -1.0,
    dlat: 0.5,
    nlat: 5,
    lon0: -2.0,
    dlon: 1.0,
    nlon: 4,
};

#[test]
fn test_parse_indicator_and_identification() {
    let bytes = WindGribBuilder::new(reference_time(), WIND_GRID).build();
    let indicator = sections::parse_indicator(&bytes).unwrap();
    assert_eq!(indicator.discipline, 0);
    assert_eq!(indicator.edition, 2);
    assert_eq!(indicator.message_length, bytes.len() as u64);

    let message = Grib2Reader::new(Bytes::from(bytes)).next_message().unwrap().unwrap();
    assert_eq!(message.identification.center, 7);
    assert_eq!(message.reference_time(), reference_time());
}

#[test]
fn test_wind_field_metadata() {
    let bytes = WindGribBuilder::new(reference_time(), WIND_GRID)
        .with_forecast_hour(9)
        .with_constant_value(4.5)
        .build();
    let message = Grib2Reader::new(Bytes::from(bytes)).next_message().unwrap().unwrap();

    let tables = Grib2Tables::surface_winds();
    assert_eq!(message.parameter(&tables), "UGRD");
    assert_eq!(message.level(&tables), "10 m above ground");

    let valid = message.valid_time().unwrap();
    assert_eq!(valid.forecast_hour(), Some(9));
    assert_eq!(valid.valid_datetime(), reference_time() + Duration::hours(9));

    assert_eq!(message.grid_dims(), (9, 9));
    assert!(!message.grid.scans_northward());
    let lats = message.grid.latitudes();
    assert_approx_eq!(lats[0], 33.5, 1e-9);
    assert_approx_eq!(lats[8], 31.5, 1e-9);

    let values = message.unpack_data().unwrap();
    assert_eq!(values.len(), 81);
    assert!(values.iter().all(|&v| v == 4.5));
}

#[test]
fn test_negative_coordinates_use_sign_magnitude() {
    let bytes = WindGribBuilder::new(reference_time(), SOUTHWEST).build();
    let message = Grib2Reader::new(Bytes::from(bytes)).next_message().unwrap().unwrap();
    let grid = &message.grid;
    assert_approx_eq!(grid.first_latitude, -1.0, 1e-9);
    assert_approx_eq!(grid.first_longitude, -2.0, 1e-9);
    assert_approx_eq!(grid.last_longitude, 1.0, 1e-9);
    assert!(grid.scans_northward());
    assert_eq!(grid.longitudes(), vec![-2.0, -1.0, 0.0, 1.0]);
}

#[test]
fn test_gradient_round_trips_within_packing_precision() {
    let bytes = WindGribBuilder::new(reference_time(), SOUTHWEST)
        .with_fn(|lat, lon| (lat * 3.0 - lon) as f32)
        .build();
    let message = Grib2Reader::new(Bytes::from(bytes)).next_message().unwrap().unwrap();
    let values = message.unpack_data().unwrap();

    let lats = message.grid.latitudes();
    let lons = message.grid.longitudes();
    for (j, lat) in lats.iter().enumerate() {
        for (i, lon) in lons.iter().enumerate() {
            assert_approx_eq!(values[j * lons.len() + i], lat * 3.0 - lon, 1e-3);
        }
    }
}

#[test]
fn test_bitmap_marks_missing_points() {
    let mut data = vec![1.0f32; SOUTHWEST.len()];
    data[0] = f32::NAN;
    data[7] = f32::NAN;
    data[8] = 3.0;
    let bytes = WindGribBuilder::new(reference_time(), SOUTHWEST)
        .with_data(data)
        .build();
    let message = Grib2Reader::new(Bytes::from(bytes)).next_message().unwrap().unwrap();
    assert!(message.bitmap.is_some());
    assert_eq!(message.representation.num_data_points, 18);

    let values = message.unpack_data().unwrap();
    assert!(values[0].is_nan());
    assert!(values[7].is_nan());
    assert_approx_eq!(values[1], 1.0, 1e-3);
    assert_approx_eq!(values[8], 3.0, 1e-3);
    assert_eq!(values.iter().filter(|v| v.is_nan()).count(), 2);
}

#[test]
fn test_repeated_sections_yield_one_field_each() {
    let u = WindGribBuilder::new(reference_time(), WIND_GRID).with_constant_value(5.0);
    let v = u.clone().with_parameter(2, VGRD).with_constant_value(-3.0);
    let bytes = WindGribBuilder::build_multi(&[&u, &v]);

    let messages = Grib2Reader::new(Bytes::from(bytes)).read_all().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].field_index, 0);
    assert_eq!(messages[1].field_index, 1);

    let tables = Grib2Tables::surface_winds();
    assert_eq!(messages[1].parameter(&tables), "VGRD");
    assert!(messages[1].unpack_data().unwrap().iter().all(|&x| x == -3.0));
}

#[test]
fn test_concatenated_messages_and_trailing_garbage() {
    let mut bytes = b"header noise".to_vec();
    for hour in [0, 3, 6] {
        bytes.extend(
            WindGribBuilder::new(reference_time(), WIND_GRID)
                .with_forecast_hour(hour)
                .build(),
        );
    }
    bytes.extend_from_slice(b"trailing");

    let messages = Grib2Reader::new(Bytes::from(bytes)).read_all().unwrap();
    let hours: Vec<_> = messages
        .iter()
        .map(|m| m.valid_time().unwrap().forecast_hour().unwrap())
        .collect();
    assert_eq!(hours, vec![0, 3, 6]);
}

#[test]
fn test_truncated_message_is_an_error() {
    let bytes = WindGribBuilder::new(reference_time(), WIND_GRID).build();
    let truncated = Bytes::from(bytes[..bytes.len() - 10].to_vec());
    assert!(Grib2Reader::new(truncated).next_message().is_err());
}
