mod common;

use common::{feed_zip, read_json, square_feature, write_feature_collection};
use serde_json::Value;
use tessera::config::AtlasConfig;
use tessera::feed::Feed;
use tessera::pipeline;

const STOPS_TWO: &str = "\
stop_id,stop_name,stop_lat,stop_lon,parent_station
A,Alpha St,40.70,-73.99,
B,Beta Av,40.72,-73.98,
";

const ROUTES_Q: &str = "\
route_id,route_short_name,route_long_name,route_type
R1,Q,Broadway Local,1
";

const TRIPS_TWO: &str = "\
route_id,service_id,trip_id
R1,wk,T1
R1,wk,T2
";

const CALENDAR_WEEKDAY: &str = "\
service_id,monday,tuesday,wednesday,thursday,friday,saturday,sunday,start_date,end_date
wk,1,1,1,1,1,0,0,20250101,20251231
";

const STOP_TIMES_IN_ORDER: &str = "\
trip_id,arrival_time,departure_time,stop_id,stop_sequence
T1,07:00:00,07:00:00,A,1
T1,07:05:00,07:05:00,B,2
T2,07:10:00,07:10:00,B,1
T2,07:15:00,07:15:00,A,2
";

const STOP_TIMES_INTERLEAVED: &str = "\
trip_id,arrival_time,departure_time,stop_id,stop_sequence
T1,07:00:00,07:00:00,A,1
T2,07:10:00,07:10:00,B,1
T1,07:05:00,07:05:00,B,2
T2,07:15:00,07:15:00,A,2
";

fn config_for(dir: &std::path::Path) -> AtlasConfig {
    AtlasConfig {
        neighborhoods_path: dir.join("neighborhoods.geojson"),
        out_dir: dir.join("out"),
        ..AtlasConfig::default()
    }
}

fn two_stop_neighborhoods(dir: &std::path::Path) {
    write_feature_collection(
        &dir.join("neighborhoods.geojson"),
        &[
            square_feature("Near Alpha", "Brooklyn", 40.70, -73.99, 0.001),
            square_feature("Near Beta", "Brooklyn", 40.72, -73.98, 0.001),
        ],
    );
}

fn run_two_stop_fixture(stop_times: &str) -> (tempfile::TempDir, AtlasConfig) {
    let dir = tempfile::tempdir().unwrap();
    two_stop_neighborhoods(dir.path());
    let config = config_for(dir.path());
    let archive = feed_zip(&[
        ("stops.txt", STOPS_TWO),
        ("routes.txt", ROUTES_Q),
        ("trips.txt", TRIPS_TWO),
        ("calendar.txt", CALENDAR_WEEKDAY),
        ("stop_times.txt", stop_times),
    ]);
    let feed = Feed::from_reader(archive).unwrap();
    pipeline::run_with_feed(&config, feed).unwrap();
    (dir, config)
}

#[test]
fn two_stops_one_route() {
    let (_dir, config) = run_two_stop_fixture(STOP_TIMES_IN_ORDER);

    let matrix = read_json(&config.out_dir.join("matrix_weekday_am.json"));
    assert_eq!(matrix["minutes"], serde_json::json!([[0, 5], [5, 0]]));
    assert_eq!(matrix["routes"][0]["short_name"], "Q");
    assert_eq!(matrix["first_route"][0][1], 0);
    assert_eq!(matrix["first_route"][0][0], Value::Null);
    let scores = matrix["centrality"]["metrics"]["harmonic"]["scores"]
        .as_array()
        .unwrap();
    assert!(scores.iter().all(|s| s.as_f64().unwrap() > 0.0));

    let graph = read_json(&config.out_dir.join("graph_weekday_am.json"));
    assert!(graph["stops"].as_array().unwrap().len() >= 2);
    assert!(graph["edges"].as_array().unwrap().len() >= 2);
    assert_eq!(graph["window"]["id"], "weekday_am");

    // The departures all fall in the AM window; the PM matrix is empty off
    // the diagonal.
    let pm = read_json(&config.out_dir.join("matrix_weekday_pm.json"));
    assert_eq!(pm["minutes"], serde_json::json!([[0, null], [null, 0]]));
}

#[test]
fn atlas_ids_agree_across_documents() {
    let (_dir, config) = run_two_stop_fixture(STOP_TIMES_IN_ORDER);

    let neighborhoods = read_json(&config.out_dir.join("neighborhoods.geojson"));
    let stamped: Vec<&str> = neighborhoods["features"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["properties"]["atlas_id"].as_str().unwrap())
        .collect();

    let matrix = read_json(&config.out_dir.join("matrix_weekday_am.json"));
    let matrix_ids: Vec<&str> = matrix["neighborhoods"]
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["id"].as_str().unwrap())
        .collect();
    assert_eq!(stamped, matrix_ids);

    let graph = read_json(&config.out_dir.join("graph_weekday_am.json"));
    let graph_ids: Vec<&str> = graph["neighborhoods"]
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["id"].as_str().unwrap())
        .collect();
    assert_eq!(stamped, graph_ids);
}

#[test]
fn transfer_only_graph() {
    let dir = tempfile::tempdir().unwrap();
    two_stop_neighborhoods(dir.path());
    let config = config_for(dir.path());
    let archive = feed_zip(&[
        (
            "stops.txt",
            "stop_id,stop_name,stop_lat,stop_lon,parent_station\n\
             A,Alpha St,40.70,-73.99,P\n\
             B,Beta Av,40.72,-73.98,P\n",
        ),
        ("trips.txt", "route_id,service_id,trip_id\n"),
        (
            "stop_times.txt",
            "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n",
        ),
    ]);
    let feed = Feed::from_reader(archive).unwrap();
    pipeline::run_with_feed(&config, feed).unwrap();

    let graph = read_json(&config.out_dir.join("graph_weekday_am.json"));
    let edges = graph["edges"].as_array().unwrap();
    assert!(edges.contains(&serde_json::json!([0, 1, 2, null])));
    assert!(edges.contains(&serde_json::json!([1, 0, 2, null])));

    let matrix = read_json(&config.out_dir.join("matrix_weekday_am.json"));
    assert_eq!(matrix["minutes"], serde_json::json!([[0, 2], [2, 0]]));
    assert_eq!(matrix["first_route"][0][1], Value::Null);
}

#[test]
fn out_of_order_stop_times_match_in_order_output() {
    let (_dir_a, config_a) = run_two_stop_fixture(STOP_TIMES_IN_ORDER);
    let (_dir_b, config_b) = run_two_stop_fixture(STOP_TIMES_INTERLEAVED);

    for name in ["matrix_weekday_am.json", "matrix_weekday_pm.json"] {
        let a = read_json(&config_a.out_dir.join(name));
        let b = read_json(&config_b.out_dir.join(name));
        assert_eq!(a["minutes"], b["minutes"], "{name}");
        assert_eq!(a["first_route"], b["first_route"], "{name}");
    }

    let a = read_json(&config_a.out_dir.join("teleport_corridors.json"));
    let b = read_json(&config_b.out_dir.join("teleport_corridors.json"));
    assert_eq!(a["windows"], b["windows"]);
}

#[test]
fn identical_inputs_are_deterministic() {
    let (_dir_a, config_a) = run_two_stop_fixture(STOP_TIMES_IN_ORDER);
    let (_dir_b, config_b) = run_two_stop_fixture(STOP_TIMES_IN_ORDER);

    for name in [
        "matrix_weekday_am.json",
        "matrix_weekday_pm.json",
        "matrix_weekend.json",
        "teleport_corridors.json",
        "matrix_weekday_am_derived.json",
        "derived_regions.geojson",
    ] {
        let mut a = read_json(&config_a.out_dir.join(name));
        let mut b = read_json(&config_b.out_dir.join(name));
        // Timestamps are the only run-dependent field.
        a.as_object_mut().unwrap().remove("generated_at");
        b.as_object_mut().unwrap().remove("generated_at");
        assert_eq!(a, b, "{name}");
    }
}

#[test]
fn unreachable_neighborhood_row_is_null() {
    let dir = tempfile::tempdir().unwrap();
    write_feature_collection(
        &dir.path().join("neighborhoods.geojson"),
        &[
            square_feature("Near Alpha", "Brooklyn", 40.70, -73.99, 0.001),
            square_feature("Near Beta", "Brooklyn", 40.72, -73.98, 0.001),
            square_feature("Isolated", "Brooklyn", 40.80, -73.90, 0.001),
        ],
    );
    let config = config_for(dir.path());
    let archive = feed_zip(&[
        (
            "stops.txt",
            "stop_id,stop_name,stop_lat,stop_lon,parent_station\n\
             A,Alpha St,40.70,-73.99,\n\
             B,Beta Av,40.72,-73.98,\n\
             X,Far Rd,40.80,-73.90,\n",
        ),
        ("routes.txt", ROUTES_Q),
        (
            "trips.txt",
            "route_id,service_id,trip_id\nR1,wk,T1\nR1,wk,T3\n",
        ),
        ("calendar.txt", CALENDAR_WEEKDAY),
        (
            "stop_times.txt",
            "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n\
             T1,07:00:00,07:00:00,A,1\n\
             T1,07:05:00,07:05:00,B,2\n\
             T3,03:00:00,03:00:00,X,1\n",
        ),
    ]);
    let feed = Feed::from_reader(archive).unwrap();
    pipeline::run_with_feed(&config, feed).unwrap();

    let matrix = read_json(&config.out_dir.join("matrix_weekday_am.json"));
    assert_eq!(
        matrix["minutes"][2],
        serde_json::json!([null, null, 0]),
        "isolated origin reaches only itself"
    );
    assert_eq!(matrix["minutes"][0][2], Value::Null);
    let harmonic = &matrix["centrality"]["metrics"]["harmonic"]["scores"];
    assert_eq!(harmonic[2].as_f64().unwrap(), 0.0);
}

#[test]
fn missing_required_table_is_exit_code_two() {
    let dir = tempfile::tempdir().unwrap();
    two_stop_neighborhoods(dir.path());
    let config = config_for(dir.path());
    let archive = feed_zip(&[("stops.txt", STOPS_TWO), ("trips.txt", TRIPS_TWO)]);
    let feed = Feed::from_reader(archive).unwrap();
    let err = pipeline::run_with_feed(&config, feed).unwrap_err();
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn empty_feature_collection_is_exit_code_two() {
    let dir = tempfile::tempdir().unwrap();
    write_feature_collection(&dir.path().join("neighborhoods.geojson"), &[]);
    let config = config_for(dir.path());
    let archive = feed_zip(&[
        ("stops.txt", STOPS_TWO),
        ("trips.txt", TRIPS_TWO),
        ("calendar.txt", CALENDAR_WEEKDAY),
        ("stop_times.txt", STOP_TIMES_IN_ORDER),
    ]);
    let feed = Feed::from_reader(archive).unwrap();
    let err = pipeline::run_with_feed(&config, feed).unwrap_err();
    assert_eq!(err.exit_code(), 2);
}
