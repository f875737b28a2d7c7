use std::path::{Path, PathBuf};

use abstutil::Timer;
use serde_json::{json, Value};

use gtfs::{IndexOptions, RouteGeometry, ScheduleIndex, ServiceID, TripName, GTFS};
use model::{reconcile_corpus, write_json, Discard};

const STOPS: &str = "stop_id,stop_name,parent_station
x,Xville Caltrain Station,
x_nb,Xville Northbound,x
y,Yburg Caltrain Station,
y_nb,Yburg Northbound,y
z,Off the route,
";

const TRIPS: &str = "route_id,service_id,trip_id,trip_short_name
Local,weekday,t101,101
Local,weekday,t202,202
Local,weekend,t404,404
";

const STOP_TIMES: &str =
    "trip_id,arrival_time,departure_time,stop_id,stop_sequence,shape_dist_traveled
t101,23:50:00,23:50:00,x_nb,1,0
t101,24:30:00,24:30:00,y_nb,2,10
t202,07:55:00,07:55:00,x_nb,1,0
t202,08:05:00,08:05:00,y_nb,2,10
t404,09:00:00,09:00:00,x_nb,1,0
";

/// A fresh directory per test
fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("train_spotting_{name}_{}", std::process::id()));
    if dir.exists() {
        fs_err::remove_dir_all(&dir).unwrap();
    }
    fs_err::create_dir_all(&dir).unwrap();
    dir
}

fn visit(trip: &str, stop: &str, location: Option<(f64, f64)>) -> Value {
    let mut journey = json!({
        "FramedVehicleJourneyRef": {"DatedVehicleJourneyRef": trip},
        "MonitoredCall": {"StopPointRef": stop}
    });
    if let Some((lon, lat)) = location {
        journey["VehicleLocation"] = json!({"Longitude": lon.to_string(), "Latitude": lat.to_string()});
    }
    json!({"MonitoredVehicleJourney": journey})
}

fn write_snapshot(root: &Path, date: &str, hhmm: &str, visits: Vec<Value>) {
    let dir = root.join(date);
    fs_err::create_dir_all(&dir).unwrap();
    let payload = json!({
        "ServiceDelivery": {
            "StopMonitoringDelivery": {
                "MonitoredStopVisit": visits
            }
        }
    });
    fs_err::write(dir.join(format!("{hhmm}.json")), payload.to_string()).unwrap();
}

fn setup(name: &str) -> (PathBuf, ScheduleIndex, RouteGeometry) {
    let root = scratch_dir(name);
    let gtfs_dir = root.join("gtfs");
    fs_err::create_dir_all(&gtfs_dir).unwrap();
    fs_err::write(gtfs_dir.join("stops.txt"), STOPS).unwrap();
    fs_err::write(gtfs_dir.join("trips.txt"), TRIPS).unwrap();
    fs_err::write(gtfs_dir.join("stop_times.txt"), STOP_TIMES).unwrap();
    fs_err::write(
        root.join("points.json"),
        "[[-122.0, 37.0], [-122.0, 37.1]]",
    )
    .unwrap();

    let mut timer = Timer::throwaway();
    let service_id = ServiceID::new("weekday");
    let gtfs = GTFS::load(&gtfs_dir, &service_id, &mut timer).unwrap();
    let schedule = ScheduleIndex::new(
        &gtfs,
        &IndexOptions {
            service_id,
            reference_trip: TripName::new("202"),
            strip_from_stop_names: vec!["Caltrain Station".to_string()],
        },
    )
    .unwrap();
    let route = RouteGeometry::load(root.join("points.json")).unwrap();

    let snapshots = root.join("snapshots");
    write_snapshot(
        &snapshots,
        "2024-03-01",
        "0800",
        vec![visit("202", "y_nb", Some((-122.0, 37.05)))],
    );
    write_snapshot(
        &snapshots,
        "2024-03-01",
        "0801",
        vec![
            visit("202", "y_nb", None),
            visit("202", "z", None),
            visit("999", "y_nb", None),
        ],
    );
    write_snapshot(
        &snapshots,
        "2024-03-01",
        "2350",
        vec![visit("101", "x_nb", Some((-122.0, 37.0)))],
    );
    write_snapshot(
        &snapshots,
        "2024-03-02",
        "0010",
        vec![visit("101", "y_nb", None)],
    );
    fs_err::write(snapshots.join("2024-03-02").join("0011.json"), "{not json").unwrap();
    fs_err::write(snapshots.join("2024-03-02").join("notes.txt"), "ignored").unwrap();

    (root, schedule, route)
}

#[test]
fn end_to_end() {
    let (root, schedule, route) = setup("end_to_end");
    let (results, report) = reconcile_corpus(
        &schedule,
        &route,
        root.join("snapshots"),
        &mut Timer::throwaway(),
    )
    .unwrap();

    let actual = serde_json::to_value(&results).unwrap();
    let pos_0800 = actual[1]["service_dates"][0]["positions"][0]["position"]
        .as_f64()
        .unwrap();
    assert!((pos_0800 - 0.5).abs() < 0.01, "got {pos_0800}");
    let pos_2350 = actual[0]["service_dates"][0]["positions"][1]["position"]
        .as_f64()
        .unwrap();
    assert!(pos_2350.abs() < 0.01, "got {pos_2350}");

    let mut expected = json!([
        {
            "trip_short_name": "101",
            "service_dates": [{
                "service_date": "2024-03-01",
                // The train was still heading to Y at 00:10 the next calendar day
                "stop_times": [{"stop_id": "x", "sec": 85800}, {"stop_id": "y", "sec": 87000}],
                // Positions keep the time of day each snapshot was taken
                "positions": [{"sec": 600, "position": null}, {"sec": 85800, "position": null}]
            }]
        },
        {
            "trip_short_name": "202",
            "service_dates": [{
                "service_date": "2024-03-01",
                "stop_times": [{"stop_id": "y", "sec": 28860}],
                "positions": [{"sec": 28800, "position": null}, {"sec": 28860, "position": null}]
            }]
        }
    ]);
    expected[0]["service_dates"][0]["positions"][1]["position"] = json!(pos_2350);
    expected[1]["service_dates"][0]["positions"][0]["position"] = json!(pos_0800);
    assert_eq!(actual, expected);

    assert_eq!(report.snapshots_read, 4);
    assert_eq!(report.observations_recorded, 4);
    assert_eq!(report.skipped_files.len(), 1);
    assert!(report.skipped_files[0].path.ends_with("0011.json"));
    assert_eq!(report.discarded.get(Discard::StopNotOnRoute), 1);
    assert_eq!(report.discarded.get(Discard::UnknownTrip), 1);
    assert!(report.duplicate_positions.is_empty());
    assert_eq!(report.unprojected_locations, 0);
    assert!(!report.is_clean());

    fs_err::remove_dir_all(&root).unwrap();
}

#[test]
fn reruns_are_identical() {
    let (root, schedule, route) = setup("reruns_are_identical");
    let mut outputs = Vec::new();
    for i in 0..2 {
        let (results, report) = reconcile_corpus(
            &schedule,
            &route,
            root.join("snapshots"),
            &mut Timer::throwaway(),
        )
        .unwrap();
        let realtime = root.join(format!("realtime{i}.json"));
        let report_path = root.join(format!("report{i}.json"));
        write_json(&realtime, &results).unwrap();
        report.write_json(&report_path).unwrap();
        outputs.push((
            fs_err::read(&realtime).unwrap(),
            fs_err::read(&report_path).unwrap(),
        ));
    }
    assert_eq!(outputs[0], outputs[1]);

    // The index survives a trip through the filesystem too
    let index_dir = root.join("index");
    schedule.write_to_dir(&index_dir).unwrap();
    let reread = ScheduleIndex::read_from_dir(&index_dir).unwrap();
    let (results, _) = reconcile_corpus(
        &reread,
        &route,
        root.join("snapshots"),
        &mut Timer::throwaway(),
    )
    .unwrap();
    write_json(root.join("realtime_reread.json"), &results).unwrap();
    assert_eq!(
        fs_err::read(root.join("realtime_reread.json")).unwrap(),
        outputs[0].0
    );

    fs_err::remove_dir_all(&root).unwrap();
}

#[test]
fn malformed_names_fail_loudly() {
    let (root, schedule, route) = setup("malformed_names_fail_loudly");
    let snapshots = root.join("snapshots");
    fs_err::write(snapshots.join("2024-03-01").join("8am.json"), "{}").unwrap();
    assert!(reconcile_corpus(&schedule, &route, &snapshots, &mut Timer::throwaway()).is_err());

    fs_err::remove_file(snapshots.join("2024-03-01").join("8am.json")).unwrap();
    fs_err::create_dir_all(snapshots.join("March 3")).unwrap();
    assert!(reconcile_corpus(&schedule, &route, &snapshots, &mut Timer::throwaway()).is_err());

    let empty = root.join("empty");
    fs_err::create_dir_all(&empty).unwrap();
    assert!(reconcile_corpus(&schedule, &route, &empty, &mut Timer::throwaway()).is_err());

    fs_err::remove_dir_all(&root).unwrap();
}
