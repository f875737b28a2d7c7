use std::collections::{BTreeMap, BTreeSet};
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{resolve_ancestors, RouteID, ScheduleError, ServiceID, StopID, Trip, TripName, GTFS};

/// Scheduled times beyond this belong to trips that run past midnight.
pub const MIDNIGHT: u32 = 24 * 3600;

pub struct IndexOptions {
    pub service_id: ServiceID,
    /// The trip used to find and order all the stops on the route
    pub reference_trip: TripName,
    /// Removed from every stop name, like "Caltrain Station"
    pub strip_from_stop_names: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IncludedStop {
    pub stop_id: StopID,
    pub stop_name: String,
    /// 0 at the start of the reference trip, 1 at the end
    pub position: f64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledStopTime {
    pub sec: u32,
    pub stop_id: StopID,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripSummary {
    pub route_id: RouteID,
    pub trip_short_name: TripName,
    /// Only stops on the route, in order
    pub stop_times: Vec<ScheduledStopTime>,
}

impl TripSummary {
    pub fn spans_midnight(&self) -> bool {
        self.stop_times.iter().any(|st| st.sec > MIDNIGHT)
    }
}

/// Everything about the schedule needed to make sense of realtime data along one route.
pub struct ScheduleIndex {
    /// Every stop in the feed to its topmost parent station
    pub stops_ancestor: BTreeMap<StopID, StopID>,
    /// Keyed by ancestor stop. Only stations visited by the reference trip.
    pub included_stops: BTreeMap<StopID, IncludedStop>,
    pub trips: Vec<TripSummary>,
    /// Data quality problems found while building
    pub warnings: Vec<String>,
}

const STOPS_ANCESTOR: &str = "stops_ancestor.json";
const STOPS: &str = "stops.json";
const TRIPS: &str = "trips.json";
const WARNINGS: &str = "schedule_warnings.json";

impl ScheduleIndex {
    pub fn new(gtfs: &GTFS, opts: &IndexOptions) -> Result<Self> {
        if gtfs.service_id != opts.service_id {
            bail!(
                "GTFS was loaded for service {}, but the index wants {}",
                gtfs.service_id,
                opts.service_id
            );
        }

        let stops_ancestor = resolve_ancestors(&gtfs.stops)?;
        let reference = gtfs.select_reference_trip(&opts.reference_trip)?;
        let mut warnings = gtfs.warnings.clone();
        let included_stops = compute_included_stops_and_positions(
            gtfs,
            &stops_ancestor,
            reference,
            opts,
            &mut warnings,
        )?;

        let mut trips = Vec::new();
        for trip in gtfs.trips.values() {
            let trip_short_name = match trip.short_name {
                Some(ref name) => name.clone(),
                None => {
                    warnings.push(format!(
                        "Trip {} has no trip_short_name, so realtime data can't match it",
                        trip.trip_id
                    ));
                    continue;
                }
            };
            let mut stop_times = Vec::new();
            for st in &trip.stop_times {
                let ancestor = lookup_ancestor(&stops_ancestor, &st.stop_id)?;
                if !included_stops.contains_key(ancestor) {
                    continue;
                }
                // Untimed stops don't tell us anything to compare against
                if let Some(sec) = st.arrival_time {
                    stop_times.push(ScheduledStopTime {
                        sec,
                        stop_id: ancestor.clone(),
                    });
                }
            }
            trips.push(TripSummary {
                route_id: trip.route_id.clone(),
                trip_short_name,
                stop_times,
            });
        }

        for warning in &warnings {
            warn!("{warning}");
        }
        info!(
            "Indexed {} stops on the route and {} trips",
            included_stops.len(),
            trips.len()
        );

        Ok(Self {
            stops_ancestor,
            included_stops,
            trips,
            warnings,
        })
    }

    /// The station containing this stop, or None if the stop isn't in the feed.
    pub fn ancestor(&self, stop: &StopID) -> Option<&StopID> {
        self.stops_ancestor.get(stop)
    }

    pub fn is_included(&self, ancestor: &StopID) -> bool {
        self.included_stops.contains_key(ancestor)
    }

    pub fn trip_names(&self) -> BTreeSet<TripName> {
        self.trips
            .iter()
            .map(|trip| trip.trip_short_name.clone())
            .collect()
    }

    pub fn midnight_spanning_trips(&self) -> BTreeSet<TripName> {
        self.trips
            .iter()
            .filter(|trip| trip.spans_midnight())
            .map(|trip| trip.trip_short_name.clone())
            .collect()
    }

    pub fn write_to_dir<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        fs_err::create_dir_all(dir)?;
        write_json(&dir.join(STOPS_ANCESTOR), &self.stops_ancestor)?;
        write_json(&dir.join(STOPS), &self.included_stops)?;
        write_json(&dir.join(TRIPS), &self.trips)?;
        write_json(&dir.join(WARNINGS), &self.warnings)?;
        info!("Wrote schedule index to {}", dir.display());
        Ok(())
    }

    /// Reads what `write_to_dir` produced.
    pub fn read_from_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let index = Self {
            stops_ancestor: read_json(&dir.join(STOPS_ANCESTOR))?,
            included_stops: read_json(&dir.join(STOPS))?,
            trips: read_json(&dir.join(TRIPS))?,
            warnings: read_json(&dir.join(WARNINGS))?,
        };
        // Make sure the pieces agree with each other
        for ancestor in index.included_stops.keys() {
            if index.stops_ancestor.get(ancestor) != Some(ancestor) {
                bail!("{STOPS} has {ancestor}, which isn't a top-level stop in {STOPS_ANCESTOR}");
            }
        }
        Ok(index)
    }
}

fn compute_included_stops_and_positions(
    gtfs: &GTFS,
    stops_ancestor: &BTreeMap<StopID, StopID>,
    reference: &Trip,
    opts: &IndexOptions,
    warnings: &mut Vec<String>,
) -> Result<BTreeMap<StopID, IncludedStop>, ScheduleError> {
    let problem = |problem: String| ScheduleError::ShapeDistance {
        trip: reference.trip_id.clone(),
        problem,
    };

    let total = match reference.stop_times.last() {
        Some(last) => last
            .shape_dist_traveled
            .ok_or_else(|| problem("the last stop has no shape_dist_traveled".to_string()))?,
        None => return Err(problem("it has no stop times".to_string())),
    };
    if !(total > 0.0) {
        return Err(problem(format!(
            "the last stop has shape_dist_traveled {total}"
        )));
    }

    let mut included = BTreeMap::new();
    let mut prev_dist: Option<f64> = None;
    for st in &reference.stop_times {
        let dist = st.shape_dist_traveled.ok_or_else(|| {
            problem(format!(
                "stop {} (sequence {}) has no shape_dist_traveled",
                st.stop_id, st.stop_sequence
            ))
        })?;
        // Surface this, but don't try to fix it
        if let Some(prev) = prev_dist {
            if dist < prev {
                warnings.push(format!(
                    "Reference trip {}: shape_dist_traveled goes backwards from {prev} to {dist} at stop {}",
                    reference.trip_id, st.stop_id
                ));
            }
        }
        prev_dist = Some(dist);

        let ancestor = lookup_ancestor(stops_ancestor, &st.stop_id)?;
        let stop = gtfs
            .stops
            .get(ancestor)
            .ok_or_else(|| ScheduleError::UnknownStop(ancestor.clone()))?;
        if included.contains_key(ancestor) {
            warnings.push(format!(
                "Reference trip {} visits {ancestor} more than once; using the last visit",
                reference.trip_id
            ));
        }
        included.insert(
            ancestor.clone(),
            IncludedStop {
                stop_id: ancestor.clone(),
                stop_name: clean_name(&stop.name, &opts.strip_from_stop_names),
                position: dist / total,
            },
        );
    }
    Ok(included)
}

fn lookup_ancestor<'a>(
    stops_ancestor: &'a BTreeMap<StopID, StopID>,
    stop: &StopID,
) -> Result<&'a StopID, ScheduleError> {
    stops_ancestor
        .get(stop)
        .ok_or_else(|| ScheduleError::UnknownStop(stop.clone()))
}

fn clean_name(name: &str, strip: &[String]) -> String {
    let mut name = name.to_string();
    for x in strip {
        if !x.is_empty() {
            name = name.replace(x.as_str(), "");
        }
    }
    name.trim().to_string()
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    fs_err::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = fs_err::File::open(path)?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use abstutil::Timer;

    use super::*;

    const STOPS_TXT: &str = "stop_id,stop_name,parent_station
sf,San Francisco Caltrain Station,
sf_nb,San Francisco Northbound,sf
sf_sb,San Francisco Southbound,sf
mlbr,Millbrae Caltrain Station,
mlbr_nb,Millbrae Northbound,mlbr
mlbr_sb,Millbrae Southbound,mlbr
sj,San Jose Diridon Caltrain Station,
sj_sb,San Jose Southbound,sj
bus,Some bus stop,
";

    const TRIPS_TXT: &str = "route_id,service_id,trip_id,trip_short_name,shape_id
Local,weekday,t101,101,south
Local,weekday,t102,102,south
Local,weekday,t201,201,south
Local,weekend,t401,401,south
";

    const STOP_TIMES_TXT: &str =
        "trip_id,arrival_time,departure_time,stop_id,stop_sequence,shape_dist_traveled
t101,08:00:00,08:00:00,sf_sb,1,0
t101,08:30:00,08:30:00,mlbr_sb,2,20.5
t101,09:30:00,09:30:00,sj_sb,3,75
t102,23:30:00,23:30:00,sf_sb,1,0
t102,23:59:00,23:59:00,mlbr_sb,2,20.5
t102,24:40:00,24:40:00,sj_sb,3,75
t201,12:00:00,12:00:00,bus,1,0
t201,12:10:00,12:10:00,mlbr_nb,2,5
t401,10:00:00,10:00:00,sf_sb,1,0
";

    fn gtfs(stop_times: &str) -> GTFS {
        GTFS::from_tables(
            STOPS_TXT.as_bytes(),
            TRIPS_TXT.as_bytes(),
            stop_times.as_bytes(),
            None,
            &ServiceID::new("weekday"),
            &mut Timer::throwaway(),
        )
        .unwrap()
    }

    fn opts(reference_trip: &str) -> IndexOptions {
        IndexOptions {
            service_id: ServiceID::new("weekday"),
            reference_trip: TripName::new(reference_trip),
            strip_from_stop_names: vec!["Caltrain Station".to_string()],
        }
    }

    fn schedule_error(result: Result<ScheduleIndex>) -> ScheduleError {
        match result {
            Ok(_) => panic!("expected an error"),
            Err(err) => err.downcast::<ScheduleError>().unwrap(),
        }
    }

    #[test]
    fn included_stops_and_positions() {
        let index = ScheduleIndex::new(&gtfs(STOP_TIMES_TXT), &opts("101")).unwrap();
        assert!(index.warnings.is_empty(), "{:?}", index.warnings);

        let stops: Vec<(&str, &str, f64)> = index
            .included_stops
            .values()
            .map(|s| (s.stop_id.as_str(), s.stop_name.as_str(), s.position))
            .collect();
        assert_eq!(
            stops,
            vec![
                ("mlbr", "Millbrae", 20.5 / 75.0),
                ("sf", "San Francisco", 0.0),
                ("sj", "San Jose Diridon", 1.0),
            ]
        );
        assert!(index.is_included(&StopID::new("mlbr")));
        assert!(!index.is_included(&StopID::new("bus")));
        assert_eq!(index.ancestor(&StopID::new("mlbr_nb")), Some(&StopID::new("mlbr")));
        assert_eq!(index.ancestor(&StopID::new("nowhere")), None);
    }

    #[test]
    fn trip_summaries() {
        let index = ScheduleIndex::new(&gtfs(STOP_TIMES_TXT), &opts("101")).unwrap();
        let names: Vec<&str> = index
            .trips
            .iter()
            .map(|t| t.trip_short_name.as_str())
            .collect();
        assert_eq!(names, vec!["101", "102", "201"]);

        let t102 = &index.trips[1];
        assert_eq!(
            t102.stop_times.last(),
            Some(&ScheduledStopTime {
                sec: 88800,
                stop_id: StopID::new("sj"),
            })
        );
        // The bus stop isn't on the route
        assert_eq!(
            index.trips[2].stop_times,
            vec![ScheduledStopTime {
                sec: 12 * 3600 + 600,
                stop_id: StopID::new("mlbr"),
            }]
        );

        let midnight = index.midnight_spanning_trips();
        assert_eq!(midnight.len(), 1);
        assert!(midnight.contains(&TripName::new("102")));
        assert_eq!(index.trip_names().len(), 3);
    }

    #[test]
    fn reference_trip_must_be_unique() {
        assert!(matches!(
            schedule_error(ScheduleIndex::new(&gtfs(STOP_TIMES_TXT), &opts("999"))),
            ScheduleError::ReferenceTrip { matches: 0, .. }
        ));
        // Trips from another service don't count
        assert!(matches!(
            schedule_error(ScheduleIndex::new(&gtfs(STOP_TIMES_TXT), &opts("401"))),
            ScheduleError::ReferenceTrip { matches: 0, .. }
        ));

        let gtfs = GTFS::from_tables(
            STOPS_TXT.as_bytes(),
            "route_id,service_id,trip_id,trip_short_name
Local,weekday,a,101
Local,weekday,b,101
"
            .as_bytes(),
            "trip_id,arrival_time,departure_time,stop_id,stop_sequence,shape_dist_traveled
a,08:00:00,08:00:00,sf_sb,1,0
b,09:00:00,09:00:00,sf_sb,1,0
"
            .as_bytes(),
            None,
            &ServiceID::new("weekday"),
            &mut Timer::throwaway(),
        )
        .unwrap();
        assert!(matches!(
            schedule_error(ScheduleIndex::new(&gtfs, &opts("101"))),
            ScheduleError::ReferenceTrip { matches: 2, .. }
        ));
    }

    #[test]
    fn shape_distance_problems() {
        let mlbr = "t101,08:30:00,08:30:00,mlbr_sb,2,20.5";

        let backwards = STOP_TIMES_TXT.replace(mlbr, "t101,08:30:00,08:30:00,mlbr_sb,2,80");
        let index = ScheduleIndex::new(&gtfs(&backwards), &opts("101")).unwrap();
        assert_eq!(index.warnings.len(), 1);
        // Not clamped
        assert_eq!(
            index.included_stops[&StopID::new("mlbr")].position,
            80.0 / 75.0
        );

        let missing = STOP_TIMES_TXT.replace(mlbr, "t101,08:30:00,08:30:00,mlbr_sb,2,");
        assert!(matches!(
            schedule_error(ScheduleIndex::new(&gtfs(&missing), &opts("101"))),
            ScheduleError::ShapeDistance { .. }
        ));

        // Only one stop left, so the total distance is 0
        let single_stop = STOP_TIMES_TXT.replace("t201,12:10:00,12:10:00,mlbr_nb,2,5\n", "");
        assert!(matches!(
            schedule_error(ScheduleIndex::new(&gtfs(&single_stop), &opts("201"))),
            ScheduleError::ShapeDistance { .. }
        ));
    }

    #[test]
    fn write_and_read_back() {
        // Make sure there's a warning to carry through
        let backwards = STOP_TIMES_TXT.replace(
            "t101,08:30:00,08:30:00,mlbr_sb,2,20.5",
            "t101,08:30:00,08:30:00,mlbr_sb,2,80",
        );
        let index = ScheduleIndex::new(&gtfs(&backwards), &opts("101")).unwrap();
        assert_eq!(index.warnings.len(), 1);
        let dir = std::env::temp_dir().join(format!("schedule_index_{}", std::process::id()));
        index.write_to_dir(&dir).unwrap();
        let copy = ScheduleIndex::read_from_dir(&dir).unwrap();
        fs_err::remove_dir_all(&dir).unwrap();

        assert_eq!(copy.stops_ancestor, index.stops_ancestor);
        assert_eq!(copy.included_stops, index.included_stops);
        assert_eq!(copy.trips, index.trips);
        assert_eq!(copy.warnings, index.warnings);
        assert_eq!(copy.midnight_spanning_trips(), index.midnight_spanning_trips());
    }
}
