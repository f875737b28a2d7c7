use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;

use gtfs::{RouteGeometry, ScheduleIndex, StopID, TripName, MIDNIGHT};

use crate::{
    group_results, DuplicatePosition, Observation, RunReport, SkippedFile, Snapshot, SnapshotFault,
    SnapshotTime, TripResult,
};

/// Observations of trips that run past midnight before this time of day belong to the previous
/// day's service.
pub const NOON: u32 = 12 * 3600;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArrivalKey {
    pub service_date: NaiveDate,
    pub trip: TripName,
    /// Always a top-level station
    pub stop: StopID,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PositionKey {
    pub service_date: NaiveDate,
    pub trip: TripName,
    /// Seconds since midnight of the snapshot's calendar date, not shifted for late trips
    pub sec: u32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PositionSample {
    /// 0 to 1 along the route. None if the vehicle was seen without a location.
    pub position: Option<f64>,
    pub source: SnapshotTime,
}

/// Why an observation didn't make it into the results.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Discard {
    UnknownStop,
    StopNotOnRoute,
    UnknownTrip,
    IncompleteVisit,
    NoServiceDate,
}

impl std::fmt::Display for Discard {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let x = match self {
            Discard::UnknownStop => "stop isn't in the schedule",
            Discard::StopNotOnRoute => "stop isn't on the route",
            Discard::UnknownTrip => "trip isn't in the schedule",
            Discard::IncompleteVisit => "visit is missing the stop or trip",
            Discard::NoServiceDate => "no previous service date",
        };
        write!(f, "{x}")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Recorded,
    Discarded(Discard),
}

/// Figures out which day's service an observation belongs to, and the time since the start of
/// that day. A trip that spans midnight seen before noon is still running the previous day's
/// service. This assumes snapshots never have a gap from before midnight to after noon.
pub fn assign_service_date(time: SnapshotTime, spans_midnight: bool) -> Option<(NaiveDate, u32)> {
    if spans_midnight && time.sec < NOON {
        Some((time.date.pred_opt()?, time.sec + MIDNIGHT))
    } else {
        Some((time.date, time.sec))
    }
}

/// Replays observations in time order, remembering the last time each stop was still upcoming
/// and where each vehicle was along the route.
///
/// The realtime feed never says a train arrived; it only lists the stop a train is heading to.
/// The last time a stop was reported as upcoming is used as the arrival time. That's biased early,
/// and when snapshots drop out, a train looks like it instantly reached every stop it passed in
/// the meantime. The position trace is there to help spot those cases.
pub struct Reconciler<'a> {
    schedule: &'a ScheduleIndex,
    route: &'a RouteGeometry,
    trip_names: BTreeSet<TripName>,
    midnight_trips: BTreeSet<TripName>,

    arrivals: BTreeMap<ArrivalKey, u32>,
    positions: BTreeMap<PositionKey, PositionSample>,
    report: RunReport,
}

impl<'a> Reconciler<'a> {
    pub fn new(schedule: &'a ScheduleIndex, route: &'a RouteGeometry) -> Self {
        Self {
            schedule,
            route,
            trip_names: schedule.trip_names(),
            midnight_trips: schedule.midnight_spanning_trips(),
            arrivals: BTreeMap::new(),
            positions: BTreeMap::new(),
            report: RunReport::new(),
        }
    }

    pub fn ingest(&mut self, snapshot: &Snapshot) {
        self.report.snapshots_read += 1;
        let incomplete = snapshot.payload.count_incomplete_visits();
        if incomplete > 0 {
            self.report.discarded.add(Discard::IncompleteVisit, incomplete);
        }
        for obs in snapshot.payload.extract_observations(snapshot.time) {
            self.observe(&obs);
        }
    }

    pub fn skip(&mut self, fault: &SnapshotFault) {
        warn!(
            "Skipping {} ({}): {:#}",
            fault.path.display(),
            fault.time,
            fault.error
        );
        self.report.skipped_files.push(SkippedFile::from(fault));
    }

    pub fn observe(&mut self, obs: &Observation) -> Outcome {
        let outcome = self.fold(obs);
        match outcome {
            Outcome::Recorded => {
                self.report.observations_recorded += 1;
            }
            Outcome::Discarded(reason) => {
                self.report.discarded.inc(reason);
            }
        }
        outcome
    }

    fn fold(&mut self, obs: &Observation) -> Outcome {
        let stop = match self.schedule.ancestor(&obs.stop_ref) {
            Some(stop) => stop,
            None => return Outcome::Discarded(Discard::UnknownStop),
        };
        if !self.schedule.is_included(stop) {
            return Outcome::Discarded(Discard::StopNotOnRoute);
        }
        if !self.trip_names.contains(&obs.trip_ref) {
            return Outcome::Discarded(Discard::UnknownTrip);
        }
        let spans_midnight = self.midnight_trips.contains(&obs.trip_ref);
        let (service_date, sec) = match assign_service_date(obs.time, spans_midnight) {
            Some(pair) => pair,
            None => return Outcome::Discarded(Discard::NoServiceDate),
        };

        let key = ArrivalKey {
            service_date,
            trip: obs.trip_ref.clone(),
            stop: stop.clone(),
        };
        let latest = self.arrivals.entry(key).or_insert(sec);
        *latest = (*latest).max(sec);

        let position = match obs.location {
            Some((lon, lat)) => {
                let position = self.route.project(lon, lat);
                if position.is_none() {
                    debug!(
                        "Couldn't project ({lon}, {lat}) onto the route for {} at {}",
                        obs.trip_ref, obs.time
                    );
                    self.report.unprojected_locations += 1;
                }
                position
            }
            None => None,
        };
        let sample = PositionSample {
            position,
            source: obs.time,
        };
        let key = PositionKey {
            service_date,
            trip: obs.trip_ref.clone(),
            sec: obs.time.sec,
        };
        if let Some(duplicate) = merge_position(&mut self.positions, key, sample) {
            self.report.duplicate_positions.push(duplicate);
        }

        Outcome::Recorded
    }

    /// Combines results from another partition of the corpus, like a different set of days. The
    /// result is the same no matter how the corpus was split or in what order things merge.
    pub fn merge(&mut self, other: Reconciler) {
        for (key, sec) in other.arrivals {
            let latest = self.arrivals.entry(key).or_insert(sec);
            *latest = (*latest).max(sec);
        }
        for (key, sample) in other.positions {
            if let Some(duplicate) = merge_position(&mut self.positions, key, sample) {
                self.report.duplicate_positions.push(duplicate);
            }
        }
        self.report.absorb(other.report);
    }

    pub fn arrivals(&self) -> &BTreeMap<ArrivalKey, u32> {
        &self.arrivals
    }

    pub fn positions(&self) -> &BTreeMap<PositionKey, PositionSample> {
        &self.positions
    }

    pub fn report(&self) -> &RunReport {
        &self.report
    }

    pub fn finish(self) -> (Vec<TripResult>, RunReport) {
        (group_results(&self.arrivals, &self.positions), self.report)
    }
}

// Within one snapshot, the same vehicle shows up once per upcoming stop. A location from any of
// those beats a missing one. Between different snapshots, the later one wins, but that shouldn't
// happen, so it's reported.
fn merge_position(
    positions: &mut BTreeMap<PositionKey, PositionSample>,
    key: PositionKey,
    sample: PositionSample,
) -> Option<DuplicatePosition> {
    match positions.entry(key) {
        Entry::Vacant(entry) => {
            entry.insert(sample);
            None
        }
        Entry::Occupied(mut entry) => {
            let existing = *entry.get();
            if existing.source == sample.source {
                if sample.position.is_some() {
                    entry.get_mut().position = sample.position;
                }
                return None;
            }

            let (kept, replaced) = if sample.source > existing.source {
                entry.insert(sample);
                (sample.source, existing.source)
            } else {
                (existing.source, sample.source)
            };
            let key = entry.key();
            Some(DuplicatePosition {
                service_date: key.service_date,
                trip_short_name: key.trip.clone(),
                sec: key.sec,
                kept,
                replaced,
            })
        }
    }
}
