use crate::{ServiceID, StopID, TripID, TripName};

/// Problems with the static schedule that make it impossible to build an index.
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("stop {stop} has parent_station {parent}, which isn't in stops.txt")]
    DanglingParent { stop: StopID, parent: StopID },

    #[error("the parent_station chain starting at {stop} loops back through {via}")]
    ParentCycle { stop: StopID, via: StopID },

    #[error("stop_times.txt refers to stop {0}, which isn't in stops.txt")]
    UnknownStop(StopID),

    #[error("wanted exactly 1 trip named {name} in service {service_id}, got {matches}")]
    ReferenceTrip {
        name: TripName,
        service_id: ServiceID,
        matches: usize,
    },

    #[error("reference trip {trip}: {problem}")]
    ShapeDistance { trip: TripID, problem: String },

    #[error("bad GTFS time {0:?}")]
    BadTime(String),
}
