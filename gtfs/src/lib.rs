//! Reads the parts of a GTFS feed needed to line up realtime observations with one route: stops
//! collapsed into stations, trips from one service, and the route's shape.

#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate log;

mod error;
mod ids;
mod index;
mod route;
mod shapes;
mod source;
mod stop_times;
mod stops;
mod trips;

use std::collections::BTreeMap;
use std::path::Path;

use abstutil::Timer;
use anyhow::Result;

pub use error::ScheduleError;
pub use ids::{RouteID, ServiceID, ShapeID, StopID, TripID, TripName};
pub use index::{
    IncludedStop, IndexOptions, ScheduleIndex, ScheduledStopTime, TripSummary, MIDNIGHT,
};
pub use route::RouteGeometry;
pub use source::Source;
pub use stop_times::{parse_time, StopTime};
pub use stops::{resolve_ancestors, Stop};
pub use trips::Trip;

pub struct GTFS {
    pub service_id: ServiceID,
    pub stops: BTreeMap<StopID, Stop>,
    /// Only trips from `service_id`, with their stop times attached
    pub trips: BTreeMap<TripID, Trip>,
    /// Empty if the feed has no shapes.txt
    pub shapes: BTreeMap<ShapeID, Vec<(f64, f64)>>,
    /// Problems that didn't stop loading, but somebody should look at
    pub warnings: Vec<String>,
}

impl GTFS {
    /// Loads from a directory or a zip file.
    pub fn load<P: AsRef<Path>>(path: P, service_id: &ServiceID, timer: &mut Timer) -> Result<Self> {
        let path = path.as_ref();
        timer.start(format!("read GTFS from {}", path.display()));
        let mut source = Source::open(path)?;
        let stops = source.read("stops.txt")?;
        let trips = source.read("trips.txt")?;
        let stop_times = source.read("stop_times.txt")?;
        let shapes = if source.has("shapes.txt") {
            Some(source.read("shapes.txt")?)
        } else {
            None
        };
        timer.stop(format!("read GTFS from {}", path.display()));

        Self::from_tables(
            &stops,
            &trips,
            &stop_times,
            shapes.as_deref(),
            service_id,
            timer,
        )
    }

    pub fn from_tables(
        stops: &[u8],
        trips: &[u8],
        stop_times: &[u8],
        shapes: Option<&[u8]>,
        service_id: &ServiceID,
        timer: &mut Timer,
    ) -> Result<Self> {
        timer.start("parse GTFS");
        let stops = stops::load(stops).map_err(|err| anyhow!("stops.txt: {err}"))?;
        let (mut trips, other_service) =
            trips::load(trips, service_id).map_err(|err| anyhow!("trips.txt: {err}"))?;
        if trips.is_empty() {
            bail!("No trips in service {service_id}");
        }
        let (stop_times, unknown_trips) = stop_times::load(stop_times, &trips, &other_service)
            .map_err(|err| anyhow!("stop_times.txt: {err}"))?;
        let shapes = match shapes {
            Some(shapes) => shapes::load(shapes).map_err(|err| anyhow!("shapes.txt: {err}"))?,
            None => BTreeMap::new(),
        };

        let mut warnings = Vec::new();
        if let Some(example) = unknown_trips.iter().next() {
            warnings.push(format!(
                "stop_times.txt refers to {} trips that aren't in trips.txt, like {example}",
                unknown_trips.len(),
            ));
        }
        warnings.extend(trips::build_trip_index(&mut trips, stop_times));
        info!(
            "{} stops, {} trips in service {service_id}, {} trips from other services",
            stops.len(),
            trips.len(),
            other_service.len()
        );
        timer.stop("parse GTFS");

        Ok(Self {
            service_id: service_id.clone(),
            stops,
            trips,
            shapes,
            warnings,
        })
    }

    /// The one trip with this short name. Ambiguity is an error; there's no good way to pick.
    pub fn select_reference_trip(&self, name: &TripName) -> Result<&Trip, ScheduleError> {
        let matches: Vec<&Trip> = self
            .trips
            .values()
            .filter(|trip| trip.short_name.as_ref() == Some(name))
            .collect();
        if matches.len() != 1 {
            return Err(ScheduleError::ReferenceTrip {
                name: name.clone(),
                service_id: self.service_id.clone(),
                matches: matches.len(),
            });
        }
        Ok(matches[0])
    }

    pub fn shape_for_trip(&self, trip: &Trip) -> Option<&Vec<(f64, f64)>> {
        self.shapes.get(trip.shape_id.as_ref()?)
    }
}
