use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use serde::Deserialize;

use crate::{RouteID, ServiceID, ShapeID, StopTime, TripID, TripName};

pub struct Trip {
    pub trip_id: TripID,
    pub route_id: RouteID,
    pub service_id: ServiceID,
    pub short_name: Option<TripName>,
    pub shape_id: Option<ShapeID>,

    // Sorted by stop_sequence
    pub stop_times: Vec<StopTime>,
}

/// Only keeps trips from one service. Also returns the IDs of everything else, so stop times for
/// those can be quietly skipped later.
pub fn load<R: std::io::Read>(
    reader: R,
    service_id: &ServiceID,
) -> Result<(BTreeMap<TripID, Trip>, BTreeSet<TripID>)> {
    let mut trips = BTreeMap::new();
    let mut other_service = BTreeSet::new();
    for rec in csv::Reader::from_reader(reader).deserialize() {
        let rec: Record = rec?;
        if trips.contains_key(&rec.trip_id) || other_service.contains(&rec.trip_id) {
            bail!("Duplicate {:?}", rec.trip_id);
        }
        if &rec.service_id != service_id {
            other_service.insert(rec.trip_id);
            continue;
        }
        trips.insert(
            rec.trip_id.clone(),
            Trip {
                trip_id: rec.trip_id,
                route_id: rec.route_id,
                service_id: rec.service_id,
                short_name: rec
                    .trip_short_name
                    .filter(|x| !x.trim().is_empty())
                    .map(|x| TripName::new(x.trim())),
                shape_id: rec.shape_id,
                stop_times: Vec::new(),
            },
        );
    }
    Ok((trips, other_service))
}

/// Attaches grouped and sorted stop times to their trip. Trips with nothing to attach are
/// dropped. Returns a description of everything that didn't fit.
pub fn build_trip_index(
    trips: &mut BTreeMap<TripID, Trip>,
    mut stop_times: BTreeMap<TripID, Vec<StopTime>>,
) -> Vec<String> {
    let mut warnings = Vec::new();
    let mut empty = Vec::new();
    for trip in trips.values_mut() {
        match stop_times.remove(&trip.trip_id) {
            Some(list) => {
                trip.stop_times = list;
            }
            None => {
                empty.push(trip.trip_id.clone());
            }
        }
    }
    for id in empty {
        warnings.push(format!("Trip {id} has no stop times, skipping it"));
        trips.remove(&id);
    }
    if !stop_times.is_empty() {
        warnings.push(format!(
            "Stop times defined for {} trips that aren't in the filtered service",
            stop_times.len()
        ));
    }
    warnings
}

#[derive(Deserialize)]
struct Record {
    trip_id: TripID,
    route_id: RouteID,
    service_id: ServiceID,
    #[serde(default)]
    trip_short_name: Option<String>,
    #[serde(default)]
    shape_id: Option<ShapeID>,
}
