use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use serde::Deserialize;

use crate::{ScheduleError, StopID, Trip, TripID};

pub struct StopTime {
    pub stop_id: StopID,
    pub stop_sequence: usize,
    /// Seconds since the start of the service day. This can exceed 24 hours. None for stops
    /// without a timepoint.
    pub arrival_time: Option<u32>,
    pub shape_dist_traveled: Option<f64>,
}

/// Groups stop times by trip, sorted by stop_sequence. Rows belonging to trips from other
/// services are dropped. Rows for trips that don't exist at all are dropped too, but reported.
pub fn load<R: std::io::Read>(
    reader: R,
    trips: &BTreeMap<TripID, Trip>,
    other_service: &BTreeSet<TripID>,
) -> Result<(BTreeMap<TripID, Vec<StopTime>>, BTreeSet<TripID>)> {
    let mut stop_times: BTreeMap<TripID, Vec<StopTime>> = BTreeMap::new();
    let mut unknown_trips = BTreeSet::new();
    for rec in csv::Reader::from_reader(reader).deserialize() {
        let rec: Record = rec?;
        if !trips.contains_key(&rec.trip_id) {
            if !other_service.contains(&rec.trip_id) {
                unknown_trips.insert(rec.trip_id);
            }
            continue;
        }

        // Some feeds only fill out one of these
        let arrival_time = match rec.arrival_time.or(rec.departure_time) {
            Some(time) if !time.trim().is_empty() => Some(parse_time(&time)?),
            _ => None,
        };
        stop_times
            .entry(rec.trip_id)
            .or_insert_with(Vec::new)
            .push(StopTime {
                stop_id: rec.stop_id,
                stop_sequence: rec.stop_sequence,
                arrival_time,
                shape_dist_traveled: rec.shape_dist_traveled,
            });
    }

    // Sort by stop_sequence, in case the file isn't in order
    for list in stop_times.values_mut() {
        list.sort_by_key(|st| st.stop_sequence);
    }
    Ok((stop_times, unknown_trips))
}

/// Parses HH:MM:SS into seconds. Hours can be 24 or more for trips running past midnight.
pub fn parse_time(time: &str) -> Result<u32, ScheduleError> {
    let bad = || ScheduleError::BadTime(time.to_string());
    let parts: Vec<&str> = time.trim().split(':').collect();
    if parts.len() != 3 {
        return Err(bad());
    }
    let mut values = [0; 3];
    for (value, part) in values.iter_mut().zip(parts) {
        if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
            return Err(bad());
        }
        *value = part.parse::<u32>().map_err(|_| bad())?;
    }
    let [hours, minutes, seconds] = values;
    if minutes >= 60 || seconds >= 60 {
        return Err(bad());
    }
    hours
        .checked_mul(3600)
        .and_then(|x| x.checked_add(60 * minutes + seconds))
        .ok_or_else(bad)
}

#[derive(Deserialize)]
struct Record {
    trip_id: TripID,
    stop_id: StopID,
    stop_sequence: usize,
    #[serde(default)]
    arrival_time: Option<String>,
    #[serde(default)]
    departure_time: Option<String>,
    #[serde(default)]
    shape_dist_traveled: Option<f64>,
}
