use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use gtfs::{StopID, TripName};

use crate::{ArrivalKey, PositionKey, PositionSample};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TripResult {
    pub trip_short_name: TripName,
    pub service_dates: Vec<ServiceDateResult>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServiceDateResult {
    pub service_date: NaiveDate,
    /// Sorted by time
    pub stop_times: Vec<ObservedStopTime>,
    /// Sorted by time
    pub positions: Vec<ObservedPosition>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedStopTime {
    pub stop_id: StopID,
    pub sec: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObservedPosition {
    pub sec: u32,
    /// null when the vehicle was seen, but without a usable location
    pub position: Option<f64>,
}

/// Groups both aggregates by trip, then by service date. Trips and dates come out sorted, so the
/// same input always produces the same output.
pub fn group_results(
    arrivals: &BTreeMap<ArrivalKey, u32>,
    positions: &BTreeMap<PositionKey, PositionSample>,
) -> Vec<TripResult> {
    let mut grouped: BTreeMap<&TripName, BTreeMap<NaiveDate, ServiceDateResult>> =
        BTreeMap::new();
    for (key, sec) in arrivals {
        entry_for(&mut grouped, &key.trip, key.service_date)
            .stop_times
            .push(ObservedStopTime {
                stop_id: key.stop.clone(),
                sec: *sec,
            });
    }
    // The keys are already sorted by time within a trip and date
    for (key, sample) in positions {
        entry_for(&mut grouped, &key.trip, key.service_date)
            .positions
            .push(ObservedPosition {
                sec: key.sec,
                position: sample.position,
            });
    }

    grouped
        .into_iter()
        .map(|(trip, dates)| TripResult {
            trip_short_name: trip.clone(),
            service_dates: dates
                .into_values()
                .map(|mut date| {
                    date.stop_times
                        .sort_by(|a, b| (a.sec, &a.stop_id).cmp(&(b.sec, &b.stop_id)));
                    date
                })
                .collect(),
        })
        .collect()
}

fn entry_for<'a, 'b>(
    grouped: &'b mut BTreeMap<&'a TripName, BTreeMap<NaiveDate, ServiceDateResult>>,
    trip: &'a TripName,
    service_date: NaiveDate,
) -> &'b mut ServiceDateResult {
    grouped
        .entry(trip)
        .or_insert_with(BTreeMap::new)
        .entry(service_date)
        .or_insert_with(|| ServiceDateResult {
            service_date,
            stop_times: Vec::new(),
            positions: Vec::new(),
        })
}
