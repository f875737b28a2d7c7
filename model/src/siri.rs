//! The subset of a SIRI StopMonitoring response that matters here.

use serde::Deserialize;

use gtfs::{StopID, TripName};

use crate::SnapshotTime;

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StopMonitoring {
    pub service_delivery: ServiceDelivery,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceDelivery {
    pub stop_monitoring_delivery: StopMonitoringDelivery,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StopMonitoringDelivery {
    // Missing entirely when nothing's running
    #[serde(default)]
    pub monitored_stop_visit: Vec<MonitoredStopVisit>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MonitoredStopVisit {
    pub monitored_vehicle_journey: MonitoredVehicleJourney,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MonitoredVehicleJourney {
    #[serde(default)]
    pub monitored_call: Option<MonitoredCall>,
    #[serde(default)]
    pub framed_vehicle_journey_ref: Option<FramedVehicleJourneyRef>,
    #[serde(default)]
    pub vehicle_location: Option<VehicleLocation>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MonitoredCall {
    pub stop_point_ref: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FramedVehicleJourneyRef {
    pub dated_vehicle_journey_ref: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VehicleLocation {
    #[serde(default)]
    pub longitude: Option<Coordinate>,
    #[serde(default)]
    pub latitude: Option<Coordinate>,
}

/// Sometimes a number, sometimes a string, sometimes an empty string.
#[derive(Deserialize)]
#[serde(untagged)]
pub enum Coordinate {
    Number(f64),
    Text(String),
}

impl Coordinate {
    fn value(&self) -> Option<f64> {
        let x = match self {
            Coordinate::Number(x) => *x,
            Coordinate::Text(x) => x.trim().parse().ok()?,
        };
        if x.is_finite() {
            Some(x)
        } else {
            None
        }
    }
}

/// One monitored stop visit from one snapshot. The realtime feed reports the stop a train is
/// heading to next, not where it is.
#[derive(Clone, Debug, PartialEq)]
pub struct Observation {
    /// Not necessarily a top-level station
    pub stop_ref: StopID,
    pub trip_ref: TripName,
    pub time: SnapshotTime,
    /// (longitude, latitude)
    pub location: Option<(f64, f64)>,
}

impl StopMonitoring {
    pub fn visits(&self) -> &[MonitoredStopVisit] {
        &self
            .service_delivery
            .stop_monitoring_delivery
            .monitored_stop_visit
    }

    /// Every visit with a stop and a trip. Zero visits is fine.
    pub fn extract_observations(
        &self,
        time: SnapshotTime,
    ) -> impl Iterator<Item = Observation> + '_ {
        self.visits()
            .iter()
            .filter_map(move |visit| visit.to_observation(time))
    }

    /// Visits that can't become an observation because they're missing the stop or the trip.
    pub fn count_incomplete_visits(&self) -> usize {
        self.visits()
            .iter()
            .filter(|visit| visit.stop_ref().is_none() || visit.trip_ref().is_none())
            .count()
    }
}

impl MonitoredStopVisit {
    fn stop_ref(&self) -> Option<&str> {
        let call = self.monitored_vehicle_journey.monitored_call.as_ref()?;
        call.stop_point_ref.as_deref().filter(|x| !x.is_empty())
    }

    fn trip_ref(&self) -> Option<&str> {
        let journey = self
            .monitored_vehicle_journey
            .framed_vehicle_journey_ref
            .as_ref()?;
        journey
            .dated_vehicle_journey_ref
            .as_deref()
            .filter(|x| !x.is_empty())
    }

    fn location(&self) -> Option<(f64, f64)> {
        let location = self.monitored_vehicle_journey.vehicle_location.as_ref()?;
        let longitude = location.longitude.as_ref()?.value()?;
        let latitude = location.latitude.as_ref()?.value()?;
        if longitude.abs() > 180.0 || latitude.abs() > 90.0 {
            return None;
        }
        Some((longitude, latitude))
    }

    fn to_observation(&self, time: SnapshotTime) -> Option<Observation> {
        Some(Observation {
            stop_ref: StopID::new(self.stop_ref()?),
            trip_ref: TripName::new(self.trip_ref()?),
            time,
            location: self.location(),
        })
    }
}
