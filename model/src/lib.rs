//! Replays captured realtime snapshots against a schedule index to work out when each trip
//! actually reached each stop, and where along the route it was over time.

#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate log;

mod reconcile;
mod report;
mod result;
mod siri;
mod snapshots;

use std::path::Path;

use abstutil::Timer;
use anyhow::Result;
use serde::Serialize;

use gtfs::{RouteGeometry, ScheduleIndex};

pub use reconcile::{
    assign_service_date, ArrivalKey, Discard, Outcome, PositionKey, PositionSample, Reconciler,
    NOON,
};
pub use report::{DuplicatePosition, RunReport, SkippedFile};
pub use result::{group_results, ObservedPosition, ObservedStopTime, ServiceDateResult, TripResult};
pub use siri::{Observation, StopMonitoring};
pub use snapshots::{enumerate_snapshots, Snapshot, SnapshotFault, SnapshotTime, Snapshots};

/// Reads every snapshot under `snapshots_dir` in time order and reconciles it. Bad files are
/// skipped and listed in the report.
pub fn reconcile_corpus<P: AsRef<Path>>(
    schedule: &ScheduleIndex,
    route: &RouteGeometry,
    snapshots_dir: P,
    timer: &mut Timer,
) -> Result<(Vec<TripResult>, RunReport)> {
    let snapshots_dir = snapshots_dir.as_ref();
    let snapshots = enumerate_snapshots(snapshots_dir)?;
    if snapshots.len() == 0 {
        bail!("No snapshots under {}", snapshots_dir.display());
    }

    let mut reconciler = Reconciler::new(schedule, route);
    timer.start_iter("reconcile snapshots", snapshots.len());
    for snapshot in snapshots {
        timer.next();
        match snapshot {
            Ok(snapshot) => reconciler.ingest(&snapshot),
            Err(fault) => reconciler.skip(&fault),
        }
    }
    Ok(reconciler.finish())
}

pub fn write_json<P: AsRef<Path>, T: Serialize>(path: P, value: &T) -> Result<()> {
    let path = path.as_ref();
    fs_err::write(path, serde_json::to_string_pretty(value)?)?;
    info!("Wrote {}", path.display());
    Ok(())
}
