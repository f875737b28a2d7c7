use std::collections::BTreeMap;
use std::path::Path;

use abstutil::{prettyprint_usize, Counter};
use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;

use gtfs::TripName;

use crate::{Discard, SnapshotFault, SnapshotTime};

/// Everything that got skipped or looked suspicious during a run. Output is only trustworthy
/// alongside this.
pub struct RunReport {
    pub snapshots_read: usize,
    pub observations_recorded: usize,
    pub skipped_files: Vec<SkippedFile>,
    pub discarded: Counter<Discard>,
    pub duplicate_positions: Vec<DuplicatePosition>,
    /// Observations with a valid location that couldn't be placed along the route. Their position
    /// is recorded as null, same as observations with no location.
    pub unprojected_locations: usize,
    pub schedule_warnings: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SkippedFile {
    pub path: String,
    pub reason: String,
}

impl From<&SnapshotFault> for SkippedFile {
    fn from(fault: &SnapshotFault) -> Self {
        Self {
            path: fault.path.display().to_string(),
            reason: format!("{:#}", fault.error),
        }
    }
}

/// Two different snapshots produced a position for the same trip at the same time. The later
/// snapshot won.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DuplicatePosition {
    pub service_date: NaiveDate,
    pub trip_short_name: TripName,
    pub sec: u32,
    pub kept: SnapshotTime,
    pub replaced: SnapshotTime,
}

impl RunReport {
    pub fn new() -> Self {
        Self {
            snapshots_read: 0,
            observations_recorded: 0,
            skipped_files: Vec::new(),
            discarded: Counter::new(),
            duplicate_positions: Vec::new(),
            unprojected_locations: 0,
            schedule_warnings: Vec::new(),
        }
    }

    pub fn absorb(&mut self, other: RunReport) {
        self.snapshots_read += other.snapshots_read;
        self.observations_recorded += other.observations_recorded;
        self.skipped_files.extend(other.skipped_files);
        for (reason, count) in other.discarded.consume() {
            self.discarded.add(reason, count);
        }
        self.duplicate_positions.extend(other.duplicate_positions);
        self.unprojected_locations += other.unprojected_locations;
        self.schedule_warnings.extend(other.schedule_warnings);
    }

    /// True if nothing needs a second look. Discarded observations are expected and don't count.
    pub fn is_clean(&self) -> bool {
        self.skipped_files.is_empty()
            && self.duplicate_positions.is_empty()
            && self.unprojected_locations == 0
            && self.schedule_warnings.is_empty()
    }

    pub fn log_summary(&self) {
        info!(
            "Read {} snapshots, recorded {} observations",
            prettyprint_usize(self.snapshots_read),
            prettyprint_usize(self.observations_recorded)
        );
        for (reason, count) in self.discarded.borrow() {
            info!(
                "Discarded {} observations: {reason}",
                prettyprint_usize(*count)
            );
        }
        if !self.skipped_files.is_empty() {
            warn!(
                "Skipped {} snapshot files, so the output is incomplete",
                self.skipped_files.len()
            );
        }
        if !self.duplicate_positions.is_empty() {
            warn!(
                "{} positions were reported by more than one snapshot; review these",
                self.duplicate_positions.len()
            );
        }
        if self.unprojected_locations > 0 {
            warn!(
                "{} locations couldn't be projected onto the route; their positions are null",
                prettyprint_usize(self.unprojected_locations)
            );
        }
        for warning in &self.schedule_warnings {
            warn!("Schedule: {warning}");
        }
    }

    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let discarded_observations: BTreeMap<String, usize> = self
            .discarded
            .borrow()
            .iter()
            .map(|(reason, count)| (reason.to_string(), *count))
            .collect();
        let file = ReportFile {
            snapshots_read: self.snapshots_read,
            observations_recorded: self.observations_recorded,
            skipped_files: &self.skipped_files,
            discarded_observations,
            duplicate_positions: &self.duplicate_positions,
            unprojected_locations: self.unprojected_locations,
            schedule_warnings: &self.schedule_warnings,
        };
        crate::write_json(path, &file)
    }
}

#[derive(Serialize)]
struct ReportFile<'a> {
    snapshots_read: usize,
    observations_recorded: usize,
    skipped_files: &'a [SkippedFile],
    discarded_observations: BTreeMap<String, usize>,
    duplicate_positions: &'a [DuplicatePosition],
    unprojected_locations: usize,
    schedule_warnings: &'a [String],
}
