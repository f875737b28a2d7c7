use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;

use crate::StopMonitoring;

/// When a snapshot was captured, recovered from where it lives in the corpus:
/// `{YYYY-MM-DD}/{HHMM}.json`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SnapshotTime {
    pub date: NaiveDate,
    /// Seconds since midnight of `date`
    pub sec: u32,
}

impl SnapshotTime {
    pub fn new(date: NaiveDate, hours: u32, minutes: u32) -> Self {
        Self {
            date,
            sec: hours * 3600 + minutes * 60,
        }
    }

    /// Fails on anything that doesn't exactly match the naming scheme, instead of guessing.
    pub fn from_path(path: &Path) -> Result<Self> {
        let date = path
            .parent()
            .and_then(|dir| dir.file_name())
            .and_then(|name| name.to_str())
            .ok_or_else(|| anyhow!("{} isn't inside a date directory", path.display()))?;
        let date = parse_date_dir(date)?;
        let stem = path
            .file_stem()
            .and_then(|name| name.to_str())
            .ok_or_else(|| anyhow!("{} has no usable filename", path.display()))?;
        parse_hhmm(date, stem).with_context(|| path.display().to_string())
    }
}

impl std::fmt::Display for SnapshotTime {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{} {:02}:{:02}",
            self.date,
            self.sec / 3600,
            (self.sec % 3600) / 60
        )
    }
}

fn parse_date_dir(name: &str) -> Result<NaiveDate> {
    // chrono accepts unpadded fields, but then the directories wouldn't sort lexicographically
    if name.len() != 10 {
        bail!("Date directory {name} isn't YYYY-MM-DD");
    }
    NaiveDate::parse_from_str(name, "%Y-%m-%d")
        .map_err(|err| anyhow!("Date directory {name} isn't YYYY-MM-DD: {err}"))
}

fn parse_hhmm(date: NaiveDate, stem: &str) -> Result<SnapshotTime> {
    if stem.len() != 4 || !stem.chars().all(|c| c.is_ascii_digit()) {
        bail!("Snapshot filename {stem} isn't HHMM");
    }
    let hours: u32 = stem[0..2].parse()?;
    let minutes: u32 = stem[2..4].parse()?;
    if hours >= 24 || minutes >= 60 {
        bail!("Snapshot filename {stem} isn't a valid time");
    }
    Ok(SnapshotTime::new(date, hours, minutes))
}

pub struct Snapshot {
    pub path: PathBuf,
    pub time: SnapshotTime,
    pub payload: StopMonitoring,
}

/// One snapshot file couldn't be used. The rest of the corpus is still fine.
pub struct SnapshotFault {
    pub path: PathBuf,
    pub time: SnapshotTime,
    pub error: anyhow::Error,
}

/// Lists every snapshot under `root`, sorted by time. Nothing is read or parsed until the
/// iterator reaches that file. A badly named date directory or JSON file fails the whole thing.
pub fn enumerate_snapshots<P: AsRef<Path>>(root: P) -> Result<Snapshots> {
    let root = root.as_ref();
    let mut files = Vec::new();
    for entry in fs_err::read_dir(root)? {
        let path = entry?.path();
        // Follow symlinks, so a linked date directory isn't silently skipped
        if !fs_err::metadata(&path)?.is_dir() {
            if is_json(&path) {
                bail!("{} isn't inside a date directory", path.display());
            }
            debug!("Ignoring {}", path.display());
            continue;
        }

        // Check the directory name even if there's nothing inside
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| anyhow!("{} isn't a date directory", path.display()))?;
        parse_date_dir(name)?;
        for entry in fs_err::read_dir(&path)? {
            let path = entry?.path();
            if !is_json(&path) || !fs_err::metadata(&path)?.is_file() {
                debug!("Ignoring {}", path.display());
                continue;
            }
            files.push((SnapshotTime::from_path(&path)?, path));
        }
    }
    files.sort();

    Ok(Snapshots {
        files: files.into_iter(),
    })
}

fn is_json(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some("json")
}

pub struct Snapshots {
    files: std::vec::IntoIter<(SnapshotTime, PathBuf)>,
}

impl Iterator for Snapshots {
    type Item = Result<Snapshot, SnapshotFault>;

    fn next(&mut self) -> Option<Self::Item> {
        let (time, path) = self.files.next()?;
        Some(match read_payload(&path) {
            Ok(payload) => Ok(Snapshot {
                path,
                time,
                payload,
            }),
            Err(error) => Err(SnapshotFault { path, time, error }),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.files.size_hint()
    }
}

impl ExactSizeIterator for Snapshots {}

fn read_payload(path: &Path) -> Result<StopMonitoring> {
    let bytes = fs_err::read(path)?;
    // The upstream API starts responses with a byte-order mark
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(&bytes);
    Ok(serde_json::from_slice(bytes)?)
}
