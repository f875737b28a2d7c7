use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use serde::Deserialize;

use crate::{ScheduleError, StopID};

pub struct Stop {
    pub stop_id: StopID,
    pub name: String,
    pub parent_station: Option<StopID>,
}

pub fn load<R: std::io::Read>(reader: R) -> Result<BTreeMap<StopID, Stop>> {
    let mut stops = BTreeMap::new();
    for rec in csv::Reader::from_reader(reader).deserialize() {
        let rec: Record = rec?;
        if stops.contains_key(&rec.stop_id) {
            bail!("Duplicate {:?}", rec.stop_id);
        }
        stops.insert(
            rec.stop_id.clone(),
            Stop {
                stop_id: rec.stop_id,
                name: rec.stop_name.unwrap_or_default(),
                parent_station: rec.parent_station,
            },
        );
    }
    Ok(stops)
}

/// Maps every stop to its topmost parent_station, or itself if it has no parent. Platforms and
/// boarding areas all collapse into one logical station.
pub fn resolve_ancestors(
    stops: &BTreeMap<StopID, Stop>,
) -> Result<BTreeMap<StopID, StopID>, ScheduleError> {
    let mut ancestors: BTreeMap<StopID, StopID> = BTreeMap::new();
    for start in stops.keys() {
        if ancestors.contains_key(start) {
            continue;
        }

        let mut chain = vec![start];
        let mut visited = BTreeSet::new();
        visited.insert(start);
        let mut current = start;
        let root = loop {
            // Part of this chain was already resolved from another stop
            if let Some(root) = ancestors.get(current) {
                break root.clone();
            }
            let parent = match &stops[current].parent_station {
                Some(parent) => parent,
                None => break current.clone(),
            };
            let (parent, _) =
                stops
                    .get_key_value(parent)
                    .ok_or_else(|| ScheduleError::DanglingParent {
                        stop: current.clone(),
                        parent: parent.clone(),
                    })?;
            if !visited.insert(parent) {
                return Err(ScheduleError::ParentCycle {
                    stop: start.clone(),
                    via: parent.clone(),
                });
            }
            chain.push(parent);
            current = parent;
        };

        for id in chain {
            ancestors.insert(id.clone(), root.clone());
        }
    }
    Ok(ancestors)
}

#[derive(Deserialize)]
struct Record {
    stop_id: StopID,
    #[serde(default)]
    stop_name: Option<String>,
    #[serde(default)]
    parent_station: Option<StopID>,
}
