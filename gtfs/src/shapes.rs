use std::collections::BTreeMap;

use anyhow::Result;
use serde::Deserialize;

use crate::ShapeID;

/// Returns (longitude, latitude) points per shape, in order.
pub fn load<R: std::io::Read>(reader: R) -> Result<BTreeMap<ShapeID, Vec<(f64, f64)>>> {
    let mut pts_per_shape: BTreeMap<ShapeID, Vec<(usize, (f64, f64))>> = BTreeMap::new();
    for rec in csv::Reader::from_reader(reader).deserialize() {
        let rec: Record = rec?;
        pts_per_shape
            .entry(rec.shape_id)
            .or_insert_with(Vec::new)
            .push((rec.shape_pt_sequence, (rec.shape_pt_lon, rec.shape_pt_lat)));
    }

    // Sort by shape_pt_sequence, in case the file isn't in order
    let mut results = BTreeMap::new();
    for (shape_id, mut pts) in pts_per_shape {
        pts.sort_by_key(|(seq, _)| *seq);
        results.insert(shape_id, pts.into_iter().map(|(_, pt)| pt).collect());
    }
    Ok(results)
}

#[derive(Deserialize)]
struct Record {
    shape_id: ShapeID,
    shape_pt_lat: f64,
    shape_pt_lon: f64,
    shape_pt_sequence: usize,
}
