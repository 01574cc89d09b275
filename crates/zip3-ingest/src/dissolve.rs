//! Dissolve trimmed ZCTAs into one polygon per (state, ZIP3)

use crate::geometry::Geometry;
use crate::models::{TrimmedPolygon, Zip3Region};
use std::collections::BTreeMap;
use tracing::info;
use zip3_common::RegionKey;

pub struct Dissolver;

impl Dissolver {
    /// Union every group of trimmed polygons sharing a key.
    ///
    /// Regions come back sorted by key; a group with one member keeps its
    /// geometry untouched.
    pub fn dissolve(trimmed: Vec<TrimmedPolygon>) -> Vec<Zip3Region> {
        let input = trimmed.len();
        let mut groups: BTreeMap<RegionKey, Vec<Geometry>> = BTreeMap::new();
        for polygon in trimmed {
            groups.entry(polygon.key()).or_default().push(polygon.geometry);
        }

        let regions: Vec<Zip3Region> = groups
            .into_iter()
            .map(|(key, parts)| {
                let member_count = parts.len();
                Zip3Region {
                    key,
                    geometry: Geometry::union_all(parts),
                    member_count,
                }
            })
            .collect();

        info!(
            input,
            regions = regions.len(),
            "Dissolved trimmed polygons by state and ZIP3"
        );
        regions
    }
}
