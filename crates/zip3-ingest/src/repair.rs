//! Topology repair and simplification of dissolved regions
//!
//! Regions with a structural defect or crossing edges are run through the
//! overlay engine (the zero-width-buffer fix); valid regions pass through
//! untouched. A region that is still invalid after repair is dropped with a
//! warning. Simplified regions are fitted back into their state and cut away
//! from neighbouring regions of the same state, so simplification never moves
//! a boundary outside the state or onto another region. A simplification that
//! cannot be fitted is discarded for that region. Keys are never changed.

use crate::config::GeometryConfig;
use crate::crs::Crs;
use crate::geometry::Geometry;
use crate::models::{StateRecord, Zip3Region};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};
use zip3_common::Zip3Error;

#[derive(Debug, Clone, Default, Serialize)]
pub struct RepairStats {
    /// Regions that had a structural defect or crossing edges before repair
    pub repaired: usize,
    /// Keys of regions that could not be repaired
    pub dropped_invalid: Vec<String>,
    /// Regions that lost vertices to simplification
    pub simplified: usize,
    /// Regions where simplification was rejected and the input kept
    pub simplify_rejected: usize,
    pub vertices_before: usize,
    pub vertices_after: usize,
}

#[derive(Debug)]
pub struct RepairOutcome {
    pub regions: Vec<Zip3Region>,
    pub stats: RepairStats,
}

pub struct TopologyRepairer {
    data_crs: Crs,
    working_crs: Crs,
    /// Tolerance in metres; `None` disables simplification
    simplify_tolerance_m: Option<f64>,
}

impl TopologyRepairer {
    pub fn new(config: &GeometryConfig, data_crs: Crs) -> Self {
        Self {
            data_crs,
            working_crs: config.working_crs,
            simplify_tolerance_m: config.simplify.then_some(config.simplify_tolerance_m),
        }
    }

    /// Repair, then simplify, `regions`; `states` bound where simplified
    /// boundaries may go
    pub fn process(&self, regions: Vec<Zip3Region>, states: &[StateRecord]) -> RepairOutcome {
        let mut stats = RepairStats::default();
        let mut kept = Vec::with_capacity(regions.len());

        for region in regions {
            stats.vertices_before += region.geometry.vertex_count();

            if !region.geometry.needs_repair() {
                kept.push(region);
                continue;
            }

            debug!(key = %region.key, issue = ?region.geometry.structural_issue(), "Repairing region");
            stats.repaired += 1;
            let repaired = region.geometry.repair();
            if let Some(issue) = repaired.structural_issue() {
                let err = Zip3Error::invalid_geometry(&region.key, issue);
                warn!(error = %err, "Dropping region");
                stats.dropped_invalid.push(region.key.to_string());
                continue;
            }
            kept.push(Zip3Region {
                geometry: repaired,
                ..region
            });
        }

        if let Some(tolerance) = self.simplify_tolerance_m {
            self.simplify_all(&mut kept, states, tolerance, &mut stats);
        }
        stats.vertices_after = kept.iter().map(|r| r.geometry.vertex_count()).sum();

        info!(
            repaired = stats.repaired,
            dropped = stats.dropped_invalid.len(),
            simplified = stats.simplified,
            simplify_rejected = stats.simplify_rejected,
            vertices_before = stats.vertices_before,
            vertices_after = stats.vertices_after,
            "Repaired and simplified {} regions",
            kept.len()
        );
        if !stats.dropped_invalid.is_empty() {
            warn!(keys = ?stats.dropped_invalid, "Regions dropped as unrepairable");
        }

        RepairOutcome {
            regions: kept,
            stats,
        }
    }

    /// Simplify in order; each accepted result is clipped to its state and
    /// has the current geometry of every same-state neighbour removed
    fn simplify_all(&self, regions: &mut [Zip3Region], states: &[StateRecord], tolerance: f64, stats: &mut RepairStats) {
        let boundaries: HashMap<&str, &Geometry> =
            states.iter().map(|s| (s.state_abbr.as_str(), &s.geometry)).collect();

        for i in 0..regions.len() {
            let simplified = regions[i]
                .geometry
                .simplify(tolerance, self.data_crs, self.working_crs);
            if simplified == regions[i].geometry {
                continue;
            }

            match self.fit(i, simplified, regions, boundaries.get(regions[i].state_abbr()).copied()) {
                Ok(fitted) => {
                    stats.simplified += 1;
                    regions[i].geometry = fitted;
                },
                Err(issue) => {
                    debug!(key = %regions[i].key, issue, "Simplification rejected");
                    stats.simplify_rejected += 1;
                },
            }
        }
    }

    fn fit(
        &self,
        index: usize,
        simplified: Geometry,
        regions: &[Zip3Region],
        state: Option<&Geometry>,
    ) -> std::result::Result<Geometry, &'static str> {
        let state = state.ok_or("no boundary for the region's state")?;
        if let Some(issue) = simplified.structural_issue() {
            return Err(issue);
        }

        let mut fitted = simplified.intersection(state);
        let bbox = fitted.bounding_rect().ok_or("simplified region left its state")?;

        let state_abbr = regions[index].state_abbr();
        let neighbours: Vec<Geometry> = regions
            .iter()
            .enumerate()
            .filter(|(j, r)| *j != index && r.state_abbr() == state_abbr && r.geometry.bbox_intersects(&bbox))
            .map(|(_, r)| r.geometry.clone())
            .collect();
        if !neighbours.is_empty() {
            fitted = fitted.difference(&Geometry::union_all(neighbours));
        }

        match fitted.structural_issue() {
            Some(issue) => Err(issue),
            None => Ok(fitted),
        }
    }
}
