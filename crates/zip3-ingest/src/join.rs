//! Spatial join: one state per ZCTA
//!
//! With the default `within` predicate a ZCTA belongs to the state that fully
//! contains it. Boundary-straddling ZCTAs (contained by no state) fall back to
//! the state containing their centroid. ZCTAs that match nothing, typically
//! offshore slivers, are dropped and counted.

use crate::config::{JoinConfig, JoinPredicate};
use crate::geometry::Geometry;
use crate::models::{AssignedZcta, AssignmentMethod, StateRecord, ZctaRecord};
use crate::progress::create_progress_bar;
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, Serialize)]
pub struct JoinStats {
    pub within: usize,
    pub centroid: usize,
    pub largest_overlap: usize,
    pub unassigned: usize,
    /// ZIP codes of the dropped ZCTAs, in input order
    pub unassigned_zips: Vec<String>,
}

impl JoinStats {
    pub fn assigned(&self) -> usize {
        self.within + self.centroid + self.largest_overlap
    }

    fn record(&mut self, method: AssignmentMethod) {
        match method {
            AssignmentMethod::Within => self.within += 1,
            AssignmentMethod::Centroid => self.centroid += 1,
            AssignmentMethod::LargestOverlap => self.largest_overlap += 1,
        }
    }
}

#[derive(Debug)]
pub struct JoinOutcome {
    pub assigned: Vec<AssignedZcta>,
    pub stats: JoinStats,
}

pub struct SpatialJoiner<'a> {
    config: &'a JoinConfig,
}

impl<'a> SpatialJoiner<'a> {
    pub fn new(config: &'a JoinConfig) -> Self {
        Self { config }
    }

    /// Assign every ZCTA to at most one state
    pub fn join(&self, zctas: Vec<ZctaRecord>, states: &[StateRecord]) -> JoinOutcome {
        info!(
            predicate = ?self.config.predicate,
            centroid_fallback = self.config.centroid_fallback,
            zctas = zctas.len(),
            states = states.len(),
            "Assigning ZCTAs to states"
        );

        let pb = create_progress_bar(zctas.len() as u64, "Assigning ZCTAs to states");
        let mut stats = JoinStats::default();
        let mut assigned = Vec::with_capacity(zctas.len());

        for zcta in zctas {
            pb.inc(1);
            match self.assign(&zcta.geometry, states) {
                Some((state_index, method)) => {
                    stats.record(method);
                    assigned.push(AssignedZcta {
                        state_abbr: states[state_index].state_abbr.clone(),
                        state_index,
                        method,
                        zcta,
                    });
                },
                None => {
                    debug!(zip5 = %zcta.zip5, "ZCTA matched no state");
                    stats.unassigned += 1;
                    stats.unassigned_zips.push(zcta.zip5);
                },
            }
        }
        pb.finish_and_clear();

        info!(
            within = stats.within,
            centroid = stats.centroid,
            largest_overlap = stats.largest_overlap,
            "Assigned {} ZCTAs to states",
            stats.assigned()
        );
        if stats.unassigned > 0 {
            warn!(
                count = stats.unassigned,
                "ZCTAs could not be assigned to any state and were dropped"
            );
        }

        JoinOutcome { assigned, stats }
    }

    /// Index of the owning state and the rule that chose it
    pub fn assign(&self, geometry: &Geometry, states: &[StateRecord]) -> Option<(usize, AssignmentMethod)> {
        let bbox = geometry.bounding_rect()?;
        let candidates: Vec<usize> = states
            .iter()
            .enumerate()
            .filter(|(_, s)| s.geometry.bbox_intersects(&bbox))
            .map(|(i, _)| i)
            .collect();

        let primary = match self.config.predicate {
            JoinPredicate::Within => candidates
                .iter()
                .copied()
                .find(|&i| states[i].geometry.contains(geometry))
                .map(|i| (i, AssignmentMethod::Within)),
            JoinPredicate::LargestOverlap => largest_overlap(geometry, states, &candidates)
                .map(|i| (i, AssignmentMethod::LargestOverlap)),
        };

        primary.or_else(|| {
            if !self.config.centroid_fallback {
                return None;
            }
            let centroid = geometry.centroid()?;
            candidates
                .iter()
                .copied()
                .find(|&i| states[i].geometry.contains_point(&centroid))
                .map(|i| (i, AssignmentMethod::Centroid))
        })
    }
}

/// Candidate with the largest positive intersection area; ties keep the earlier state
fn largest_overlap(geometry: &Geometry, states: &[StateRecord], candidates: &[usize]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for &i in candidates {
        let area = states[i].geometry.intersection(geometry).area();
        if area > 0.0 && best.map_or(true, |(_, best_area)| area > best_area) {
            best = Some((i, area));
        }
    }
    best.map(|(i, _)| i)
}
