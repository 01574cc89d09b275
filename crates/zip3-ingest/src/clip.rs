//! Clipping assigned ZCTAs to their state boundary

use crate::models::{AssignedZcta, AssignmentMethod, StateRecord, TrimmedPolygon};
use crate::progress::create_progress_bar;
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, Serialize)]
pub struct ClipStats {
    /// Intersected with the state boundary
    pub clipped: usize,
    /// Already inside the state; kept as is
    pub passed_through: usize,
    /// Nothing (or only a sliver) left after intersection
    pub dropped_empty: usize,
    pub dropped_zips: Vec<String>,
}

#[derive(Debug)]
pub struct ClipOutcome {
    pub trimmed: Vec<TrimmedPolygon>,
    pub stats: ClipStats,
}

pub struct Clipper {
    /// Trimmed polygons with area at or below this are dropped
    min_area: f64,
}

impl Clipper {
    pub fn new(min_area: f64) -> Self {
        Self { min_area }
    }

    /// Intersect every assignment with its state's boundary.
    ///
    /// `states` must be the slice the assignments were joined against.
    pub fn clip(&self, assigned: Vec<AssignedZcta>, states: &[StateRecord]) -> ClipOutcome {
        let pb = create_progress_bar(assigned.len() as u64, "Clipping ZCTAs to state boundaries");
        let mut stats = ClipStats::default();
        let mut trimmed = Vec::with_capacity(assigned.len());

        for item in assigned {
            pb.inc(1);
            let geometry = if item.method == AssignmentMethod::Within {
                stats.passed_through += 1;
                item.zcta.geometry
            } else {
                stats.clipped += 1;
                states[item.state_index]
                    .geometry
                    .intersection(&item.zcta.geometry)
            };

            if geometry.is_empty() || geometry.area() <= self.min_area {
                debug!(zip5 = %item.zcta.zip5, state = %item.state_abbr, "Clipped ZCTA is empty");
                stats.dropped_empty += 1;
                stats.dropped_zips.push(item.zcta.zip5);
                continue;
            }

            trimmed.push(TrimmedPolygon {
                zip5: item.zcta.zip5,
                state_abbr: item.state_abbr,
                geometry,
            });
        }
        pb.finish_and_clear();

        info!(
            clipped = stats.clipped,
            passed_through = stats.passed_through,
            "Trimmed {} ZCTA polygons",
            trimmed.len()
        );
        if stats.dropped_empty > 0 {
            warn!(count = stats.dropped_empty, "Dropped ZCTAs with no area inside their state");
        }

        ClipOutcome { trimmed, stats }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::geometry::tests::rect;
    use crate::models::ZctaRecord;

    fn state() -> StateRecord {
        StateRecord {
            state_abbr: "MA".to_string(),
            state_fips: "25".to_string(),
            geometry: rect(0.0, 0.0, 10.0, 10.0),
        }
    }

    fn assigned(zip5: &str, x0: f64, y0: f64, x1: f64, y1: f64, method: AssignmentMethod) -> AssignedZcta {
        AssignedZcta {
            zcta: ZctaRecord {
                zip5: zip5.to_string(),
                geometry: rect(x0, y0, x1, y1),
            },
            state_abbr: "MA".to_string(),
            state_index: 0,
            method,
        }
    }

    #[test]
    fn test_clip_trims_straddler_and_keeps_contained() {
        let outcome = Clipper::new(0.0).clip(
            vec![
                assigned("02134", 1.0, 1.0, 2.0, 2.0, AssignmentMethod::Within),
                assigned("01913", 8.0, 8.0, 12.0, 12.0, AssignmentMethod::Centroid),
            ],
            &[state()],
        );

        assert_eq!(outcome.trimmed.len(), 2);
        assert_eq!(outcome.stats.passed_through, 1);
        assert_eq!(outcome.stats.clipped, 1);
        assert!((outcome.trimmed[0].geometry.area() - 1.0).abs() < 1e-9);
        // 4x4 straddler keeps the 2x2 corner inside the state
        assert!((outcome.trimmed[1].geometry.area() - 4.0).abs() < 1e-9);
        let bbox = outcome.trimmed[1].geometry.bounding_rect().unwrap();
        assert!(bbox.max().x <= 10.0 + 1e-9 && bbox.max().y <= 10.0 + 1e-9);
    }

    #[test]
    fn test_clip_drops_empty_and_slivers() {
        let outcome = Clipper::new(0.5).clip(
            vec![
                // Edge contact only
                assigned("02999", 10.0, 0.0, 11.0, 1.0, AssignmentMethod::Centroid),
                // 0.1 x 1 sliver inside
                assigned("02998", 9.9, 0.0, 12.0, 1.0, AssignmentMethod::LargestOverlap),
            ],
            &[state()],
        );

        assert!(outcome.trimmed.is_empty());
        assert_eq!(outcome.stats.dropped_empty, 2);
        assert_eq!(outcome.stats.dropped_zips, vec!["02999", "02998"]);
    }
}
