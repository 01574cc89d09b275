//! Coverage analysis
//!
//! For each state, the summed area of its ZIP3 regions divided by the state's
//! own area. Areas are measured in the CONUS Albers equal-area projection.
//! The result is a data-quality report only: warnings never abort a run and
//! nothing here feeds back into the geometry.

use crate::config::CoverageConfig;
use crate::crs::Crs;
use crate::models::{StateRecord, Zip3Region};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};
use zip3_common::{Result, Zip3Error};

/// File name of the JSON report in the output directory
pub const COVERAGE_REPORT_FILE: &str = "coverage_report.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageBand {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl CoverageBand {
    pub fn classify(ratio: f64, config: &CoverageConfig) -> Self {
        if ratio >= config.band_excellent {
            CoverageBand::Excellent
        } else if ratio >= config.band_good {
            CoverageBand::Good
        } else if ratio >= config.band_fair {
            CoverageBand::Fair
        } else {
            CoverageBand::Poor
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CoverageRow {
    pub state_abbr: String,
    /// Square metres
    pub summed_zip3_area: f64,
    /// Square metres
    pub official_state_area: f64,
    pub coverage_ratio: f64,
    pub band: CoverageBand,
    pub region_count: usize,
    pub note: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CoverageWarning {
    AboveMaximum { state_abbr: String, ratio: f64, max_ratio: f64 },
    NoRegions { state_abbr: String },
    ZeroStateArea { state_abbr: String },
}

impl std::fmt::Display for CoverageWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoverageWarning::AboveMaximum {
                state_abbr,
                ratio,
                max_ratio,
            } => write!(
                f,
                "{}: coverage {:.1}% exceeds the {:.1}% maximum",
                state_abbr,
                ratio * 100.0,
                max_ratio * 100.0
            ),
            CoverageWarning::NoRegions { state_abbr } => {
                write!(f, "{}: no ZIP3 regions, coverage 0%", state_abbr)
            },
            CoverageWarning::ZeroStateArea { state_abbr } => {
                write!(f, "{}: state polygon has no area", state_abbr)
            },
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CoverageSummary {
    pub states: usize,
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    pub above_100: usize,
    pub above_max: usize,
    pub excellent: usize,
    pub good: usize,
    pub fair: usize,
    pub poor: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoverageReport {
    /// Sorted by ascending coverage ratio
    pub rows: Vec<CoverageRow>,
    pub warnings: Vec<CoverageWarning>,
    pub summary: CoverageSummary,
    pub max_ratio: f64,
}

impl CoverageReport {
    pub fn row(&self, state_abbr: &str) -> Option<&CoverageRow> {
        self.rows.iter().find(|r| r.state_abbr == state_abbr)
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| Zip3Error::write(path, e))
    }
}

pub struct CoverageAnalyzer<'a> {
    config: &'a CoverageConfig,
    /// CRS the region and state geometries are in
    crs: Crs,
}

impl<'a> CoverageAnalyzer<'a> {
    pub fn new(config: &'a CoverageConfig, crs: Crs) -> Self {
        Self { config, crs }
    }

    pub fn analyze(&self, regions: &[Zip3Region], states: &[StateRecord]) -> CoverageReport {
        let mut summed: HashMap<&str, (f64, usize)> = HashMap::new();
        for region in regions {
            let entry = summed.entry(region.state_abbr()).or_insert((0.0, 0));
            entry.0 += region.geometry.equal_area(self.crs);
            entry.1 += 1;
        }

        let mut rows = Vec::with_capacity(states.len());
        let mut warnings = Vec::new();

        for state in states {
            let official = state.geometry.equal_area(self.crs);
            let (zip3_area, region_count) = summed
                .get(state.state_abbr.as_str())
                .copied()
                .unwrap_or((0.0, 0));

            if region_count == 0 {
                warnings.push(CoverageWarning::NoRegions {
                    state_abbr: state.state_abbr.clone(),
                });
            }
            let ratio = if official > 0.0 {
                zip3_area / official
            } else {
                warnings.push(CoverageWarning::ZeroStateArea {
                    state_abbr: state.state_abbr.clone(),
                });
                0.0
            };
            if ratio > self.config.max_ratio {
                warnings.push(CoverageWarning::AboveMaximum {
                    state_abbr: state.state_abbr.clone(),
                    ratio,
                    max_ratio: self.config.max_ratio,
                });
            }

            rows.push(CoverageRow {
                state_abbr: state.state_abbr.clone(),
                summed_zip3_area: zip3_area,
                official_state_area: official,
                coverage_ratio: ratio,
                band: CoverageBand::classify(ratio, self.config),
                region_count,
                note: coverage_note(&state.state_abbr, ratio, self.config),
            });
        }

        rows.sort_by(|a, b| {
            a.coverage_ratio
                .total_cmp(&b.coverage_ratio)
                .then_with(|| a.state_abbr.cmp(&b.state_abbr))
        });
        let summary = summarize(&rows, self.config.max_ratio);

        CoverageReport {
            rows,
            warnings,
            summary,
            max_ratio: self.config.max_ratio,
        }
    }

    /// Log the lowest and highest states, the summary and every warning
    pub fn log_report(&self, report: &CoverageReport) {
        let n = self.config.report_extremes.min(report.rows.len());

        info!("States with lowest ZIP3 coverage:");
        for row in report.rows.iter().take(n) {
            info!("  {}: {:>6.1}% - {}", row.state_abbr, row.coverage_ratio * 100.0, row.note);
        }
        info!("States with highest ZIP3 coverage:");
        for row in report.rows.iter().rev().take(n).rev() {
            info!("  {}: {:>6.1}% - {}", row.state_abbr, row.coverage_ratio * 100.0, row.note);
        }

        let s = &report.summary;
        info!(
            states = s.states,
            mean = %format!("{:.1}%", s.mean * 100.0),
            median = %format!("{:.1}%", s.median * 100.0),
            max = %format!("{:.1}%", s.max * 100.0),
            above_100 = s.above_100,
            "Coverage statistics"
        );
        info!(
            excellent = s.excellent,
            good = s.good,
            fair = s.fair,
            poor = s.poor,
            "Coverage bands"
        );

        for warning in &report.warnings {
            warn!("Coverage warning: {}", warning);
        }
        if s.above_max == 0 {
            info!(
                "Coverage validation passed (max {:.1}% <= {:.1}%)",
                s.max * 100.0,
                report.max_ratio * 100.0
            );
        }
    }
}

fn summarize(rows: &[CoverageRow], max_ratio: f64) -> CoverageSummary {
    if rows.is_empty() {
        return CoverageSummary::default();
    }

    // rows are sorted by ratio
    let ratios: Vec<f64> = rows.iter().map(|r| r.coverage_ratio).collect();
    let n = ratios.len();
    let median = if n % 2 == 1 {
        ratios[n / 2]
    } else {
        (ratios[n / 2 - 1] + ratios[n / 2]) / 2.0
    };
    let count_band = |band| rows.iter().filter(|r| r.band == band).count();

    CoverageSummary {
        states: n,
        mean: ratios.iter().sum::<f64>() / n as f64,
        median,
        min: ratios[0],
        max: ratios[n - 1],
        above_100: ratios.iter().filter(|&&r| r > 1.0).count(),
        above_max: ratios.iter().filter(|&&r| r > max_ratio).count(),
        excellent: count_band(CoverageBand::Excellent),
        good: count_band(CoverageBand::Good),
        fair: count_band(CoverageBand::Fair),
        poor: count_band(CoverageBand::Poor),
    }
}

/// Short explanation of a coverage ratio, for the report
pub fn coverage_note(state_abbr: &str, ratio: f64, config: &CoverageConfig) -> &'static str {
    if ratio > 1.2 {
        "Multiple ZIP overlaps or boundary differences"
    } else if ratio > config.max_ratio {
        "Minor boundary differences"
    } else if ratio >= config.band_excellent {
        "Excellent coverage"
    } else if ratio >= config.band_good {
        "Good coverage"
    } else if ratio >= config.band_fair {
        "Fair coverage"
    } else {
        match state_abbr {
            "AK" => "Sparse population, vast wilderness",
            "HI" => "Island geography limits",
            "NV" | "UT" | "CA" | "OR" => "Large rural/desert areas",
            _ => "Rural areas without postal service",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::geometry::tests::rect;
    use crate::geometry::Geometry;
    use zip3_common::RegionKey;

    fn state(abbr: &str, geometry: Geometry) -> StateRecord {
        StateRecord {
            state_abbr: abbr.to_string(),
            state_fips: String::new(),
            geometry,
        }
    }

    fn region(abbr: &str, zip3: &str, geometry: Geometry) -> Zip3Region {
        Zip3Region {
            key: RegionKey::new(abbr, zip3),
            geometry,
            member_count: 1,
        }
    }

    #[test]
    fn test_ratios_bands_and_warnings() {
        let config = CoverageConfig::default();
        let states = vec![
            state("MA", rect(-73.0, 41.5, -71.0, 42.5)),
            state("NH", rect(-73.0, 42.5, -71.0, 43.5)),
            state("VT", rect(-74.0, 43.5, -72.0, 44.5)),
        ];
        let regions = vec![
            // Western half and eastern half of MA
            region("MA", "010", rect(-73.0, 41.5, -72.0, 42.5)),
            region("MA", "021", rect(-72.0, 41.5, -71.0, 42.5)),
            // Half of NH
            region("NH", "030", rect(-73.0, 42.5, -72.0, 43.5)),
        ];

        let report = CoverageAnalyzer::new(&config, Crs::Nad83).analyze(&regions, &states);

        let ma = report.row("MA").unwrap();
        assert!((ma.coverage_ratio - 1.0).abs() < 0.01);
        assert_eq!(ma.band, CoverageBand::Excellent);
        assert_eq!(ma.region_count, 2);

        let nh = report.row("NH").unwrap();
        assert!((nh.coverage_ratio - 0.5).abs() < 0.01);
        assert_eq!(nh.band, CoverageBand::Poor);

        let vt = report.row("VT").unwrap();
        assert_eq!(vt.coverage_ratio, 0.0);
        assert_eq!(report.rows[0].state_abbr, "VT");
        assert_eq!(
            report.warnings,
            vec![CoverageWarning::NoRegions {
                state_abbr: "VT".to_string()
            }]
        );

        assert_eq!(report.summary.states, 3);
        assert_eq!(report.summary.poor, 2);
        assert_eq!(report.summary.above_max, 0);
        assert!((report.summary.median - nh.coverage_ratio).abs() < 1e-12);
    }

    #[test]
    fn test_above_maximum_is_a_warning() {
        let config = CoverageConfig::default();
        let states = vec![state("RI", rect(-71.8, 41.3, -71.1, 42.0))];
        // Two overlapping copies of the state: 200%
        let regions = vec![
            region("RI", "028", rect(-71.8, 41.3, -71.1, 42.0)),
            region("RI", "029", rect(-71.8, 41.3, -71.1, 42.0)),
        ];

        let report = CoverageAnalyzer::new(&config, Crs::Nad83).analyze(&regions, &states);
        assert!(matches!(
            report.warnings.as_slice(),
            [CoverageWarning::AboveMaximum { .. }]
        ));
        assert_eq!(report.summary.above_100, 1);
        assert_eq!(report.rows[0].note, "Multiple ZIP overlaps or boundary differences");
    }

    #[test]
    fn test_coverage_note() {
        let config = CoverageConfig::default();
        assert_eq!(coverage_note("AK", 0.40, &config), "Sparse population, vast wilderness");
        assert_eq!(coverage_note("HI", 0.60, &config), "Island geography limits");
        assert_eq!(coverage_note("NV", 0.70, &config), "Large rural/desert areas");
        assert_eq!(coverage_note("ME", 0.70, &config), "Rural areas without postal service");
        assert_eq!(coverage_note("AK", 0.97, &config), "Excellent coverage");
        assert_eq!(coverage_note("TX", 1.08, &config), "Minor boundary differences");
    }

    #[test]
    fn test_write_json() {
        let dir = tempfile::tempdir().unwrap();
        let config = CoverageConfig::default();
        let report = CoverageAnalyzer::new(&config, Crs::Nad83).analyze(&[], &[]);
        let path = dir.path().join(COVERAGE_REPORT_FILE);
        report.write_json(&path).unwrap();

        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(value["summary"]["states"], 0);
        assert_eq!(value["max_ratio"], 1.05);
    }
}
