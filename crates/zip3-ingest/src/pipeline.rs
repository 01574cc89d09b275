//! State × ZIP3 pipeline
//!
//! Runs the stages strictly in order over the whole dataset:
//! 1. Load ZCTA and state layers (downloading states if absent)
//! 2. Join every ZCTA to one state
//! 3. Clip each ZCTA to its state
//! 4. Dissolve by (state, ZIP3)
//! 5. Repair and simplify
//! 6. Analyze coverage
//! 7. Export, then write the coverage report and manifest

use crate::clip::{ClipStats, Clipper};
use crate::config::{ExportFormat, PipelineConfig};
use crate::coverage::{CoverageAnalyzer, CoverageReport, COVERAGE_REPORT_FILE};
use crate::crs::Crs;
use crate::dissolve::Dissolver;
use crate::export::{ExportedFile, Exporter, FIELD_STATE, FIELD_ZIP3};
use crate::join::{JoinStats, SpatialJoiner};
use crate::loader::layer::{field_string, PolygonLayer};
use crate::loader::{InputLoader, LoadStats, LoadedInputs, StateBoundaryFetcher};
use crate::manifest::{OutputManifest, MANIFEST_FILE};
use crate::models::Zip3Region;
use crate::repair::{RepairStats, TopologyRepairer};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, info_span, warn};
use zip3_common::{RegionKey, Result, Zip3Error};

/// Counts from every stage of one run
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineStats {
    pub load: LoadStats,
    pub join: JoinStats,
    pub clip: ClipStats,
    pub trimmed: usize,
    pub dissolved: usize,
    pub repair: RepairStats,
    pub regions: usize,
    pub coverage_warnings: usize,
    pub duration_seconds: f64,
}

/// Everything a completed run produced
#[derive(Debug)]
pub struct PipelineOutput {
    pub crs: Crs,
    pub regions: Vec<Zip3Region>,
    pub coverage: CoverageReport,
    pub exported: Vec<ExportedFile>,
    pub manifest_path: PathBuf,
    pub stats: PipelineStats,
}

pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Full run: load (with the state download if needed) then transform
    pub async fn run(&self) -> Result<PipelineOutput> {
        let start_time = Instant::now();
        info!(
            zcta_dir = %self.config.input.zcta_dir.display(),
            output_dir = %self.config.output.dir.display(),
            "Starting state/ZIP3 pipeline"
        );

        // Step 1: Load inputs
        let inputs = InputLoader::new(&self.config.input).load().await?;

        let mut output = self.transform(inputs)?;
        output.stats.duration_seconds = start_time.elapsed().as_secs_f64();

        info!(
            "Pipeline complete: {} ZCTAs in, {} regions out, {} dropped (unassigned {}, empty clip {}, invalid {}), {} coverage warnings in {:.2}s",
            output.stats.load.zctas_loaded,
            output.stats.regions,
            output.stats.join.unassigned
                + output.stats.clip.dropped_empty
                + output.stats.repair.dropped_invalid.len(),
            output.stats.join.unassigned,
            output.stats.clip.dropped_empty,
            output.stats.repair.dropped_invalid.len(),
            output.stats.coverage_warnings,
            output.stats.duration_seconds
        );

        Ok(output)
    }

    /// Stages 2 through 7 over already-loaded inputs
    pub fn transform(&self, inputs: LoadedInputs) -> Result<PipelineOutput> {
        let LoadedInputs {
            zctas,
            states,
            crs,
            stats: load,
        } = inputs;
        let mut stats = PipelineStats {
            load,
            ..PipelineStats::default()
        };

        // Step 2: Spatial join
        let joined = {
            let _span = info_span!("join").entered();
            SpatialJoiner::new(&self.config.join).join(zctas, &states)
        };
        stats.join = joined.stats;

        // Step 3: Clip to the assigned state
        let clipped = {
            let _span = info_span!("clip").entered();
            Clipper::new(self.config.geometry.min_clip_area).clip(joined.assigned, &states)
        };
        stats.clip = clipped.stats;
        stats.trimmed = clipped.trimmed.len();

        // Step 4: Dissolve by (state, ZIP3)
        let dissolved = {
            let _span = info_span!("dissolve").entered();
            Dissolver::dissolve(clipped.trimmed)
        };
        stats.dissolved = dissolved.len();

        // Step 5: Repair and simplify
        let repaired = {
            let _span = info_span!("repair").entered();
            TopologyRepairer::new(&self.config.geometry, crs).process(dissolved, &states)
        };
        stats.repair = repaired.stats;
        let regions = repaired.regions;
        stats.regions = regions.len();

        // Step 6: Coverage
        let analyzer = CoverageAnalyzer::new(&self.config.coverage, crs);
        let coverage = {
            let _span = info_span!("coverage").entered();
            analyzer.analyze(&regions, &states)
        };
        analyzer.log_report(&coverage);
        stats.coverage_warnings = coverage.warnings.len();

        // Step 7: Export
        let exported = {
            let _span = info_span!("export").entered();
            Exporter::new(&self.config.output).export(&regions, crs)?
        };

        coverage.write_json(&self.config.output.dir.join(COVERAGE_REPORT_FILE))?;

        let manifest_path = self.config.output.dir.join(MANIFEST_FILE);
        OutputManifest::build(&exported, &regions, crs, &self.config.output.layer_name)?.save(&manifest_path)?;
        info!(path = %manifest_path.display(), files = exported.len(), "Wrote output manifest");

        Ok(PipelineOutput {
            crs,
            regions,
            coverage,
            exported,
            manifest_path,
            stats,
        })
    }

    /// Make sure the state boundary layer is cached, downloading it if needed
    pub async fn fetch_states(&self) -> Result<PathBuf> {
        StateBoundaryFetcher::new(&self.config.input)?.ensure_present().await
    }

    /// Coverage analysis of the exported shapefile in the output directory
    /// against the state boundaries
    pub async fn coverage_only(&self) -> Result<CoverageReport> {
        let path = self.config.output.path_for(ExportFormat::Shapefile);
        if !path.exists() {
            return Err(Zip3Error::missing_input(&path, "run `zip3-ingest transform` first"));
        }

        let layer = PolygonLayer::read(&path, Crs::Nad83)?;
        let regions = regions_from_layer(layer.features);
        info!(path = %path.display(), regions = regions.len(), "Loaded exported regions");

        let state_path = self.fetch_states().await?;
        let states = InputLoader::new(&self.config.input).load_states(&state_path, layer.crs)?;

        let analyzer = CoverageAnalyzer::new(&self.config.coverage, layer.crs);
        let report = analyzer.analyze(&regions, &states);
        analyzer.log_report(&report);

        let report_path = path.parent().unwrap_or_else(|| Path::new(".")).join(COVERAGE_REPORT_FILE);
        report.write_json(&report_path)?;
        info!(path = %report_path.display(), "Wrote coverage report");

        Ok(report)
    }
}

/// Rebuild regions from exported features; records without both keys are skipped
fn regions_from_layer(features: Vec<(crate::geometry::Geometry, shapefile::dbase::Record)>) -> Vec<Zip3Region> {
    let total = features.len();
    let regions: Vec<Zip3Region> = features
        .into_iter()
        .filter_map(|(geometry, record)| {
            let state = field_string(&record, FIELD_STATE)?;
            let zip3 = field_string(&record, FIELD_ZIP3)?;
            Some(Zip3Region {
                key: RegionKey::new(state, zip3),
                geometry,
                member_count: 1,
            })
        })
        .collect();
    if regions.len() < total {
        warn!(skipped = total - regions.len(), "Skipped exported records without {FIELD_STATE}/{FIELD_ZIP3}");
    }
    regions
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::OutputConfig;
    use crate::geometry::tests::rect;
    use crate::models::{StateRecord, ZctaRecord};

    fn inputs() -> LoadedInputs {
        let zcta = |zip5: &str, g| ZctaRecord {
            zip5: zip5.to_string(),
            geometry: g,
        };
        LoadedInputs {
            zctas: vec![
                zcta("02134", rect(-71.5, 42.0, -71.4, 42.1)),
                zcta("02135", rect(-71.4, 42.0, -71.3, 42.1)),
                // straddles MA/NH, centroid in NH
                zcta("03060", rect(-71.5, 42.4, -71.4, 42.7)),
            ],
            states: vec![
                StateRecord {
                    state_abbr: "MA".to_string(),
                    state_fips: "25".to_string(),
                    geometry: rect(-73.0, 41.5, -70.0, 42.5),
                },
                StateRecord {
                    state_abbr: "NH".to_string(),
                    state_fips: "33".to_string(),
                    geometry: rect(-72.5, 42.5, -70.5, 45.0),
                },
            ],
            crs: Crs::Nad83,
            stats: LoadStats::default(),
        }
    }

    #[test]
    fn test_transform_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            output: OutputConfig {
                dir: dir.path().join("out"),
                ..OutputConfig::default()
            },
            ..PipelineConfig::default()
        };

        let output = Pipeline::new(config).transform(inputs()).unwrap();
        let keys: Vec<String> = output.regions.iter().map(|r| r.key.to_string()).collect();
        assert_eq!(keys, vec!["MA-021", "NH-030"]);
        assert_eq!(output.stats.join.centroid, 1);
        assert_eq!(output.regions[0].member_count, 2);

        // NH-030 was clipped to NH: 0.1 x 0.2 degrees
        assert!(output.regions[1].geometry.area() < 0.1 * 0.3);
        assert!(output.manifest_path.exists());
        assert!(dir.path().join("out").join(COVERAGE_REPORT_FILE).exists());
    }

    #[test]
    fn test_regions_from_layer_skips_incomplete_records() {
        let mut complete = shapefile::dbase::Record::default();
        complete.insert(
            FIELD_STATE.to_string(),
            shapefile::dbase::FieldValue::Character(Some("MA".to_string())),
        );
        complete.insert(
            FIELD_ZIP3.to_string(),
            shapefile::dbase::FieldValue::Character(Some("021".to_string())),
        );
        let incomplete = shapefile::dbase::Record::default();

        let regions = regions_from_layer(vec![
            (rect(0.0, 0.0, 1.0, 1.0), complete),
            (rect(1.0, 1.0, 2.0, 2.0), incomplete),
        ]);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].key, RegionKey::new("MA", "021"));
    }
}
